//! # Configuration
//!
//! Run parameters of the selection model, loadable from a TOML file and fixed
//! for the duration of a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::model::SolveOptions;

/// What the model optimizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
  /// Maximize expected return under a variance cap.
  #[default]
  MaxProfit,
  /// Minimize variance above a return floor.
  MinVariance,
}

/// Per-asset override of the investment bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetBounds {
  pub min: Option<f64>,
  pub max: Option<f64>,
}

/// Limits handed to the optimization engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
  /// Wall-clock limit in seconds.
  pub time_limit_secs: Option<f64>,
  /// Branch-and-bound node limit.
  pub max_nodes: usize,
  /// Integrality tolerance for binary variables.
  pub integrality_tol: f64,
  pub verbose: bool,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      time_limit_secs: None,
      max_nodes: 100_000,
      integrality_tol: 1e-6,
      verbose: false,
    }
  }
}

impl SolverSettings {
  pub fn to_options(&self) -> SolveOptions {
    SolveOptions {
      time_limit: self.time_limit_secs.map(Duration::from_secs_f64),
      max_nodes: self.max_nodes,
      integrality_tol: self.integrality_tol,
      verbose: self.verbose,
      interrupt: None,
    }
  }
}

/// Complete run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortfolioConfig {
  pub objective: Objective,
  /// Cardinality limit `K`.
  pub max_assets: usize,
  /// Exposure cap applied to every sector without an override.
  pub sector_limit: f64,
  pub sector_limits: BTreeMap<String, f64>,
  /// Minimum weight of a selected asset without an override.
  pub min_investment: f64,
  /// Maximum weight of a selected asset without an override.
  pub max_investment: f64,
  pub asset_bounds: BTreeMap<String, AssetBounds>,
  /// Cap on daily portfolio standard deviation, used in max-profit mode.
  pub max_risk: f64,
  /// Return floor `R`; the mean of the asset mean returns when unset.
  pub target_return: Option<f64>,
  pub solver: SolverSettings,
}

impl Default for PortfolioConfig {
  fn default() -> Self {
    Self {
      objective: Objective::MaxProfit,
      max_assets: 20,
      sector_limit: 0.33,
      sector_limits: BTreeMap::new(),
      min_investment: 0.01,
      max_investment: 0.33,
      asset_bounds: BTreeMap::new(),
      max_risk: 0.01,
      target_return: None,
      solver: SolverSettings::default(),
    }
  }
}

fn check_bounds(parameter: &str, min: f64, max: f64) -> Result<()> {
  if !(min.is_finite() && max.is_finite()) {
    return Err(PortfolioError::invalid_config(parameter, "bounds must be finite"));
  }
  if min < 0.0 {
    return Err(PortfolioError::invalid_config(
      parameter,
      format!("minimum investment {min} is negative"),
    ));
  }
  if max <= 0.0 || max > 1.0 {
    return Err(PortfolioError::invalid_config(
      parameter,
      format!("maximum investment {max} must lie in (0, 1]"),
    ));
  }
  if min > max {
    return Err(PortfolioError::invalid_config(
      parameter,
      format!("minimum investment {min} exceeds maximum {max}"),
    ));
  }
  Ok(())
}

impl PortfolioConfig {
  /// Read a TOML configuration file; absent keys take their defaults.
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let content = fs::read_to_string(path.as_ref())?;
    let config: Self = toml::from_str(&content)?;
    info!(path = %path.as_ref().display(), "loaded configuration");
    Ok(config)
  }

  /// Check every parameter range, naming the first offending one.
  pub fn validate(&self) -> Result<()> {
    if self.max_assets < 1 {
      return Err(PortfolioError::invalid_config(
        "max_assets",
        "cardinality limit must be at least 1",
      ));
    }

    check_bounds("min_investment/max_investment", self.min_investment, self.max_investment)?;
    for asset in self.asset_bounds.keys() {
      check_bounds(
        &format!("asset_bounds.{asset}"),
        self.min_investment_for(asset),
        self.max_investment_for(asset),
      )?;
    }

    let sector_limits = std::iter::once(("sector_limit".to_string(), self.sector_limit)).chain(
      self
        .sector_limits
        .iter()
        .map(|(s, &v)| (format!("sector_limits.{s}"), v)),
    );
    for (parameter, limit) in sector_limits {
      if !limit.is_finite() || limit < 0.0 {
        return Err(PortfolioError::invalid_config(
          parameter,
          format!("exposure limit {limit} must be finite and non-negative"),
        ));
      }
    }

    if !self.max_risk.is_finite() || self.max_risk <= 0.0 {
      return Err(PortfolioError::invalid_config(
        "max_risk",
        format!("risk cap {} must be finite and positive", self.max_risk),
      ));
    }

    if let Some(r) = self.target_return {
      if !r.is_finite() {
        return Err(PortfolioError::invalid_config(
          "target_return",
          "target return must be finite",
        ));
      }
    }

    if let Some(t) = self.solver.time_limit_secs {
      if !t.is_finite() || t <= 0.0 {
        return Err(PortfolioError::invalid_config(
          "solver.time_limit_secs",
          format!("time limit {t} must be finite and positive"),
        ));
      }
    }

    if !(self.solver.integrality_tol > 0.0 && self.solver.integrality_tol < 0.5) {
      return Err(PortfolioError::invalid_config(
        "solver.integrality_tol",
        "tolerance must lie in (0, 0.5)",
      ));
    }

    Ok(())
  }

  pub fn min_investment_for(&self, asset: &str) -> f64 {
    self
      .asset_bounds
      .get(asset)
      .and_then(|b| b.min)
      .unwrap_or(self.min_investment)
  }

  pub fn max_investment_for(&self, asset: &str) -> f64 {
    self
      .asset_bounds
      .get(asset)
      .and_then(|b| b.max)
      .unwrap_or(self.max_investment)
  }

  pub fn sector_limit_for(&self, sector: &str) -> f64 {
    self
      .sector_limits
      .get(sector)
      .copied()
      .unwrap_or(self.sector_limit)
  }
}
