//! # Result Interpretation
//!
//! $$
//! r_p = \mu^\top x,\quad \sigma_p^2 = x^\top \Sigma x,\quad
//! r_p^{\text{ann}} = 252\, r_p,\quad \sigma_p^{\text{ann}} = \sqrt{252}\,\sigma_p
//! $$
//!
//! Turns a solved model into the allocation report.

use std::fmt;

use ndarray::Array1;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::Objective;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimate::Estimates;
use crate::model::OptimizationEngine;
use crate::model::PortfolioModel;
use crate::model::SolveStatus;
use crate::model::Var;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Selection indicators above this value count as selected.
const SELECTION_THRESHOLD: f64 = 0.5;

/// One selected asset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Holding {
  pub asset: String,
  pub sector: String,
  pub weight: f64,
}

/// Summed weight of one sector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectorExposure {
  pub sector: String,
  pub exposure: f64,
}

/// Portfolio-level metrics of an optimal solution.
#[derive(Clone, Debug, Serialize)]
pub struct PortfolioReport {
  pub objective: Objective,
  pub target_return: f64,
  /// Selected assets in price-table column order.
  pub holdings: Vec<Holding>,
  pub daily_return: f64,
  pub annualized_return: f64,
  pub daily_variance: f64,
  pub daily_risk: f64,
  pub annualized_risk: f64,
  /// Every sector of the sector map, zero exposures included.
  pub sector_exposure: Vec<SectorExposure>,
}

impl PortfolioReport {
  /// Sum of all holding weights.
  pub fn total_weight(&self) -> f64 {
    self.holdings.iter().map(|h| h.weight).sum()
  }

  pub fn exposure_of(&self, sector: &str) -> Option<f64> {
    self
      .sector_exposure
      .iter()
      .find(|s| s.sector == sector)
      .map(|s| s.exposure)
  }
}

/// Terminal result of a run.
#[derive(Clone, Debug)]
pub enum PortfolioOutcome {
  Optimal(PortfolioReport),
  /// The solve ended without an optimal solution; no allocation is reported.
  NonOptimal(SolveStatus),
}

impl PortfolioOutcome {
  pub fn status(&self) -> SolveStatus {
    match self {
      PortfolioOutcome::Optimal(_) => SolveStatus::Optimal,
      PortfolioOutcome::NonOptimal(status) => *status,
    }
  }

  pub fn report(&self) -> Option<&PortfolioReport> {
    match self {
      PortfolioOutcome::Optimal(report) => Some(report),
      PortfolioOutcome::NonOptimal(_) => None,
    }
  }

  /// JSON rendering: `{"status": ..., "report": ...}` with a null report when non-optimal.
  pub fn to_json(&self) -> serde_json::Value {
    json!({
      "status": self.status(),
      "report": self.report(),
    })
  }
}

fn read_all<E: OptimizationEngine + ?Sized>(engine: &E, vars: &[Var]) -> Result<Vec<f64>> {
  vars
    .iter()
    .map(|&v| {
      engine.value(v).ok_or_else(|| {
        PortfolioError::MissingSolution(engine.var_name(v).unwrap_or("?").to_string())
      })
    })
    .collect()
}

/// Interpret the engine state after a solve that returned `status`.
///
/// A non-optimal status is passed through without reading any variable.
pub fn interpret<E: OptimizationEngine + ?Sized>(
  engine: &E,
  status: SolveStatus,
  model: &PortfolioModel,
  estimates: &Estimates,
) -> Result<PortfolioOutcome> {
  if !status.is_optimal() {
    info!(%status, "no optimal solution, skipping allocation report");
    return Ok(PortfolioOutcome::NonOptimal(status));
  }

  let x = Array1::from(read_all(engine, &model.weights)?);
  let y = read_all(engine, &model.selected)?;

  let holdings = y
    .iter()
    .enumerate()
    .filter(|&(_, &yi)| yi > SELECTION_THRESHOLD)
    .map(|(i, _)| Holding {
      asset: model.assets[i].clone(),
      sector: model.sector_of(i).to_string(),
      weight: x[i],
    })
    .collect::<Vec<_>>();

  let daily_return = estimates.mu.dot(&x);
  let daily_variance = x.dot(&estimates.sigma.dot(&x));
  let daily_risk = daily_variance.max(0.0).sqrt();

  let mut totals = vec![0.0; model.sectors.len()];
  for (i, &s) in model.asset_sector.iter().enumerate() {
    totals[s] += x[i];
  }
  let sector_exposure = model
    .sectors
    .iter()
    .zip(totals)
    .map(|(sector, exposure)| SectorExposure {
      sector: sector.clone(),
      exposure,
    })
    .collect();

  info!(
    selected = holdings.len(),
    daily_return,
    daily_risk,
    "interpreted optimal allocation"
  );

  Ok(PortfolioOutcome::Optimal(PortfolioReport {
    objective: model.objective,
    target_return: model.target_return,
    holdings,
    daily_return,
    annualized_return: daily_return * TRADING_DAYS,
    daily_variance,
    daily_risk,
    annualized_risk: daily_risk * TRADING_DAYS.sqrt(),
    sector_exposure,
  }))
}

impl fmt::Display for PortfolioReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Optimal solution found!")?;
    writeln!(f)?;
    writeln!(f, "Selected Companies & Allocations:")?;
    for h in &self.holdings {
      writeln!(f, "{} ({}): {:.4}", h.asset, h.sector, h.weight)?;
    }
    writeln!(f)?;
    writeln!(
      f,
      "Portfolio Expected Daily Return: {:.4}%",
      self.daily_return * 100.0
    )?;
    writeln!(
      f,
      "Portfolio Expected Annualized Return: {:.2}%",
      self.annualized_return * 100.0
    )?;
    writeln!(
      f,
      "Portfolio Daily Risk (Std Dev): {:.4}%",
      self.daily_risk * 100.0
    )?;
    writeln!(
      f,
      "Portfolio Annualized Risk (Std Dev): {:.2}%",
      self.annualized_risk * 100.0
    )?;
    writeln!(f)?;
    writeln!(f, "Sector Exposure:")?;
    for s in &self.sector_exposure {
      writeln!(f, "{}: {:.4}", s.sector, s.exposure)?;
    }
    Ok(())
  }
}

impl fmt::Display for PortfolioOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PortfolioOutcome::Optimal(report) => write!(f, "{report}"),
      PortfolioOutcome::NonOptimal(status) => {
        writeln!(f, "No optimal solution found. Status: {status}")
      }
    }
  }
}
