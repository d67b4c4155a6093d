//! # Pipeline
//!
//! $$
//! P \to (R, \mu) \to \Sigma \to \text{model} \to \text{solve} \to \text{report}
//! $$
//!
//! Single-pass orchestration of the estimation, model, solve and report stages.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use crate::config::PortfolioConfig;
use crate::data::load_prices;
use crate::data::load_sector_map;
use crate::data::PriceLoadOptions;
use crate::data::PriceSeries;
use crate::data::SectorMap;
use crate::error::Result;
use crate::estimate::Estimates;
use crate::model::build_model;
use crate::model::OptimizationEngine;
use crate::model::SolveOptions;
use crate::report::interpret;
use crate::report::PortfolioOutcome;
use crate::solver::ClarabelEngine;

/// Entry point running one selection with a fixed configuration.
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer {
  config: PortfolioConfig,
  interrupt: Option<Arc<AtomicBool>>,
}

impl PortfolioOptimizer {
  pub fn new(config: PortfolioConfig) -> Self {
    Self {
      config,
      interrupt: None,
    }
  }

  /// Share a flag that stops the solve when set.
  pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
    self.interrupt = Some(flag);
    self
  }

  pub fn config(&self) -> &PortfolioConfig {
    &self.config
  }

  fn solve_options(&self) -> SolveOptions {
    SolveOptions {
      interrupt: self.interrupt.clone(),
      ..self.config.solver.to_options()
    }
  }

  /// Estimate, build, solve once on `engine` and interpret.
  ///
  /// Estimation and configuration errors surface before the engine sees a
  /// solve call; a non-optimal solve is returned as
  /// [`PortfolioOutcome::NonOptimal`].
  pub fn optimize_with<E: OptimizationEngine + ?Sized>(
    &self,
    prices: &PriceSeries,
    sectors: &SectorMap,
    engine: &mut E,
  ) -> Result<PortfolioOutcome> {
    let estimates = Estimates::from_prices(prices)?;
    let model = build_model(engine, &estimates, sectors, &self.config)?;
    let status = engine.solve(&self.solve_options());
    interpret(engine, status, &model, &estimates)
  }

  /// Same as [`Self::optimize_with`] using the bundled [`ClarabelEngine`].
  pub fn optimize(&self, prices: &PriceSeries, sectors: &SectorMap) -> Result<PortfolioOutcome> {
    let mut engine = ClarabelEngine::new();
    self.optimize_with(prices, sectors, &mut engine)
  }

  /// Load both input files and run [`Self::optimize`].
  pub fn optimize_files<P: AsRef<Path>, S: AsRef<Path>>(
    &self,
    prices_path: P,
    sectors_path: S,
    load_options: &PriceLoadOptions,
  ) -> Result<PortfolioOutcome> {
    let prices = load_prices(prices_path, load_options)?;
    let sectors = load_sector_map(sectors_path)?;
    let outcome = self.optimize(&prices, &sectors)?;
    info!(status = %outcome.status(), "run complete");
    Ok(outcome)
  }
}
