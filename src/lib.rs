//! # constrained-portfolio
//!
//! $$
//! \max_{x,y}\ \mu^\top x \ \text{ s.t. } x^\top\Sigma x \le \sigma_{\max}^2
//! \quad\text{or}\quad
//! \min_{x,y}\ x^\top\Sigma x \ \text{ s.t. } \mu^\top x \ge R
//! $$
//!
//! Cardinality- and sector-constrained portfolio selection from daily prices:
//! log-return estimation, mixed-integer model construction behind a small
//! modeling interface, a bundled branch-and-bound engine and report output.

pub mod config;
pub mod data;
pub mod error;
pub mod estimate;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod solver;

pub use config::Objective;
pub use config::PortfolioConfig;
pub use data::PriceSeries;
pub use data::SectorMap;
pub use error::PortfolioError;
pub use estimate::Estimates;
pub use pipeline::PortfolioOptimizer;
pub use report::PortfolioOutcome;
pub use report::PortfolioReport;
pub use solver::ClarabelEngine;
