//! # Errors
//!
//! Failure kinds detected before any solve attempt. A non-optimal solve is
//! not an error; see [`crate::report::PortfolioOutcome`].

use thiserror::Error;

/// Errors raised while loading data, estimating inputs or building the model.
#[derive(Error, Debug)]
pub enum PortfolioError {
  /// Too few price observations to estimate a covariance matrix.
  #[error("insufficient data: {days} price observations, at least {required} required")]
  DataInsufficient { days: usize, required: usize },

  /// A missing or non-positive price breaks a log-return calculation.
  #[error("bad price for asset '{asset}' on {date} (row {day}): {value}")]
  DataQuality {
    asset: String,
    day: usize,
    date: String,
    value: f64,
  },

  /// Asset present in the price table but absent from the sector map.
  #[error("asset '{0}' has no sector mapping")]
  UnmappedAsset(String),

  /// Out-of-range configuration parameter.
  #[error("invalid configuration: {parameter}: {reason}")]
  InvalidConfiguration { parameter: String, reason: String },

  /// Malformed input file content.
  #[error("parse error in {source_name}: {message}")]
  Parse {
    source_name: String,
    message: String,
  },

  /// Solver reported optimal but did not expose a variable value.
  #[error("solver reported optimal but has no value for variable '{0}'")]
  MissingSolution(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("TOML parsing error: {0}")]
  Toml(#[from] toml::de::Error),
}

impl PortfolioError {
  pub(crate) fn invalid_config(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::InvalidConfiguration {
      parameter: parameter.into(),
      reason: reason.into(),
    }
  }

  pub(crate) fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Parse {
      source_name: source_name.into(),
      message: message.into(),
    }
  }
}

/// Result alias for crate operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;
