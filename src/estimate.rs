//! # Return & Covariance Estimation
//!
//! $$
//! r_{t,i} = \ln\frac{P_{t+1,i}}{P_{t,i}},\qquad
//! \mu_i = \frac1T\sum_t r_{t,i},\qquad
//! \Sigma = \frac{1}{T-1}(R-\mu)^\top(R-\mu)
//! $$
//!
//! Statistical inputs of the selection model, derived once from the price table.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;

use crate::data::PriceSeries;
use crate::error::PortfolioError;
use crate::error::Result;

/// Minimum number of price rows: two returns are needed for the `T - 1` divisor.
pub const MIN_PRICE_DAYS: usize = 3;

/// Mean vector and covariance matrix of daily log returns.
#[derive(Clone, Debug)]
pub struct Estimates {
  /// Asset identifiers, aligned with `mu` and the rows/columns of `sigma`.
  pub assets: Vec<String>,
  /// `(D - 1) x N` log-return matrix.
  pub returns: Array2<f64>,
  /// Mean daily log return per asset.
  pub mu: Array1<f64>,
  /// Unbiased sample covariance of daily log returns.
  pub sigma: Array2<f64>,
}

impl Estimates {
  /// Run the return and covariance estimators on `prices`.
  pub fn from_prices(prices: &PriceSeries) -> Result<Self> {
    let returns = log_returns(prices)?;
    let mu = mean_returns(returns.view())?;
    let sigma = covariance_matrix(returns.view(), mu.view())?;
    debug!(
      observations = returns.nrows(),
      assets = returns.ncols(),
      "estimated mean returns and covariance"
    );

    Ok(Self {
      assets: prices.assets().to_vec(),
      returns,
      mu,
      sigma,
    })
  }

  pub fn num_assets(&self) -> usize {
    self.mu.len()
  }

  /// Cross-sectional mean of `mu`, the default return floor.
  pub fn mean_of_means(&self) -> f64 {
    self.mu.mean().unwrap_or(0.0)
  }
}

/// Convert the price table into adjacent-day log returns.
///
/// Fails with [`PortfolioError::DataInsufficient`] for fewer than
/// [`MIN_PRICE_DAYS`] rows and with [`PortfolioError::DataQuality`] for the
/// first missing or non-positive price encountered.
pub fn log_returns(prices: &PriceSeries) -> Result<Array2<f64>> {
  let days = prices.num_days();
  if days < MIN_PRICE_DAYS {
    return Err(PortfolioError::DataInsufficient {
      days,
      required: MIN_PRICE_DAYS,
    });
  }

  let p = prices.prices();
  for ((t, i), &v) in p.indexed_iter() {
    if !(v.is_finite() && v > 0.0) {
      return Err(PortfolioError::DataQuality {
        asset: prices.assets()[i].clone(),
        day: t,
        date: prices.dates()[t].to_string(),
        value: v,
      });
    }
  }

  let mut out = Array2::<f64>::zeros((days - 1, prices.num_assets()));
  for t in 0..days - 1 {
    for i in 0..prices.num_assets() {
      out[[t, i]] = (p[[t + 1, i]] / p[[t, i]]).ln();
    }
  }

  Ok(out)
}

/// Arithmetic mean of each return column.
pub fn mean_returns(returns: ArrayView2<f64>) -> Result<Array1<f64>> {
  returns
    .mean_axis(Axis(0))
    .ok_or(PortfolioError::DataInsufficient {
      days: returns.nrows() + 1,
      required: MIN_PRICE_DAYS,
    })
}

/// Unbiased sample covariance of the return columns around `mu`.
///
/// The divisor is `T - 1` for `T` return rows, i.e. `D - 2` in price days.
/// The result is symmetrized so `sigma[[i, j]] == sigma[[j, i]]` exactly.
pub fn covariance_matrix(returns: ArrayView2<f64>, mu: ArrayView1<f64>) -> Result<Array2<f64>> {
  let t = returns.nrows();
  if t + 1 < MIN_PRICE_DAYS {
    return Err(PortfolioError::DataInsufficient {
      days: t + 1,
      required: MIN_PRICE_DAYS,
    });
  }
  if mu.len() != returns.ncols() {
    return Err(PortfolioError::parse(
      "estimates",
      format!(
        "mean vector has {} entries for {} return columns",
        mu.len(),
        returns.ncols()
      ),
    ));
  }

  let centered = &returns - &mu.insert_axis(Axis(0));
  let raw = centered.t().dot(&centered) / (t - 1) as f64;
  let sigma = (&raw + &raw.t()) * 0.5;

  Ok(sigma)
}
