//! # Market Data
//!
//! $$
//! P \in \mathbb{R}_{>0}^{D \times N}
//! $$
//!
//! Price table and sector map produced by the acquisition step, with their CSV loaders.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use csv::StringRecord;
use ndarray::Array2;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;

/// Daily adjusted closing prices, one row per trading day and one column per asset.
#[derive(Clone, Debug)]
pub struct PriceSeries {
  dates: Vec<NaiveDate>,
  assets: Vec<String>,
  prices: Array2<f64>,
}

impl PriceSeries {
  /// Build a price series, checking shapes, date order and identifier uniqueness.
  ///
  /// Prices are not checked here; missing (`NaN`) or non-positive cells are
  /// reported by the return estimator.
  pub fn new(dates: Vec<NaiveDate>, assets: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    if prices.nrows() != dates.len() || prices.ncols() != assets.len() {
      return Err(PortfolioError::parse(
        "price table",
        format!(
          "shape {}x{} does not match {} dates and {} assets",
          prices.nrows(),
          prices.ncols(),
          dates.len(),
          assets.len()
        ),
      ));
    }

    if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
      return Err(PortfolioError::parse(
        "price table",
        format!("dates must be strictly ascending ({} then {})", w[0], w[1]),
      ));
    }

    let mut seen = HashMap::with_capacity(assets.len());
    for (i, asset) in assets.iter().enumerate() {
      if let Some(prev) = seen.insert(asset.as_str(), i) {
        return Err(PortfolioError::parse(
          "price table",
          format!("asset '{asset}' appears in columns {prev} and {i}"),
        ));
      }
    }

    Ok(Self {
      dates,
      assets,
      prices,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Asset identifiers in column order.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  /// Number of trading days `D`.
  pub fn num_days(&self) -> usize {
    self.dates.len()
  }

  /// Number of assets `N`.
  pub fn num_assets(&self) -> usize {
    self.assets.len()
  }
}

/// Many-to-one mapping from asset identifier to sector label.
///
/// Sectors keep the order in which they first appear, which is the order
/// used when reporting exposures.
#[derive(Clone, Debug, Default)]
pub struct SectorMap {
  sectors: Vec<String>,
  by_asset: HashMap<String, usize>,
}

impl SectorMap {
  pub fn new() -> Self {
    Self::default()
  }

  /// Map `asset` to `sector`. Re-inserting the same pair is a no-op; a
  /// conflicting sector for an already mapped asset is rejected.
  pub fn insert(&mut self, asset: impl Into<String>, sector: impl Into<String>) -> Result<()> {
    let asset = asset.into();
    let sector = sector.into();

    if let Some(&existing) = self.by_asset.get(&asset) {
      if self.sectors[existing] == sector {
        return Ok(());
      }
      return Err(PortfolioError::parse(
        "sector map",
        format!(
          "asset '{asset}' mapped to both '{}' and '{sector}'",
          self.sectors[existing]
        ),
      ));
    }

    let idx = match self.sectors.iter().position(|s| *s == sector) {
      Some(idx) => idx,
      None => {
        self.sectors.push(sector);
        self.sectors.len() - 1
      }
    };
    self.by_asset.insert(asset, idx);
    Ok(())
  }

  /// Sector label of `asset`, if mapped.
  pub fn sector_of(&self, asset: &str) -> Option<&str> {
    self
      .by_asset
      .get(asset)
      .map(|&idx| self.sectors[idx].as_str())
  }

  pub(crate) fn sector_index(&self, asset: &str) -> Option<usize> {
    self.by_asset.get(asset).copied()
  }

  /// Distinct sector labels in first-appearance order.
  pub fn sectors(&self) -> &[String] {
    &self.sectors
  }

  /// Number of mapped assets.
  pub fn len(&self) -> usize {
    self.by_asset.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_asset.is_empty()
  }
}

impl<A: Into<String>, S: Into<String>> FromIterator<(A, S)> for SectorMap {
  /// Collect pairs, keeping the first sector seen for a duplicated asset.
  fn from_iter<T: IntoIterator<Item = (A, S)>>(iter: T) -> Self {
    let mut map = SectorMap::new();
    for (asset, sector) in iter {
      let asset = asset.into();
      if map.by_asset.contains_key(&asset) {
        continue;
      }
      // cannot conflict: the asset is new
      let _ = map.insert(asset, sector);
    }
    map
  }
}

/// Options for [`load_prices`].
#[derive(Clone, Debug)]
pub struct PriceLoadOptions {
  /// Drop rows containing any missing cell instead of keeping them as `NaN`.
  pub drop_incomplete_rows: bool,
}

impl Default for PriceLoadOptions {
  fn default() -> Self {
    Self {
      drop_incomplete_rows: true,
    }
  }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
  let day = raw
    .trim()
    .split(|c: char| c == 'T' || c.is_whitespace())
    .next()?;
  NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_price(raw: &str) -> Option<f64> {
  let raw = raw.trim();
  if raw.is_empty() {
    return None;
  }
  raw.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Load a price table: header row of asset identifiers after a leading date
/// column, then one row per trading day.
pub fn load_prices<P: AsRef<Path>>(path: P, options: &PriceLoadOptions) -> Result<PriceSeries> {
  let path = path.as_ref();
  let name = path.display().to_string();
  let mut reader = ReaderBuilder::new()
    .has_headers(true)
    .trim(csv::Trim::All)
    .from_path(path)?;

  let headers = reader.headers()?.clone();
  if headers.len() < 2 {
    return Err(PortfolioError::parse(
      &name,
      "expected a date column followed by at least one asset column",
    ));
  }
  let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
  let n = assets.len();

  let mut dates = Vec::new();
  let mut values = Vec::new();
  let mut dropped = 0usize;
  let mut record = StringRecord::new();
  let mut line = 1usize;

  while reader.read_record(&mut record)? {
    line += 1;
    let date = record
      .get(0)
      .and_then(parse_date)
      .ok_or_else(|| PortfolioError::parse(&name, format!("line {line}: invalid date")))?;

    let mut row = Vec::with_capacity(n);
    for col in 0..n {
      let cell = record.get(col + 1).unwrap_or("");
      match parse_price(cell) {
        Some(v) => row.push(v),
        None if cell.trim().is_empty() || cell.trim().eq_ignore_ascii_case("nan") => {
          row.push(f64::NAN)
        }
        None => {
          return Err(PortfolioError::parse(
            &name,
            format!("line {line}: invalid price '{cell}' for {}", assets[col]),
          ));
        }
      }
    }

    if options.drop_incomplete_rows && row.iter().any(|v| v.is_nan()) {
      dropped += 1;
      continue;
    }

    dates.push(date);
    values.extend(row);
  }

  if dropped > 0 {
    warn!(path = %name, dropped, "dropped price rows with missing values");
  }

  let prices = Array2::from_shape_vec((dates.len(), n), values)
    .map_err(|e| PortfolioError::parse(&name, e.to_string()))?;
  let series = PriceSeries::new(dates, assets, prices)?;
  info!(
    path = %name,
    days = series.num_days(),
    assets = series.num_assets(),
    "loaded price table"
  );

  Ok(series)
}

/// Load a headerless `asset,sector` mapping.
pub fn load_sector_map<P: AsRef<Path>>(path: P) -> Result<SectorMap> {
  let path = path.as_ref();
  let name = path.display().to_string();
  let mut reader = ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_path(path)?;

  let mut map = SectorMap::new();
  for (i, record) in reader.records().enumerate() {
    let record = record?;
    let asset = record.get(0).unwrap_or("");
    if asset.is_empty() {
      debug!(path = %name, line = i + 1, "skipping row without asset identifier");
      continue;
    }
    let sector = record
      .get(1)
      .filter(|s| !s.is_empty())
      .ok_or_else(|| PortfolioError::parse(&name, format!("line {}: missing sector", i + 1)))?;
    map.insert(asset, sector)?;
  }

  info!(
    path = %name,
    assets = map.len(),
    sectors = map.sectors().len(),
    "loaded sector map"
  );

  Ok(map)
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;

  fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
  }

  #[test]
  #[traced_test]
  fn load_prices_drops_incomplete_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
      &dir,
      "prices.csv",
      "Date,AAA,BBB\n2024-01-02,10,20\n2024-01-03,,21\n2024-01-04 00:00:00,11,22\n",
    );

    let series = load_prices(&path, &PriceLoadOptions::default()).unwrap();
    assert_eq!(series.assets(), &["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(series.num_days(), 2);
    assert_eq!(series.prices()[[1, 1]], 22.0);
    assert!(logs_contain("dropped price rows with missing values"));
  }

  #[test]
  fn load_prices_keeps_gaps_as_nan_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
      &dir,
      "prices.csv",
      "Date,AAA\n2024-01-02,10\n2024-01-03,NaN\n2024-01-04,11\n",
    );

    let opts = PriceLoadOptions {
      drop_incomplete_rows: false,
    };
    let series = load_prices(&path, &opts).unwrap();
    assert_eq!(series.num_days(), 3);
    assert!(series.prices()[[1, 0]].is_nan());
  }

  #[test]
  fn load_prices_rejects_garbage_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "prices.csv", "Date,AAA\n2024-01-02,abc\n");

    let err = load_prices(&path, &PriceLoadOptions::default()).unwrap_err();
    assert!(matches!(err, PortfolioError::Parse { .. }));
  }

  #[test]
  fn price_series_requires_ascending_dates() {
    let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
    let res = PriceSeries::new(
      vec![d("2024-01-03"), d("2024-01-02")],
      vec!["AAA".into()],
      array![[1.0], [2.0]],
    );
    assert!(matches!(res, Err(PortfolioError::Parse { .. })));
  }

  #[test]
  fn sector_map_skips_blank_identifier_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
      &dir,
      "sectors.csv",
      ",Sector\nAAPL,Technology\nJPM,Financials\nMSFT,Technology\n",
    );

    let map = load_sector_map(&path).unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(map.sectors(), &["Technology".to_string(), "Financials".to_string()]);
    assert_eq!(map.sector_of("MSFT"), Some("Technology"));
    assert_eq!(map.sector_of("XOM"), None);
  }

  #[test]
  fn sector_map_rejects_conflicting_entries() {
    let mut map = SectorMap::new();
    map.insert("AAPL", "Technology").unwrap();
    map.insert("AAPL", "Technology").unwrap();
    assert!(map.insert("AAPL", "Healthcare").is_err());
  }
}
