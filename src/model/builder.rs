//! # Model Builder
//!
//! $$
//! \begin{aligned}
//! \max_{x,y}\ & \mu^\top x \quad\text{or}\quad \min_{x,y}\ x^\top\Sigma x \\
//! \text{s.t. }\ & l_i y_i \le x_i \le m_i y_i,\quad x_i \le y_i,\quad y_i\in\{0,1\} \\
//! & \mu^\top x \ge R,\quad \textstyle\sum_i x_i = 1,\quad \sum_i y_i \le K \\
//! & \textstyle\sum_{i\in s} x_i \le e_s \ \ \forall s,\qquad x^\top\Sigma x \le \sigma_{\max}^2 \ \text{(max-profit only)}
//! \end{aligned}
//! $$
//!
//! Translates estimates, sector map and configuration into declarations on an
//! [`OptimizationEngine`]. No solving happens here.

use tracing::debug;
use tracing::info;

use super::engine::OptimizationEngine;
use super::expr::Cmp;
use super::expr::Constraint;
use super::expr::LinExpr;
use super::expr::QuadExpr;
use super::expr::Sense;
use super::expr::Var;
use super::expr::VarKind;
use crate::config::Objective;
use crate::config::PortfolioConfig;
use crate::data::SectorMap;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimate::Estimates;

/// Handles to the declared variables plus the resolved model parameters.
#[derive(Clone, Debug)]
pub struct PortfolioModel {
  /// Asset identifiers in variable order.
  pub assets: Vec<String>,
  /// All sectors of the sector map, in map order.
  pub sectors: Vec<String>,
  /// Index into `sectors` for each asset.
  pub asset_sector: Vec<usize>,
  /// Allocation weight `x[i]` per asset.
  pub weights: Vec<Var>,
  /// Selection indicator `y[i]` per asset.
  pub selected: Vec<Var>,
  pub objective: Objective,
  /// Resolved return floor `R`.
  pub target_return: f64,
  /// Daily standard-deviation cap (enforced in max-profit mode only).
  pub risk_cap: f64,
}

impl PortfolioModel {
  pub fn num_assets(&self) -> usize {
    self.assets.len()
  }

  /// Sector label of asset `i`.
  pub fn sector_of(&self, i: usize) -> &str {
    &self.sectors[self.asset_sector[i]]
  }
}

/// Declare the complete selection model on `engine`.
///
/// Fails before declaring anything when the configuration is out of range or
/// an asset has no sector.
pub fn build_model<E: OptimizationEngine + ?Sized>(
  engine: &mut E,
  estimates: &Estimates,
  sectors: &SectorMap,
  config: &PortfolioConfig,
) -> Result<PortfolioModel> {
  config.validate()?;

  let n = estimates.num_assets();
  if n == 0 {
    return Err(PortfolioError::parse("estimates", "no assets to allocate"));
  }

  let asset_sector = estimates
    .assets
    .iter()
    .map(|a| {
      sectors
        .sector_index(a)
        .ok_or_else(|| PortfolioError::UnmappedAsset(a.clone()))
    })
    .collect::<Result<Vec<_>>>()?;

  let target_return = config.target_return.unwrap_or_else(|| estimates.mean_of_means());
  let mu = &estimates.mu;

  let mut weights = Vec::with_capacity(n);
  let mut selected = Vec::with_capacity(n);
  for asset in &estimates.assets {
    weights.push(engine.add_var(&format!("x[{asset}]"), VarKind::Continuous, 0.0, 1.0));
    selected.push(engine.add_var(&format!("y[{asset}]"), VarKind::Binary, 0.0, 1.0));
  }

  let expected_return = LinExpr::weighted(weights.iter().copied().zip(mu.iter().copied()));
  match config.objective {
    Objective::MaxProfit => engine.set_objective(expected_return.clone().into(), Sense::Maximize),
    Objective::MinVariance => engine.set_objective(
      QuadExpr::quad_form(&weights, &estimates.sigma),
      Sense::Minimize,
    ),
  }

  for (i, asset) in estimates.assets.iter().enumerate() {
    let (x, y) = (weights[i], selected[i]);
    let lo = config.min_investment_for(asset);
    let hi = config.max_investment_for(asset);

    engine.add_constraint(Constraint::new(
      format!("max_investment[{asset}]"),
      LinExpr::new().term(x, 1.0).term(y, -hi),
      Cmp::Le,
      0.0,
    ));
    engine.add_constraint(Constraint::new(
      format!("min_investment[{asset}]"),
      LinExpr::new().term(x, 1.0).term(y, -lo),
      Cmp::Ge,
      0.0,
    ));
    engine.add_constraint(Constraint::new(
      format!("link[{asset}]"),
      LinExpr::new().term(x, 1.0).term(y, -1.0),
      Cmp::Le,
      0.0,
    ));
  }

  if config.objective == Objective::MaxProfit {
    engine.add_constraint(Constraint::new(
      "risk",
      QuadExpr::quad_form(&weights, &estimates.sigma),
      Cmp::Le,
      config.max_risk * config.max_risk,
    ));
  }

  engine.add_constraint(Constraint::new(
    "target_return",
    expected_return,
    Cmp::Ge,
    target_return,
  ));
  engine.add_constraint(Constraint::new(
    "budget",
    LinExpr::sum(weights.iter().copied()),
    Cmp::Eq,
    1.0,
  ));
  engine.add_constraint(Constraint::new(
    "cardinality",
    LinExpr::sum(selected.iter().copied()),
    Cmp::Le,
    config.max_assets as f64,
  ));

  for (s, sector) in sectors.sectors().iter().enumerate() {
    let members = LinExpr::sum(
      asset_sector
        .iter()
        .zip(&weights)
        .filter(|&(&idx, _)| idx == s)
        .map(|(_, &x)| x),
    );
    if members.terms.is_empty() {
      debug!(sector = %sector, "no priced assets in sector, skipping exposure constraint");
      continue;
    }
    engine.add_constraint(Constraint::new(
      format!("sector[{sector}]"),
      members,
      Cmp::Le,
      config.sector_limit_for(sector),
    ));
  }

  info!(
    assets = n,
    sectors = sectors.sectors().len(),
    objective = ?config.objective,
    target_return,
    "built selection model"
  );

  Ok(PortfolioModel {
    assets: estimates.assets.clone(),
    sectors: sectors.sectors().to_vec(),
    asset_sector,
    weights,
    selected,
    objective: config.objective,
    target_return,
    risk_cap: config.max_risk,
  })
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;
  use crate::model::testing::ScriptedEngine;

  fn estimates() -> Estimates {
    Estimates {
      assets: vec!["AAA".into(), "BBB".into(), "CCC".into()],
      returns: array![[0.01, 0.0, 0.02], [0.03, 0.01, 0.0]],
      mu: array![0.02, 0.005, 0.01],
      sigma: array![
        [2e-4, 1e-5, 0.0],
        [1e-5, 5e-5, 0.0],
        [0.0, 0.0, 2e-4]
      ],
    }
  }

  fn sectors() -> SectorMap {
    [
      ("AAA", "Tech"),
      ("BBB", "Energy"),
      ("CCC", "Tech"),
      ("ZZZ", "Utilities"),
    ]
    .into_iter()
    .collect()
  }

  #[test]
  fn max_profit_declares_full_model() {
    let mut engine = ScriptedEngine::default();
    let config = PortfolioConfig {
      max_assets: 2,
      ..Default::default()
    };
    let model = build_model(&mut engine, &estimates(), &sectors(), &config).unwrap();
    let f = &engine.formulation;

    assert_eq!(f.num_vars(), 6);
    assert_eq!(f.vars[model.selected[1].index()].kind, VarKind::Binary);
    assert_eq!(f.sense, Sense::Maximize);
    assert!(f.objective.is_linear());
    assert_eq!(f.objective.linear.terms.len(), 3);

    // 3 per asset + risk + target + budget + cardinality + 2 non-empty sectors
    assert_eq!(f.constraints.len(), 9 + 4 + 2);

    let risk = f.constraint("risk").unwrap();
    assert_eq!(risk.cmp, Cmp::Le);
    assert!((risk.rhs - 1e-4).abs() < 1e-18);

    let card = f.constraint("cardinality").unwrap();
    assert_eq!(card.rhs, 2.0);

    let tech = f.constraint("sector[Tech]").unwrap();
    assert_eq!(tech.expr.linear.terms.len(), 2);
    assert!((tech.rhs - 0.33).abs() < 1e-15);
    assert!(f.constraint("sector[Utilities]").is_none());

    let floor = f.constraint("target_return").unwrap();
    assert!((floor.rhs - (0.02 + 0.005 + 0.01) / 3.0).abs() < 1e-15);
    assert!((model.target_return - floor.rhs).abs() < 1e-18);
  }

  #[test]
  fn min_variance_omits_risk_cap() {
    let mut engine = ScriptedEngine::default();
    let config = PortfolioConfig {
      objective: Objective::MinVariance,
      target_return: Some(0.012),
      ..Default::default()
    };
    build_model(&mut engine, &estimates(), &sectors(), &config).unwrap();
    let f = &engine.formulation;

    assert_eq!(f.sense, Sense::Minimize);
    assert!(!f.objective.is_linear());
    assert!(f.constraint("risk").is_none());
    assert_eq!(f.constraint("target_return").unwrap().rhs, 0.012);
  }

  #[test]
  fn linking_rows_gate_weight_on_selection() {
    let mut engine = ScriptedEngine::default();
    let mut config = PortfolioConfig::default();
    config.asset_bounds.insert(
      "BBB".into(),
      crate::config::AssetBounds {
        min: Some(0.05),
        max: Some(0.25),
      },
    );
    let model = build_model(&mut engine, &estimates(), &sectors(), &config).unwrap();
    let f = &engine.formulation;
    let (x, y) = (model.weights[1].index(), model.selected[1].index());

    let mut point = vec![0.0; f.num_vars()];
    point[x] = 0.2;
    point[y] = 1.0;
    for name in ["max_investment[BBB]", "min_investment[BBB]", "link[BBB]"] {
      assert_eq!(f.constraint(name).unwrap().violation(&point), 0.0, "{name}");
    }

    point[y] = 0.0;
    assert!(f.constraint("max_investment[BBB]").unwrap().violation(&point) > 0.0);
    assert!(f.constraint("link[BBB]").unwrap().violation(&point) > 0.0);

    point[x] = 0.01;
    point[y] = 1.0;
    assert!(f.constraint("min_investment[BBB]").unwrap().violation(&point) > 0.0);
  }

  #[test]
  fn unmapped_asset_fails_before_declaring() {
    let mut engine = ScriptedEngine::default();
    let sectors: SectorMap = [("XXX", "Tech")].into_iter().collect();
    let err = build_model(&mut engine, &estimates(), &sectors, &PortfolioConfig::default())
      .unwrap_err();

    assert!(matches!(err, PortfolioError::UnmappedAsset(ref a) if a == "AAA"));
    assert_eq!(engine.formulation.num_vars(), 0);
  }

  #[test]
  fn invalid_configuration_fails_before_declaring() {
    let mut engine = ScriptedEngine::default();
    let config = PortfolioConfig {
      min_investment: 0.5,
      max_investment: 0.2,
      ..Default::default()
    };
    let err = build_model(&mut engine, &estimates(), &sectors(), &config).unwrap_err();

    assert!(matches!(err, PortfolioError::InvalidConfiguration { .. }));
    assert_eq!(engine.formulation.num_vars(), 0);
  }
}
