use std::hint::black_box;

use chrono::Duration;
use chrono::NaiveDate;
use constrained_portfolio::config::PortfolioConfig;
use constrained_portfolio::model::build_model;
use constrained_portfolio::model::Constraint;
use constrained_portfolio::model::Formulation;
use constrained_portfolio::model::OptimizationEngine;
use constrained_portfolio::model::QuadExpr;
use constrained_portfolio::model::Sense;
use constrained_portfolio::model::SolveOptions;
use constrained_portfolio::model::SolveStatus;
use constrained_portfolio::model::Var;
use constrained_portfolio::model::VarKind;
use constrained_portfolio::Estimates;
use constrained_portfolio::PriceSeries;
use constrained_portfolio::SectorMap;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

const DAYS: usize = 500;

/// Geometric random walk with 2% daily volatility.
fn synthetic_prices(assets: usize) -> PriceSeries {
  let mut rng = StdRng::seed_from_u64(42);
  let shock = Normal::new(0.0005, 0.02).unwrap();
  let mut prices = Array2::<f64>::zeros((DAYS, assets));
  for j in 0..assets {
    let mut p = 100.0;
    for t in 0..DAYS {
      prices[[t, j]] = p;
      p *= f64::exp(shock.sample(&mut rng));
    }
  }
  let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
  let dates = (0..DAYS).map(|d| start + Duration::days(d as i64)).collect();
  let ids = (0..assets).map(|j| format!("S{j:03}")).collect();
  PriceSeries::new(dates, ids, prices).unwrap()
}

fn sectors_for(series: &PriceSeries) -> SectorMap {
  series
    .assets()
    .iter()
    .enumerate()
    .map(|(j, a)| (a.clone(), format!("Sector{}", j % 11)))
    .collect()
}

/// Records the model without solving it.
#[derive(Default)]
struct Recorder(Formulation);

impl OptimizationEngine for Recorder {
  fn add_var(&mut self, name: &str, kind: VarKind, lower: f64, upper: f64) -> Var {
    self.0.add_var(name, kind, lower, upper)
  }

  fn add_constraint(&mut self, constraint: Constraint) {
    self.0.add_constraint(constraint);
  }

  fn set_objective(&mut self, objective: QuadExpr, sense: Sense) {
    self.0.set_objective(objective, sense);
  }

  fn solve(&mut self, _options: &SolveOptions) -> SolveStatus {
    SolveStatus::Unsupported
  }

  fn value(&self, _var: Var) -> Option<f64> {
    None
  }

  fn var_name(&self, var: Var) -> Option<&str> {
    self.0.var_name(var)
  }
}

fn bench_estimates(c: &mut Criterion) {
  let mut group = c.benchmark_group("Estimates");
  for assets in [10usize, 50, 200] {
    let series = synthetic_prices(assets);
    group.bench_with_input(BenchmarkId::from_parameter(assets), &series, |b, s| {
      b.iter(|| black_box(Estimates::from_prices(s).unwrap()))
    });
  }
  group.finish();
}

fn bench_build_model(c: &mut Criterion) {
  let mut group = c.benchmark_group("BuildModel");
  let config = PortfolioConfig::default();
  for assets in [10usize, 50, 200] {
    let series = synthetic_prices(assets);
    let sectors = sectors_for(&series);
    let estimates = Estimates::from_prices(&series).unwrap();
    group.bench_with_input(BenchmarkId::from_parameter(assets), &estimates, |b, est| {
      b.iter(|| {
        let mut engine = Recorder::default();
        black_box(build_model(&mut engine, est, &sectors, &config).unwrap())
      })
    });
  }
  group.finish();
}

criterion_group!(benches, bench_estimates, bench_build_model);
criterion_main!(benches);
