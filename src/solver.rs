//! # Branch-and-Bound Engine
//!
//! $$
//! z^\* = \min\{ f_0(x) : x \in \mathcal X,\ x_j \in \{0,1\}\ \forall j \in \mathcal B \}
//! $$
//!
//! Bundled [`OptimizationEngine`]: depth-first branch-and-bound over binary
//! variables, each node a convex conic relaxation solved by Clarabel.

pub mod conic;

use std::time::Instant;

use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::model::Constraint;
use crate::model::Formulation;
use crate::model::OptimizationEngine;
use crate::model::QuadExpr;
use crate::model::Sense;
use crate::model::SolveOptions;
use crate::model::SolveStatus;
use crate::model::Var;
use crate::model::VarKind;
use conic::ConicForm;
use conic::Relaxation;

#[derive(Clone, Debug)]
struct Node {
  lower: Vec<f64>,
  upper: Vec<f64>,
  depth: usize,
}

/// Modeling engine backed by Clarabel relaxations.
#[derive(Clone, Debug, Default)]
pub struct ClarabelEngine {
  formulation: Formulation,
  solution: Option<Vec<f64>>,
  nodes_explored: usize,
}

impl ClarabelEngine {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declarations made so far.
  pub fn formulation(&self) -> &Formulation {
    &self.formulation
  }

  /// Nodes solved by the most recent [`OptimizationEngine::solve`].
  pub fn nodes_explored(&self) -> usize {
    self.nodes_explored
  }

  /// Most fractional binary at `x`, if any exceeds `tol`.
  fn branching_var(binaries: &[usize], x: &[f64], tol: f64) -> Option<usize> {
    binaries
      .iter()
      .map(|&j| (j, (x[j] - x[j].round()).abs()))
      .filter(|&(_, frac)| frac > tol)
      .max_by(|a, b| a.1.total_cmp(&b.1))
      .map(|(j, _)| j)
  }

  fn branch_and_bound(&mut self, options: &SolveOptions) -> (SolveStatus, Option<Vec<f64>>) {
    let start = Instant::now();
    self.nodes_explored = 0;

    let form = match ConicForm::new(&self.formulation) {
      Ok(form) => form,
      Err(e) => {
        warn!(error = %e, "model cannot be expressed in conic form");
        return (SolveStatus::Unsupported, None);
      }
    };

    let binaries: Vec<usize> = self
      .formulation
      .vars
      .iter()
      .enumerate()
      .filter(|(_, d)| d.kind == VarKind::Binary)
      .map(|(j, _)| j)
      .collect();

    let mut root = Node {
      lower: self.formulation.vars.iter().map(|d| d.lower).collect(),
      upper: self.formulation.vars.iter().map(|d| d.upper).collect(),
      depth: 0,
    };
    for &j in &binaries {
      root.lower[j] = root.lower[j].ceil();
      root.upper[j] = root.upper[j].floor();
    }

    let mut stack = vec![root];
    let mut incumbent: Option<(f64, Vec<f64>)> = None;

    while let Some(node) = stack.pop() {
      if options.interrupted() {
        info!(nodes = self.nodes_explored, "solve interrupted");
        return (SolveStatus::Interrupted, None);
      }
      let time_left = match options.time_limit {
        Some(limit) => match limit.checked_sub(start.elapsed()) {
          Some(left) if !left.is_zero() => Some(left),
          _ => return (SolveStatus::TimeLimit, None),
        },
        None => None,
      };
      if self.nodes_explored >= options.max_nodes {
        return (SolveStatus::NodeLimit, None);
      }
      self.nodes_explored += 1;

      let x = match form.solve_relaxation(&node.lower, &node.upper, time_left, options.verbose) {
        Relaxation::Solved(x) => x,
        Relaxation::Infeasible => {
          trace!(depth = node.depth, "relaxation infeasible");
          continue;
        }
        Relaxation::Unbounded => return (SolveStatus::Unbounded, None),
        Relaxation::TimeLimit => return (SolveStatus::TimeLimit, None),
        Relaxation::Failed(status) => {
          warn!(?status, depth = node.depth, "relaxation failed");
          return (SolveStatus::NumericalError, None);
        }
      };

      let bound = form.min_objective(&self.formulation, &x);
      if let Some((best, _)) = &incumbent {
        if bound >= best - 1e-9 * (1.0 + best.abs()) {
          trace!(depth = node.depth, bound, "pruned by bound");
          continue;
        }
      }

      match Self::branching_var(&binaries, &x, options.integrality_tol) {
        None => {
          let mut x = x;
          for &j in &binaries {
            x[j] = x[j].round();
          }
          debug!(
            depth = node.depth,
            objective = bound,
            nodes = self.nodes_explored,
            "new incumbent"
          );
          incumbent = Some((bound, x));
        }
        Some(j) => {
          let v = x[j];
          let mut down = node.clone();
          down.upper[j] = v.floor();
          down.depth += 1;
          let mut up = node;
          up.lower[j] = v.ceil();
          up.depth += 1;

          // the child nearer to the relaxed value is explored first
          if v - v.floor() >= 0.5 {
            stack.push(down);
            stack.push(up);
          } else {
            stack.push(up);
            stack.push(down);
          }
        }
      }
    }

    match incumbent {
      Some((_, x)) => (SolveStatus::Optimal, Some(x)),
      None => (SolveStatus::Infeasible, None),
    }
  }
}

impl OptimizationEngine for ClarabelEngine {
  fn add_var(&mut self, name: &str, kind: VarKind, lower: f64, upper: f64) -> Var {
    self.formulation.add_var(name, kind, lower, upper)
  }

  fn add_constraint(&mut self, constraint: Constraint) {
    self.formulation.add_constraint(constraint);
  }

  fn set_objective(&mut self, objective: QuadExpr, sense: Sense) {
    self.formulation.set_objective(objective, sense);
  }

  fn solve(&mut self, options: &SolveOptions) -> SolveStatus {
    self.solution = None;
    let start = Instant::now();
    let (status, solution) = self.branch_and_bound(options);
    self.solution = solution;

    info!(
      %status,
      nodes = self.nodes_explored,
      vars = self.formulation.num_vars(),
      constraints = self.formulation.constraints.len(),
      elapsed_ms = start.elapsed().as_millis() as u64,
      "solve finished"
    );
    status
  }

  fn value(&self, var: Var) -> Option<f64> {
    self.solution.as_ref()?.get(var.index()).copied()
  }

  fn var_name(&self, var: Var) -> Option<&str> {
    self.formulation.var_name(var)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicBool;
  use std::sync::Arc;
  use std::time::Duration;

  use super::*;
  use crate::model::Cmp;
  use crate::model::LinExpr;

  /// max 5a + 4b + 3c  s.t.  2a + 3b + c <= 5,  4a + b + 2c <= 11,  3a + 4b + 2c <= 8
  fn knapsack() -> (ClarabelEngine, [Var; 3]) {
    let mut e = ClarabelEngine::new();
    let a = e.add_var("a", VarKind::Binary, 0.0, 1.0);
    let b = e.add_var("b", VarKind::Binary, 0.0, 1.0);
    let c = e.add_var("c", VarKind::Binary, 0.0, 1.0);
    e.set_objective(
      LinExpr::weighted([(a, 5.0), (b, 4.0), (c, 3.0)]).into(),
      Sense::Maximize,
    );
    let rows = [
      ([2.0, 3.0, 1.0], 5.0),
      ([4.0, 1.0, 2.0], 11.0),
      ([3.0, 4.0, 2.0], 8.0),
    ];
    for (k, (coef, rhs)) in rows.into_iter().enumerate() {
      e.add_constraint(Constraint::new(
        format!("r{k}"),
        LinExpr::weighted([(a, coef[0]), (b, coef[1]), (c, coef[2])]),
        Cmp::Le,
        rhs,
      ));
    }
    (e, [a, b, c])
  }

  #[test]
  fn solves_binary_knapsack() {
    let (mut e, [a, b, c]) = knapsack();
    let status = e.solve(&SolveOptions::default());

    assert_eq!(status, SolveStatus::Optimal);
    assert_eq!(e.value(a), Some(1.0));
    assert_eq!(e.value(b), Some(1.0));
    assert_eq!(e.value(c), Some(0.0));
    assert_eq!(e.formulation().max_violation(&[1.0, 1.0, 0.0]), 0.0);
  }

  #[test]
  fn reports_infeasible_without_values() {
    let mut e = ClarabelEngine::new();
    let x = e.add_var("x", VarKind::Binary, 0.0, 1.0);
    let y = e.add_var("y", VarKind::Binary, 0.0, 1.0);
    e.set_objective(LinExpr::sum([x, y]).into(), Sense::Minimize);
    e.add_constraint(Constraint::new("half", LinExpr::sum([x, y]), Cmp::Eq, 1.5));

    assert_eq!(e.solve(&SolveOptions::default()), SolveStatus::Infeasible);
    assert_eq!(e.value(x), None);
  }

  #[test]
  fn quadratic_objective_with_cardinality() {
    // min x1^2 + x2^2 + x3^2  s.t. sum x = 1, x_i <= y_i, sum y <= 2
    let mut e = ClarabelEngine::new();
    let xs: Vec<Var> = (0..3)
      .map(|i| e.add_var(&format!("x{i}"), VarKind::Continuous, 0.0, 1.0))
      .collect();
    let ys: Vec<Var> = (0..3)
      .map(|i| e.add_var(&format!("y{i}"), VarKind::Binary, 0.0, 1.0))
      .collect();
    e.set_objective(
      QuadExpr {
        quad: xs.iter().map(|&x| (x, x, 1.0)).collect(),
        ..Default::default()
      },
      Sense::Minimize,
    );
    e.add_constraint(Constraint::new("budget", LinExpr::sum(xs.clone()), Cmp::Eq, 1.0));
    e.add_constraint(Constraint::new("card", LinExpr::sum(ys.clone()), Cmp::Le, 2.0));
    for (&x, &y) in xs.iter().zip(&ys) {
      e.add_constraint(Constraint::new(
        "link",
        LinExpr::new().term(x, 1.0).term(y, -1.0),
        Cmp::Le,
        0.0,
      ));
    }

    assert_eq!(e.solve(&SolveOptions::default()), SolveStatus::Optimal);
    let weights: Vec<f64> = xs.iter().map(|&x| e.value(x).unwrap()).collect();
    let picked = ys.iter().filter(|&&y| e.value(y).unwrap() > 0.5).count();
    assert_eq!(picked, 2);
    assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    let mut nonzero: Vec<f64> = weights.into_iter().filter(|w| *w > 1e-4).collect();
    nonzero.sort_by(f64::total_cmp);
    assert_eq!(nonzero.len(), 2);
    assert!((nonzero[0] - 0.5).abs() < 1e-4);
  }

  #[test]
  fn pre_set_interrupt_stops_before_first_node() {
    let (mut e, [a, ..]) = knapsack();
    let flag = Arc::new(AtomicBool::new(true));
    let options = SolveOptions {
      interrupt: Some(flag),
      ..Default::default()
    };

    assert_eq!(e.solve(&options), SolveStatus::Interrupted);
    assert_eq!(e.nodes_explored(), 0);
    assert_eq!(e.value(a), None);
  }

  #[test]
  fn node_and_time_limits_are_terminal() {
    let (mut e, _) = knapsack();
    let options = SolveOptions {
      max_nodes: 0,
      ..Default::default()
    };
    assert_eq!(e.solve(&options), SolveStatus::NodeLimit);

    let options = SolveOptions {
      time_limit: Some(Duration::ZERO),
      ..Default::default()
    };
    assert_eq!(e.solve(&options), SolveStatus::TimeLimit);
  }

  #[test]
  fn unbounded_continuous_model() {
    let mut e = ClarabelEngine::new();
    let x = e.add_var("x", VarKind::Continuous, 0.0, f64::INFINITY);
    e.set_objective(LinExpr::sum([x]).into(), Sense::Maximize);
    assert_eq!(e.solve(&SolveOptions::default()), SolveStatus::Unbounded);
  }
}
