//! # Modeling Interface
//!
//! Boundary between the formulation and whatever engine solves it: declare
//! variables and constraints, set an objective, solve once, read values back.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::expr::Constraint;
use super::expr::QuadExpr;
use super::expr::Sense;
use super::expr::Var;
use super::expr::VarKind;

/// Terminal status of a single solve attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolveStatus {
  Optimal,
  Infeasible,
  Unbounded,
  TimeLimit,
  NodeLimit,
  Interrupted,
  NumericalError,
  /// The engine cannot represent the model (e.g. a nonconvex quadratic).
  Unsupported,
}

impl SolveStatus {
  pub fn is_optimal(self) -> bool {
    self == SolveStatus::Optimal
  }
}

impl fmt::Display for SolveStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      SolveStatus::Optimal => "optimal",
      SolveStatus::Infeasible => "infeasible",
      SolveStatus::Unbounded => "unbounded",
      SolveStatus::TimeLimit => "time limit reached",
      SolveStatus::NodeLimit => "node limit reached",
      SolveStatus::Interrupted => "interrupted",
      SolveStatus::NumericalError => "numerical error",
      SolveStatus::Unsupported => "unsupported model",
    };
    f.write_str(s)
  }
}

/// Caller-supplied limits for a solve.
#[derive(Clone, Debug)]
pub struct SolveOptions {
  /// Wall-clock limit; exceeding it yields [`SolveStatus::TimeLimit`].
  pub time_limit: Option<Duration>,
  /// Maximum branch-and-bound nodes; exceeding it yields [`SolveStatus::NodeLimit`].
  pub max_nodes: usize,
  /// Distance from 0/1 under which a binary counts as integral.
  pub integrality_tol: f64,
  /// Emit per-node diagnostics.
  pub verbose: bool,
  /// Set from another thread to stop the solve with [`SolveStatus::Interrupted`].
  pub interrupt: Option<Arc<AtomicBool>>,
}

impl Default for SolveOptions {
  fn default() -> Self {
    Self {
      time_limit: None,
      max_nodes: 100_000,
      integrality_tol: 1e-6,
      verbose: false,
      interrupt: None,
    }
  }
}

impl SolveOptions {
  pub fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::Relaxed))
  }
}

/// Minimal optimization-modeling interface required by the model builder
/// and the result interpreter.
pub trait OptimizationEngine {
  /// Declare a variable with bounds; binaries are further restricted to {0, 1}.
  fn add_var(&mut self, name: &str, kind: VarKind, lower: f64, upper: f64) -> Var;

  fn add_constraint(&mut self, constraint: Constraint);

  fn set_objective(&mut self, objective: QuadExpr, sense: Sense);

  /// Solve once. Any status other than [`SolveStatus::Optimal`] is terminal.
  fn solve(&mut self, options: &SolveOptions) -> SolveStatus;

  /// Value of `var` after an optimal solve, `None` otherwise.
  fn value(&self, var: Var) -> Option<f64>;

  /// Declared name of `var`.
  fn var_name(&self, var: Var) -> Option<&str>;
}

/// Declared variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
  pub name: String,
  pub kind: VarKind,
  pub lower: f64,
  pub upper: f64,
}

/// In-memory record of every declaration made through [`OptimizationEngine`].
#[derive(Clone, Debug)]
pub struct Formulation {
  pub vars: Vec<VarDecl>,
  pub constraints: Vec<Constraint>,
  pub objective: QuadExpr,
  pub sense: Sense,
}

impl Default for Formulation {
  fn default() -> Self {
    Self {
      vars: Vec::new(),
      constraints: Vec::new(),
      objective: QuadExpr::default(),
      sense: Sense::Minimize,
    }
  }
}

impl Formulation {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_var(&mut self, name: &str, kind: VarKind, lower: f64, upper: f64) -> Var {
    let (lower, upper) = match kind {
      VarKind::Continuous => (lower, upper),
      VarKind::Binary => (lower.max(0.0), upper.min(1.0)),
    };
    self.vars.push(VarDecl {
      name: name.to_string(),
      kind,
      lower,
      upper,
    });
    Var(self.vars.len() - 1)
  }

  pub fn add_constraint(&mut self, constraint: Constraint) {
    self.constraints.push(constraint);
  }

  pub fn set_objective(&mut self, objective: QuadExpr, sense: Sense) {
    self.objective = objective;
    self.sense = sense;
  }

  pub fn num_vars(&self) -> usize {
    self.vars.len()
  }

  pub fn var_name(&self, var: Var) -> Option<&str> {
    self.vars.get(var.0).map(|v| v.name.as_str())
  }

  /// Look up a constraint by name.
  pub fn constraint(&self, name: &str) -> Option<&Constraint> {
    self.constraints.iter().find(|c| c.name == name)
  }

  /// Largest bound or constraint violation at `values`.
  pub fn max_violation(&self, values: &[f64]) -> f64 {
    let bounds = self
      .vars
      .iter()
      .zip(values)
      .map(|(d, &v)| (d.lower - v).max(v - d.upper).max(0.0));
    let rows = self.constraints.iter().map(|c| c.violation(values));
    bounds.chain(rows).fold(0.0, f64::max)
  }
}
