//! # Optimization Model
//!
//! $$
//! \min_{x}\ f_0(x)\quad \text{s.t. } f_k(x)\ \{\le,\ge,=\}\ b_k,\ \ x_j\in\{0,1\}\ (j\in\mathcal B)
//! $$
//!
//! Modeling interface, expression types and the portfolio model builder.

pub mod builder;
pub mod engine;
pub mod expr;

pub use builder::build_model;
pub use builder::PortfolioModel;
pub use engine::Formulation;
pub use engine::OptimizationEngine;
pub use engine::SolveOptions;
pub use engine::SolveStatus;
pub use engine::VarDecl;
pub use expr::Cmp;
pub use expr::Constraint;
pub use expr::LinExpr;
pub use expr::QuadExpr;
pub use expr::Sense;
pub use expr::Var;
pub use expr::VarKind;

#[cfg(test)]
pub(crate) mod testing {
  use std::collections::HashMap;

  use super::*;

  /// Records declarations and replays a scripted solve outcome.
  #[derive(Default)]
  pub(crate) struct ScriptedEngine {
    pub formulation: Formulation,
    pub status: Option<SolveStatus>,
    pub values: HashMap<String, f64>,
    pub solves: usize,
    pub reads: std::cell::Cell<usize>,
  }

  impl ScriptedEngine {
    pub fn with_outcome(status: SolveStatus, values: &[(&str, f64)]) -> Self {
      Self {
        status: Some(status),
        values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        ..Default::default()
      }
    }
  }

  impl OptimizationEngine for ScriptedEngine {
    fn add_var(&mut self, name: &str, kind: VarKind, lower: f64, upper: f64) -> Var {
      self.formulation.add_var(name, kind, lower, upper)
    }

    fn add_constraint(&mut self, constraint: Constraint) {
      self.formulation.add_constraint(constraint);
    }

    fn set_objective(&mut self, objective: QuadExpr, sense: Sense) {
      self.formulation.set_objective(objective, sense);
    }

    fn solve(&mut self, _options: &SolveOptions) -> SolveStatus {
      self.solves += 1;
      self.status.unwrap_or(SolveStatus::Optimal)
    }

    fn value(&self, var: Var) -> Option<f64> {
      self.reads.set(self.reads.get() + 1);
      let name = self.formulation.var_name(var)?;
      Some(self.values.get(name).copied().unwrap_or(0.0))
    }

    fn var_name(&self, var: Var) -> Option<&str> {
      self.formulation.var_name(var)
    }
  }
}
