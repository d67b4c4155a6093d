//! # Expressions
//!
//! $$
//! f(x) = x^\top Q x + a^\top x + c
//! $$
//!
//! Linear and quadratic expressions over declared decision variables.

use std::fmt;

/// Handle to a declared decision variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub(crate) usize);

impl Var {
  /// Position of the variable in declaration order.
  pub fn index(self) -> usize {
    self.0
  }
}

/// Domain of a decision variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
  Continuous,
  Binary,
}

/// Optimization direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense {
  Minimize,
  Maximize,
}

/// Comparison operator of a constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
  Le,
  Ge,
  Eq,
}

impl fmt::Display for Cmp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Cmp::Le => write!(f, "<="),
      Cmp::Ge => write!(f, ">="),
      Cmp::Eq => write!(f, "=="),
    }
  }
}

/// `sum(coef * var) + constant`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinExpr {
  pub terms: Vec<(Var, f64)>,
  pub constant: f64,
}

impl LinExpr {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add `coef * var` to the expression.
  pub fn add_term(&mut self, var: Var, coef: f64) -> &mut Self {
    self.terms.push((var, coef));
    self
  }

  pub fn term(mut self, var: Var, coef: f64) -> Self {
    self.terms.push((var, coef));
    self
  }

  /// Unit-coefficient sum of `vars`.
  pub fn sum<I: IntoIterator<Item = Var>>(vars: I) -> Self {
    Self::weighted(vars.into_iter().map(|v| (v, 1.0)))
  }

  /// `sum(coef * var)` over the given pairs.
  pub fn weighted<I: IntoIterator<Item = (Var, f64)>>(pairs: I) -> Self {
    Self {
      terms: pairs.into_iter().collect(),
      constant: 0.0,
    }
  }

  /// Evaluate at a point indexed by variable position.
  pub fn eval(&self, values: &[f64]) -> f64 {
    self
      .terms
      .iter()
      .map(|(v, c)| c * values[v.0])
      .sum::<f64>()
      + self.constant
  }
}

/// `sum(coef * var_i * var_j) + linear`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuadExpr {
  pub quad: Vec<(Var, Var, f64)>,
  pub linear: LinExpr,
}

impl QuadExpr {
  /// `x' M x` for a square coefficient matrix `m` over `vars`.
  pub fn quad_form(vars: &[Var], m: &ndarray::Array2<f64>) -> Self {
    let mut quad = Vec::with_capacity(vars.len() * vars.len());
    for (i, &vi) in vars.iter().enumerate() {
      for (j, &vj) in vars.iter().enumerate() {
        let c = m[[i, j]];
        if c != 0.0 {
          quad.push((vi, vj, c));
        }
      }
    }
    Self {
      quad,
      linear: LinExpr::new(),
    }
  }

  pub fn is_linear(&self) -> bool {
    self.quad.is_empty()
  }

  pub fn eval(&self, values: &[f64]) -> f64 {
    self
      .quad
      .iter()
      .map(|(a, b, c)| c * values[a.0] * values[b.0])
      .sum::<f64>()
      + self.linear.eval(values)
  }
}

impl From<LinExpr> for QuadExpr {
  fn from(linear: LinExpr) -> Self {
    Self {
      quad: Vec::new(),
      linear,
    }
  }
}

/// `expr (<=|>=|==) rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
  pub name: String,
  pub expr: QuadExpr,
  pub cmp: Cmp,
  pub rhs: f64,
}

impl Constraint {
  pub fn new(name: impl Into<String>, expr: impl Into<QuadExpr>, cmp: Cmp, rhs: f64) -> Self {
    Self {
      name: name.into(),
      expr: expr.into(),
      cmp,
      rhs,
    }
  }

  /// Amount by which `values` violate the constraint (0 when satisfied).
  pub fn violation(&self, values: &[f64]) -> f64 {
    let lhs = self.expr.eval(values);
    match self.cmp {
      Cmp::Le => (lhs - self.rhs).max(0.0),
      Cmp::Ge => (self.rhs - lhs).max(0.0),
      Cmp::Eq => (lhs - self.rhs).abs(),
    }
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  #[test]
  fn quad_form_evaluates_to_xt_m_x() {
    let vars = [Var(0), Var(1)];
    let m = array![[2.0, 0.5], [0.5, 1.0]];
    let q = QuadExpr::quad_form(&vars, &m);
    // 2*1 + 0.5*1*2*2 + 1*4
    assert!((q.eval(&[1.0, 2.0]) - 8.0).abs() < 1e-12);
  }

  #[test]
  fn violation_is_zero_when_satisfied() {
    let c = Constraint::new("budget", LinExpr::sum([Var(0), Var(1)]), Cmp::Eq, 1.0);
    assert_eq!(c.violation(&[0.25, 0.75]), 0.0);
    assert!((c.violation(&[0.5, 0.75]) - 0.25).abs() < 1e-12);
  }
}
