//! # Conic Relaxation
//!
//! $$
//! \min_x\ \tfrac12 x^\top P x + q^\top x \quad \text{s.t.}\quad Ax + s = b,\ s \in \mathcal K
//! $$
//!
//! Converts a [`Formulation`] into Clarabel's standard form once, then solves
//! continuous relaxations under per-node variable bounds.
//!
//! A convex quadratic row `x'Qx + a'x + c <= r` becomes one second-order cone
//! through a factor `F` with `F'F = Q`: with `t = r - c - a'x`,
//! `(t + 1, t - 1, 2Fx)` lies in the cone iff `||Fx||^2 <= t`.

use std::collections::BTreeMap;
use std::time::Duration;

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use thiserror::Error;
use tracing::warn;

use crate::model::Cmp;
use crate::model::Formulation;
use crate::model::LinExpr;
use crate::model::Sense;
use crate::model::Var;

/// Relative eigenvalue tolerance for convexity and rank decisions.
const EIG_TOL: f64 = 1e-10;
/// Slack accepted when comparing node bounds.
const BOUND_TOL: f64 = 1e-9;
/// Relative feasibility tolerance for nodes with every variable fixed.
const FEAS_TOL: f64 = 1e-7;

/// Reasons a formulation cannot be expressed in conic form.
#[derive(Error, Debug, PartialEq)]
pub enum ConicError {
  #[error("constraint '{0}' is quadratic but not a convex `<=` row")]
  NonconvexConstraint(String),
  #[error("objective is not convex in the requested direction")]
  NonconvexObjective,
}

/// Outcome of a single relaxation solve.
#[derive(Debug)]
pub(crate) enum Relaxation {
  Solved(Vec<f64>),
  Infeasible,
  Unbounded,
  TimeLimit,
  Failed(SolverStatus),
}

type SparseRow = Vec<(usize, f64)>;

struct SocBlock {
  rows: Vec<SparseRow>,
  b: Vec<f64>,
}

/// Node-independent part of the conic problem.
pub(crate) struct ConicForm {
  n: usize,
  p: CscMatrix<f64>,
  q: Vec<f64>,
  sign: f64,
  eq_rows: Vec<(SparseRow, f64)>,
  ineq_rows: Vec<(SparseRow, f64)>,
  socs: Vec<SocBlock>,
}

fn linear_row(expr: &LinExpr, scale: f64) -> SparseRow {
  let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
  for (v, c) in &expr.terms {
    *acc.entry(v.index()).or_default() += scale * c;
  }
  acc.into_iter().filter(|(_, c)| *c != 0.0).collect()
}

/// Symmetrized dense block of `sum c * x_i * x_j` restricted to the variables it touches.
fn symmetric_block(quad: &[(Var, Var, f64)], scale: f64) -> (Vec<usize>, DMatrix<f64>) {
  let mut support: Vec<usize> = quad
    .iter()
    .flat_map(|(a, b, _)| [a.index(), b.index()])
    .collect();
  support.sort_unstable();
  support.dedup();

  let pos = |j: usize| support.binary_search(&j).unwrap_or(0);
  let k = support.len();
  let mut m = DMatrix::<f64>::zeros(k, k);
  for (a, b, c) in quad {
    let (i, j) = (pos(a.index()), pos(b.index()));
    m[(i, j)] += 0.5 * scale * c;
    m[(j, i)] += 0.5 * scale * c;
  }

  (support, m)
}

/// Rows of `F` with `F'F = M` for a positive-semidefinite `M`, `None` if `M`
/// has a materially negative eigenvalue.
fn psd_factor(m: &DMatrix<f64>) -> Option<Vec<Vec<f64>>> {
  if m.nrows() == 0 {
    return Some(Vec::new());
  }

  let eig = SymmetricEigen::new(m.clone());
  let scale = eig.eigenvalues.iter().fold(0.0f64, |acc, l| acc.max(l.abs()));
  if scale == 0.0 {
    return Some(Vec::new());
  }
  if eig.eigenvalues.iter().any(|&l| l < -EIG_TOL * scale.max(1.0)) {
    return None;
  }

  let rows: Vec<Vec<f64>> = eig
    .eigenvalues
    .iter()
    .enumerate()
    .filter(|&(_, &l)| l > EIG_TOL * scale)
    .map(|(k, &l)| {
      let s = l.sqrt();
      eig.eigenvectors.column(k).iter().map(|v| s * v).collect::<Vec<f64>>()
    })
    .collect();

  Some(rows)
}

fn csc_from_entries(m: usize, n: usize, entries: &BTreeMap<(usize, usize), f64>) -> CscMatrix<f64> {
  let mut colptr = vec![0usize; n + 1];
  let mut rowval = Vec::with_capacity(entries.len());
  let mut nzval = Vec::with_capacity(entries.len());
  for (&(col, row), &v) in entries {
    if v != 0.0 {
      colptr[col + 1] += 1;
      rowval.push(row);
      nzval.push(v);
    }
  }
  for j in 0..n {
    colptr[j + 1] += colptr[j];
  }
  CscMatrix::new(m, n, colptr, rowval, nzval)
}

impl ConicForm {
  pub(crate) fn new(f: &Formulation) -> Result<Self, ConicError> {
    let n = f.num_vars();
    let sign = match f.sense {
      Sense::Minimize => 1.0,
      Sense::Maximize => -1.0,
    };

    let mut p_entries = BTreeMap::new();
    if !f.objective.quad.is_empty() {
      let (support, m) = symmetric_block(&f.objective.quad, sign);
      psd_factor(&m).ok_or(ConicError::NonconvexObjective)?;
      for (cj, &j) in support.iter().enumerate() {
        for (ci, &i) in support.iter().enumerate().take(cj + 1) {
          let v = 2.0 * m[(ci, cj)];
          if v != 0.0 {
            p_entries.insert((j.max(i), j.min(i)), v);
          }
        }
      }
    }
    let p = csc_from_entries(n, n, &p_entries);

    let mut q = vec![0.0; n];
    for (v, c) in &f.objective.linear.terms {
      q[v.index()] += sign * c;
    }

    let mut eq_rows = Vec::new();
    let mut ineq_rows = Vec::new();
    let mut socs = Vec::new();

    for c in &f.constraints {
      let rhs = c.rhs - c.expr.linear.constant;

      if c.expr.is_linear() {
        match c.cmp {
          Cmp::Eq => eq_rows.push((linear_row(&c.expr.linear, 1.0), rhs)),
          Cmp::Le => ineq_rows.push((linear_row(&c.expr.linear, 1.0), rhs)),
          Cmp::Ge => ineq_rows.push((linear_row(&c.expr.linear, -1.0), -rhs)),
        }
        continue;
      }

      if c.cmp != Cmp::Le {
        return Err(ConicError::NonconvexConstraint(c.name.clone()));
      }
      let (support, m) = symmetric_block(&c.expr.quad, 1.0);
      let factor =
        psd_factor(&m).ok_or_else(|| ConicError::NonconvexConstraint(c.name.clone()))?;
      let a = linear_row(&c.expr.linear, 1.0);

      if factor.is_empty() {
        ineq_rows.push((a, rhs));
        continue;
      }

      let mut rows = vec![a.clone(), a];
      let mut b = vec![rhs + 1.0, rhs - 1.0];
      for frow in factor {
        rows.push(
          support
            .iter()
            .zip(frow)
            .filter(|(_, v)| *v != 0.0)
            .map(|(&j, v)| (j, -2.0 * v))
            .collect(),
        );
        b.push(0.0);
      }
      socs.push(SocBlock { rows, b });
    }

    Ok(Self {
      n,
      p,
      q,
      sign,
      eq_rows,
      ineq_rows,
      socs,
    })
  }

  /// Objective value at `x` in minimization form.
  pub(crate) fn min_objective(&self, f: &Formulation, x: &[f64]) -> f64 {
    self.sign * f.objective.eval(x)
  }

  /// Feasibility of a point with no free variable left.
  fn check_fixed(&self, x: &[f64]) -> Relaxation {
    let dot = |row: &SparseRow| row.iter().map(|&(j, v)| v * x[j]).sum::<f64>();
    let tol = |rhs: f64| FEAS_TOL * (1.0 + rhs.abs());

    let feasible = self
      .eq_rows
      .iter()
      .all(|(row, rhs)| (dot(row) - rhs).abs() <= tol(*rhs))
      && self
        .ineq_rows
        .iter()
        .all(|(row, rhs)| dot(row) <= rhs + tol(*rhs))
      && self.socs.iter().all(|soc| {
        let s: Vec<f64> = soc
          .rows
          .iter()
          .zip(&soc.b)
          .map(|(row, b)| b - dot(row))
          .collect();
        let tail = s[1..].iter().map(|v| v * v).sum::<f64>().sqrt();
        s[0] >= tail - tol(s[0])
      });

    if feasible {
      Relaxation::Solved(x.to_vec())
    } else {
      Relaxation::Infeasible
    }
  }

  /// Solve the continuous relaxation with `lower <= x <= upper`.
  pub(crate) fn solve_relaxation(
    &self,
    lower: &[f64],
    upper: &[f64],
    time_left: Option<Duration>,
    verbose: bool,
  ) -> Relaxation {
    if lower.iter().zip(upper).any(|(l, u)| *l > *u + BOUND_TOL) {
      return Relaxation::Infeasible;
    }

    let mut entries = BTreeMap::new();
    let mut b = Vec::new();
    let mut cones = Vec::new();
    let mut push_row = |row: &[(usize, f64)], rhs: f64, b: &mut Vec<f64>| {
      let r = b.len();
      for &(j, v) in row {
        *entries.entry((j, r)).or_insert(0.0) += v;
      }
      b.push(rhs);
    };

    let fixed: Vec<usize> = (0..self.n)
      .filter(|&j| lower[j].is_finite() && (upper[j] - lower[j]).abs() <= BOUND_TOL)
      .collect();
    if fixed.len() == self.n {
      return self.check_fixed(lower);
    }

    let zero_start = b.len();
    for (row, rhs) in &self.eq_rows {
      push_row(row, *rhs, &mut b);
    }
    for &j in &fixed {
      push_row(&[(j, 1.0)], lower[j], &mut b);
    }
    if b.len() > zero_start {
      cones.push(SupportedConeT::ZeroConeT(b.len() - zero_start));
    }

    let nonneg_start = b.len();
    for (row, rhs) in &self.ineq_rows {
      push_row(row, *rhs, &mut b);
    }
    for j in 0..self.n {
      if fixed.binary_search(&j).is_ok() {
        continue;
      }
      if upper[j].is_finite() {
        push_row(&[(j, 1.0)], upper[j], &mut b);
      }
      if lower[j].is_finite() {
        push_row(&[(j, -1.0)], -lower[j], &mut b);
      }
    }
    if b.len() > nonneg_start {
      cones.push(SupportedConeT::NonnegativeConeT(b.len() - nonneg_start));
    }

    for soc in &self.socs {
      for (row, rhs) in soc.rows.iter().zip(&soc.b) {
        push_row(row, *rhs, &mut b);
      }
      cones.push(SupportedConeT::SecondOrderConeT(soc.rows.len()));
    }

    let a = csc_from_entries(b.len(), self.n, &entries);

    let settings = match DefaultSettingsBuilder::default()
      .verbose(verbose)
      .time_limit(time_left.map_or(f64::INFINITY, |d| d.as_secs_f64()))
      .build()
    {
      Ok(settings) => settings,
      Err(e) => {
        warn!(error = %e, "invalid Clarabel settings");
        return Relaxation::Failed(SolverStatus::Unsolved);
      }
    };

    let mut solver = DefaultSolver::new(&self.p, &self.q, &a, &b, &cones, settings);
    solver.solve();

    match solver.solution.status {
      SolverStatus::Solved | SolverStatus::AlmostSolved => {
        Relaxation::Solved(solver.solution.x.clone())
      }
      SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
        Relaxation::Infeasible
      }
      SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => Relaxation::Unbounded,
      SolverStatus::MaxTime => Relaxation::TimeLimit,
      other => Relaxation::Failed(other),
    }
  }
}
