//! # Linear Constraint Systems
//!
//! $$
//! A\mathbf w=b,\qquad \ell\le w_i\le u\quad \forall i
//! $$
//!
//! Equality systems, inequality ranges and uniform box bounds.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::OptimizerError;
use crate::error::Result;

/// Equality system `A w = b` with `A` of shape `m x n`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearSystem {
  a: DMatrix<f64>,
  b: DVector<f64>,
}

impl LinearSystem {
  /// System with no rows over `n` assets.
  pub fn empty(n: usize) -> Self {
    Self {
      a: DMatrix::zeros(0, n),
      b: DVector::zeros(0),
    }
  }

  pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Result<Self> {
    if a.nrows() != b.len() {
      return Err(OptimizerError::shape(
        "equality targets",
        (a.nrows(), 1),
        (b.len(), 1),
      ));
    }
    Ok(Self { a, b })
  }

  pub fn a(&self) -> &DMatrix<f64> {
    &self.a
  }

  pub fn b(&self) -> &DVector<f64> {
    &self.b
  }

  pub fn n_rows(&self) -> usize {
    self.a.nrows()
  }

  pub fn n_cols(&self) -> usize {
    self.a.ncols()
  }

  pub fn is_empty(&self) -> bool {
    self.a.nrows() == 0
  }

  /// Append the rows of `other` below the current rows.
  pub fn stack(&self, other: &LinearSystem) -> Result<Self> {
    if other.n_cols() != self.n_cols() {
      return Err(OptimizerError::shape(
        "constraint rows",
        (other.n_rows(), self.n_cols()),
        (other.n_rows(), other.n_cols()),
      ));
    }

    let m = self.n_rows();
    let rows = m + other.n_rows();
    let a = DMatrix::from_fn(rows, self.n_cols(), |i, j| {
      if i < m {
        self.a[(i, j)]
      } else {
        other.a[(i - m, j)]
      }
    });
    let b = DVector::from_fn(rows, |i, _| if i < m { self.b[i] } else { other.b[i - m] });

    Ok(Self { a, b })
  }

  /// Base rows followed by one unit row per pinned index: first every index in
  /// `lower` pinned to `lower_target`, then every index in `upper` pinned to
  /// `upper_target`.
  pub fn with_pins(
    &self,
    lower: &[usize],
    lower_target: f64,
    upper: &[usize],
    upper_target: f64,
  ) -> Self {
    let m = self.n_rows();
    let n = self.n_cols();
    let pins: Vec<(usize, f64)> = lower
      .iter()
      .map(|&i| (i, lower_target))
      .chain(upper.iter().map(|&i| (i, upper_target)))
      .collect();

    let rows = m + pins.len();
    let a = DMatrix::from_fn(rows, n, |i, j| {
      if i < m {
        self.a[(i, j)]
      } else if pins[i - m].0 == j {
        1.0
      } else {
        0.0
      }
    });
    let b = DVector::from_fn(rows, |i, _| if i < m { self.b[i] } else { pins[i - m].1 });

    Self { a, b }
  }

  /// `A w - b`.
  pub fn residual(&self, w: &DVector<f64>) -> DVector<f64> {
    &self.a * w - &self.b
  }
}

/// Two-sided linear range `lower <= R w <= upper`.
#[derive(Clone, Debug, PartialEq)]
pub struct InequalityRange {
  rows: DMatrix<f64>,
  lower: DVector<f64>,
  upper: DVector<f64>,
}

impl InequalityRange {
  pub fn new(rows: DMatrix<f64>, lower: DVector<f64>, upper: DVector<f64>) -> Result<Self> {
    if lower.len() != rows.nrows() {
      return Err(OptimizerError::shape(
        "range lower targets",
        (rows.nrows(), 1),
        (lower.len(), 1),
      ));
    }
    if upper.len() != rows.nrows() {
      return Err(OptimizerError::shape(
        "range upper targets",
        (rows.nrows(), 1),
        (upper.len(), 1),
      ));
    }
    if lower.iter().zip(upper.iter()).any(|(lo, hi)| lo > hi) {
      return Err(OptimizerError::invalid(
        "factor_constraint",
        "lower target exceeds upper target",
      ));
    }
    Ok(Self { rows, lower, upper })
  }

  pub fn rows(&self) -> &DMatrix<f64> {
    &self.rows
  }

  pub fn lower(&self) -> &DVector<f64> {
    &self.lower
  }

  pub fn upper(&self) -> &DVector<f64> {
    &self.upper
  }

  /// Distance of each row value outside `[lower, upper]`, zero when inside.
  pub fn violation(&self, w: &DVector<f64>) -> DVector<f64> {
    let values = &self.rows * w;
    DVector::from_fn(values.len(), |i, _| {
      let v = values[i];
      (self.lower[i] - v).max(0.0) + (v - self.upper[i]).max(0.0)
    })
  }
}

/// Uniform scalar bounds applied to every asset weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxBounds {
  pub lower: f64,
  pub upper: f64,
}

impl Default for BoxBounds {
  fn default() -> Self {
    Self {
      lower: f64::NEG_INFINITY,
      upper: f64::INFINITY,
    }
  }
}

impl BoxBounds {
  pub fn new(lower: f64, upper: f64) -> Result<Self> {
    if lower.is_nan() || upper.is_nan() {
      return Err(OptimizerError::invalid("box bounds", "bounds must not be NaN"));
    }
    if lower > upper {
      return Err(OptimizerError::invalid(
        "box bounds",
        format!("min_weight {lower} exceeds max_weight {upper}"),
      ));
    }
    Ok(Self { lower, upper })
  }

  pub fn is_unbounded(&self) -> bool {
    self.lower == f64::NEG_INFINITY && self.upper == f64::INFINITY
  }

  /// Indices strictly below `lower - tol` and strictly above `upper + tol`,
  /// both in ascending order.
  pub fn violations(&self, w: &DVector<f64>, tol: f64) -> (Vec<usize>, Vec<usize>) {
    let below = w
      .iter()
      .enumerate()
      .filter(|&(_, &wi)| wi < self.lower - tol)
      .map(|(i, _)| i)
      .collect();
    let above = w
      .iter()
      .enumerate()
      .filter(|&(_, &wi)| wi > self.upper + tol)
      .map(|(i, _)| i)
      .collect();
    (below, above)
  }

  /// Amount by which `wi` lies outside the bounds.
  pub fn excess(&self, wi: f64) -> f64 {
    (self.lower - wi).max(0.0) + (wi - self.upper).max(0.0)
  }

  /// Element-wise clamp into `[lower, upper]`.
  pub fn clip(&self, w: &DVector<f64>) -> DVector<f64> {
    w.map(|wi| wi.max(self.lower).min(self.upper))
  }
}
