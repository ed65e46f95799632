//! # Objective Inputs
//!
//! $$
//! \Sigma_{ij} = \sigma_i \sigma_j \rho_{ij},\qquad \hat\alpha_i=\frac1T\sum_t r_{it}
//! $$
//!
//! Helpers that turn volatilities, correlations or return histories into the
//! `alpha` column and covariance matrix expected by [`ProblemDefinition`].
//!
//! [`ProblemDefinition`]: crate::problem::ProblemDefinition

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::OptimizerError;
use crate::error::Result;

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

/// Build a covariance matrix from per-asset volatilities and a correlation
/// matrix. Missing correlation entries fall back to the identity.
pub fn covariance_matrix(sigmas: &[f64], corr: &[Vec<f64>]) -> DMatrix<f64> {
  let n = sigmas.len();
  DMatrix::from_fn(n, n, |i, j| {
    let c_ij = corr
      .get(i)
      .and_then(|row| row.get(j))
      .copied()
      .unwrap_or(if i == j { 1.0 } else { 0.0 });
    sigmas[i] * sigmas[j] * c_ij
  })
}

/// Covariance with a single pairwise correlation `rho` between every pair.
pub fn constant_correlation_covariance(sigmas: &[f64], rho: f64) -> DMatrix<f64> {
  let n = sigmas.len();
  DMatrix::from_fn(n, n, |i, j| {
    let c_ij = if i == j { 1.0 } else { rho };
    sigmas[i] * sigmas[j] * c_ij
  })
}

/// Per-asset sample means of aligned return series, as an `n x 1` column.
pub fn mean_returns(aligned_returns: &[Vec<f64>]) -> DMatrix<f64> {
  let means: Vec<f64> = aligned_returns.iter().map(|r| sample_mean(r)).collect();
  DMatrix::from_column_slice(means.len(), 1, &means)
}

/// Unbiased sample covariance of aligned return series (one series per asset).
pub fn sample_covariance(aligned_returns: &[Vec<f64>]) -> Result<DMatrix<f64>> {
  let n = aligned_returns.len();
  let t = aligned_returns.first().map(|r| r.len()).unwrap_or(0);
  if let Some(bad) = aligned_returns.iter().find(|r| r.len() != t) {
    return Err(OptimizerError::shape("return series", (n, t), (n, bad.len())));
  }
  if t < 2 {
    return Err(OptimizerError::invalid(
      "return series",
      "at least two observations are required",
    ));
  }

  let means: Vec<f64> = aligned_returns.iter().map(|r| sample_mean(r)).collect();
  let centered = DMatrix::from_fn(n, t, |i, k| aligned_returns[i][k] - means[i]);
  Ok(&centered * centered.transpose() / (t - 1) as f64)
}

/// `n x 1` column from a slice.
pub fn column(values: &[f64]) -> DMatrix<f64> {
  DMatrix::from_column_slice(values.len(), 1, values)
}

/// Square matrix from row vectors. Ragged rows are a shape error.
pub fn square_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
  let n = rows.len();
  if let Some(bad) = rows.iter().find(|r| r.len() != n) {
    return Err(OptimizerError::shape("covariance matrix", (n, n), (n, bad.len())));
  }
  let flat: Vec<f64> = rows.iter().flatten().copied().collect();
  Ok(DMatrix::from_row_slice(n, n, &flat))
}

/// Convert a column matrix into a vector, rejecting anything wider.
pub(crate) fn as_column(alpha: &DMatrix<f64>) -> Result<DVector<f64>> {
  if alpha.ncols() != 1 {
    return Err(OptimizerError::shape(
      "expected returns",
      (alpha.nrows(), 1),
      alpha.shape(),
    ));
  }
  Ok(alpha.column(0).into_owned())
}
