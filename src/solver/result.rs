//! # Solver Results
//!
//! $$
//! \mu_p=\alpha^\top\mathbf w,\quad \sigma_p^2=\mathbf w^\top\Sigma\mathbf w,\quad U=\mu_p-\gamma\sigma_p^2
//! $$
//!
//! Weights plus the diagnostics needed to tell a converged repair loop from one
//! that stopped at its iteration cap.

use nalgebra::DVector;

use crate::error::OptimizerError;
use crate::error::Result;
use crate::problem::ProblemDefinition;

/// How a solve terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
  /// No bound violations remained before clipping.
  Converged,
  /// The solver stopped at its iteration cap, or violations were left; the
  /// weights were clipped.
  IterationCapped,
}

/// Output of a single `solve()` call.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverResult {
  weights: DVector<f64>,
  repair_iterations: usize,
  lower_violations: Vec<usize>,
  upper_violations: Vec<usize>,
  status: SolveStatus,
}

impl SolverResult {
  pub(crate) fn new(
    weights: DVector<f64>,
    repair_iterations: usize,
    lower_violations: Vec<usize>,
    upper_violations: Vec<usize>,
  ) -> Self {
    let status = if lower_violations.is_empty() && upper_violations.is_empty() {
      SolveStatus::Converged
    } else {
      SolveStatus::IterationCapped
    };
    Self {
      weights,
      repair_iterations,
      lower_violations,
      upper_violations,
      status,
    }
  }

  pub(crate) fn with_status(mut self, status: SolveStatus) -> Self {
    self.status = status;
    self
  }

  /// Final (clipped) weights.
  pub fn weights(&self) -> &DVector<f64> {
    &self.weights
  }

  pub fn into_weights(self) -> DVector<f64> {
    self.weights
  }

  /// Number of augmented re-solves performed after the initial solve.
  pub fn repair_iterations(&self) -> usize {
    self.repair_iterations
  }

  /// Assets still below the lower bound when the loop stopped (before clipping).
  pub fn lower_violations(&self) -> &[usize] {
    &self.lower_violations
  }

  /// Assets still above the upper bound when the loop stopped (before clipping).
  pub fn upper_violations(&self) -> &[usize] {
    &self.upper_violations
  }

  pub fn status(&self) -> SolveStatus {
    self.status
  }

  pub fn is_converged(&self) -> bool {
    self.status == SolveStatus::Converged
  }

  /// Expected return, risk and utility of the weights under `problem`'s objective.
  pub fn statistics(&self, problem: &ProblemDefinition) -> Result<PortfolioStatistics> {
    let objective = problem.require_objective("statistics")?;
    let n = objective.n_assets();
    if self.weights.len() != n {
      return Err(OptimizerError::shape(
        "weights",
        (n, 1),
        (self.weights.len(), 1),
      ));
    }

    let expected_return = objective.alpha().dot(&self.weights);
    let variance = self.weights.dot(&(objective.cov() * &self.weights));
    Ok(PortfolioStatistics {
      expected_return,
      variance,
      volatility: variance.max(0.0).sqrt(),
      utility: expected_return - objective.gamma() * variance,
    })
  }
}

/// Summary statistics of a weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioStatistics {
  /// `alpha' w`.
  pub expected_return: f64,
  /// `w' Sigma w`.
  pub variance: f64,
  pub volatility: f64,
  /// `alpha' w - gamma w' Sigma w`.
  pub utility: f64,
}
