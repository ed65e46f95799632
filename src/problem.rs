//! # Problem Definition
//!
//! $$
//! \max_{\mathbf w}\ \alpha^\top\mathbf w-\gamma\,\mathbf w^\top\Sigma\mathbf w
//! \quad\text{s.t.}\quad A\mathbf w=b,\ \ \ell\le w_i\le u
//! $$
//!
//! Validated objective inputs and the parsed constraint set shared by every
//! solver back-end.

pub mod constraint;
pub mod inputs;
pub mod linear;

use nalgebra::DMatrix;
use nalgebra::DVector;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

pub use constraint::Constraint;
pub use constraint::FactorConstraint;
pub use linear::BoxBounds;
pub use linear::InequalityRange;
pub use linear::LinearSystem;

use crate::error::OptimizerError;
use crate::error::Result;

const SYMMETRY_TOL: f64 = 1e-10;

/// Mean-variance objective `alpha' w - gamma w' Sigma w`.
#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
  alpha: DVector<f64>,
  cov: DMatrix<f64>,
  gamma: f64,
}

impl Objective {
  pub fn alpha(&self) -> &DVector<f64> {
    &self.alpha
  }

  pub fn cov(&self) -> &DMatrix<f64> {
    &self.cov
  }

  pub fn gamma(&self) -> f64 {
    self.gamma
  }

  pub fn n_assets(&self) -> usize {
    self.alpha.len()
  }

  /// Objective value at `w`.
  pub fn utility(&self, w: &DVector<f64>) -> f64 {
    self.alpha.dot(w) - self.gamma * w.dot(&(&self.cov * w))
  }
}

/// Objective plus constraint set, configured in two steps: objective first,
/// then constraints (which need the asset count).
#[derive(Clone, Debug, Default)]
pub struct ProblemDefinition {
  objective: Option<Objective>,
  equalities: Option<LinearSystem>,
  ranges: Vec<InequalityRange>,
  bounds: BoxBounds,
}

impl ProblemDefinition {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set `alpha` (an `n x 1` column), the `n x n` covariance and the risk
  /// aversion. Changing the asset count drops previously set constraints.
  pub fn set_objective(&mut self, alpha: DMatrix<f64>, cov: DMatrix<f64>, gamma: f64) -> Result<()> {
    let alpha = inputs::as_column(&alpha)?;
    let n = alpha.len();
    if n == 0 {
      return Err(OptimizerError::invalid(
        "expected returns",
        "at least one asset is required",
      ));
    }
    if cov.shape() != (n, n) {
      return Err(OptimizerError::shape("covariance matrix", (n, n), cov.shape()));
    }
    if !gamma.is_finite() || gamma <= 0.0 {
      return Err(OptimizerError::invalid(
        "risk aversion",
        format!("gamma must be positive and finite, got {gamma}"),
      ));
    }
    if alpha.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
      return Err(OptimizerError::invalid(
        "objective",
        "expected returns and covariance must be finite",
      ));
    }
    if (&cov - cov.transpose()).amax() > SYMMETRY_TOL {
      warn!(n, "covariance matrix is not symmetric");
    }

    if self.n_assets() != Some(n) {
      self.equalities = None;
      self.ranges.clear();
      self.bounds = BoxBounds::default();
    }
    debug!(n, gamma, "objective configured");
    self.objective = Some(Objective { alpha, cov, gamma });
    Ok(())
  }

  /// [`set_objective`](Self::set_objective) from a return slice and covariance rows.
  pub fn set_objective_from_slices(&mut self, alpha: &[f64], cov: &[Vec<f64>], gamma: f64) -> Result<()> {
    let cov = inputs::square_matrix(cov)?;
    self.set_objective(inputs::column(alpha), cov, gamma)
  }

  /// Replace the constraint set. Equality rows are stacked in the order the
  /// constraints are given; bounds not mentioned reset to +/- infinity. On
  /// error the previous constraint set is kept.
  pub fn set_constraints<I>(&mut self, constraints: I) -> Result<()>
  where
    I: IntoIterator<Item = Constraint>,
  {
    let n = self
      .n_assets()
      .ok_or(OptimizerError::NotConfigured("set_constraints"))?;

    let mut equalities = LinearSystem::empty(n);
    let mut ranges = Vec::new();
    let mut lower = f64::NEG_INFINITY;
    let mut upper = f64::INFINITY;

    for constraint in constraints {
      match constraint {
        Constraint::MinWeight(lb) => lower = lb,
        Constraint::MaxWeight(ub) => upper = ub,
        Constraint::SumWeights(target) => {
          if !target.is_finite() {
            return Err(OptimizerError::invalid(
              Constraint::SUM_WEIGHTS,
              "target must be finite",
            ));
          }
          let row = LinearSystem::new(DMatrix::from_element(1, n, 1.0), DVector::from_element(1, target))?;
          equalities = equalities.stack(&row)?;
        }
        Constraint::Factor(factor) => {
          if factor.rows.ncols() != n {
            return Err(OptimizerError::shape(
              "factor rows",
              (factor.rows.nrows(), n),
              factor.rows.shape(),
            ));
          }
          if factor.is_equality() {
            let rows = LinearSystem::new(factor.rows, factor.upper)?;
            equalities = equalities.stack(&rows)?;
          } else {
            ranges.push(InequalityRange::new(factor.rows, factor.lower, factor.upper)?);
          }
        }
      }
    }

    let bounds = BoxBounds::new(lower, upper)?;
    debug!(
      equalities = equalities.n_rows(),
      ranges = ranges.len(),
      lower,
      upper,
      "constraints configured"
    );

    self.equalities = Some(equalities);
    self.ranges = ranges;
    self.bounds = bounds;
    Ok(())
  }

  /// Parse the key/value constraint vocabulary and apply it.
  pub fn set_constraints_json(&mut self, value: &Value) -> Result<()> {
    let constraints = constraint::parse_constraints(value)?;
    self.set_constraints(constraints)
  }

  pub fn objective(&self) -> Option<&Objective> {
    self.objective.as_ref()
  }

  pub(crate) fn require_objective(&self, caller: &'static str) -> Result<&Objective> {
    self.objective.as_ref().ok_or(OptimizerError::NotConfigured(caller))
  }

  pub fn alpha(&self) -> Option<&DVector<f64>> {
    self.objective.as_ref().map(Objective::alpha)
  }

  pub fn cov(&self) -> Option<&DMatrix<f64>> {
    self.objective.as_ref().map(Objective::cov)
  }

  pub fn gamma(&self) -> Option<f64> {
    self.objective.as_ref().map(Objective::gamma)
  }

  pub fn n_assets(&self) -> Option<usize> {
    self.objective.as_ref().map(Objective::n_assets)
  }

  /// Concatenated equality system. Empty (zero rows) when only the objective
  /// has been set.
  pub fn equalities(&self) -> Option<LinearSystem> {
    match (&self.equalities, self.n_assets()) {
      (Some(eq), _) => Some(eq.clone()),
      (None, Some(n)) => Some(LinearSystem::empty(n)),
      (None, None) => None,
    }
  }

  pub fn ranges(&self) -> &[InequalityRange] {
    &self.ranges
  }

  pub fn bounds(&self) -> BoxBounds {
    self.bounds
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn two_asset() -> ProblemDefinition {
    let mut problem = ProblemDefinition::new();
    problem
      .set_objective_from_slices(&[0.1, 0.2], &[vec![0.04, 0.0], vec![0.0, 0.09]], 2.0)
      .unwrap();
    problem
  }

  #[test]
  fn alpha_must_be_a_single_column() {
    let mut problem = ProblemDefinition::new();
    let err = problem
      .set_objective(DMatrix::zeros(2, 2), DMatrix::identity(2, 2), 1.0)
      .unwrap_err();
    assert!(matches!(err, OptimizerError::Shape { what: "expected returns", .. }));
    assert!(problem.objective().is_none());
  }

  #[test]
  fn covariance_shape_must_match_alpha() {
    let mut problem = ProblemDefinition::new();
    let err = problem
      .set_objective(inputs::column(&[0.1, 0.2, 0.3]), DMatrix::identity(2, 2), 1.0)
      .unwrap_err();
    assert!(matches!(err, OptimizerError::Shape { what: "covariance matrix", .. }));
  }

  #[test]
  fn non_positive_gamma_is_rejected() {
    let mut problem = ProblemDefinition::new();
    let err = problem
      .set_objective(inputs::column(&[0.1]), DMatrix::identity(1, 1), 0.0)
      .unwrap_err();
    assert!(matches!(err, OptimizerError::InvalidInput { .. }));
  }

  #[test]
  fn constraints_need_objective_first() {
    let mut problem = ProblemDefinition::new();
    let err = problem.set_constraints([Constraint::SumWeights(1.0)]).unwrap_err();
    assert!(matches!(err, OptimizerError::NotConfigured(_)));
  }

  #[test]
  fn builds_equality_system_and_bounds() {
    let mut problem = two_asset();
    problem
      .set_constraints_json(&json!({
        "sum_weights": 1.0,
        "min_weight": 0.0,
        "max_weight": 1.0,
        "factor_constraint": [[1.0, -1.0], 0.0]
      }))
      .unwrap();

    let eq = problem.equalities().unwrap();
    assert_eq!(eq.a().shape(), (2, 2));
    assert_eq!(eq.a().row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0]);
    assert_eq!(eq.a().row(1).iter().copied().collect::<Vec<_>>(), vec![1.0, -1.0]);
    assert_eq!(eq.b().as_slice(), &[1.0, 0.0]);
    assert_eq!(problem.bounds(), BoxBounds::new(0.0, 1.0).unwrap());
    assert!(problem.ranges().is_empty());
  }

  #[test]
  fn range_factor_is_kept_apart_from_equalities() {
    let mut problem = two_asset();
    problem
      .set_constraints([
        Constraint::SumWeights(1.0),
        Constraint::Factor(FactorConstraint::range(
          DMatrix::from_row_slice(1, 2, &[0.0, 1.0]),
          DVector::from_element(1, 0.0),
          DVector::from_element(1, 0.4),
        )),
      ])
      .unwrap();

    assert_eq!(problem.equalities().unwrap().n_rows(), 1);
    assert_eq!(problem.ranges().len(), 1);
    assert!(problem.bounds().is_unbounded());
  }

  #[test]
  fn unrecognized_key_leaves_previous_constraints() {
    let mut problem = two_asset();
    problem.set_constraints([Constraint::SumWeights(1.0)]).unwrap();

    let err = problem
      .set_constraints_json(&json!({"unknown_kind": 1}))
      .unwrap_err();
    assert!(matches!(err, OptimizerError::UnrecognizedConstraint(_)));
    assert_eq!(problem.equalities().unwrap().n_rows(), 1);
  }

  #[test]
  fn factor_columns_must_match_universe() {
    let mut problem = two_asset();
    let err = problem
      .set_constraints([Constraint::Factor(FactorConstraint::equality(
        DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]),
        DVector::from_element(1, 0.0),
      ))])
      .unwrap_err();
    assert!(matches!(err, OptimizerError::Shape { .. }));
  }

  #[test]
  fn resizing_universe_drops_constraints() {
    let mut problem = two_asset();
    problem
      .set_constraints([Constraint::SumWeights(1.0), Constraint::MinWeight(0.0)])
      .unwrap();
    problem
      .set_objective(inputs::column(&[0.1, 0.2, 0.3]), DMatrix::identity(3, 3), 1.0)
      .unwrap();

    assert_eq!(problem.n_assets(), Some(3));
    assert!(problem.equalities().unwrap().is_empty());
    assert!(problem.bounds().is_unbounded());
  }
}
