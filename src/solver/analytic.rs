//! # Analytic Solver
//!
//! $$
//! V^{-1}=\tfrac{1}{2\gamma}\Sigma^{-1},\quad
//! \lambda=(AV^{-1}A^\top)^{-1}(AV^{-1}\alpha-b),\quad
//! \mathbf w=V^{-1}(\alpha-A^\top\lambda)
//! $$
//!
//! Closed-form KKT solution of the equality-constrained mean-variance problem,
//! followed by an active-set style repair of box-bound violations: violating
//! assets are pinned to the violated bound and the base system is re-solved,
//! up to a fixed number of iterations, then the weights are clipped.

use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::result::SolverResult;
use super::PortfolioSolver;
use crate::error::OptimizerError;
use crate::error::Result;
use crate::problem::BoxBounds;
use crate::problem::Constraint;
use crate::problem::LinearSystem;
use crate::problem::ProblemDefinition;

/// Floor for the accepted `M M^-1 - I` residual on well-conditioned matrices.
const INVERSE_RESIDUAL_TOL: f64 = 1e-6;

/// Invert `m`, rejecting matrices whose computed inverse does not reproduce
/// the identity to within `n eps |M| |M^-1|` (Frobenius norms).
fn invert(m: DMatrix<f64>, what: &'static str) -> Result<DMatrix<f64>> {
  let n = m.nrows();
  let inverse = m
    .clone()
    .try_inverse()
    .ok_or(OptimizerError::SingularMatrix { what })?;

  let residual = (&m * &inverse - DMatrix::<f64>::identity(n, n)).amax();
  let round_off = n as f64 * f64::EPSILON * m.norm() * inverse.norm();
  if !residual.is_finite() || residual > INVERSE_RESIDUAL_TOL.max(round_off) {
    return Err(OptimizerError::SingularMatrix { what });
  }
  Ok(inverse)
}

/// `alpha` together with `V^-1 = Sigma^-1 / (2 gamma)`, computed once per
/// objective and reused by every equality solve.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledObjective {
  alpha: DVector<f64>,
  v_inv: DMatrix<f64>,
}

impl CompiledObjective {
  pub fn compile(alpha: &DVector<f64>, cov: &DMatrix<f64>, gamma: f64) -> Result<Self> {
    let cov_inv = invert(cov.clone(), "covariance matrix")?;
    Ok(Self {
      alpha: alpha.clone(),
      v_inv: cov_inv * (0.5 / gamma),
    })
  }

  pub fn from_problem(problem: &ProblemDefinition) -> Result<Self> {
    let objective = problem.require_objective("compile")?;
    Self::compile(objective.alpha(), objective.cov(), objective.gamma())
  }

  pub fn alpha(&self) -> &DVector<f64> {
    &self.alpha
  }

  pub fn v_inv(&self) -> &DMatrix<f64> {
    &self.v_inv
  }

  pub fn n_assets(&self) -> usize {
    self.alpha.len()
  }

  /// Stationary point of the Lagrangian for `A w = b`. With no rows this is
  /// the unconstrained optimum `V^-1 alpha`.
  pub fn solve_equality(&self, system: &LinearSystem) -> Result<DVector<f64>> {
    if system.n_cols() != self.n_assets() {
      return Err(OptimizerError::shape(
        "constraint rows",
        (system.n_rows(), self.n_assets()),
        (system.n_rows(), system.n_cols()),
      ));
    }
    if system.is_empty() {
      return Ok(&self.v_inv * &self.alpha);
    }

    let a = system.a();
    let a_vinv = a * &self.v_inv;
    let m = &a_vinv * a.transpose();
    let m_inv = invert(m, "reduced KKT system")?;

    let lambda = m_inv * (&a_vinv * &self.alpha - system.b());
    Ok(&self.v_inv * (&self.alpha - a.transpose() * lambda))
  }
}

/// Runtime configuration for [`AnalyticSolver`].
#[derive(Clone, Copy, Debug)]
pub struct AnalyticSolverConfig {
  /// Cap on the iteration counter. The initial solve counts as the first
  /// iteration, so at most `max_iterations - 1` augmented re-solves run (and
  /// always at least one when a bound is violated).
  pub max_iterations: usize,
  /// Slack allowed before a weight counts as violating a bound. Zero uses
  /// strict comparisons.
  pub violation_tolerance: f64,
}

impl Default for AnalyticSolverConfig {
  fn default() -> Self {
    Self {
      max_iterations: 15,
      violation_tolerance: 0.0,
    }
  }
}

/// Bound-repair loop over a compiled objective and its base equality system.
pub fn repair_bounds(
  compiled: &CompiledObjective,
  base: &LinearSystem,
  bounds: &BoxBounds,
  config: &AnalyticSolverConfig,
) -> Result<SolverResult> {
  let tol = config.violation_tolerance;
  let mut w = compiled.solve_equality(base)?;
  let (mut below, mut above) = bounds.violations(&w, tol);

  let mut counter = 1;
  let mut repairs = 0;
  while !below.is_empty() || !above.is_empty() {
    let augmented = base.with_pins(&below, bounds.lower, &above, bounds.upper);
    w = compiled.solve_equality(&augmented)?;
    repairs += 1;
    (below, above) = bounds.violations(&w, tol);
    debug!(
      iteration = repairs,
      pinned = augmented.n_rows() - base.n_rows(),
      below = ?below,
      above = ?above,
      "re-solved with pinned weights"
    );

    counter += 1;
    if counter >= config.max_iterations {
      break;
    }
  }

  if !below.is_empty() || !above.is_empty() {
    warn!(
      iterations = repairs,
      below = ?below,
      above = ?above,
      "bound repair hit the iteration cap, clipping weights"
    );
  }

  Ok(SolverResult::new(bounds.clip(&w), repairs, below, above))
}

#[derive(Clone, Debug)]
struct Configured {
  compiled: CompiledObjective,
  equalities: LinearSystem,
  bounds: BoxBounds,
}

/// Closed-form solver with iterative bound repair.
#[derive(Clone, Debug, Default)]
pub struct AnalyticSolver {
  config: AnalyticSolverConfig,
  state: Option<Configured>,
  weights: Option<DVector<f64>>,
}

impl AnalyticSolver {
  pub fn new(config: AnalyticSolverConfig) -> Self {
    Self {
      config,
      state: None,
      weights: None,
    }
  }

  pub fn config(&self) -> &AnalyticSolverConfig {
    &self.config
  }

  /// Compiled objective of the configured problem.
  pub fn compiled(&self) -> Option<&CompiledObjective> {
    self.state.as_ref().map(|s| &s.compiled)
  }
}

impl PortfolioSolver for AnalyticSolver {
  fn name(&self) -> &'static str {
    "analytic"
  }

  fn configure(&mut self, problem: &ProblemDefinition) -> Result<()> {
    self.state = None;

    if let Some(range) = problem.ranges().first() {
      return Err(OptimizerError::UnsupportedConstraint {
        kind: Constraint::FACTOR,
        solver: self.name(),
        reason: format!(
          "{} row(s) with lower != upper; only equality targets are supported",
          range.rows().nrows()
        ),
      });
    }

    let compiled = CompiledObjective::from_problem(problem)?;
    let equalities = problem
      .equalities()
      .ok_or(OptimizerError::NotConfigured("configure"))?;
    let bounds = problem.bounds();
    info!(
      n = compiled.n_assets(),
      equalities = equalities.n_rows(),
      lower = bounds.lower,
      upper = bounds.upper,
      "analytic solver configured"
    );

    self.state = Some(Configured {
      compiled,
      equalities,
      bounds,
    });
    Ok(())
  }

  fn solve(&mut self) -> Result<SolverResult> {
    let state = self
      .state
      .as_ref()
      .ok_or(OptimizerError::NotConfigured("solve"))?;
    let result = repair_bounds(&state.compiled, &state.equalities, &state.bounds, &self.config)?;
    self.weights = Some(result.weights().clone());
    Ok(result)
  }

  fn weights(&self) -> Option<&DVector<f64>> {
    self.weights.as_ref()
  }
}
