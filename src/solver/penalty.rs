//! # Penalty Solver
//!
//! $$
//! \min_{\mathbf w}\ -\alpha^\top\mathbf w+\gamma\,\mathbf w^\top\Sigma\mathbf w
//! +\rho\Big(\lVert A\mathbf w-b\rVert^2+\sum_k v_k(\mathbf w)^2+\sum_i e_i(w_i)^2\Big)
//! $$
//!
//! Nelder-Mead over a quadratic-penalty objective. Slower and only approximate,
//! but honors factor ranges `lower <= R w <= upper` that the closed form cannot.
//! The penalty leaves bounds violated by roughly `1 / rho`; the final weights
//! are clipped like the analytic solver's.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::solver::neldermead::NelderMead;
use nalgebra::DVector;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::result::SolveStatus;
use super::result::SolverResult;
use super::PortfolioSolver;
use crate::error::OptimizerError;
use crate::error::Result;
use crate::problem::BoxBounds;
use crate::problem::InequalityRange;
use crate::problem::LinearSystem;
use crate::problem::Objective;
use crate::problem::ProblemDefinition;

fn backend(err: anyhow::Error) -> OptimizerError {
  OptimizerError::Backend(format!("{err:#}"))
}

/// Runtime configuration for [`PenaltySolver`].
#[derive(Clone, Copy, Debug)]
pub struct PenaltySolverConfig {
  /// Weight `rho` on squared constraint violations.
  pub penalty: f64,
  pub max_iterations: u64,
  /// Simplex standard deviation at which Nelder-Mead stops.
  pub sd_tolerance: f64,
  /// Edge length of the initial simplex around the starting point.
  pub initial_step: f64,
  /// Bound violation left by the penalty that still counts as feasible.
  pub violation_tolerance: f64,
}

impl Default for PenaltySolverConfig {
  fn default() -> Self {
    Self {
      penalty: 1e4,
      max_iterations: 5000,
      sd_tolerance: 1e-12,
      initial_step: 0.1,
      violation_tolerance: 1e-3,
    }
  }
}

struct PenalizedUtility {
  problem: Configured,
  penalty: f64,
}

impl PenalizedUtility {
  fn violation(&self, w: &DVector<f64>) -> f64 {
    let p = &self.problem;
    let eq = if p.equalities.is_empty() {
      0.0
    } else {
      p.equalities.residual(w).norm_squared()
    };
    let ranges: f64 = p.ranges.iter().map(|r| r.violation(w).norm_squared()).sum();
    let bounds: f64 = w.iter().map(|&wi| p.bounds.excess(wi).powi(2)).sum();
    eq + ranges + bounds
  }
}

impl CostFunction for PenalizedUtility {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = DVector::from_column_slice(x);
    Ok(-self.problem.objective.utility(&w) + self.penalty * self.violation(&w))
  }
}

#[derive(Clone, Debug)]
struct Configured {
  objective: Objective,
  equalities: LinearSystem,
  ranges: Vec<InequalityRange>,
  bounds: BoxBounds,
}

/// Quadratic-penalty back-end driven by `argmin`'s Nelder-Mead.
#[derive(Clone, Debug, Default)]
pub struct PenaltySolver {
  config: PenaltySolverConfig,
  state: Option<Configured>,
  seed: Option<DVector<f64>>,
  weights: Option<DVector<f64>>,
}

impl PenaltySolver {
  pub fn new(config: PenaltySolverConfig) -> Self {
    Self {
      config,
      state: None,
      seed: None,
      weights: None,
    }
  }

  pub fn config(&self) -> &PenaltySolverConfig {
    &self.config
  }

  /// Starting point for the next solve. Used once, then the solver falls
  /// back to its own last weights.
  pub fn set_weights(&mut self, w: DVector<f64>) -> Result<()> {
    if let Some(n) = self.state.as_ref().map(|s| s.objective.n_assets()) {
      if w.len() != n {
        return Err(OptimizerError::shape("initial weights", (n, 1), (w.len(), 1)));
      }
    }
    self.seed = Some(w);
    Ok(())
  }

  fn start(&self, n: usize) -> Result<Vec<f64>> {
    if let Some(seed) = &self.seed {
      if seed.len() != n {
        return Err(OptimizerError::shape("initial weights", (n, 1), (seed.len(), 1)));
      }
      return Ok(seed.iter().copied().collect());
    }
    Ok(match &self.weights {
      Some(w) if w.len() == n => w.iter().copied().collect(),
      _ => vec![1.0 / n as f64; n],
    })
  }
}

impl PortfolioSolver for PenaltySolver {
  fn name(&self) -> &'static str {
    "penalty"
  }

  fn configure(&mut self, problem: &ProblemDefinition) -> Result<()> {
    self.state = None;

    let objective = problem.require_objective("configure")?.clone();
    let equalities = problem
      .equalities()
      .ok_or(OptimizerError::NotConfigured("configure"))?;
    let ranges = problem.ranges().to_vec();
    let bounds = problem.bounds();
    info!(
      n = objective.n_assets(),
      equalities = equalities.n_rows(),
      ranges = ranges.len(),
      "penalty solver configured"
    );

    self.state = Some(Configured {
      objective,
      equalities,
      ranges,
      bounds,
    });
    Ok(())
  }

  fn solve(&mut self) -> Result<SolverResult> {
    let state = self
      .state
      .as_ref()
      .ok_or(OptimizerError::NotConfigured("solve"))?;
    let n = state.objective.n_assets();
    let bounds = state.bounds;

    let cost = PenalizedUtility {
      problem: state.clone(),
      penalty: self.config.penalty,
    };

    let x0 = self.start(n)?;
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
      let mut point = x0.clone();
      point[i] += self.config.initial_step;
      simplex.push(point);
    }

    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(self.config.sd_tolerance)
      .map_err(backend)?;
    let max_iters = self.config.max_iterations;
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(max_iters))
      .run()
      .map_err(backend)?;

    let iterations = res.state.get_iter();
    let best_cost = res.state.get_best_cost();
    let best = res
      .state
      .best_param
      .ok_or_else(|| OptimizerError::Backend("optimizer returned no parameters".into()))?;
    let w = DVector::from_vec(best);
    if w.iter().any(|v| !v.is_finite()) {
      return Err(OptimizerError::Backend("optimizer produced non-finite weights".into()));
    }

    let (below, above) = bounds.violations(&w, self.config.violation_tolerance);
    debug!(
      iterations,
      cost = best_cost,
      below = ?below,
      above = ?above,
      "nelder-mead finished"
    );

    let mut result = SolverResult::new(bounds.clip(&w), 0, below, above);
    if iterations >= max_iters {
      warn!(iterations, "nelder-mead hit the iteration cap, clipping weights");
      result = result.with_status(SolveStatus::IterationCapped);
    }
    self.seed = None;
    self.weights = Some(result.weights().clone());
    Ok(result)
  }

  fn weights(&self) -> Option<&DVector<f64>> {
    self.weights.as_ref()
  }
}
