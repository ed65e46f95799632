//! # Solvers
//!
//! $$
//! \mathbf w^\*=\arg\max_{\mathbf w}\ \alpha^\top\mathbf w-\gamma\,\mathbf w^\top\Sigma\mathbf w
//! $$
//!
//! Solver back-ends sharing one [`ProblemDefinition`] and constraint vocabulary.

pub mod analytic;
pub mod penalty;
pub mod result;

use std::str::FromStr;

use nalgebra::DVector;

pub use analytic::AnalyticSolver;
pub use analytic::AnalyticSolverConfig;
pub use analytic::CompiledObjective;
pub use penalty::PenaltySolver;
pub use penalty::PenaltySolverConfig;
pub use result::PortfolioStatistics;
pub use result::SolveStatus;
pub use result::SolverResult;

use crate::error::OptimizerError;
use crate::error::Result;
use crate::problem::ProblemDefinition;

/// Common interface of every back-end.
pub trait PortfolioSolver {
  fn name(&self) -> &'static str;

  /// Take a snapshot of `problem` and precompute whatever the back-end needs.
  /// On error the solver is left unconfigured.
  fn configure(&mut self, problem: &ProblemDefinition) -> Result<()>;

  /// Compute weights for the configured problem. A failed solve leaves the
  /// previously stored weights untouched.
  fn solve(&mut self) -> Result<SolverResult>;

  /// Weights from the last successful solve.
  fn weights(&self) -> Option<&DVector<f64>>;
}

/// Back-end selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverMethod {
  /// Closed-form KKT solve with bound repair.
  Analytic,
  /// Nelder-Mead on a quadratic-penalty objective.
  Penalty,
}

impl SolverMethod {
  /// Fresh solver with default configuration.
  pub fn solver(self) -> Box<dyn PortfolioSolver + Send + Sync> {
    match self {
      Self::Analytic => Box::new(AnalyticSolver::default()),
      Self::Penalty => Box::new(PenaltySolver::default()),
    }
  }
}

impl FromStr for SolverMethod {
  type Err = OptimizerError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "analytic" | "kkt" | "closed-form" => Ok(Self::Analytic),
      "penalty" | "nelder-mead" | "neldermead" => Ok(Self::Penalty),
      other => Err(OptimizerError::invalid(
        "solver method",
        format!("unknown solver `{other}`"),
      )),
    }
  }
}

/// Configure a default solver of the given kind on `problem` and solve once.
pub fn optimize(method: SolverMethod, problem: &ProblemDefinition) -> Result<SolverResult> {
  let mut solver = method.solver();
  solver.configure(problem)?;
  solver.solve()
}
