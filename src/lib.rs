//! # portopt
//!
//! $$
//! \max_{\mathbf w}\ \alpha^\top\mathbf w-\gamma\,\mathbf w^\top\Sigma\mathbf w
//! \quad\text{s.t.}\quad A\mathbf w=b,\ \ \ell\le w_i\le u
//! $$
//!
//! Mean-variance portfolio optimization. The [`solver::AnalyticSolver`] solves
//! the equality-constrained problem in closed form from its KKT conditions and
//! repairs box-bound violations by pinning offending weights and re-solving.
//! [`solver::PenaltySolver`] is a slower Nelder-Mead back-end that also honors
//! factor ranges.
//!
//! ```ignore
//! let mut problem = ProblemDefinition::new();
//! problem.set_objective_from_slices(&[0.1, 0.2], &[vec![0.04, 0.0], vec![0.0, 0.09]], 2.0)?;
//! problem.set_constraints_json(&json!({"sum_weights": 1.0, "min_weight": 0.0, "max_weight": 1.0}))?;
//!
//! let mut solver = AnalyticSolver::default();
//! solver.configure(&problem)?;
//! let result = solver.solve()?; // [0.5, 0.5]
//! ```

pub mod error;
pub mod problem;
pub mod solver;

pub use error::OptimizerError;
pub use error::Result;
pub use problem::Constraint;
pub use problem::ProblemDefinition;
pub use solver::AnalyticSolver;
pub use solver::PenaltySolver;
pub use solver::PortfolioSolver;
pub use solver::SolveStatus;
pub use solver::SolverMethod;
pub use solver::SolverResult;
