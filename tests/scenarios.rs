use anyhow::Result;
use approx::assert_abs_diff_eq;
use nalgebra::DMatrix;
use nalgebra::DVector;
use portopt::problem::inputs;
use portopt::problem::FactorConstraint;
use portopt::solver::optimize;
use portopt::AnalyticSolver;
use portopt::Constraint;
use portopt::OptimizerError;
use portopt::PortfolioSolver;
use portopt::ProblemDefinition;
use portopt::SolverMethod;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde_json::json;

fn two_asset_long_only() -> Result<ProblemDefinition> {
  let mut problem = ProblemDefinition::new();
  problem.set_objective_from_slices(&[0.1, 0.2], &[vec![0.04, 0.0], vec![0.0, 0.09]], 2.0)?;
  problem.set_constraints_json(&json!({
    "sum_weights": 1.0,
    "min_weight": 0.0,
    "max_weight": 1.0
  }))?;
  Ok(problem)
}

fn random_problem(rng: &mut StdRng, n: usize) -> Result<ProblemDefinition> {
  let sigmas: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..0.4)).collect();
  let alpha: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.05..0.15)).collect();
  let cov = inputs::constant_correlation_covariance(&sigmas, rng.gen_range(0.0..0.6));

  let mut problem = ProblemDefinition::new();
  problem.set_objective(inputs::column(&alpha), cov, rng.gen_range(1.0..5.0))?;
  Ok(problem)
}

#[test]
fn two_asset_long_only_splits_evenly() -> Result<()> {
  let problem = two_asset_long_only()?;
  let mut solver = AnalyticSolver::default();
  solver.configure(&problem)?;
  let result = solver.solve()?;

  assert_eq!(result.repair_iterations(), 0);
  assert!(result.is_converged());
  assert_abs_diff_eq!(result.weights()[0], 0.5, epsilon = 1e-12);
  assert_abs_diff_eq!(result.weights()[1], 0.5, epsilon = 1e-12);

  let stats = result.statistics(&problem)?;
  assert_abs_diff_eq!(stats.expected_return, 0.15, epsilon = 1e-12);
  assert_abs_diff_eq!(stats.volatility, 0.0325f64.sqrt(), epsilon = 1e-12);
  Ok(())
}

#[test]
fn unknown_constraint_key_is_rejected() -> Result<()> {
  let mut problem = two_asset_long_only()?;
  let err = problem
    .set_constraints_json(&json!({"sum_weights": 1.0, "unknown_kind": 1}))
    .unwrap_err();
  assert!(matches!(err, OptimizerError::UnrecognizedConstraint(ref k) if k == "unknown_kind"));

  let err = problem.set_constraints_json(&json!("sum_weights")).unwrap_err();
  assert!(matches!(err, OptimizerError::Type(_)));
  Ok(())
}

#[test]
fn backends_agree_on_interior_problem() -> Result<()> {
  let problem = two_asset_long_only()?;
  let mut solutions = Vec::new();
  for method in ["analytic", "penalty"] {
    let mut solver = method.parse::<SolverMethod>()?.solver();
    assert!(solver.weights().is_none());
    solver.configure(&problem)?;
    let result = solver.solve()?;
    assert_eq!(solver.weights(), Some(result.weights()));
    solutions.push(result.into_weights());
  }

  for i in 0..2 {
    assert_abs_diff_eq!(solutions[0][i], solutions[1][i], epsilon = 1e-3);
  }
  Ok(())
}

#[test]
fn closed_form_meets_equalities_on_random_problems() -> Result<()> {
  let mut rng = StdRng::seed_from_u64(7);
  for n in 3..10 {
    let mut problem = random_problem(&mut rng, n)?;
    let exposure: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    problem.set_constraints([
      Constraint::SumWeights(1.0),
      Constraint::Factor(FactorConstraint::equality(
        DMatrix::from_row_slice(1, n, &exposure),
        DVector::from_element(1, 0.1),
      )),
    ])?;

    let result = optimize(SolverMethod::Analytic, &problem)?;
    let residual = problem.equalities().unwrap().residual(result.weights());
    assert!(residual.amax() < 1e-8, "n = {n}, residual {residual}");
  }
  Ok(())
}

#[test]
fn weights_respect_bounds_on_random_problems() -> Result<()> {
  let mut rng = StdRng::seed_from_u64(42);
  for _ in 0..50 {
    let n = rng.gen_range(3..9);
    let mut problem = random_problem(&mut rng, n)?;
    problem.set_constraints([Constraint::SumWeights(1.0), Constraint::MinWeight(0.0)])?;

    let result = optimize(SolverMethod::Analytic, &problem)?;
    assert!(result.weights().iter().all(|&w| w >= 0.0));
    if result.is_converged() {
      assert_abs_diff_eq!(result.weights().sum(), 1.0, epsilon = 1e-8);
    } else {
      assert!(!result.lower_violations().is_empty());
    }
  }
  Ok(())
}

#[test]
fn weight_cap_binds_on_random_problems() -> Result<()> {
  let mut rng = StdRng::seed_from_u64(11);
  let mut repaired = 0;
  for _ in 0..50 {
    let n = rng.gen_range(3..9);
    let upper = 1.5 / n as f64;
    let mut problem = random_problem(&mut rng, n)?;
    problem.set_constraints([Constraint::SumWeights(1.0), Constraint::MaxWeight(upper)])?;

    let result = optimize(SolverMethod::Analytic, &problem)?;
    assert!(result.weights().iter().all(|&w| w <= upper));
    if result.is_converged() {
      assert_abs_diff_eq!(result.weights().sum(), 1.0, epsilon = 1e-8);
    } else {
      assert!(!result.upper_violations().is_empty());
    }
    if result.repair_iterations() > 0 {
      repaired += 1;
    }
  }
  assert!(repaired > 0);
  Ok(())
}

#[test]
fn sample_estimates_feed_the_solver() -> Result<()> {
  let returns = vec![
    vec![0.010, 0.020, -0.010, 0.015, 0.005],
    vec![0.004, -0.002, 0.006, 0.001, 0.003],
    vec![0.020, -0.015, 0.030, -0.005, 0.010],
  ];
  let mut problem = ProblemDefinition::new();
  problem.set_objective(inputs::mean_returns(&returns), inputs::sample_covariance(&returns)?, 3.0)?;
  problem.set_constraints_json(&json!({"sum_weights": 1.0, "min_weight": 0.0}))?;

  let result = optimize(SolverMethod::Analytic, &problem)?;
  assert!(result.weights().iter().all(|&w| w >= 0.0));
  assert_eq!(result.weights().len(), 3);
  Ok(())
}

#[test]
fn singular_covariance_is_reported() -> Result<()> {
  let mut problem = ProblemDefinition::new();
  problem.set_objective_from_slices(&[0.1, 0.2], &[vec![0.04, 0.0], vec![0.0, 0.0]], 2.0)?;
  problem.set_constraints([Constraint::SumWeights(1.0)])?;

  let err = optimize(SolverMethod::Analytic, &problem).unwrap_err();
  assert!(matches!(err, OptimizerError::SingularMatrix { .. }));
  Ok(())
}
