//! # Constraint Vocabulary
//!
//! $$
//! \mathcal C\in\{\texttt{min\_weight},\ \texttt{max\_weight},\ \texttt{sum\_weights},\ \texttt{factor\_constraint}\}
//! $$
//!
//! Typed constraint variants shared by every solver back-end, plus parsing from
//! the key/value vocabulary (for example a JSON object).

use nalgebra::DMatrix;
use nalgebra::DVector;
use serde_json::Value;

use crate::error::OptimizerError;
use crate::error::Result;

/// Linear factor exposure `lower <= R w <= upper` with `R` of shape `k x n`.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorConstraint {
  pub rows: DMatrix<f64>,
  pub lower: DVector<f64>,
  pub upper: DVector<f64>,
}

impl FactorConstraint {
  /// Equality form `R w = target`.
  pub fn equality(rows: DMatrix<f64>, target: DVector<f64>) -> Self {
    Self {
      rows,
      lower: target.clone(),
      upper: target,
    }
  }

  pub fn range(rows: DMatrix<f64>, lower: DVector<f64>, upper: DVector<f64>) -> Self {
    Self { rows, lower, upper }
  }

  /// True when every row collapses to an equality.
  pub fn is_equality(&self) -> bool {
    self.lower == self.upper
  }
}

/// One entry of the constraint vocabulary.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
  /// Uniform lower bound on every weight.
  MinWeight(f64),
  /// Uniform upper bound on every weight.
  MaxWeight(f64),
  /// `sum(w) = target`.
  SumWeights(f64),
  Factor(FactorConstraint),
}

impl Constraint {
  pub const MIN_WEIGHT: &'static str = "min_weight";
  pub const MAX_WEIGHT: &'static str = "max_weight";
  pub const SUM_WEIGHTS: &'static str = "sum_weights";
  pub const FACTOR: &'static str = "factor_constraint";

  /// Recognized keys, in documentation order.
  pub const KINDS: [&'static str; 4] = [
    Self::MIN_WEIGHT,
    Self::MAX_WEIGHT,
    Self::SUM_WEIGHTS,
    Self::FACTOR,
  ];

  pub fn kind(&self) -> &'static str {
    match self {
      Constraint::MinWeight(_) => Self::MIN_WEIGHT,
      Constraint::MaxWeight(_) => Self::MAX_WEIGHT,
      Constraint::SumWeights(_) => Self::SUM_WEIGHTS,
      Constraint::Factor(_) => Self::FACTOR,
    }
  }

  /// Parse a single `key: value` pair.
  ///
  /// Scalars are plain numbers. A factor value is `[rows, target]` for an
  /// equality or `[rows, lower, upper]` for a range, where `rows` is either a
  /// single row `[r0, r1, ...]` or a list of rows, and targets are numbers or
  /// lists of numbers (one per row).
  pub fn from_key_value(key: &str, value: &Value) -> Result<Self> {
    match key {
      Self::MIN_WEIGHT => Ok(Constraint::MinWeight(scalar(Self::MIN_WEIGHT, value)?)),
      Self::MAX_WEIGHT => Ok(Constraint::MaxWeight(scalar(Self::MAX_WEIGHT, value)?)),
      Self::SUM_WEIGHTS => Ok(Constraint::SumWeights(scalar(Self::SUM_WEIGHTS, value)?)),
      Self::FACTOR => factor(value).map(Constraint::Factor),
      other => Err(OptimizerError::UnrecognizedConstraint(other.to_string())),
    }
  }
}

/// Parse a key/value mapping into constraints, preserving key order.
///
/// Every key is checked against the vocabulary before any value is parsed, so
/// an unknown key is reported even when another entry is malformed.
pub fn parse_constraints(value: &Value) -> Result<Vec<Constraint>> {
  let map = value
    .as_object()
    .ok_or_else(|| OptimizerError::Type(json_type_name(value).to_string()))?;

  if let Some(unknown) = map
    .keys()
    .find(|k| !Constraint::KINDS.iter().any(|kind| *kind == k.as_str()))
  {
    return Err(OptimizerError::UnrecognizedConstraint(unknown.clone()));
  }

  map
    .iter()
    .map(|(key, value)| Constraint::from_key_value(key, value))
    .collect()
}

/// Parse a JSON document such as `{"sum_weights": 1.0, "min_weight": 0.0}`.
pub fn parse_constraints_str(document: &str) -> Result<Vec<Constraint>> {
  let value: Value = serde_json::from_str(document)?;
  parse_constraints(&value)
}

fn json_type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

fn scalar(field: &'static str, value: &Value) -> Result<f64> {
  value
    .as_f64()
    .ok_or_else(|| {
      OptimizerError::invalid(
        field,
        format!("expected a number, got {}", json_type_name(value)),
      )
    })
}

fn numbers(field: &'static str, value: &Value) -> Result<Vec<f64>> {
  match value {
    Value::Number(_) => Ok(vec![scalar(field, value)?]),
    Value::Array(items) => items.iter().map(|v| scalar(field, v)).collect(),
    other => Err(OptimizerError::invalid(
      field,
      format!("expected a number or a list of numbers, got {}", json_type_name(other)),
    )),
  }
}

fn row_matrix(value: &Value) -> Result<DMatrix<f64>> {
  let field = Constraint::FACTOR;
  let items = value
    .as_array()
    .ok_or_else(|| OptimizerError::invalid(field, "factor rows must be a list"))?;

  let rows: Vec<Vec<f64>> = if items.iter().all(Value::is_number) {
    vec![numbers(field, value)?]
  } else {
    items.iter().map(|row| numbers(field, row)).collect::<Result<_>>()?
  };

  let k = rows.len();
  let n = rows.first().map(|r| r.len()).unwrap_or(0);
  if k == 0 || n == 0 {
    return Err(OptimizerError::invalid(field, "factor rows must not be empty"));
  }
  if let Some(bad) = rows.iter().find(|r| r.len() != n) {
    return Err(OptimizerError::shape("factor rows", (k, n), (k, bad.len())));
  }

  let flat: Vec<f64> = rows.into_iter().flatten().collect();
  Ok(DMatrix::from_row_slice(k, n, &flat))
}

fn factor(value: &Value) -> Result<FactorConstraint> {
  let field = Constraint::FACTOR;
  let parts = value
    .as_array()
    .ok_or_else(|| {
      OptimizerError::invalid(field, "expected [rows, target] or [rows, lower, upper]")
    })?;

  match parts.as_slice() {
    [rows, target] => Ok(FactorConstraint::equality(
      row_matrix(rows)?,
      DVector::from_vec(numbers(field, target)?),
    )),
    [rows, lower, upper] => Ok(FactorConstraint::range(
      row_matrix(rows)?,
      DVector::from_vec(numbers(field, lower)?),
      DVector::from_vec(numbers(field, upper)?),
    )),
    _ => Err(OptimizerError::invalid(
      field,
      format!("expected 2 or 3 entries, got {}", parts.len()),
    )),
  }
}
