//! # Errors
//!
//! Error taxonomy shared by the problem definition and every solver back-end.
//! Errors are raised where they are detected and never retried.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OptimizerError {
  /// Objective or constraint inputs have the wrong dimensions.
  #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
  Shape {
    what: &'static str,
    expected: String,
    actual: String,
  },

  /// The covariance matrix or a reduced KKT system could not be inverted, or
  /// its computed inverse misses the identity by more than round-off allows.
  #[error("{what} is singular and cannot be inverted")]
  SingularMatrix { what: &'static str },

  #[error("constraint `{0}` not recognized")]
  UnrecognizedConstraint(String),

  /// Constraints were not supplied as a key/value mapping.
  #[error("constraints must be a key/value mapping, got {0}")]
  Type(String),

  #[error("invalid input for {field}: {reason}")]
  InvalidInput { field: &'static str, reason: String },

  /// The constraint is valid but the selected back-end cannot represent it.
  #[error("constraint `{kind}` is not supported by the {solver} solver: {reason}")]
  UnsupportedConstraint {
    kind: &'static str,
    solver: &'static str,
    reason: String,
  },

  #[error("{0} called before the problem was configured")]
  NotConfigured(&'static str),

  #[error("nonlinear solver failed: {0}")]
  Backend(String),

  #[error("malformed constraint document: {0}")]
  Json(#[from] serde_json::Error),
}

impl OptimizerError {
  pub(crate) fn shape(what: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Self {
    OptimizerError::Shape {
      what,
      expected: format!("{}x{}", expected.0, expected.1),
      actual: format!("{}x{}", actual.0, actual.1),
    }
  }

  pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    OptimizerError::InvalidInput {
      field,
      reason: reason.into(),
    }
  }
}
