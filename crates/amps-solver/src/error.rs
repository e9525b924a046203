//! Solver error taxonomy.
//!
//! Only genuinely fatal conditions are errors: misconfiguration, unbound
//! symbols, non-finite stamp values, and singular linear systems. Convergence
//! and homotopy failures are *structured results* ([`crate::nr::SolveReport`],
//! [`crate::homotopy::HomotopyOutcome`]) so batch callers can distinguish
//! "did not converge" from "is broken".

use amps_core::AmpsError;
use thiserror::Error;

/// Fatal solver errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Invalid configuration (e.g. infeasibility analysis without
    /// optimization mode, malformed equation sets).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A symbol was requested that the equation set never declared.
    #[error("Unbound symbol '{0}'")]
    UnboundSymbol(String),

    /// A stamp evaluator produced NaN or an infinite value. This indicates a
    /// modeling bug upstream and is never silently tolerated.
    #[error("Non-finite value {value} stamped at row {row}, col {col}")]
    InvalidValue { row: usize, col: usize, value: f64 },

    /// A residual evaluator produced NaN or an infinite value.
    #[error("Non-finite residual {value} at row {row}")]
    InvalidResidual { row: usize, value: f64 },

    /// A stamp targeted a row/column outside the assembled system.
    #[error("Stamp at ({row}, {col}) outside {size}x{size} system")]
    OutOfBounds { row: usize, col: usize, size: usize },

    /// The assembled Jacobian could not be factorized.
    #[error("Singular Jacobian matrix")]
    Singular,

    /// Network structure prevents index assignment or assembly.
    #[error("Network error: {0}")]
    Network(String),
}

/// Convenience type alias for Results using SolverError.
pub type SolverResult<T> = Result<T, SolverError>;

impl From<SolverError> for AmpsError {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::Config(msg) => AmpsError::Config(msg),
            SolverError::Network(msg) => AmpsError::Network(msg),
            other => AmpsError::Solver(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SolverError::InvalidValue {
            row: 3,
            col: 7,
            value: f64::NAN,
        };
        let text = err.to_string();
        assert!(text.contains("row 3"));
        assert!(text.contains("col 7"));
    }

    #[test]
    fn test_conversion_to_amps_error() {
        let err: AmpsError = SolverError::Config("bad flag".into()).into();
        assert!(matches!(err, AmpsError::Config(_)));

        let err: AmpsError = SolverError::Singular.into();
        assert!(matches!(err, AmpsError::Solver(_)));
    }
}
