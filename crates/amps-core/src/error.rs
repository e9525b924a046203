//! Unified error types for the AMPS ecosystem
//!
//! [`AmpsError`] is the common error representation at API boundaries;
//! domain-specific errors (e.g. the solver's) convert into it for uniform
//! handling by callers.

use thiserror::Error;

/// Unified error type for AMPS operations.
#[derive(Error, Debug)]
pub enum AmpsError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using AmpsError.
pub type AmpsResult<T> = Result<T, AmpsError>;

impl From<anyhow::Error> for AmpsError {
    fn from(err: anyhow::Error) -> Self {
        AmpsError::Other(err.to_string())
    }
}

impl From<String> for AmpsError {
    fn from(s: String) -> Self {
        AmpsError::Other(s)
    }
}

impl From<&str> for AmpsError {
    fn from(s: &str) -> Self {
        AmpsError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AmpsError::Solver("did not converge".into());
        assert!(err.to_string().contains("Solver error"));
        assert!(err.to_string().contains("did not converge"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let amps_err: AmpsError = io_err.into();
        assert!(matches!(amps_err, AmpsError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> AmpsResult<()> {
            Err(AmpsError::Validation("test".into()))
        }
        fn outer() -> AmpsResult<()> {
            inner()?;
            Ok(())
        }
        assert!(outer().is_err());
    }
}
