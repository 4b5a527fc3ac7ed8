//! Error types for Quarry.

use thiserror::Error;

/// Main error type for index, storage and engine operations.
///
/// Query strings never produce a `QuarryError`: syntax and typing problems are
/// reported as [`QueryError`](crate::query::QueryError) diagnostics instead.
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Incompatible index version {actual:#x}, expected {expected:#x}")]
    VersionMismatch { expected: i32, actual: i32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Build aborted")]
    Aborted,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        QuarryError::InvalidArgument(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        QuarryError::InvalidConfig(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        QuarryError::Index(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        QuarryError::Format(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        QuarryError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        QuarryError::Internal(msg.into())
    }

    /// Whether this error comes from reading a malformed or foreign index stream.
    pub fn is_format_error(&self) -> bool {
        match self {
            QuarryError::Format(_) | QuarryError::VersionMismatch { .. } => true,
            QuarryError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuarryError::not_found("doc 42");
        assert_eq!(err.to_string(), "Not found: doc 42");

        let err = QuarryError::VersionMismatch {
            expected: 0x10,
            actual: 0x20,
        };
        assert_eq!(
            err.to_string(),
            "Incompatible index version 0x20, expected 0x10"
        );
    }

    #[test]
    fn test_format_errors() {
        assert!(QuarryError::format("truncated").is_format_error());
        assert!(
            QuarryError::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
                .is_format_error()
        );
        assert!(!QuarryError::Aborted.is_format_error());
    }
}
