//! Query diagnostics.

use std::fmt;

/// One problem found while parsing or compiling a query string.
///
/// Positions and lengths are in characters, not bytes, so they can be used
/// directly to underline the offending text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub position: usize,
    pub length: usize,
    pub message: String,
}

impl QueryError {
    pub fn new(position: usize, length: usize, message: impl Into<String>) -> Self {
        QueryError {
            position,
            length,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (at {}..{})",
            self.message,
            self.position,
            self.position + self.length
        )
    }
}

impl std::error::Error for QueryError {}
