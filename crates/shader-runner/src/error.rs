//! Error types for the shader test interpreter
//!
//! A malformed test file is never a test outcome: every parse or invariant
//! error is surfaced as a [`RunnerError`] and stops the run of that file.

use std::fmt;

/// An error raised while parsing a single line of a test file
///
/// Parsers do not know which file or line they are working on; the
/// orchestrator attaches that context when converting to [`RunnerError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    /// Creates a new parse error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

/// Returns early from the enclosing function with a [`ParseError`]
macro_rules! parse_bail {
    ($($arg:tt)+) => {
        return Err($crate::error::ParseError::new(format!($($arg)+)))
    };
}

pub(crate) use parse_bail;

/// Fatal errors that abort the run of a test file
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The test file is malformed or violates an interpreter invariant
    #[error("{file}:{line}: {message}")]
    Parse {
        /// Name of the test file
        file: String,
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
    /// The test file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the test file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Attaches file and line context to a parse error
    pub fn at(file: &str, line: usize, error: ParseError) -> Self {
        Self::Parse {
            file: file.to_string(),
            line,
            message: error.message,
        }
    }
}
