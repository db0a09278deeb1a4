//! Error types for dotrender-core.

use std::time::Duration;

use thiserror::Error;

/// Result type for dotrender-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum Error {
    /// No engine bound, invalid option combination, or other caller mistake.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required interpreter, library or native artifact is absent.
    #[error("missing dependency {artifact}: {message}")]
    MissingDependency {
        /// Name of the absent artifact (file path, symbol, executable).
        artifact: String,
        message: String,
    },

    /// Script evaluation failed, the layout process exited nonzero, or the
    /// executable could not be found.
    #[error("execution failed: {message}{}", context.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Execution {
        /// Original diagnostic text (interpreter message or captured stderr).
        message: String,
        /// Command line or script context, when known.
        context: Option<String>,
    },

    /// A bridge wait or subprocess exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// All pool entries were busy and the pool is configured to fail fast.
    #[error("engine pool exhausted")]
    PoolExhausted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an execution failure without command context.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            message: message.into(),
            context: None,
        }
    }

    /// Whether a fallback engine may be tried after this failure.
    ///
    /// Only engine-specific failures qualify: execution, timeout, and
    /// missing dependency. Configuration errors are caller mistakes and
    /// abort immediately, as do IO errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Execution { .. } | Error::Timeout(_) | Error::MissingDependency { .. }
        )
    }
}
