//! Error types for glbtidy

use crate::stage::Stage;
use thiserror::Error;

/// Main error type for glbtidy operations
///
/// Partial-quality outcomes are not errors; stages report them as
/// [`StageWarning`](crate::StageWarning)s instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Empty or malformed mesh, or an invalid configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A post-stage consistency check failed
    #[error("Invariant violated after {stage} stage: {message}")]
    InvariantViolation { stage: Stage, message: String },

    /// An allocation failed or the mesh exceeds the configured size limits
    #[error("Resource exhausted during {stage} stage: {message}")]
    ResourceExhaustion { stage: Stage, message: String },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Processing cancelled before {0}")]
    Cancelled(String),
}

impl Error {
    pub fn invariant(stage: Stage, message: impl Into<String>) -> Self {
        Error::InvariantViolation {
            stage,
            message: message.into(),
        }
    }

    pub fn exhausted(stage: Stage, message: impl Into<String>) -> Self {
        Error::ResourceExhaustion {
            stage,
            message: message.into(),
        }
    }

    /// Stage the error is attributed to, when it has one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::InvariantViolation { stage, .. } | Error::ResourceExhaustion { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Result type alias for glbtidy operations
pub type Result<T> = std::result::Result<T, Error>;
