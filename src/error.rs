use std::path::PathBuf;
use thiserror::Error;

/// Every failure the engine can report to a caller.
///
/// Store corruption, lookup misses and malformed capability output are
/// normally absorbed where they happen; they still have variants so the
/// strict entry points can say what went wrong.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("fact store at {path} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("could not persist fact store to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("fact '{0}' not found")]
    NotFound(String),

    #[error("malformed reconciliation decision: {0}")]
    MalformedDecision(String),

    #[error("malformed task state: {0}")]
    MalformedTaskState(String),

    #[error("{capability} could not complete this step: {reason}")]
    CapabilityUnavailable {
        capability: &'static str,
        reason: String,
    },

    #[error("conversation exceeded {limit} turns")]
    MaxTurnsExceeded { limit: u32 },

    #[error("conversation cancelled")]
    Cancelled,

    #[error("fact store invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn capability(capability: &'static str, reason: impl ToString) -> Self {
        EngineError::CapabilityUnavailable {
            capability,
            reason: reason.to_string(),
        }
    }

    /// Failures worth retrying with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Persistence { .. } | EngineError::CapabilityUnavailable { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
