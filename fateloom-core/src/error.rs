//! Error taxonomy for engine operations.
//!
//! Operations surface exactly four caller-visible failure classes:
//! - `NotFound`: a session, node, choice, or branch does not exist
//! - `InvalidState`: the operation is not legal for the current session
//!   state (dead character, inactive session, off-path rewind target)
//! - `Generation`: the content generator was unreachable or returned
//!   unparsable structure; the mutation was aborted, the caller may retry
//! - IO/serialization errors from snapshot save/load
//!
//! Soft parse failures from the risk evaluator are deliberately *not*
//! represented here: those are swallowed at the call site and degrade to
//! an empty result, keeping the story flowing.

use crate::provider::GeneratorError;
use thiserror::Error;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("content generation failed: {0}")]
    Generation(#[from] GeneratorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("save version mismatch: expected {expected}, found {found}")]
    SaveVersion { expected: u32, found: u32 },
}

impl EngineError {
    /// Whether the caller may usefully retry the operation.
    ///
    /// Generation failures abort atomically and are retryable; rejected
    /// operations (`NotFound`, `InvalidState`) are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Generation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(EngineError::Generation(GeneratorError::Unavailable("down".into())).is_retryable());
        assert!(!EngineError::NotFound("session".into()).is_retryable());
        assert!(!EngineError::InvalidState("dead".into()).is_retryable());
    }
}
