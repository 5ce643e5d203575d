//! Enforcement error types

use pld_core::{ConfigError, StructuralError};

/// Failure to run an enforcement check at all
///
/// Rule violations are reported as data; this type only covers inputs the
/// checks cannot be applied to.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnforcementError {
    /// Event could not be decoded
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// Invalid checker or threshold configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transcript has no events
    #[error("transcript is empty")]
    EmptyTranscript,

    /// Transcript mixes events from more than one session
    #[error("transcript mixes sessions `{expected}` and `{found}`")]
    MixedSessions {
        /// Session id of the first event
        expected: String,
        /// Conflicting session id
        found: String,
    },
}

/// Result alias for enforcement operations
pub type Result<T> = std::result::Result<T, EnforcementError>;
