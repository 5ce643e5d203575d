//! Failover error types

use pld_core::ConfigError;

/// Failover failure
///
/// Exhaustion is not an error: it is reported through
/// [`crate::ReconciliationOutcome::Finalize`] and
/// [`crate::FailoverStatus::Exhausted`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailoverError {
    /// Backoff asked for attempt 0
    #[error("attempt must be >= 1, got {0}")]
    InvalidAttempt(u32),

    /// Invalid policy or registry configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for failover operations
pub type Result<T> = std::result::Result<T, FailoverError>;
