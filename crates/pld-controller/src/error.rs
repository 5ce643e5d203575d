//! Controller error types

use pld_core::{ConfigError, EventType, Phase, StructuralError};
use pld_enforcement::{EnforcementError, Violation};

use crate::bridge::SignalKind;

/// Controller failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControllerError {
    /// Phase transition not in the allowed table
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition {
        /// Current phase
        from: Phase,
        /// Requested phase
        to: Phase,
    },

    /// Event could not be decoded
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// Invalid runtime configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Enforcement check could not run
    #[error(transparent)]
    Enforcement(#[from] EnforcementError),
}

/// Result alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

/// A runtime signal could not be turned into a valid event
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// No mapping registered for the signal kind
    #[error("no mapping for signal `{0}`")]
    Unmapped(SignalKind),

    /// Mapping phase contradicts a MUST event type outside normalize mode
    #[error("event_type {event_type} requires phase {required}, mapping gives {got}")]
    MustViolation {
        /// Mapped event type
        event_type: EventType,
        /// Phase the event type requires
        required: Phase,
        /// Phase the mapping resolved to
        got: Phase,
    },

    /// Code prefix and resolved phase disagree
    #[error("{0}")]
    PrefixMismatch(Violation),

    /// Built event failed validation
    #[error("event rejected with {} violation(s)", .0.len())]
    Rejected(Vec<Violation>),
}
