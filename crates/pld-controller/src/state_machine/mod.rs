//! Session lifecycle state machine
//!
//! [`allowed_transitions`] is the phase table every lifecycle event is gated
//! by; [`SessionStateMachine`] applies events to one session's state.

mod session;

pub use session::{rules, SessionState, SessionStateMachine, StateTransition, TransitionReason};

use crate::error::ControllerError;
use pld_core::Phase;

/// Validates a phase transition.
///
/// `outcome` is terminal: nothing leaves it, not even `outcome` itself.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), ControllerError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(ControllerError::IllegalTransition { from, to })
    }
}

/// Legal next phases from `from`
#[must_use]
pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::*;
    match from {
        None => vec![Continue, Drift, Repair, Failover, Reentry, Outcome],
        Continue => vec![Continue, Drift, Repair, Failover, Outcome],
        Drift => vec![Repair, Failover, Continue],
        Repair => vec![Reentry, Continue, Failover],
        Reentry => vec![Continue, Outcome],
        Failover => vec![Reentry, Continue, Outcome],
        Outcome => vec![],
    }
}

fn allowed(from: Phase, to: Phase) -> bool {
    allowed_transitions(from).into_iter().any(|p| p == to)
}
