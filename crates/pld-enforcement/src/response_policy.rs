//! Advisory response policy
//!
//! Maps an event to what the runtime should do with its next response:
//! keep going, block, mandate a repair or a failover, or only observe.
//! Decisions are advice; they never change event semantics or session state.

use crate::validation::ValidationMode;
use pld_core::{Event, EventType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Schema versions the policy knows how to read
pub const SUPPORTED_SCHEMA_VERSIONS: [&str; 2] = ["2.0", "2.1"];

/// Policy verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecisionType {
    /// Respond normally
    Continue,
    /// Hold the response
    Block,
    /// A repair must happen before continuing
    PolicyRepairMandated,
    /// A failover recovery path must be followed
    PolicyFailoverMandated,
    /// Record only, no effect on the response
    ObserveOnly,
    /// Nothing to do
    Noop,
}

impl PolicyDecisionType {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Block => "block",
            Self::PolicyRepairMandated => "policy_repair_mandated",
            Self::PolicyFailoverMandated => "policy_failover_mandated",
            Self::ObserveOnly => "observe_only",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for PolicyDecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision with its explanation
///
/// `suggested_next_event_type` is the most likely follow-up, not a
/// requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePolicyDecision {
    /// Verdict
    pub decision: PolicyDecisionType,
    /// Why
    pub reason: String,
    /// Default follow-up event, if any
    pub suggested_next_event_type: Option<EventType>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl ResponsePolicyDecision {
    fn new(decision: PolicyDecisionType, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            suggested_next_event_type: None,
            notes: None,
        }
    }

    fn suggest(mut self, next: EventType) -> Self {
        self.suggested_next_event_type = Some(next);
        self
    }

    fn note(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Decide the response policy for a decoded event
#[must_use]
pub fn evaluate_response_policy(event: &Event, mode: ValidationMode) -> ResponsePolicyDecision {
    if let Some(blocked) = check_schema_version(&event.schema_version) {
        return blocked;
    }
    policy_for(event.event_type, mode)
}

/// Decide the response policy for an undecoded event
///
/// Unknown event types block in strict mode and are only observed otherwise.
#[must_use]
pub fn evaluate_response_policy_value(value: &Value, mode: ValidationMode) -> ResponsePolicyDecision {
    let schema_version = value["schema_version"].as_str().unwrap_or_default();
    if let Some(blocked) = check_schema_version(schema_version) {
        return blocked;
    }

    let raw_type = value["event_type"].as_str().unwrap_or_default();
    match EventType::from_str(raw_type) {
        Ok(event_type) => policy_for(event_type, mode),
        Err(_) if mode == ValidationMode::Strict => ResponsePolicyDecision::new(
            PolicyDecisionType::Block,
            format!("unknown event_type `{raw_type}` in strict mode"),
        ),
        Err(_) => ResponsePolicyDecision::new(
            PolicyDecisionType::ObserveOnly,
            format!("unknown event_type `{raw_type}` in {mode} mode"),
        ),
    }
}

fn check_schema_version(version: &str) -> Option<ResponsePolicyDecision> {
    (!SUPPORTED_SCHEMA_VERSIONS.contains(&version)).then(|| {
        ResponsePolicyDecision::new(
            PolicyDecisionType::Block,
            format!("unsupported schema_version `{version}`"),
        )
    })
}

fn policy_for(event_type: EventType, mode: ValidationMode) -> ResponsePolicyDecision {
    use EventType as T;
    use PolicyDecisionType as D;

    match event_type {
        T::DriftDetected | T::DriftEscalated => {
            ResponsePolicyDecision::new(D::PolicyRepairMandated, format!("{event_type} requires repair"))
                .suggest(T::RepairTriggered)
        }
        T::RepairTriggered | T::RepairEscalated => ResponsePolicyDecision::new(
            D::Block,
            format!("{event_type}: hold responses until repair resolves"),
        ),
        T::ReentryObserved => ResponsePolicyDecision::new(D::Continue, "reentered stable state")
            .suggest(T::ContinueAllowed),
        T::ContinueAllowed => ResponsePolicyDecision::new(D::Continue, "continuation permitted"),
        T::ContinueBlocked => ResponsePolicyDecision::new(D::Block, "continuation blocked"),
        T::FailoverTriggered => {
            ResponsePolicyDecision::new(D::PolicyFailoverMandated, "failover triggered, recovery required")
                .suggest(T::ReentryObserved)
                .note("allowed next events: reentry_observed, continue_allowed, session_closed")
        }
        T::EvaluationPass => ResponsePolicyDecision::new(D::Continue, "evaluation passed"),
        T::EvaluationFail if mode == ValidationMode::Strict => {
            ResponsePolicyDecision::new(D::Block, "evaluation failed in strict mode")
        }
        T::EvaluationFail => {
            ResponsePolicyDecision::new(D::PolicyRepairMandated, "evaluation failed, repair advised")
        }
        T::SessionClosed => ResponsePolicyDecision::new(D::Block, "session closed"),
        T::LatencySpike | T::PauseDetected | T::Handoff | T::FallbackExecuted => {
            ResponsePolicyDecision::new(D::ObserveOnly, format!("{event_type} is observability"))
        }
        T::Info => ResponsePolicyDecision::new(D::ObserveOnly, "informational event"),
    }
}
