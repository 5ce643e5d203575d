//! Wire event types and their event-type to phase constraints

use crate::error::ParseError;
use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle event type (closed set of wire values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Drift observed
    DriftDetected,
    /// Drift persisted or worsened
    DriftEscalated,
    /// Repair started
    RepairTriggered,
    /// Repair escalated (e.g. hard reset)
    RepairEscalated,
    /// Agent back on track after repair or failover
    ReentryObserved,
    /// Turn may continue
    ContinueAllowed,
    /// Turn continuation blocked
    ContinueBlocked,
    /// Failover declared
    FailoverTriggered,
    /// Latency anomaly (observability)
    LatencySpike,
    /// Pause in the conversation (observability)
    PauseDetected,
    /// Fallback path executed
    FallbackExecuted,
    /// Conversation handed off (observability)
    Handoff,
    /// Outcome evaluation passed
    EvaluationPass,
    /// Outcome evaluation failed
    EvaluationFail,
    /// Session closed (terminal)
    SessionClosed,
    /// Informational event
    Info,
}

/// Strength of the event-type to phase mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseConstraint {
    /// Phase must equal the mapped phase
    Must(Phase),
    /// Phase should equal the mapped phase (advisory)
    Should(Phase),
    /// Any phase is accepted
    May,
}

impl PhaseConstraint {
    /// Mapped phase, if the constraint names one
    #[inline]
    #[must_use]
    pub const fn expected(self) -> Option<Phase> {
        match self {
            PhaseConstraint::Must(p) | PhaseConstraint::Should(p) => Some(p),
            PhaseConstraint::May => None,
        }
    }

    /// Required phase for MUST constraints
    #[inline]
    #[must_use]
    pub const fn required(self) -> Option<Phase> {
        match self {
            PhaseConstraint::Must(p) => Some(p),
            _ => None,
        }
    }
}

impl EventType {
    /// Every event type
    pub const ALL: [EventType; 16] = [
        EventType::DriftDetected,
        EventType::DriftEscalated,
        EventType::RepairTriggered,
        EventType::RepairEscalated,
        EventType::ReentryObserved,
        EventType::ContinueAllowed,
        EventType::ContinueBlocked,
        EventType::FailoverTriggered,
        EventType::LatencySpike,
        EventType::PauseDetected,
        EventType::FallbackExecuted,
        EventType::Handoff,
        EventType::EvaluationPass,
        EventType::EvaluationFail,
        EventType::SessionClosed,
        EventType::Info,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::DriftDetected => "drift_detected",
            EventType::DriftEscalated => "drift_escalated",
            EventType::RepairTriggered => "repair_triggered",
            EventType::RepairEscalated => "repair_escalated",
            EventType::ReentryObserved => "reentry_observed",
            EventType::ContinueAllowed => "continue_allowed",
            EventType::ContinueBlocked => "continue_blocked",
            EventType::FailoverTriggered => "failover_triggered",
            EventType::LatencySpike => "latency_spike",
            EventType::PauseDetected => "pause_detected",
            EventType::FallbackExecuted => "fallback_executed",
            EventType::Handoff => "handoff",
            EventType::EvaluationPass => "evaluation_pass",
            EventType::EvaluationFail => "evaluation_fail",
            EventType::SessionClosed => "session_closed",
            EventType::Info => "info",
        }
    }

    /// Event-type to phase constraint
    ///
    /// - MUST: drift, repair, reentry, continue and failover event types
    /// - SHOULD: evaluations and `session_closed` (outcome), `info` (none)
    /// - MAY: latency, pause, fallback and handoff signals
    #[must_use]
    pub const fn phase_constraint(self) -> PhaseConstraint {
        use EventType::*;
        match self {
            DriftDetected | DriftEscalated => PhaseConstraint::Must(Phase::Drift),
            RepairTriggered | RepairEscalated => PhaseConstraint::Must(Phase::Repair),
            ReentryObserved => PhaseConstraint::Must(Phase::Reentry),
            ContinueAllowed | ContinueBlocked => PhaseConstraint::Must(Phase::Continue),
            FailoverTriggered => PhaseConstraint::Must(Phase::Failover),
            EvaluationPass | EvaluationFail | SessionClosed => {
                PhaseConstraint::Should(Phase::Outcome)
            }
            Info => PhaseConstraint::Should(Phase::None),
            LatencySpike | PauseDetected | FallbackExecuted | Handoff => PhaseConstraint::May,
        }
    }

    /// Drift event types
    #[inline]
    #[must_use]
    pub const fn is_drift(self) -> bool {
        matches!(self, EventType::DriftDetected | EventType::DriftEscalated)
    }

    /// Event types that accept any phase
    #[inline]
    #[must_use]
    pub const fn is_may(self) -> bool {
        matches!(self.phase_constraint(), PhaseConstraint::May)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseError::UnknownEventType(s.to_string()))
    }
}
