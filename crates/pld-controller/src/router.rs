//! Next-action hints for orchestration layers

use pld_core::{Event, EventType, Phase};
use pld_enforcement::{ValidationEngine, ValidationMode, ValidationReport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the embedding runtime should do with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// MUST violation, drop the event
    RejectEvent,
    /// Hand to drift handling
    RouteToDriftHandler,
    /// Hand to repair handling
    RouteToRepairHandler,
    /// Hand to reentry handling
    RouteToReentryHandler,
    /// Hand to continuation handling
    RouteToContinueHandler,
    /// Start or continue failover orchestration
    RouteToFailoverHandler,
    /// Hand to outcome evaluation
    RouteToEvaluationHandler,
    /// Close a session that reached its outcome
    CloseSession,
    /// Close a session from a phase-less closure event
    CloseSessionNonSemantic,
    /// Close a session from an unexpected phase
    CloseSessionWithWarning,
    /// Observability only
    RouteToObservabilitySink,
}

impl NextAction {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RejectEvent => "reject_event",
            Self::RouteToDriftHandler => "route_to_drift_handler",
            Self::RouteToRepairHandler => "route_to_repair_handler",
            Self::RouteToReentryHandler => "route_to_reentry_handler",
            Self::RouteToContinueHandler => "route_to_continue_handler",
            Self::RouteToFailoverHandler => "route_to_failover_handler",
            Self::RouteToEvaluationHandler => "route_to_evaluation_handler",
            Self::CloseSession => "close_session",
            Self::CloseSessionNonSemantic => "close_session_non_semantic",
            Self::CloseSessionWithWarning => "close_session_with_warning",
            Self::RouteToObservabilitySink => "route_to_observability_sink",
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing verdict
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    /// Hint for the caller
    pub next_action: NextAction,
    /// Human readable reason
    pub reason: String,
    /// Validation behind the decision
    pub report: ValidationReport,
}

/// Event → [`NextAction`]
///
/// Never modifies the event; a normalized candidate, if any, is only carried
/// in the report.
#[derive(Debug, Clone, Default)]
pub struct ActionRouter {
    engine: ValidationEngine,
    mode: ValidationMode,
}

impl ActionRouter {
    /// Router validating in `mode`
    #[must_use]
    pub fn new(engine: ValidationEngine, mode: ValidationMode) -> Self {
        Self { engine, mode }
    }

    /// Route one event
    #[must_use]
    pub fn route(&self, event: &Event) -> RouteDecision {
        let report = self.engine.validate(event, self.mode);
        if !report.is_valid {
            let rules: Vec<&str> = report.must_violations().map(|v| v.rule_id.as_str()).collect();
            return RouteDecision {
                next_action: NextAction::RejectEvent,
                reason: format!("rejected by {}", rules.join(", ")),
                report,
            };
        }

        // Route on the accepted phase so a normalized event goes where it belongs.
        let phase = report.accepted(event).map_or(event.phase(), Event::phase);
        let (next_action, reason) = route_for(event.event_type, phase);
        RouteDecision {
            next_action,
            reason,
            report,
        }
    }
}

pub(crate) fn route_for(event_type: EventType, phase: Phase) -> (NextAction, String) {
    use EventType as T;
    let action = match event_type {
        T::DriftDetected | T::DriftEscalated => NextAction::RouteToDriftHandler,
        T::RepairTriggered | T::RepairEscalated => NextAction::RouteToRepairHandler,
        T::ReentryObserved => NextAction::RouteToReentryHandler,
        T::ContinueAllowed | T::ContinueBlocked => NextAction::RouteToContinueHandler,
        T::FailoverTriggered => NextAction::RouteToFailoverHandler,
        T::EvaluationPass | T::EvaluationFail => NextAction::RouteToEvaluationHandler,
        T::SessionClosed => match phase {
            Phase::Outcome => NextAction::CloseSession,
            Phase::None => NextAction::CloseSessionNonSemantic,
            _ => NextAction::CloseSessionWithWarning,
        },
        T::Info | T::LatencySpike | T::PauseDetected | T::Handoff | T::FallbackExecuted => {
            NextAction::RouteToObservabilitySink
        }
    };
    (action, format!("{event_type} in phase {phase}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(mode: ValidationMode, event_type: EventType, phase: Phase, code: &str) -> RouteDecision {
        let event = Event::builder("s1", 3, event_type, phase, code).build();
        ActionRouter::new(ValidationEngine::default(), mode).route(&event)
    }

    #[test]
    fn test_lifecycle_routes() {
        let cases = [
            (EventType::DriftEscalated, Phase::Drift, "D1_instruction", NextAction::RouteToDriftHandler),
            (EventType::RepairTriggered, Phase::Repair, "R1_clarify", NextAction::RouteToRepairHandler),
            (EventType::ReentryObserved, Phase::Reentry, "RE1_resume", NextAction::RouteToReentryHandler),
            (EventType::ContinueBlocked, Phase::Continue, "C1_blocked", NextAction::RouteToContinueHandler),
            (EventType::FailoverTriggered, Phase::Failover, "F1_fallback", NextAction::RouteToFailoverHandler),
            (EventType::EvaluationFail, Phase::Outcome, "O2_goal_missed", NextAction::RouteToEvaluationHandler),
            (EventType::Handoff, Phase::None, "INFO_handoff", NextAction::RouteToObservabilitySink),
        ];
        for (event_type, phase, code, expected) in cases {
            assert_eq!(route(ValidationMode::Strict, event_type, phase, code).next_action, expected);
        }
    }

    #[test]
    fn test_must_violation_rejects() {
        let decision = route(ValidationMode::Strict, EventType::DriftDetected, Phase::Repair, "R1_clarify");
        assert_eq!(decision.next_action, NextAction::RejectEvent);
        assert!(decision.reason.contains("EVT-001"));
    }

    #[test]
    fn test_normalized_event_routes() {
        let decision = route(ValidationMode::Normalize, EventType::ReentryObserved, Phase::Continue, "RE1_resume");
        assert_eq!(decision.next_action, NextAction::RouteToReentryHandler);
        assert!(decision.report.normalized.is_some());
    }

    #[test]
    fn test_session_closed_variants() {
        let outcome = route(ValidationMode::Warn, EventType::SessionClosed, Phase::Outcome, "O0_session_closed");
        assert_eq!(outcome.next_action, NextAction::CloseSession);

        let none = route(ValidationMode::Warn, EventType::SessionClosed, Phase::None, "INFO_closed");
        assert_eq!(none.next_action, NextAction::CloseSessionNonSemantic);
        assert!(none.report.has_should_violations);

        let odd = route(ValidationMode::Warn, EventType::SessionClosed, Phase::Continue, "C0_normal");
        assert_eq!(odd.next_action, NextAction::CloseSessionWithWarning);
    }
}
