use super::validate_transition;
use pld_core::{Event, EventType, Phase, SessionId, TaxonomyCode};
use pld_enforcement::{check_event_type_phase, Violation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule identifiers reported by the state machine
pub mod rules {
    /// Phase transition not in the allowed table
    pub const INVALID_TRANSITION: &str = "SM-001";
    /// First event of a session is not a legal opener
    pub const INVALID_SESSION_START: &str = "SM-002";
    /// Drift observed while failover is active
    pub const DRIFT_AFTER_FAILOVER: &str = "SM-003";
}

/// Mutable lifecycle state of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session identifier
    pub session_id: SessionId,
    /// Current phase
    pub phase: Phase,
    /// Opened by a legal first event and not yet closed
    pub is_open: bool,
    /// Inside a failover episode
    pub failover_active: bool,
    /// Type of the last applied event
    pub last_event_type: Option<EventType>,
    /// Code of the last applied event
    pub last_code: Option<TaxonomyCode>,
    /// Turn of the last applied event
    pub last_turn: Option<u64>,
}

impl SessionState {
    /// Fresh state: phase none, closed, no failover
    #[must_use]
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: Phase::None,
            is_open: false,
            failover_active: false,
            last_event_type: None,
            last_code: None,
            last_turn: None,
        }
    }
}

/// Why a step moved (or did not move) the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Legal table transition
    Transition,
    /// Opened by `continue_allowed`
    SessionInitialized,
    /// Opened by the system-init info event
    SessionInitializedViaSystem,
    /// Illegal first event, session stays closed
    InvalidSessionStart,
    /// Closed by `session_closed`
    SessionTerminated,
    /// Entered failover
    FailoverActive,
    /// Left failover through reentry
    FailoverRecoveredViaReentry,
    /// Left failover through continue
    FailoverRecoveredViaContinue,
    /// Drift while failover is active
    InvalidFailoverState,
    /// Legal move that does not end failover
    FailoverNonterminalTransition,
    /// Non-advancing event during failover
    FailoverContext,
    /// Illegal table transition, phase unchanged
    InvalidTransition,
}

impl TransitionReason {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::SessionInitialized => "session_initialized",
            Self::SessionInitializedViaSystem => "session_initialized_via_system",
            Self::InvalidSessionStart => "invalid_session_start",
            Self::SessionTerminated => "session_terminated",
            Self::FailoverActive => "failover_active",
            Self::FailoverRecoveredViaReentry => "failover_recovered_via_reentry",
            Self::FailoverRecoveredViaContinue => "failover_recovered_via_continue",
            Self::InvalidFailoverState => "invalid_failover_state",
            Self::FailoverNonterminalTransition => "failover_nonterminal_transition",
            Self::FailoverContext => "failover_context",
            Self::InvalidTransition => "invalid_transition",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`SessionStateMachine::apply`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    /// State before the event
    pub previous: SessionState,
    /// State after the event
    pub next: SessionState,
    /// Rule that decided the step
    pub reason: TransitionReason,
    /// Transition and event-type violations
    pub violations: Vec<Violation>,
}

impl StateTransition {
    /// Whether the phase changed
    #[must_use]
    pub fn phase_changed(&self) -> bool {
        self.previous.phase != self.next.phase
    }
}

/// State machine for one session
///
/// Not synchronized: callers keep a single writer per session (see
/// [`SessionRegistry`](crate::SessionRegistry)).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    /// Machine for a session that has seen no events
    #[must_use]
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            state: SessionState::new(session_id),
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Apply one event
    ///
    /// Rules in precedence order: terminal close, session init, failover
    /// entry, failover-active handling, then the transition table. An
    /// illegal first event is recorded and leaves the session closed, but
    /// still falls through to the later rules. Event-type to phase
    /// consistency is checked on every call and folded into the violations.
    pub fn apply(&mut self, event: &Event) -> StateTransition {
        let previous = self.state.clone();
        let mut next = previous.clone();
        let mut violations: Vec<Violation> =
            check_event_type_phase(event.event_type, event.phase()).into_iter().collect();

        let from = previous.phase;
        let to = event.phase();
        let legal = validate_transition(from, to).is_ok();

        let reason = if event.event_type == EventType::SessionClosed {
            next.is_open = false;
            next.failover_active = false;
            if legal {
                next.phase = to;
            } else {
                violations.push(invalid_transition(from, to));
            }
            TransitionReason::SessionTerminated
        } else if !previous.is_open && event.turn_sequence == 1 {
            match event.event_type {
                EventType::ContinueAllowed => {
                    next.is_open = true;
                    next.phase = Phase::Continue;
                    TransitionReason::SessionInitialized
                }
                EventType::Info if event.code().is_system_init() => {
                    next.is_open = true;
                    TransitionReason::SessionInitializedViaSystem
                }
                other => {
                    violations.push(Violation::must(
                        rules::INVALID_SESSION_START,
                        "event_type",
                        format!(
                            "session must start with continue_allowed or info/{}, got {other}",
                            pld_core::SYSTEM_INIT_CODE
                        ),
                    ));
                    match advance(&mut next, event.event_type, from, to, legal, &mut violations) {
                        TransitionReason::Transition | TransitionReason::InvalidTransition => {
                            TransitionReason::InvalidSessionStart
                        }
                        reason => reason,
                    }
                }
            }
        } else {
            advance(&mut next, event.event_type, from, to, legal, &mut violations)
        };

        next.last_event_type = Some(event.event_type);
        next.last_code = Some(event.code().clone());
        next.last_turn = Some(event.turn_sequence);
        self.state = next.clone();

        if violations.is_empty() {
            tracing::debug!(
                session_id = %event.session_id,
                turn = event.turn_sequence,
                from = %from,
                to = %next.phase,
                reason = %reason,
                "session step"
            );
        } else {
            tracing::warn!(
                session_id = %event.session_id,
                turn = event.turn_sequence,
                event_type = %event.event_type,
                reason = %reason,
                rules = ?violations.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
                "session step violated lifecycle rules"
            );
        }

        StateTransition {
            previous,
            next,
            reason,
            violations,
        }
    }
}

/// Failover entry, failover-active handling and the transition table
fn advance(
    next: &mut SessionState,
    event_type: EventType,
    from: Phase,
    to: Phase,
    legal: bool,
    violations: &mut Vec<Violation>,
) -> TransitionReason {
    // Entry is not gated by the table.
    if event_type == EventType::FailoverTriggered && to == Phase::Failover {
        next.failover_active = true;
        next.phase = Phase::Failover;
        return TransitionReason::FailoverActive;
    }

    if !legal {
        violations.push(invalid_transition(from, to));
    }

    if !next.failover_active {
        return if legal {
            next.phase = to;
            TransitionReason::Transition
        } else {
            TransitionReason::InvalidTransition
        };
    }

    match (event_type, to) {
        (EventType::ReentryObserved, Phase::Reentry) => {
            next.failover_active = false;
            next.phase = Phase::Reentry;
            TransitionReason::FailoverRecoveredViaReentry
        }
        (EventType::ContinueAllowed, Phase::Continue) => {
            next.failover_active = false;
            next.phase = Phase::Continue;
            TransitionReason::FailoverRecoveredViaContinue
        }
        (event_type, Phase::Drift) if event_type.is_drift() => {
            violations.push(Violation::must(
                rules::DRIFT_AFTER_FAILOVER,
                "event_type",
                format!("{event_type} observed while failover is active"),
            ));
            TransitionReason::InvalidFailoverState
        }
        _ if legal => {
            next.phase = to;
            TransitionReason::FailoverNonterminalTransition
        }
        _ => TransitionReason::FailoverContext,
    }
}

fn invalid_transition(from: Phase, to: Phase) -> Violation {
    Violation::must(
        rules::INVALID_TRANSITION,
        "pld.phase",
        format!("transition {from} -> {to} is not allowed"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(turn: u64, event_type: EventType, phase: Phase, code: &str) -> Event {
        Event::builder("s1", turn, event_type, phase, code).build()
    }

    fn opened() -> SessionStateMachine {
        let mut machine = SessionStateMachine::new("s1");
        machine.apply(&event(1, EventType::ContinueAllowed, Phase::Continue, "C0_normal"));
        machine
    }

    #[test]
    fn test_continue_opens_session() {
        let mut machine = SessionStateMachine::new("s1");
        let step = machine.apply(&event(1, EventType::ContinueAllowed, Phase::Continue, "C0_normal"));
        assert_eq!(step.reason, TransitionReason::SessionInitialized);
        assert!(step.violations.is_empty());
        assert!(machine.state().is_open);
        assert_eq!(machine.state().phase, Phase::Continue);
        assert_eq!(machine.state().last_turn, Some(1));
    }

    #[test]
    fn test_system_init_opens_without_phase() {
        let mut machine = SessionStateMachine::new("s1");
        let step = machine.apply(&event(1, EventType::Info, Phase::None, "SYS_session_init"));
        assert_eq!(step.reason, TransitionReason::SessionInitializedViaSystem);
        assert!(machine.state().is_open);
        assert_eq!(machine.state().phase, Phase::None);
    }

    #[test]
    fn test_invalid_first_event_keeps_session_closed() {
        let mut machine = SessionStateMachine::new("s1");
        let step = machine.apply(&event(1, EventType::DriftDetected, Phase::Drift, "D1_instruction"));
        assert_eq!(step.reason, TransitionReason::InvalidSessionStart);
        assert_eq!(step.violations.len(), 1);
        assert_eq!(step.violations[0].rule_id, rules::INVALID_SESSION_START);
        assert!(!machine.state().is_open);
        // none -> drift is legal, so the phase still moves
        assert_eq!(machine.state().phase, Phase::Drift);
    }

    #[test]
    fn test_failover_as_first_event_enters_failover_closed() {
        let mut machine = SessionStateMachine::new("s1");
        let step = machine.apply(&event(1, EventType::FailoverTriggered, Phase::Failover, "F1_fallback"));
        assert_eq!(step.reason, TransitionReason::FailoverActive);
        assert_eq!(
            step.violations.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
            vec![rules::INVALID_SESSION_START]
        );
        assert!(!machine.state().is_open);
        assert!(machine.state().failover_active);
        assert_eq!(machine.state().phase, Phase::Failover);
    }

    #[test]
    fn test_illegal_first_event_records_both_rules() {
        let mut machine = SessionStateMachine::new("s1");
        let step = machine.apply(&event(1, EventType::Info, Phase::None, "INFO_generic"));
        assert_eq!(step.reason, TransitionReason::InvalidSessionStart);
        assert_eq!(
            step.violations.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
            vec![rules::INVALID_SESSION_START, rules::INVALID_TRANSITION]
        );
        assert_eq!(machine.state().phase, Phase::None);
    }

    #[test]
    fn test_illegal_transition_keeps_phase() {
        let mut machine = opened();
        machine.apply(&event(2, EventType::DriftDetected, Phase::Drift, "D1_instruction"));
        let step = machine.apply(&event(3, EventType::EvaluationPass, Phase::Outcome, "O1_goal_met"));
        assert_eq!(step.reason, TransitionReason::InvalidTransition);
        assert_eq!(machine.state().phase, Phase::Drift);
        assert_eq!(step.violations[0].rule_id, rules::INVALID_TRANSITION);
    }

    #[test]
    fn test_session_closed_always_closes() {
        let mut machine = opened();
        machine.apply(&event(2, EventType::DriftDetected, Phase::Drift, "D1_instruction"));
        let step = machine.apply(&event(3, EventType::SessionClosed, Phase::Outcome, "O0_session_closed"));
        assert_eq!(step.reason, TransitionReason::SessionTerminated);
        assert!(!machine.state().is_open);
        // drift -> outcome is illegal, so the phase is not adopted
        assert_eq!(machine.state().phase, Phase::Drift);
        assert_eq!(step.violations[0].rule_id, rules::INVALID_TRANSITION);
    }

    #[test]
    fn test_may_event_with_lifecycle_phase_moves_phase() {
        let mut machine = opened();
        let step = machine.apply(&event(2, EventType::FallbackExecuted, Phase::Failover, "F2_tool_fallback"));
        assert_eq!(step.reason, TransitionReason::Transition);
        assert!(step.violations.is_empty());
        assert_eq!(machine.state().phase, Phase::Failover);
        // only failover_triggered opens a failover episode
        assert!(!machine.state().failover_active);
    }

    #[test]
    fn test_info_after_continue_is_invalid_transition() {
        let mut machine = opened();
        let step = machine.apply(&event(2, EventType::Info, Phase::None, "INFO_generic"));
        assert_eq!(step.reason, TransitionReason::InvalidTransition);
        assert_eq!(step.violations[0].rule_id, rules::INVALID_TRANSITION);
        assert_eq!(machine.state().phase, Phase::Continue);
    }

    #[test]
    fn test_event_type_mismatch_folded_in() {
        let mut machine = opened();
        let step = machine.apply(&event(2, EventType::DriftDetected, Phase::Repair, "R1_clarify"));
        assert_eq!(step.reason, TransitionReason::Transition);
        assert_eq!(machine.state().phase, Phase::Repair);
        assert_eq!(step.violations.len(), 1);
        assert_eq!(step.violations[0].rule_id, "EVT-001");
    }

    #[test]
    fn test_failover_recovery_via_reentry() {
        let mut machine = opened();
        let step = machine.apply(&event(2, EventType::FailoverTriggered, Phase::Failover, "F1_fallback"));
        assert_eq!(step.reason, TransitionReason::FailoverActive);
        assert!(machine.state().failover_active);

        let step = machine.apply(&event(3, EventType::ReentryObserved, Phase::Reentry, "RE1_resume"));
        assert_eq!(step.reason, TransitionReason::FailoverRecoveredViaReentry);
        assert!(!machine.state().failover_active);
        assert_eq!(machine.state().phase, Phase::Reentry);
    }

    #[test]
    fn test_drift_after_failover() {
        let mut machine = opened();
        machine.apply(&event(2, EventType::FailoverTriggered, Phase::Failover, "F1_fallback"));
        let step = machine.apply(&event(3, EventType::DriftDetected, Phase::Drift, "D1_instruction"));
        assert_eq!(step.reason, TransitionReason::InvalidFailoverState);
        assert_eq!(
            step.violations.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
            vec![rules::INVALID_TRANSITION, rules::DRIFT_AFTER_FAILOVER]
        );
        assert_eq!(machine.state().phase, Phase::Failover);
        assert!(machine.state().failover_active);
    }

    #[test]
    fn test_failover_context_step() {
        let mut machine = opened();
        machine.apply(&event(2, EventType::FailoverTriggered, Phase::Failover, "F1_fallback"));
        let step = machine.apply(&event(3, EventType::RepairTriggered, Phase::Repair, "R1_clarify"));
        assert_eq!(step.reason, TransitionReason::FailoverContext);
        assert_eq!(machine.state().phase, Phase::Failover);
        assert_eq!(step.violations.len(), 1);
        assert_eq!(step.violations[0].rule_id, rules::INVALID_TRANSITION);
    }

    #[test]
    fn test_failover_nonterminal_transition() {
        let mut machine = opened();
        machine.apply(&event(2, EventType::FailoverTriggered, Phase::Failover, "F1_fallback"));
        let step = machine.apply(&event(3, EventType::EvaluationFail, Phase::Outcome, "O2_goal_missed"));
        assert_eq!(step.reason, TransitionReason::FailoverNonterminalTransition);
        assert!(step.violations.is_empty());
        assert_eq!(machine.state().phase, Phase::Outcome);
        assert!(machine.state().failover_active);
    }

    #[test]
    fn test_reason_wire_names() {
        let json = serde_json::to_value(TransitionReason::FailoverRecoveredViaContinue).unwrap();
        assert_eq!(json, "failover_recovered_via_continue");
        assert_eq!(TransitionReason::InvalidSessionStart.to_string(), "invalid_session_start");
    }
}
