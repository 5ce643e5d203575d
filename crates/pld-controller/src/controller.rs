//! Controller context
//!
//! [`PldController`] is built once from a [`RuntimeConfig`] and passed to
//! whatever ingests events. It owns the validation engine, the session
//! registry and the sequence checker; there is no process-wide instance.

use crate::bridge::SignalBridge;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::router::{route_for, ActionRouter, NextAction, RouteDecision};
use crate::state_machine::{SessionState, StateTransition, TransitionReason};
use pld_core::{Event, Phase, StructuralError};
use pld_enforcement::{
    evaluate_response_policy, MetricSeverity, ResponsePolicyDecision, SequenceRuleChecker,
    SequenceValidationResult, ValidationEngine, ValidationMode, ValidationReport,
};
use pld_failover::{FailoverOrchestrator, FailoverRegistry};
use serde::Serialize;
use serde_json::Value;

/// Result of ingesting one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    /// Validation verdict
    pub report: ValidationReport,
    /// Event applied to the session (normalized when applicable)
    pub accepted: Option<Event>,
    /// Session step, absent for rejected events
    pub transition: Option<StateTransition>,
    /// Routing hint
    pub action: NextAction,
    /// Session entered failover and needs orchestration
    pub failover_required: bool,
}

impl IngestOutcome {
    /// Event was rejected and not applied
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.accepted.is_none()
    }
}

/// Explicit runtime context
#[derive(Debug)]
pub struct PldController {
    config: RuntimeConfig,
    engine: ValidationEngine,
    sessions: SessionRegistry,
    checker: SequenceRuleChecker,
}

impl PldController {
    /// Build from configuration
    ///
    /// # Errors
    /// [`ControllerError::Config`](crate::ControllerError::Config) when the
    /// configuration does not validate.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let engine = ValidationEngine::new(config.validation.engine.clone());
        let checker = SequenceRuleChecker::new(config.sequence.clone());
        tracing::info!(mode = %config.validation.mode, "controller initialized");
        Ok(Self {
            config,
            engine,
            sessions: SessionRegistry::new(),
            checker,
        })
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Validation mode in effect
    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.config.validation.mode
    }

    /// Session registry
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Current state of a session
    #[must_use]
    pub fn state(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.snapshot(session_id)
    }

    /// Validate, apply and route one decoded event
    ///
    /// Rejected events are never applied. In normalize mode the corrected
    /// candidate is applied instead of the original.
    pub fn ingest(&self, event: &Event) -> IngestOutcome {
        let report = self.engine.validate(event, self.mode());
        let accepted = report.accepted(event).cloned();
        self.apply(event, report, accepted)
    }

    /// Validate, apply and route one undecoded event
    ///
    /// An unknown `pld.phase` is a validation failure here, not a decode error.
    ///
    /// # Errors
    /// [`ControllerError::Structural`](crate::ControllerError::Structural)
    /// when a required field is missing or malformed.
    pub fn ingest_value(&self, value: &Value) -> Result<IngestOutcome> {
        let raw = self.engine.validate_value(value, self.mode())?;
        let accepted = raw.accepted().cloned();
        match raw.event.clone().or_else(|| accepted.clone()) {
            Some(event) => Ok(self.apply(&event, raw.report, accepted)),
            None => {
                tracing::warn!(
                    session_id = value["session_id"].as_str().unwrap_or_default(),
                    turn = value["turn_sequence"].as_u64().unwrap_or_default(),
                    "event with unknown phase rejected"
                );
                Ok(IngestOutcome {
                    report: raw.report,
                    accepted: None,
                    transition: None,
                    action: NextAction::RejectEvent,
                    failover_required: false,
                })
            }
        }
    }

    /// Validate, apply and route one JSON document
    ///
    /// # Errors
    /// [`ControllerError::Structural`](crate::ControllerError::Structural)
    /// when the text is not JSON or the event is structurally invalid.
    pub fn ingest_json(&self, json: &str) -> Result<IngestOutcome> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| StructuralError::Malformed(e.to_string()))?;
        self.ingest_value(&value)
    }

    /// Routing decision without touching session state
    #[must_use]
    pub fn route(&self, event: &Event) -> RouteDecision {
        ActionRouter::new(self.engine.clone(), self.mode()).route(event)
    }

    /// Advisory response policy for `event` under the configured mode
    #[must_use]
    pub fn response_policy(&self, event: &Event) -> ResponsePolicyDecision {
        evaluate_response_policy(event, self.mode())
    }

    /// Sequence rules for every session in `events`
    #[must_use]
    pub fn audit(&self, events: &[Event]) -> Vec<SequenceValidationResult> {
        self.checker.check_all(events)
    }

    /// Sequence rules for one session's transcript
    ///
    /// # Errors
    /// [`ControllerError::Enforcement`](crate::ControllerError::Enforcement)
    /// for an empty or mixed-session transcript.
    pub fn audit_session(&self, events: &[Event]) -> Result<SequenceValidationResult> {
        Ok(self.checker.check_session(events)?)
    }

    /// Signal bridge sharing this controller's engine and mode
    #[must_use]
    pub fn bridge(&self) -> SignalBridge {
        SignalBridge::new(self.mode()).with_engine(self.engine.clone())
    }

    /// Failover orchestrator wired from the configuration
    ///
    /// # Errors
    /// [`ControllerError::Config`](crate::ControllerError::Config) when a
    /// policy or strategy name is not registered.
    pub fn failover_orchestrator(&self, registry: &FailoverRegistry) -> Result<FailoverOrchestrator> {
        Ok(registry.orchestrator_from_spec(&self.config.failover)?)
    }

    /// Classify a metric reading with the configured thresholds
    #[must_use]
    pub fn evaluate_metric(&self, metric: &str, value: f64) -> MetricSeverity {
        self.config.thresholds.evaluate(metric, value)
    }

    fn apply(&self, event: &Event, report: ValidationReport, accepted: Option<Event>) -> IngestOutcome {
        let Some(applied) = accepted else {
            tracing::warn!(
                session_id = %event.session_id,
                turn = event.turn_sequence,
                event_type = %event.event_type,
                rules = ?report.must_violations().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
                "event rejected"
            );
            return IngestOutcome {
                report,
                accepted: None,
                transition: None,
                action: NextAction::RejectEvent,
                failover_required: false,
            };
        };

        let transition = self.sessions.apply(&applied);
        let (action, _) = route_for(applied.event_type, applied.phase());
        let failover_required = transition.next.failover_active && transition.next.phase == Phase::Failover;

        if transition.reason == TransitionReason::SessionTerminated {
            tracing::info!(
                session_id = %applied.session_id,
                turn = applied.turn_sequence,
                phase = %transition.next.phase,
                "session closed"
            );
        }
        if failover_required {
            tracing::info!(
                session_id = %applied.session_id,
                turn = applied.turn_sequence,
                "failover orchestration required"
            );
        }

        IngestOutcome {
            report,
            accepted: Some(applied),
            transition: Some(transition),
            action,
            failover_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pld_core::EventType;
    use pld_enforcement::PolicyDecisionType;
    use serde_json::json;

    fn controller(mode: ValidationMode) -> PldController {
        PldController::new(RuntimeConfig::default().with_mode(mode)).unwrap()
    }

    #[test]
    fn test_rejected_event_not_applied() {
        let ctl = controller(ValidationMode::Strict);
        let event = Event::builder("s1", 1, EventType::ContinueAllowed, Phase::Drift, "C0_normal").build();
        let outcome = ctl.ingest(&event);
        assert!(outcome.is_rejected());
        assert_eq!(outcome.action, NextAction::RejectEvent);
        assert!(ctl.state("s1").is_none());
    }

    #[test]
    fn test_normalized_event_applied() {
        let ctl = controller(ValidationMode::Normalize);
        let event = Event::builder("s1", 1, EventType::ContinueAllowed, Phase::Drift, "C0_normal").build();
        let outcome = ctl.ingest(&event);
        assert_eq!(outcome.accepted.as_ref().map(Event::phase), Some(Phase::Continue));
        assert_eq!(event.phase(), Phase::Drift);
        assert_eq!(ctl.state("s1").map(|s| s.phase), Some(Phase::Continue));
    }

    #[test]
    fn test_failover_required() {
        let ctl = controller(ValidationMode::Strict);
        ctl.ingest(&Event::builder("s1", 1, EventType::ContinueAllowed, Phase::Continue, "C0_normal").build());
        let outcome = ctl.ingest(
            &Event::builder("s1", 2, EventType::FailoverTriggered, Phase::Failover, "F1_fallback").build(),
        );
        assert!(outcome.failover_required);
        assert_eq!(outcome.action, NextAction::RouteToFailoverHandler);
    }

    #[test]
    fn test_unknown_phase_value() {
        let ctl = controller(ValidationMode::Normalize);
        let mut value = Event::builder("s1", 1, EventType::ContinueAllowed, Phase::Continue, "C0_normal")
            .build()
            .to_value();
        value["pld"]["phase"] = json!("cruising");

        let outcome = ctl.ingest_value(&value).unwrap();
        assert_eq!(outcome.report.violations[0].rule_id, "PHASE-001");
        assert_eq!(outcome.accepted.map(|e| e.phase()), Some(Phase::Continue));

        let strict = controller(ValidationMode::Strict);
        assert!(strict.ingest_value(&value).unwrap().is_rejected());
    }

    #[test]
    fn test_ingest_json_structural_error() {
        let ctl = controller(ValidationMode::Strict);
        assert!(ctl.ingest_json("{not json").is_err());
        assert!(ctl.ingest_json(r#"{"schema_version": "2.0"}"#).is_err());
    }

    #[test]
    fn test_response_policy_follows_mode() {
        let failed = Event::builder("s1", 3, EventType::EvaluationFail, Phase::Outcome, "O2_goal_missed").build();
        assert_eq!(
            controller(ValidationMode::Strict).response_policy(&failed).decision,
            PolicyDecisionType::Block
        );
        assert_eq!(
            controller(ValidationMode::Warn).response_policy(&failed).decision,
            PolicyDecisionType::PolicyRepairMandated
        );
    }

    #[test]
    fn test_failover_orchestrator_from_config() {
        let ctl = controller(ValidationMode::Strict);
        let orchestrator = ctl.failover_orchestrator(&FailoverRegistry::with_defaults()).unwrap();
        assert_eq!(orchestrator.max_attempts(), 3);
        assert_eq!(ctl.evaluate_metric("PRDR", 60.0), MetricSeverity::Critical);
    }
}
