//! Whole-transcript sequence rules
//!
//! Checks that need more than one event:
//! - SR-001: `turn_sequence` strictly increases
//! - SR-002A / SR-002B: lifecycle (error) or observability (warning) events after close
//! - SR-003A / SR-003C: failover followed by a non-recovery event (error) or by nothing (warning)
//! - SR-004: more than one `session_closed`

use crate::error::{EnforcementError, Result};
use pld_core::{Event, EventType, Metadata, Phase, SessionId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Rule identifiers reported by the checker
pub mod rules {
    /// Turn sequence not strictly increasing
    pub const MONOTONICITY: &str = "SR-001";
    /// Lifecycle event after session close
    pub const LIFECYCLE_AFTER_CLOSE: &str = "SR-002A";
    /// Observability event after session close
    pub const OBSERVABILITY_AFTER_CLOSE: &str = "SR-002B";
    /// Failover followed by a non-recovery lifecycle event
    pub const INVALID_RECOVERY: &str = "SR-003A";
    /// Failover never followed by a lifecycle event
    pub const NO_RECOVERY: &str = "SR-003C";
    /// More than one closure
    pub const MULTIPLE_CLOSURES: &str = "SR-004";
}

/// Decides which events are observability rather than lifecycle
pub trait ObservabilityClassifier: Send + Sync {
    /// Whether an event of this type and phase is observability/info
    fn is_observability(&self, event_type: EventType, phase: Phase) -> bool;
}

impl<F> ObservabilityClassifier for F
where
    F: Fn(EventType, Phase) -> bool + Send + Sync,
{
    fn is_observability(&self, event_type: EventType, phase: Phase) -> bool {
        self(event_type, phase)
    }
}

/// Built-in classifier
///
/// Latency, pause, handoff and info events are always observability.
/// `fallback_executed` is observability unless it sits in a failover, drift
/// or repair phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ObservabilityClassifier for DefaultClassifier {
    fn is_observability(&self, event_type: EventType, phase: Phase) -> bool {
        match event_type {
            EventType::LatencySpike
            | EventType::PauseDetected
            | EventType::Handoff
            | EventType::Info => true,
            EventType::FallbackExecuted => {
                !matches!(phase, Phase::Failover | Phase::Drift | Phase::Repair)
            }
            _ => false,
        }
    }
}

/// Sequence violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceSeverity {
    /// Session is non-compliant
    Error,
    /// Advisory
    Warning,
    /// Informational
    Info,
}

impl fmt::Display for SequenceSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SequenceSeverity::Error => "error",
            SequenceSeverity::Warning => "warning",
            SequenceSeverity::Info => "info",
        })
    }
}

/// One broken sequence rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRuleViolation {
    /// Rule identifier
    pub rule_id: String,
    /// Severity
    pub severity: SequenceSeverity,
    /// Human readable explanation
    pub message: String,
    /// Session
    pub session_id: SessionId,
    /// Turn of the offending event
    pub turn_sequence: Option<u64>,
    /// Position of the offending event in the input
    pub event_index: Option<usize>,
    /// Type of the offending event
    pub event_type: Option<EventType>,
    /// Rule-specific details
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub details: Metadata,
}

impl SequenceRuleViolation {
    fn at(
        rule_id: &str,
        severity: SequenceSeverity,
        message: impl Into<String>,
        index: usize,
        event: &Event,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            message: message.into(),
            session_id: event.session_id.clone(),
            turn_sequence: Some(event.turn_sequence),
            event_index: Some(index),
            event_type: Some(event.event_type),
            details: Metadata::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Audit verdict for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceValidationResult {
    /// Session
    pub session_id: SessionId,
    /// No ERROR violation
    pub is_valid: bool,
    /// Violations in rule order
    pub violations: Vec<SequenceRuleViolation>,
}

impl SequenceValidationResult {
    /// ERROR violations
    pub fn errors(&self) -> impl Iterator<Item = &SequenceRuleViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == SequenceSeverity::Error)
    }

    /// WARNING violations
    pub fn warnings(&self) -> impl Iterator<Item = &SequenceRuleViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == SequenceSeverity::Warning)
    }

    /// Rule ids in report order
    #[must_use]
    pub fn rule_ids(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.rule_id.as_str()).collect()
    }
}

/// Checker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Event types accepted as the first lifecycle event after a failover
    pub recovery_event_types: BTreeSet<EventType>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            recovery_event_types: [
                EventType::ReentryObserved,
                EventType::ContinueAllowed,
                EventType::SessionClosed,
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// Stateless transcript auditor
#[derive(Clone)]
pub struct SequenceRuleChecker {
    recovery: BTreeSet<EventType>,
    classifier: Arc<dyn ObservabilityClassifier>,
}

impl fmt::Debug for SequenceRuleChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceRuleChecker")
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl Default for SequenceRuleChecker {
    fn default() -> Self {
        Self::new(SequenceConfig::default())
    }
}

impl SequenceRuleChecker {
    /// Create checker with the default classifier
    #[must_use]
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            recovery: config.recovery_event_types,
            classifier: Arc::new(DefaultClassifier),
        }
    }

    /// Replace the observability classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl ObservabilityClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replace the recovery event set
    #[must_use]
    pub fn with_recovery_events(mut self, events: impl IntoIterator<Item = EventType>) -> Self {
        self.recovery = events.into_iter().collect();
        self
    }

    /// Configured recovery event types
    #[inline]
    #[must_use]
    pub fn recovery_events(&self) -> &BTreeSet<EventType> {
        &self.recovery
    }

    /// Audit one session's transcript in the given order
    ///
    /// # Errors
    /// [`EnforcementError::EmptyTranscript`] for no events and
    /// [`EnforcementError::MixedSessions`] if session ids differ.
    pub fn check_session(&self, events: &[Event]) -> Result<SequenceValidationResult> {
        let first = events.first().ok_or(EnforcementError::EmptyTranscript)?;
        if let Some(other) = events.iter().find(|e| e.session_id != first.session_id) {
            return Err(EnforcementError::MixedSessions {
                expected: first.session_id.to_string(),
                found: other.session_id.to_string(),
            });
        }
        let refs: Vec<&Event> = events.iter().collect();
        Ok(self.audit(&first.session_id, &refs))
    }

    /// Audit a transcript holding any number of sessions
    ///
    /// Events are grouped by session id, keeping their relative order, and
    /// sessions are audited in parallel. Results are ordered by session id.
    #[must_use]
    pub fn check_all(&self, events: &[Event]) -> Vec<SequenceValidationResult> {
        let mut groups: BTreeMap<&SessionId, Vec<&Event>> = BTreeMap::new();
        for event in events {
            groups.entry(&event.session_id).or_default().push(event);
        }
        let groups: Vec<_> = groups.into_iter().collect();
        groups
            .par_iter()
            .map(|(session_id, events)| self.audit(session_id, events))
            .collect()
    }

    fn is_observability(&self, event: &Event) -> bool {
        self.classifier
            .is_observability(event.event_type, event.phase())
    }

    fn audit(&self, session_id: &SessionId, events: &[&Event]) -> SequenceValidationResult {
        let mut violations = Vec::new();
        check_monotonic(events, &mut violations);
        self.check_terminal(events, &mut violations);
        self.check_failover_recovery(events, &mut violations);
        check_closures(session_id, events, &mut violations);

        let is_valid = !violations
            .iter()
            .any(|v: &SequenceRuleViolation| v.severity == SequenceSeverity::Error);

        tracing::debug!(
            session_id = %session_id,
            events = events.len(),
            violations = violations.len(),
            is_valid,
            "sequence audit complete"
        );

        SequenceValidationResult {
            session_id: session_id.clone(),
            is_valid,
            violations,
        }
    }

    fn check_terminal(&self, events: &[&Event], out: &mut Vec<SequenceRuleViolation>) {
        let Some(closed_at) = events
            .iter()
            .find(|e| e.event_type == EventType::SessionClosed)
            .map(|e| e.turn_sequence)
        else {
            return;
        };

        for (index, event) in events.iter().enumerate() {
            if event.turn_sequence <= closed_at {
                continue;
            }
            let violation = if self.is_observability(event) {
                SequenceRuleViolation::at(
                    rules::OBSERVABILITY_AFTER_CLOSE,
                    SequenceSeverity::Warning,
                    format!("observability event {} after session close", event.event_type),
                    index,
                    event,
                )
            } else {
                SequenceRuleViolation::at(
                    rules::LIFECYCLE_AFTER_CLOSE,
                    SequenceSeverity::Error,
                    format!("lifecycle event {} after session close", event.event_type),
                    index,
                    event,
                )
            };
            out.push(violation.with_detail("closed_at_turn", json!(closed_at)));
        }
    }

    fn check_failover_recovery(&self, events: &[&Event], out: &mut Vec<SequenceRuleViolation>) {
        let mut ordered: Vec<(usize, &Event)> = events.iter().copied().enumerate().collect();
        ordered.sort_by_key(|(_, e)| e.turn_sequence);

        for (pos, (index, event)) in ordered.iter().enumerate() {
            if event.event_type != EventType::FailoverTriggered {
                continue;
            }
            let next = ordered[pos + 1..]
                .iter()
                .find(|(_, e)| !self.is_observability(e));

            match next {
                None => out.push(SequenceRuleViolation::at(
                    rules::NO_RECOVERY,
                    SequenceSeverity::Warning,
                    "no recovery observed after failover",
                    *index,
                    event,
                )),
                Some((next_index, next)) if !self.recovery.contains(&next.event_type) => out.push(
                    SequenceRuleViolation::at(
                        rules::INVALID_RECOVERY,
                        SequenceSeverity::Error,
                        format!("failover followed by non-recovery event {}", next.event_type),
                        *next_index,
                        next,
                    )
                    .with_detail("failover_turn_sequence", json!(event.turn_sequence))
                    .with_detail("failover_event_index", json!(index))
                    .with_detail(
                        "allowed_recovery_events",
                        json!(self.recovery.iter().copied().map(EventType::as_str).collect::<Vec<_>>()),
                    ),
                ),
                Some(_) => {}
            }
        }
    }
}

fn check_monotonic(events: &[&Event], out: &mut Vec<SequenceRuleViolation>) {
    for (index, pair) in events.windows(2).enumerate() {
        let (prev, cur) = (pair[0], pair[1]);
        if cur.turn_sequence <= prev.turn_sequence {
            out.push(
                SequenceRuleViolation::at(
                    rules::MONOTONICITY,
                    SequenceSeverity::Error,
                    format!(
                        "turn_sequence {} does not follow {}",
                        cur.turn_sequence, prev.turn_sequence
                    ),
                    index + 1,
                    cur,
                )
                .with_detail("previous_turn_sequence", json!(prev.turn_sequence)),
            );
        }
    }
}

fn check_closures(
    session_id: &SessionId,
    events: &[&Event],
    out: &mut Vec<SequenceRuleViolation>,
) {
    let closures: Vec<u64> = events
        .iter()
        .filter(|e| e.event_type == EventType::SessionClosed)
        .map(|e| e.turn_sequence)
        .collect();
    if closures.len() > 1 {
        let mut details = Metadata::new();
        details.insert("count".to_string(), json!(closures.len()));
        details.insert("turns".to_string(), json!(closures));
        out.push(SequenceRuleViolation {
            rule_id: rules::MULTIPLE_CLOSURES.to_string(),
            severity: SequenceSeverity::Error,
            message: format!("session closed {} times", closures.len()),
            session_id: session_id.clone(),
            turn_sequence: None,
            event_index: None,
            event_type: Some(EventType::SessionClosed),
            details,
        });
    }
}
