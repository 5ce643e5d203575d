//! Testing utilities for the PLD workspace
//!
//! Shared event builders, canned transcripts, and instrumented failover
//! strategies and sinks.

#![allow(missing_docs)]

use pld_core::{Event, EventType, Metadata, Phase};
use pld_failover::{FailoverContext, RecoveryStrategy, SignalSink};
use std::sync::atomic::{AtomicU32, Ordering};

pub fn event(session: &str, turn: u64, event_type: EventType, phase: Phase, code: &str) -> Event {
    Event::builder(session, turn, event_type, phase, code).build()
}

/// Events numbered from turn 1 in the given order
pub fn transcript(session: &str, steps: &[(EventType, Phase, &str)]) -> Vec<Event> {
    steps
        .iter()
        .zip(1u64..)
        .map(|(&(event_type, phase, code), turn)| event(session, turn, event_type, phase, code))
        .collect()
}

/// continue → drift → repair → reentry → close
pub fn happy_path(session: &str) -> Vec<Event> {
    transcript(
        session,
        &[
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
            (EventType::DriftDetected, Phase::Drift, "D1_instruction"),
            (EventType::RepairTriggered, Phase::Repair, "R2_soft_repair"),
            (EventType::ReentryObserved, Phase::Reentry, "RE1_resume"),
            (EventType::SessionClosed, Phase::Outcome, "O0_session_closed"),
        ],
    )
}

/// continue → drift → failover → reentry → close
pub fn failover_path(session: &str) -> Vec<Event> {
    transcript(
        session,
        &[
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
            (EventType::DriftDetected, Phase::Drift, "D4_tool_error"),
            (EventType::FailoverTriggered, Phase::Failover, "F1_fallback"),
            (EventType::ReentryObserved, Phase::Reentry, "RE1_resume"),
            (EventType::SessionClosed, Phase::Outcome, "O0_session_closed"),
        ],
    )
}

/// One JSON object per line
pub fn to_jsonl(events: &[Event]) -> String {
    events
        .iter()
        .map(|e| e.to_value().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strategy that counts calls and optionally fails every attempt
#[derive(Debug, Default)]
pub struct CountingStrategy {
    calls: AtomicU32,
    failure: Option<String>,
}

impl CountingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecoveryStrategy for CountingStrategy {
    fn name(&self) -> &str {
        "counting"
    }

    fn execute(&self, context: &mut FailoverContext<'_>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut payload = Metadata::new();
        payload.insert("attempt".to_string(), context.attempt().into());
        context.emit("failover_attempt", &payload);
        if let Some(message) = &self.failure {
            context.fail(message.clone());
        }
    }
}

/// Sink that keeps every emitted signal and log line
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub signals: Vec<(String, Metadata)>,
    pub logs: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.signals.iter().map(|(k, _)| k.as_str()).collect()
    }
}

impl SignalSink for RecordingSink {
    fn emit(&mut self, kind: &str, payload: &Metadata) {
        self.signals.push((kind.to_string(), payload.clone()));
    }

    fn log(&mut self, message: &str, _fields: &Metadata) {
        self.logs.push(message.to_string());
    }
}
