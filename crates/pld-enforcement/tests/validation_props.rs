use pld_core::{Event, EventType, Phase, PhaseConstraint};
use pld_enforcement::{ValidationEngine, ValidationMode};
use proptest::prelude::*;

fn arb_phase() -> impl Strategy<Value = Phase> {
    proptest::sample::select(Phase::ALL.to_vec())
}

fn arb_event_type() -> impl Strategy<Value = EventType> {
    proptest::sample::select(EventType::ALL.to_vec())
}

fn arb_code() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("D1_instruction".to_string()),
        Just("D4_tool_error".to_string()),
        Just("R2_soft_repair".to_string()),
        Just("RE1_resume".to_string()),
        Just("C0_normal".to_string()),
        Just("O0_session_closed".to_string()),
        Just("F1_fallback".to_string()),
        Just("INFO_latency_spike".to_string()),
        Just("SYS_session_init".to_string()),
        Just("M1_PRDR".to_string()),
    ]
}

fn arb_mode() -> impl Strategy<Value = ValidationMode> {
    prop_oneof![
        Just(ValidationMode::Strict),
        Just(ValidationMode::Warn),
        Just(ValidationMode::Normalize),
    ]
}

/// Code whose prefix agrees with `phase`
fn consistent_code(phase: Phase) -> &'static str {
    match phase {
        Phase::None => "INFO_generic",
        Phase::Continue => "C0_normal",
        Phase::Drift => "D1_instruction",
        Phase::Repair => "R1_clarify",
        Phase::Reentry => "RE1_resume",
        Phase::Outcome => "O0_session_closed",
        Phase::Failover => "F1_fallback",
    }
}

proptest! {
    #[test]
    fn must_type_valid_iff_required_phase(event_type in arb_event_type(), phase in arb_phase()) {
        let PhaseConstraint::Must(required) = event_type.phase_constraint() else {
            return Ok(());
        };
        let event = Event::builder("s1", 1, event_type, phase, consistent_code(phase)).build();
        let report = ValidationEngine::default().validate(&event, ValidationMode::Strict);
        prop_assert_eq!(report.must_violations().next().is_none(), phase == required);
    }

    #[test]
    fn lifecycle_code_fixes_phase(code in arb_code(), phase in arb_phase()) {
        let event = Event::builder("s1", 1, EventType::Handoff, phase, code.as_str()).build();
        let report = ValidationEngine::default().validate(&event, ValidationMode::Strict);
        let implied = event.code().implied_phase();
        prop_assert_eq!(report.is_valid, implied == phase);
    }

    #[test]
    fn normalize_is_idempotent_and_non_mutating(
        event_type in arb_event_type(),
        phase in arb_phase(),
        code in arb_code(),
        mode in arb_mode(),
    ) {
        let engine = ValidationEngine::default();
        let event = Event::builder("s1", 1, event_type, phase, code.as_str()).build();
        let before = event.clone();

        let first = engine.normalize(&event, mode);
        prop_assert_eq!(&event, &before);

        if let Some(normalized) = first {
            prop_assert_eq!(mode, ValidationMode::Normalize);
            prop_assert!(engine.validate(&normalized, ValidationMode::Strict).is_valid);
            prop_assert_eq!(normalized.event_id, event.event_id);
            if let Some(again) = engine.normalize(&normalized, mode) {
                prop_assert_eq!(again.phase(), normalized.phase());
            }
        }
    }

    #[test]
    fn should_violations_never_invalidate(mode in arb_mode(), phase in arb_phase()) {
        let event = Event::builder("s1", 1, EventType::EvaluationPass, phase, consistent_code(phase)).build();
        let report = ValidationEngine::default().validate(&event, mode);
        prop_assert!(report.is_valid);
        prop_assert_eq!(report.has_should_violations, phase != Phase::Outcome);
        prop_assert_eq!(report.should_violations().count(), usize::from(phase != Phase::Outcome));
    }
}

#[test]
fn batch_matches_sequential() {
    let engine = ValidationEngine::default();
    let events: Vec<Event> = EventType::ALL
        .iter()
        .zip(1u64..)
        .map(|(&t, turn)| Event::builder("s1", turn, t, Phase::Drift, "D1_instruction").build())
        .collect();

    let batch = engine.validate_batch(&events, ValidationMode::Warn);
    let sequential: Vec<_> = events
        .iter()
        .map(|e| engine.validate(e, ValidationMode::Warn))
        .collect();
    assert_eq!(batch, sequential);
}
