use pld_core::{EventType, Phase};
use pld_enforcement::{EnforcementError, SequenceConfig, SequenceRuleChecker, SequenceSeverity};
use pld_test_utils::{event, failover_path, happy_path, transcript};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_happy_path_clean() {
    let result = SequenceRuleChecker::default()
        .check_session(&happy_path("s1"))
        .unwrap();
    assert!(result.is_valid);
    assert!(result.violations.is_empty());
}

#[test]
fn test_events_after_close() {
    let mut events = happy_path("s1");
    events.push(event("s1", 6, EventType::LatencySpike, Phase::None, "INFO_latency_spike"));
    events.push(event("s1", 7, EventType::DriftDetected, Phase::Drift, "D1_instruction"));

    let result = SequenceRuleChecker::default().check_session(&events).unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.rule_ids(), vec!["SR-002B", "SR-002A"]);
    assert_eq!(result.warnings().count(), 1);
    assert_eq!(result.errors().count(), 1);
}

#[test]
fn test_failover_recovery_rules() {
    let checker = SequenceRuleChecker::default();

    assert!(checker.check_session(&failover_path("s1")).unwrap().is_valid);

    let bad = transcript(
        "s1",
        &[
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
            (EventType::FailoverTriggered, Phase::Failover, "F1_fallback"),
            (EventType::PauseDetected, Phase::None, "INFO_pause_detected"),
            (EventType::RepairTriggered, Phase::Repair, "R1_clarify"),
        ],
    );
    let result = checker.check_session(&bad).unwrap();
    assert_eq!(result.rule_ids(), vec!["SR-003A"]);
    // the offending event is the repair, not the failover
    let violation = &result.violations[0];
    assert_eq!(violation.event_type, Some(EventType::RepairTriggered));
    assert_eq!(violation.turn_sequence, Some(4));
    assert_eq!(violation.event_index, Some(3));
    assert_eq!(violation.details["failover_turn_sequence"], 2);
    assert_eq!(violation.details["failover_event_index"], 1);

    let dangling = transcript(
        "s1",
        &[
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
            (EventType::FailoverTriggered, Phase::Failover, "F1_fallback"),
            (EventType::FallbackExecuted, Phase::None, "INFO_fallback"),
        ],
    );
    let result = checker.check_session(&dangling).unwrap();
    assert!(result.is_valid);
    assert_eq!(result.rule_ids(), vec!["SR-003C"]);
    assert_eq!(result.violations[0].severity, SequenceSeverity::Warning);
}

#[test]
fn test_custom_recovery_set() {
    let checker = SequenceRuleChecker::new(SequenceConfig::default())
        .with_recovery_events([EventType::ReentryObserved]);
    let events = transcript(
        "s1",
        &[
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
            (EventType::FailoverTriggered, Phase::Failover, "F1_fallback"),
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
        ],
    );
    assert_eq!(checker.check_session(&events).unwrap().rule_ids(), vec!["SR-003A"]);
}

#[test]
fn test_custom_classifier() {
    // Treat nothing as observability: the pause now counts as the recovery step.
    let checker = SequenceRuleChecker::default().with_classifier(|_: EventType, _: Phase| false);
    let events = transcript(
        "s1",
        &[
            (EventType::ContinueAllowed, Phase::Continue, "C0_normal"),
            (EventType::FailoverTriggered, Phase::Failover, "F1_fallback"),
            (EventType::PauseDetected, Phase::None, "INFO_pause_detected"),
            (EventType::ReentryObserved, Phase::Reentry, "RE1_resume"),
        ],
    );
    assert_eq!(checker.check_session(&events).unwrap().rule_ids(), vec!["SR-003A"]);
}

#[test]
fn test_transcript_errors() {
    let checker = SequenceRuleChecker::default();
    assert_eq!(checker.check_session(&[]), Err(EnforcementError::EmptyTranscript));

    let mut events = happy_path("a");
    events.extend(happy_path("b"));
    assert!(matches!(
        checker.check_session(&events),
        Err(EnforcementError::MixedSessions { .. })
    ));

    let results = checker.check_all(&events);
    let ids: Vec<&str> = results.iter().map(|r| r.session_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(results.iter().all(|r| r.is_valid));
}

proptest! {
    #[test]
    fn non_increasing_turn_flags_sr001(turns in proptest::collection::vec(1u64..20, 2..12)) {
        let events: Vec<_> = turns
            .iter()
            .map(|&t| event("s1", t, EventType::Info, Phase::None, "INFO_generic"))
            .collect();
        let result = SequenceRuleChecker::default().check_session(&events).unwrap();

        let increasing = turns.windows(2).all(|w| w[0] < w[1]);
        prop_assert_eq!(result.rule_ids().contains(&"SR-001"), !increasing);
        prop_assert_eq!(result.is_valid, increasing);
    }
}
