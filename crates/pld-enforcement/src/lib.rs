//! PLD Enforcement - protocol checks over lifecycle events
//!
//! - [`ValidationEngine`]: per-event phase, prefix and event-type rules with
//!   strict / warn / normalize policies
//! - [`SequenceRuleChecker`]: cross-event invariants over a whole transcript
//! - [`ThresholdEvaluator`]: metric severity classification
//! - [`evaluate_response_policy`]: advisory decision for the next response
//!
//! Every check here is pure. Violations are returned as data; only inputs a
//! check cannot run on at all produce an [`EnforcementError`].

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod response_policy;
pub mod sequence;
pub mod thresholds;
pub mod validation;

pub use error::{EnforcementError, Result};
pub use response_policy::{
    evaluate_response_policy, evaluate_response_policy_value, PolicyDecisionType,
    ResponsePolicyDecision,
};
pub use sequence::{
    DefaultClassifier, ObservabilityClassifier, SequenceConfig, SequenceRuleChecker,
    SequenceRuleViolation, SequenceSeverity, SequenceValidationResult,
};
pub use thresholds::{MetricSeverity, MetricThreshold, ThresholdEvaluator};
pub use validation::{
    check_code_phase, check_event_type_phase, RawValidation, Severity, ValidationConfig,
    ValidationEngine, ValidationMode, ValidationReport, ValidationSummary, Violation,
};
