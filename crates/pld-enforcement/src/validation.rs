//! Per-event validation and normalization
//!
//! The engine checks one event at a time against the taxonomy tables:
//! - schema major version (VER-001)
//! - phase is known (PHASE-001, raw JSON entry point only)
//! - code prefix implies the event's phase (TAX-001, TAX-002)
//! - event type to phase mapping (EVT-001 for MUST, EVT-002 for SHOULD)
//!
//! MUST violations invalidate an event in every mode unless normalize mode
//! finds a single-field phase correction that passes strict re-validation.
//! SHOULD violations are advisory and only surfaced in warn and normalize mode.

use pld_core::{
    check_envelope, ConfigError, Event, EventType, Phase, PhaseConstraint, StructuralError,
    TaxonomyCode, SCHEMA_VERSION,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Rule identifiers reported by the engine
pub mod rules {
    /// Schema major version differs from the configured target
    pub const SCHEMA_VERSION_MISMATCH: &str = "VER-001";
    /// `pld.phase` is not one of the seven phases
    pub const UNKNOWN_PHASE: &str = "PHASE-001";
    /// Lifecycle code prefix implies a different phase
    pub const PREFIX_PHASE_MISMATCH: &str = "TAX-001";
    /// Non-lifecycle code prefix with a phase other than `none`
    pub const NON_LIFECYCLE_PHASE: &str = "TAX-002";
    /// MUST event-type to phase mapping broken
    pub const EVENT_TYPE_MUST: &str = "EVT-001";
    /// SHOULD event-type to phase mapping broken
    pub const EVENT_TYPE_SHOULD: &str = "EVT-002";
}

/// Strictness policy applied to every event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Reject on MUST violations, log SHOULD violations quietly
    #[default]
    Strict,
    /// Reject on MUST violations, surface SHOULD violations
    Warn,
    /// Attempt a phase correction before rejecting
    Normalize,
}

impl ValidationMode {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Warn => "warn",
            ValidationMode::Normalize => "normalize",
        }
    }

    /// Whether SHOULD violations are logged at warn level in this mode
    ///
    /// Reports always carry SHOULD violations; this only affects logging.
    #[inline]
    #[must_use]
    pub const fn surfaces_should(self) -> bool {
        !matches!(self, ValidationMode::Strict)
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "warn" => Ok(ValidationMode::Warn),
            "normalize" => Ok(ValidationMode::Normalize),
            other => Err(ConfigError::invalid(
                "mode",
                format!("expected strict, warn or normalize, got `{other}`"),
            )),
        }
    }
}

/// Constraint strength of a violated rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Blocks validity
    Must,
    /// Advisory
    Should,
}

/// One broken rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule identifier (`EVT-001`, `SM-001`, ...)
    pub rule_id: String,
    /// Constraint strength
    pub severity: Severity,
    /// Human readable explanation
    pub message: String,
    /// Dotted path of the offending field
    pub field: String,
}

impl Violation {
    /// MUST-level violation
    pub fn must(rule_id: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Must,
            message: message.into(),
            field: field.to_string(),
        }
    }

    /// SHOULD-level violation
    pub fn should(rule_id: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Should,
            message: message.into(),
            field: field.to_string(),
        }
    }

    /// Whether this violation blocks validity
    #[inline]
    #[must_use]
    pub fn is_must(&self) -> bool {
        self.severity == Severity::Must
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.rule_id, self.message, self.field)
    }
}

/// Event-type to phase consistency
///
/// Returns an EVT-001 (MUST) or EVT-002 (SHOULD) violation when the phase
/// does not match the mapped phase. MAY event types never fail.
#[must_use]
pub fn check_event_type_phase(event_type: EventType, phase: Phase) -> Option<Violation> {
    match event_type.phase_constraint() {
        PhaseConstraint::Must(required) if required != phase => Some(Violation::must(
            rules::EVENT_TYPE_MUST,
            "pld.phase",
            format!("event_type {event_type} requires phase {required}, got {phase}"),
        )),
        PhaseConstraint::Should(expected) if expected != phase => Some(Violation::should(
            rules::EVENT_TYPE_SHOULD,
            "pld.phase",
            format!("event_type {event_type} recommends phase {expected}, got {phase}"),
        )),
        _ => None,
    }
}

/// Code prefix to phase consistency
#[must_use]
pub fn check_code_phase(code: &TaxonomyCode, phase: Phase) -> Option<Violation> {
    match code.lifecycle_prefix() {
        Some(prefix) if prefix.phase() != phase => Some(Violation::must(
            rules::PREFIX_PHASE_MISMATCH,
            "pld.code",
            format!(
                "prefix {} of code {code} implies phase {}, got {phase}",
                prefix.as_str(),
                prefix.phase()
            ),
        )),
        None if phase != Phase::None => Some(Violation::must(
            rules::NON_LIFECYCLE_PHASE,
            "pld.code",
            format!(
                "non-lifecycle prefix {} of code {code} requires phase none, got {phase}",
                code.prefix()
            ),
        )),
        _ => None,
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or_default()
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Target schema version
    pub schema_version: String,
    /// Report VER-001 when the major version differs
    pub reject_major_version_mismatch: bool,
    /// Phase assumed for MAY event types without a current phase
    pub default_may_phase: Phase,
    /// Allow normalize mode to propose corrected events
    pub allow_normalization: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            reject_major_version_mismatch: true,
            default_may_phase: Phase::None,
            allow_normalization: true,
        }
    }
}

impl ValidationConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target schema version
    #[inline]
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Enable or disable VER-001
    #[inline]
    #[must_use]
    pub fn with_version_check(mut self, enabled: bool) -> Self {
        self.reject_major_version_mismatch = enabled;
        self
    }

    /// Set the default MAY phase
    #[inline]
    #[must_use]
    pub fn with_default_may_phase(mut self, phase: Phase) -> Self {
        self.default_may_phase = phase;
        self
    }

    /// Enable or disable normalization
    #[inline]
    #[must_use]
    pub fn with_normalization(mut self, enabled: bool) -> Self {
        self.allow_normalization = enabled;
        self
    }
}

/// Verdict for one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// No MUST violation remains (after normalization, if any)
    pub is_valid: bool,
    /// At least one SHOULD violation was surfaced
    pub has_should_violations: bool,
    /// Violations of the original event
    pub violations: Vec<Violation>,
    /// Corrected copy (normalize mode only)
    pub normalized: Option<Event>,
}

impl ValidationReport {
    /// MUST violations
    pub fn must_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_must())
    }

    /// SHOULD violations
    pub fn should_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_must())
    }

    /// Event to accept: the normalized candidate if any, else the original
    ///
    /// Returns `None` when the event is rejected.
    #[must_use]
    pub fn accepted<'a>(&'a self, original: &'a Event) -> Option<&'a Event> {
        if !self.is_valid {
            return None;
        }
        Some(self.normalized.as_ref().unwrap_or(original))
    }

    /// Compact serializable summary
    #[must_use]
    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            is_valid: self.is_valid,
            must_violations: self.must_violations().count(),
            should_violations: self.should_violations().count(),
            rule_ids: self.violations.iter().map(|v| v.rule_id.clone()).collect(),
            normalized: self.normalized.is_some(),
        }
    }
}

/// Counts and rule ids of a [`ValidationReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Verdict
    pub is_valid: bool,
    /// Number of MUST violations
    pub must_violations: usize,
    /// Number of SHOULD violations
    pub should_violations: usize,
    /// Rule ids in report order
    pub rule_ids: Vec<String>,
    /// Whether a normalized candidate exists
    pub normalized: bool,
}

/// Result of validating an undecoded JSON event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawValidation {
    /// Decoded event, absent when the phase is unknown
    pub event: Option<Event>,
    /// Verdict
    pub report: ValidationReport,
}

impl RawValidation {
    /// Event to accept, if any
    #[must_use]
    pub fn accepted(&self) -> Option<&Event> {
        match &self.event {
            Some(event) => self.report.accepted(event),
            None => self.report.normalized.as_ref().filter(|_| self.report.is_valid),
        }
    }
}

/// Stateless validation engine
///
/// Holds only its configuration, so one engine can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    /// Create engine with configuration
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Every rule violation of `event`, regardless of mode
    #[must_use]
    pub fn check(&self, event: &Event) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.config.reject_major_version_mismatch
            && major_version(&event.schema_version) != major_version(&self.config.schema_version)
        {
            violations.push(Violation::must(
                rules::SCHEMA_VERSION_MISMATCH,
                "schema_version",
                format!(
                    "schema major version {} does not match {}",
                    event.schema_version, self.config.schema_version
                ),
            ));
        }

        violations.extend(check_code_phase(&event.pld.code, event.phase()));
        violations.extend(check_event_type_phase(event.event_type, event.phase()));
        violations
    }

    /// Validate one decoded event
    #[must_use]
    pub fn validate(&self, event: &Event, mode: ValidationMode) -> ValidationReport {
        let violations = self.check(event);

        let has_must = violations.iter().any(Violation::is_must);
        let has_should_violations = violations.iter().any(|v| !v.is_must());
        let normalized = if has_must {
            self.normalize(event, mode)
        } else {
            None
        };

        let report = ValidationReport {
            is_valid: !has_must || normalized.is_some(),
            has_should_violations,
            violations,
            normalized,
        };

        if !report.is_valid {
            tracing::debug!(
                session_id = %event.session_id,
                turn = event.turn_sequence,
                event_type = %event.event_type,
                mode = %mode,
                violations = report.violations.len(),
                "event rejected"
            );
        } else if report.has_should_violations {
            let rules: Vec<&str> = report.should_violations().map(|v| v.rule_id.as_str()).collect();
            if mode.surfaces_should() {
                tracing::warn!(session_id = %event.session_id, turn = event.turn_sequence, ?rules, "should violations");
            } else {
                tracing::debug!(session_id = %event.session_id, turn = event.turn_sequence, ?rules, "should violations");
            }
        }
        report
    }

    /// Single-field phase correction
    ///
    /// Only in normalize mode and only for MUST-mapped event types whose phase
    /// differs from the required one. The candidate is returned only if it has
    /// no MUST violation left. The input is never modified.
    #[must_use]
    pub fn normalize(&self, event: &Event, mode: ValidationMode) -> Option<Event> {
        if mode != ValidationMode::Normalize || !self.config.allow_normalization {
            return None;
        }
        let required = event.event_type.phase_constraint().required()?;
        if required == event.phase() {
            return None;
        }

        let candidate = event.with_phase(required);
        if self.check(&candidate).iter().any(Violation::is_must) {
            return None;
        }
        tracing::debug!(
            session_id = %event.session_id,
            turn = event.turn_sequence,
            from = %event.phase(),
            to = %required,
            "event normalized"
        );
        Some(candidate)
    }

    /// Validate an undecoded JSON event
    ///
    /// Unlike [`Event::from_value`], an unknown `pld.phase` is not structural
    /// here: it is reported as PHASE-001, and normalize mode may still replace
    /// it with the phase required by the event type.
    ///
    /// # Errors
    /// Returns [`StructuralError`] when a required field is missing or malformed.
    pub fn validate_value(
        &self,
        value: &Value,
        mode: ValidationMode,
    ) -> Result<RawValidation, StructuralError> {
        check_envelope(value)?;

        let phase = value["pld"]["phase"].as_str().unwrap_or_default();
        if Phase::from_str(phase).is_ok() {
            let event = Event::from_value(value)?;
            let report = self.validate(&event, mode);
            return Ok(RawValidation {
                event: Some(event),
                report,
            });
        }

        let violations = vec![Violation::must(
            rules::UNKNOWN_PHASE,
            "pld.phase",
            format!("unknown phase `{phase}`"),
        )];

        let required = value["event_type"]
            .as_str()
            .and_then(|s| EventType::from_str(s).ok())
            .and_then(|t| t.phase_constraint().required());

        let normalized = match required {
            Some(required)
                if mode == ValidationMode::Normalize && self.config.allow_normalization =>
            {
                let mut fixed = value.clone();
                fixed["pld"]["phase"] = Value::from(required.as_str());
                let candidate = Event::from_value(&fixed)?;
                let clean = !self.check(&candidate).iter().any(Violation::is_must);
                clean.then_some(candidate)
            }
            _ => None,
        };

        Ok(RawValidation {
            event: None,
            report: ValidationReport {
                is_valid: normalized.is_some(),
                has_should_violations: false,
                violations,
                normalized,
            },
        })
    }

    /// Phase for a MAY event type
    ///
    /// Prefers the caller's current phase, else the configured default.
    /// Returns `None` for MUST and SHOULD event types.
    #[must_use]
    pub fn resolve_may_phase(&self, event_type: EventType, current: Option<Phase>) -> Option<Phase> {
        event_type
            .is_may()
            .then(|| current.unwrap_or(self.config.default_may_phase))
    }

    /// Validate independent events in parallel, preserving input order
    #[must_use]
    pub fn validate_batch(&self, events: &[Event], mode: ValidationMode) -> Vec<ValidationReport> {
        events.par_iter().map(|e| self.validate(e, mode)).collect()
    }
}
