//! Lifecycle event record and wire decoding
//!
//! [`Event`] mirrors the runtime wire envelope: envelope fields at the top
//! level, lifecycle semantics in the nested `pld` block, and opaque maps
//! (`payload`, `runtime`, `metrics`, `extensions`) passed through untouched.

use crate::error::StructuralError;
use crate::event_type::EventType;
use crate::phase::Phase;
use crate::taxonomy::{TaxonomyCode, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque key/value map carried through unmodified
pub type Metadata = serde_json::Map<String, Value>;

/// Envelope fields every wire event must carry
const REQUIRED_FIELDS: [&str; 8] = [
    "schema_version",
    "event_id",
    "timestamp",
    "session_id",
    "turn_sequence",
    "source",
    "event_type",
    "pld",
];

/// Session identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a session identifier
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle semantics block (`pld`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PldBlock {
    /// Lifecycle phase
    pub phase: Phase,
    /// Taxonomy code
    pub code: TaxonomyCode,
    /// Classifier confidence in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Signal metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// User-experience block (`ux`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UxBlock {
    /// Whether the event produced user-visible output
    #[serde(default)]
    pub user_visible_state_change: bool,
}

/// Immutable lifecycle event
///
/// Operations that "change" an event, such as normalization, return a new
/// value and leave the original untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Schema version (`"2.0"`)
    pub schema_version: String,
    /// Unique event identifier
    pub event_id: Uuid,
    /// Emission time (RFC3339, UTC)
    pub timestamp: DateTime<Utc>,
    /// Owning session
    pub session_id: SessionId,
    /// 1-based turn index, strictly increasing per session
    pub turn_sequence: u64,
    /// Logical origin (user, assistant, runtime, detector, ...)
    pub source: String,
    /// Event type
    pub event_type: EventType,
    /// Lifecycle semantics
    pub pld: PldBlock,
    /// Opaque payload
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub payload: Metadata,
    /// Runtime observability fields
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub runtime: Metadata,
    /// User-experience flags
    #[serde(default)]
    pub ux: UxBlock,
    /// Runtime metric snapshots
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metrics: Metadata,
    /// Experiment and extension fields
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extensions: Metadata,
}

impl Event {
    /// Start building an event with the lifecycle-relevant fields
    pub fn builder(
        session_id: impl Into<SessionId>,
        turn_sequence: u64,
        event_type: EventType,
        phase: Phase,
        code: impl Into<TaxonomyCode>,
    ) -> EventBuilder {
        EventBuilder::new(session_id.into(), turn_sequence, event_type, phase, code.into())
    }

    /// Lifecycle phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.pld.phase
    }

    /// Taxonomy code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &TaxonomyCode {
        &self.pld.code
    }

    /// Copy of this event with only the phase replaced
    #[must_use]
    pub fn with_phase(&self, phase: Phase) -> Self {
        let mut copy = self.clone();
        copy.pld.phase = phase;
        copy
    }

    /// Decode one event from JSON text
    ///
    /// # Errors
    /// Returns [`StructuralError`] if the text is not a well-formed event.
    pub fn from_json_str(json: &str) -> Result<Self, StructuralError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| StructuralError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Decode one event from a JSON value
    ///
    /// Required fields are checked one by one so the error names the
    /// offending field. Unknown `pld.phase` values are structural here;
    /// the enforcement layer reports them as a semantic violation instead
    /// when it is given the raw value.
    ///
    /// # Errors
    /// Returns [`StructuralError`] naming the first missing or malformed field.
    pub fn from_value(value: &Value) -> Result<Self, StructuralError> {
        check_envelope(value)?;
        let event: Event = serde_json::from_value(value.clone())
            .map_err(|e| StructuralError::Malformed(e.to_string()))?;
        Ok(event)
    }

    /// Encode as a JSON value
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Structural checks on the raw envelope, in wire order
///
/// # Errors
/// Returns the first missing or malformed required field.
pub fn check_envelope(value: &Value) -> Result<(), StructuralError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StructuralError::Malformed("event must be a JSON object".into()))?;

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
        return Err(StructuralError::MissingField(missing));
    }

    let pld = obj["pld"]
        .as_object()
        .ok_or_else(|| StructuralError::malformed("pld", "must be an object"))?;
    if !pld.contains_key("phase") {
        return Err(StructuralError::MissingField("pld.phase"));
    }
    if !pld.contains_key("code") {
        return Err(StructuralError::MissingField("pld.code"));
    }

    require_non_empty_str(obj, "schema_version")?;
    require_non_empty_str(obj, "source")?;

    let session_id = require_non_empty_str(obj, "session_id")?;
    if session_id.trim().is_empty() {
        return Err(StructuralError::malformed("session_id", "must not be blank"));
    }

    match obj["turn_sequence"].as_u64() {
        Some(n) if n >= 1 => {}
        _ => {
            return Err(StructuralError::malformed(
                "turn_sequence",
                "must be an integer >= 1",
            ))
        }
    }

    let event_id = require_non_empty_str(obj, "event_id")?;
    Uuid::parse_str(event_id).map_err(|e| StructuralError::malformed("event_id", e.to_string()))?;

    let timestamp = require_non_empty_str(obj, "timestamp")?;
    DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| StructuralError::malformed("timestamp", e.to_string()))?;

    let event_type = require_non_empty_str(obj, "event_type")?;
    EventType::from_str(event_type)
        .map_err(|e| StructuralError::malformed("event_type", e.to_string()))?;

    if !pld["phase"].is_string() {
        return Err(StructuralError::malformed("pld.phase", "must be a string"));
    }
    match pld["code"].as_str() {
        Some(code) if !code.is_empty() => Ok(()),
        _ => Err(StructuralError::malformed(
            "pld.code",
            "must be a non-empty string",
        )),
    }
}

fn require_non_empty_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, StructuralError> {
    match obj.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        Some(_) => Err(StructuralError::malformed(field, "must not be empty")),
        None => Err(StructuralError::malformed(field, "must be a string")),
    }
}

/// Builder for [`Event`]
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    fn new(
        session_id: SessionId,
        turn_sequence: u64,
        event_type: EventType,
        phase: Phase,
        code: TaxonomyCode,
    ) -> Self {
        Self {
            event: Event {
                schema_version: SCHEMA_VERSION.to_string(),
                event_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                session_id,
                turn_sequence,
                source: "runtime".to_string(),
                event_type,
                pld: PldBlock {
                    phase,
                    code,
                    confidence: None,
                    metadata: Metadata::new(),
                },
                payload: Metadata::new(),
                runtime: Metadata::new(),
                ux: UxBlock::default(),
                metrics: Metadata::new(),
                extensions: Metadata::new(),
            },
        }
    }

    /// Set the logical source
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.event.source = source.into();
        self
    }

    /// Override the schema version
    #[must_use]
    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.event.schema_version = version.into();
        self
    }

    /// Override the event id
    #[must_use]
    pub fn event_id(mut self, id: Uuid) -> Self {
        self.event.event_id = id;
        self
    }

    /// Override the timestamp
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    /// Set classifier confidence
    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.event.pld.confidence = Some(confidence);
        self
    }

    /// Set signal metadata
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.event.pld.metadata = metadata;
        self
    }

    /// Set the opaque payload
    #[must_use]
    pub fn payload(mut self, payload: Metadata) -> Self {
        self.event.payload = payload;
        self
    }

    /// Add one runtime field
    #[must_use]
    pub fn runtime_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.runtime.insert(key.into(), value.into());
        self
    }

    /// Set extension fields
    #[must_use]
    pub fn extensions(mut self, extensions: Metadata) -> Self {
        self.event.extensions = extensions;
        self
    }

    /// Mark the event as user visible
    #[must_use]
    pub fn user_visible(mut self, visible: bool) -> Self {
        self.event.ux.user_visible_state_change = visible;
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Event {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wire_event() -> Value {
        json!({
            "schema_version": "2.0",
            "event_id": "6f1c2f9e-8a53-4d8c-9d0e-0c6b7a3c2a11",
            "timestamp": "2025-01-01T00:00:00Z",
            "session_id": "s1",
            "turn_sequence": 2,
            "source": "detector",
            "event_type": "drift_detected",
            "pld": { "phase": "drift", "code": "D4_tool_error", "confidence": 0.92 },
            "payload": { "tool_name": "search" },
            "ux": { "user_visible_state_change": false }
        })
    }

    #[test]
    fn decode_wire_event() {
        let event = Event::from_value(&wire_event()).unwrap();
        assert_eq!(event.session_id.as_str(), "s1");
        assert_eq!(event.turn_sequence, 2);
        assert_eq!(event.event_type, EventType::DriftDetected);
        assert_eq!(event.phase(), Phase::Drift);
        assert_eq!(event.pld.confidence, Some(0.92));
        assert_eq!(event.payload["tool_name"], json!("search"));
    }

    #[test]
    fn encode_decode_preserves_opaque_maps() {
        let event = Event::from_value(&wire_event()).unwrap();
        let back = Event::from_value(&event.to_value()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn missing_field_is_named() {
        let mut value = wire_event();
        value.as_object_mut().unwrap().remove("session_id");
        assert_eq!(
            Event::from_value(&value),
            Err(StructuralError::MissingField("session_id"))
        );

        let mut value = wire_event();
        value["pld"].as_object_mut().unwrap().remove("code");
        assert_eq!(
            Event::from_value(&value),
            Err(StructuralError::MissingField("pld.code"))
        );
    }

    #[test]
    fn zero_turn_sequence_is_malformed() {
        let mut value = wire_event();
        value["turn_sequence"] = json!(0);
        let err = Event::from_value(&value).unwrap_err();
        assert_eq!(err.field(), Some("turn_sequence"));
    }

    #[test]
    fn unknown_event_type_is_malformed() {
        let mut value = wire_event();
        value["event_type"] = json!("drift_resolved");
        let err = Event::from_value(&value).unwrap_err();
        assert_eq!(err.field(), Some("event_type"));
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let mut value = wire_event();
        value["timestamp"] = json!("yesterday");
        assert_eq!(Event::from_value(&value).unwrap_err().field(), Some("timestamp"));
    }

    #[test]
    fn non_object_input() {
        assert!(matches!(
            Event::from_json_str("[1, 2]"),
            Err(StructuralError::Malformed(_))
        ));
        assert!(matches!(
            Event::from_json_str("{"),
            Err(StructuralError::Malformed(_))
        ));
    }

    #[test]
    fn with_phase_leaves_original_untouched() {
        let event = Event::builder("s1", 1, EventType::DriftDetected, Phase::Repair, "D1_x").build();
        let fixed = event.with_phase(Phase::Drift);
        assert_eq!(event.phase(), Phase::Repair);
        assert_eq!(fixed.phase(), Phase::Drift);
        assert_eq!(fixed.event_id, event.event_id);
    }

    #[test]
    fn builder_defaults() {
        let event = Event::builder("s9", 3, EventType::Info, Phase::None, "INFO_generic")
            .runtime_field("latency_ms", 12)
            .build();
        assert_eq!(event.schema_version, SCHEMA_VERSION);
        assert_eq!(event.source, "runtime");
        assert_eq!(event.runtime["latency_ms"], json!(12));
        assert!(!event.ux.user_visible_state_change);
    }
}
