//! Runtime signal bridge
//!
//! Turns runtime-local signals (a detector noticing a tool error, a turn
//! completing normally) into canonical lifecycle events. Every built event
//! passes the same prefix and event-type rules the [`ValidationEngine`]
//! enforces on ingestion, so the bridge never emits an event the controller
//! would reject.

use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use pld_core::{Event, EventType, Metadata, ParseError, Phase, PhaseConstraint, SessionId, TaxonomyCode};
use pld_enforcement::{check_code_phase, ValidationEngine, ValidationMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Runtime-local signal identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Agent ignored an instruction
    InstructionDrift,
    /// Agent lost conversational context
    ContextDrift,
    /// Agent is repeating the same plan
    RepeatedPlan,
    /// Tool call failed
    ToolError,
    /// Agent asked itself for clarification
    Clarification,
    /// Light-touch correction
    SoftRepair,
    /// Response rewritten
    Rewrite,
    /// User asked to clarify
    RequestUserClarification,
    /// Conversation state reset
    HardReset,
    /// Nominal turn
    ContinueNormal,
    /// Nominal user turn
    ContinueUserTurn,
    /// Nominal system turn
    ContinueSystemTurn,
    /// Session ended
    SessionClosed,
    /// Response latency above threshold
    LatencySpike,
    /// Conversation paused
    PauseDetected,
    /// PRDR metric sample
    MetricPrdr,
    /// VRL metric sample
    MetricVrl,
    /// Generic diagnostic
    Info,
    /// Runtime opened the session
    SessionInit,
}

impl SignalKind {
    /// Every signal kind
    pub const ALL: [SignalKind; 19] = [
        Self::InstructionDrift,
        Self::ContextDrift,
        Self::RepeatedPlan,
        Self::ToolError,
        Self::Clarification,
        Self::SoftRepair,
        Self::Rewrite,
        Self::RequestUserClarification,
        Self::HardReset,
        Self::ContinueNormal,
        Self::ContinueUserTurn,
        Self::ContinueSystemTurn,
        Self::SessionClosed,
        Self::LatencySpike,
        Self::PauseDetected,
        Self::MetricPrdr,
        Self::MetricVrl,
        Self::Info,
        Self::SessionInit,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstructionDrift => "instruction_drift",
            Self::ContextDrift => "context_drift",
            Self::RepeatedPlan => "repeated_plan",
            Self::ToolError => "tool_error",
            Self::Clarification => "clarification",
            Self::SoftRepair => "soft_repair",
            Self::Rewrite => "rewrite",
            Self::RequestUserClarification => "request_user_clarification",
            Self::HardReset => "hard_reset",
            Self::ContinueNormal => "continue_normal",
            Self::ContinueUserTurn => "continue_user_turn",
            Self::ContinueSystemTurn => "continue_system_turn",
            Self::SessionClosed => "session_closed",
            Self::LatencySpike => "latency_spike",
            Self::PauseDetected => "pause_detected",
            Self::MetricPrdr => "metric_prdr",
            Self::MetricVrl => "metric_vrl",
            Self::Info => "info",
            Self::SessionInit => "session_init",
        }
    }

    /// Built-in mapping for this kind
    #[must_use]
    pub fn default_mapping(self) -> SignalMapping {
        use EventType as T;
        let (event_type, phase, code, confidence) = match self {
            Self::InstructionDrift => (T::DriftDetected, Phase::Drift, "D1_instruction", Some(0.9)),
            Self::ContextDrift => (T::DriftDetected, Phase::Drift, "D2_context", Some(0.9)),
            Self::RepeatedPlan => (T::DriftDetected, Phase::Drift, "D3_repeated_plan", Some(0.9)),
            Self::ToolError => (T::DriftDetected, Phase::Drift, "D4_tool_error", Some(0.9)),
            Self::Clarification => (T::RepairTriggered, Phase::Repair, "R1_clarify", Some(0.9)),
            Self::SoftRepair => (T::RepairTriggered, Phase::Repair, "R2_soft_repair", Some(0.9)),
            Self::Rewrite => (T::RepairTriggered, Phase::Repair, "R3_rewrite", Some(0.9)),
            Self::RequestUserClarification => (
                T::RepairTriggered,
                Phase::Repair,
                "R4_request_clarification",
                Some(0.9),
            ),
            Self::HardReset => (T::RepairTriggered, Phase::Repair, "R5_hard_reset", Some(0.9)),
            Self::ContinueNormal => (T::ContinueAllowed, Phase::Continue, "C0_normal", None),
            Self::ContinueUserTurn => (T::ContinueAllowed, Phase::Continue, "C0_user_turn", None),
            Self::ContinueSystemTurn => (T::ContinueAllowed, Phase::Continue, "C0_system_turn", None),
            Self::SessionClosed => (T::SessionClosed, Phase::Outcome, "O0_session_closed", None),
            Self::LatencySpike => (T::LatencySpike, Phase::None, "INFO_latency_spike", None),
            Self::PauseDetected => (T::PauseDetected, Phase::None, "INFO_pause_detected", None),
            Self::MetricPrdr => (T::Info, Phase::None, "M1_PRDR", None),
            Self::MetricVrl => (T::Info, Phase::None, "M2_VRL", None),
            Self::Info => (T::Info, Phase::None, "INFO_generic", None),
            Self::SessionInit => (T::Info, Phase::None, pld_core::SYSTEM_INIT_CODE, None),
        };
        SignalMapping {
            event_type,
            phase,
            code: TaxonomyCode::new(code),
            default_confidence: confidence,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = ParseError;

    // Signal kinds share the event-type parse error: both are wire enums.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseError::UnknownEventType(s.to_string()))
    }
}

/// Lifecycle semantics a signal kind maps to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMapping {
    /// Event type
    pub event_type: EventType,
    /// Phase before mode-dependent resolution
    pub phase: Phase,
    /// Taxonomy code
    pub code: TaxonomyCode,
    /// Confidence used when the signal carries none
    pub default_confidence: Option<f64>,
}

/// One runtime observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSignal {
    /// Signal kind
    pub kind: SignalKind,
    /// Copied to the event payload
    #[serde(default)]
    pub payload: Metadata,
    /// Classifier confidence in `[0, 1]`
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Copied to `pld.metadata`
    #[serde(default)]
    pub metadata: Metadata,
}

impl RuntimeSignal {
    /// Signal with empty payload and metadata
    #[must_use]
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            payload: Metadata::new(),
            confidence: None,
            metadata: Metadata::new(),
        }
    }

    /// Set payload
    #[must_use]
    pub fn with_payload(mut self, payload: Metadata) -> Self {
        self.payload = payload;
        self
    }

    /// Set confidence
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Where and when a signal was observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Owning session
    pub session_id: SessionId,
    /// 1-based turn index
    pub turn_sequence: u64,
    /// Logical origin
    pub source: String,
    /// Model identifier
    #[serde(default)]
    pub model: Option<String>,
    /// Tool identifier
    #[serde(default)]
    pub tool: Option<String>,
    /// Opaque agent state key
    #[serde(default)]
    pub agent_state: Option<String>,
    /// Phase MAY event types inherit
    #[serde(default)]
    pub current_phase: Option<Phase>,
}

impl EventContext {
    /// Context with only the required fields
    #[must_use]
    pub fn new(session_id: impl Into<SessionId>, turn_sequence: u64, source: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turn_sequence,
            source: source.into(),
            model: None,
            tool: None,
            agent_state: None,
            current_phase: None,
        }
    }

    /// Set model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set tool
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Set agent state key
    #[must_use]
    pub fn with_agent_state(mut self, state: impl Into<String>) -> Self {
        self.agent_state = Some(state.into());
        self
    }

    /// Set current phase
    #[must_use]
    pub fn with_current_phase(mut self, phase: Phase) -> Self {
        self.current_phase = Some(phase);
        self
    }
}

/// Optional envelope overrides for [`SignalBridge::build_event_with`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitOptions {
    /// `ux.user_visible_state_change`
    pub user_visible: bool,
    /// Timestamp instead of now
    pub timestamp: Option<DateTime<Utc>>,
    /// Extra `runtime.*` fields
    pub runtime_fields: Metadata,
    /// `extensions.*` fields
    pub extensions: Metadata,
}

/// Signal → event translator
#[derive(Debug, Clone)]
pub struct SignalBridge {
    mode: ValidationMode,
    engine: ValidationEngine,
    mappings: BTreeMap<SignalKind, SignalMapping>,
}

impl Default for SignalBridge {
    fn default() -> Self {
        Self::new(ValidationMode::Strict)
    }
}

impl SignalBridge {
    /// Bridge with the built-in mapping table
    #[must_use]
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            engine: ValidationEngine::default(),
            mappings: SignalKind::ALL
                .into_iter()
                .map(|k| (k, k.default_mapping()))
                .collect(),
        }
    }

    /// Use a specific validation engine
    #[must_use]
    pub fn with_engine(mut self, engine: ValidationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Override the mapping of one kind
    #[must_use]
    pub fn with_mapping(mut self, kind: SignalKind, mapping: SignalMapping) -> Self {
        self.mappings.insert(kind, mapping);
        self
    }

    /// Stop bridging one kind
    #[must_use]
    pub fn without_mapping(mut self, kind: SignalKind) -> Self {
        self.mappings.remove(&kind);
        self
    }

    /// Validation mode
    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Mapping of `kind`, if bridged
    #[must_use]
    pub fn mapping(&self, kind: SignalKind) -> Option<&SignalMapping> {
        self.mappings.get(&kind)
    }

    /// Build an event with default envelope options
    ///
    /// # Errors
    /// See [`SignalBridge::build_event_with`].
    pub fn build_event(&self, signal: &RuntimeSignal, context: &EventContext) -> Result<Event, BridgeError> {
        self.build_event_with(signal, context, &EmitOptions::default())
    }

    /// Build an event
    ///
    /// # Errors
    /// - [`BridgeError::Unmapped`]: the kind is not bridged
    /// - [`BridgeError::MustViolation`]: the mapping phase breaks a MUST
    ///   event type outside normalize mode
    /// - [`BridgeError::PrefixMismatch`]: the resolved phase contradicts the code
    /// - [`BridgeError::Rejected`]: the built event failed validation
    pub fn build_event_with(
        &self,
        signal: &RuntimeSignal,
        context: &EventContext,
        options: &EmitOptions,
    ) -> Result<Event, BridgeError> {
        let mapping = self
            .mappings
            .get(&signal.kind)
            .ok_or(BridgeError::Unmapped(signal.kind))?;

        let phase = self.resolve_phase(mapping, context)?;
        if let Some(violation) = check_code_phase(&mapping.code, phase) {
            return Err(BridgeError::PrefixMismatch(violation));
        }

        let mut builder = Event::builder(
            context.session_id.clone(),
            context.turn_sequence,
            mapping.event_type,
            phase,
            mapping.code.clone(),
        )
        .source(context.source.clone())
        .metadata(signal.metadata.clone())
        .payload(signal.payload.clone())
        .extensions(options.extensions.clone())
        .user_visible(options.user_visible)
        .runtime_field("turn_sequence", context.turn_sequence);

        for (key, value) in [
            ("model", &context.model),
            ("tool", &context.tool),
            ("agent_state", &context.agent_state),
        ] {
            let value = value.clone().map_or(Value::Null, Value::from);
            builder = builder.runtime_field(key, value);
        }
        for (key, value) in &options.runtime_fields {
            builder = builder.runtime_field(key.clone(), value.clone());
        }
        if let Some(confidence) = signal.confidence.or(mapping.default_confidence) {
            builder = builder.confidence(confidence);
        }
        if let Some(timestamp) = options.timestamp {
            builder = builder.timestamp(timestamp);
        }
        let event = builder.build();

        let report = self.engine.validate(&event, self.mode);
        if !report.is_valid {
            return Err(BridgeError::Rejected(report.violations));
        }
        if report.has_should_violations {
            tracing::warn!(
                session_id = %event.session_id,
                turn = event.turn_sequence,
                signal = %signal.kind,
                rules = ?report.violations.iter().map(|v| v.rule_id.as_str()).collect::<Vec<_>>(),
                "bridged event has advisory violations"
            );
        }
        tracing::debug!(
            session_id = %event.session_id,
            turn = event.turn_sequence,
            signal = %signal.kind,
            event_type = %event.event_type,
            phase = %event.phase(),
            "signal bridged"
        );
        Ok(event)
    }

    fn resolve_phase(&self, mapping: &SignalMapping, context: &EventContext) -> Result<Phase, BridgeError> {
        match mapping.event_type.phase_constraint() {
            PhaseConstraint::May => Ok(self.may_phase(mapping, context)),
            PhaseConstraint::Must(required) if required != mapping.phase => {
                if self.mode == ValidationMode::Normalize {
                    Ok(required)
                } else {
                    Err(BridgeError::MustViolation {
                        event_type: mapping.event_type,
                        required,
                        got: mapping.phase,
                    })
                }
            }
            PhaseConstraint::Should(expected) if self.mode == ValidationMode::Normalize => Ok(expected),
            _ => Ok(mapping.phase),
        }
    }

    // The current phase is only inherited when the code allows it.
    fn may_phase(&self, mapping: &SignalMapping, context: &EventContext) -> Phase {
        self.engine
            .resolve_may_phase(mapping.event_type, context.current_phase)
            .filter(|phase| check_code_phase(&mapping.code, *phase).is_none())
            .unwrap_or(mapping.phase)
    }
}
