//! Runtime configuration
//!
//! Loaded from TOML or YAML by file extension:
//!
//! ```toml
//! [validation]
//! mode = "normalize"
//! schema_version = "2.0"
//!
//! [sequence]
//! recovery_event_types = ["reentry_observed", "continue_allowed", "session_closed"]
//!
//! [failover]
//! max_attempts = 3
//! backoff = { name = "exponential", config = { base_seconds = 0.5 } }
//! reconciliation = { name = "threshold", config = { threshold = 3 } }
//!
//! [thresholds.PRDR]
//! warn = 30.0
//! critical = 50.0
//! ```
//!
//! Every section is optional. A document that parses but describes an
//! unusable setup is rejected by [`RuntimeConfig::validate`].

use pld_core::ConfigError;
use pld_enforcement::{SequenceConfig, ThresholdEvaluator, ValidationConfig, ValidationMode};
use pld_failover::{FailoverRegistry, FailoverSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Validation section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Mode applied on ingestion
    pub mode: ValidationMode,
    /// Engine configuration
    #[serde(flatten)]
    pub engine: ValidationConfig,
}

/// Complete controller configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-event validation
    pub validation: ValidationSettings,
    /// Transcript rules
    pub sequence: SequenceConfig,
    /// Failover wiring
    pub failover: FailoverSpec,
    /// Metric thresholds
    pub thresholds: ThresholdEvaluator,
}

impl RuntimeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With validation mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.validation.mode = mode;
        self
    }

    /// With engine configuration
    #[inline]
    #[must_use]
    pub fn with_validation(mut self, engine: ValidationConfig) -> Self {
        self.validation.engine = engine;
        self
    }

    /// With sequence configuration
    #[inline]
    #[must_use]
    pub fn with_sequence(mut self, sequence: SequenceConfig) -> Self {
        self.sequence = sequence;
        self
    }

    /// With failover wiring
    #[inline]
    #[must_use]
    pub fn with_failover(mut self, failover: FailoverSpec) -> Self {
        self.failover = failover;
        self
    }

    /// With metric thresholds
    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: ThresholdEvaluator) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Parse a TOML document and validate it
    ///
    /// # Errors
    /// [`ConfigError::Load`] on syntax errors, otherwise see [`RuntimeConfig::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document and validate it
    ///
    /// # Errors
    /// [`ConfigError::Load`] on syntax errors, otherwise see [`RuntimeConfig::validate`].
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file
    ///
    /// # Errors
    /// [`ConfigError::Load`] when the file cannot be read, has another
    /// extension or does not parse; validation errors otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&source)?,
            Some("yaml" | "yml") => Self::from_yaml_str(&source)?,
            other => {
                return Err(ConfigError::Load(format!(
                    "{}: unsupported extension {}",
                    path.display(),
                    other.unwrap_or("(none)")
                )))
            }
        };
        tracing::info!(path = %path.display(), mode = %config.validation.mode, "configuration loaded");
        Ok(config)
    }

    /// Reject configurations the runtime could not use
    ///
    /// # Errors
    /// [`ConfigError`] for an empty recovery set, a zero attempt budget or
    /// failover policies the built-in registry cannot construct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence.recovery_event_types.is_empty() {
            return Err(ConfigError::invalid(
                "sequence.recovery_event_types",
                "must name at least one event type",
            ));
        }
        if self.failover.max_attempts == 0 {
            return Err(ConfigError::invalid("failover.max_attempts", "must be >= 1"));
        }
        if self.validation.engine.schema_version.trim().is_empty() {
            return Err(ConfigError::invalid("validation.schema_version", "must not be empty"));
        }

        let registry = FailoverRegistry::with_defaults();
        registry.create_backoff(&self.failover.backoff.name, &self.failover.backoff.config)?;
        registry.create_reconciliation(
            &self.failover.reconciliation.name,
            &self.failover.reconciliation.config,
        )?;
        Ok(())
    }
}
