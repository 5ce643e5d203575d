//! Reconciliation policies
//!
//! A reconciliation policy classifies the result of one failover attempt.

use pld_core::{ConfigError, Metadata, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::{self, Debug};

/// Classification of a failover attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationOutcome {
    /// Keep retrying after backoff
    Continue,
    /// Session recovered
    Recover,
    /// Stop; no further attempts
    Finalize,
    /// Could not classify; treated as terminal
    Unknown,
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconciliationOutcome::Continue => "continue",
            ReconciliationOutcome::Recover => "recover",
            ReconciliationOutcome::Finalize => "finalize",
            ReconciliationOutcome::Unknown => "unknown",
        })
    }
}

/// What a policy sees about the attempt just made
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationInput {
    /// Session
    pub session_id: SessionId,
    /// 1-based attempt just executed
    pub attempt_count: u32,
    /// Name of the recovery strategy
    pub strategy_name: String,
    /// Merged runtime metadata
    pub metadata: Metadata,
}

/// Policy verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Outcome
    pub outcome: ReconciliationOutcome,
    /// Machine readable reason
    pub reason_code: String,
    /// Free-form detail
    #[serde(default)]
    pub detail: Metadata,
}

impl ReconciliationResult {
    /// Create result
    pub fn new(outcome: ReconciliationOutcome, reason_code: impl Into<String>) -> Self {
        Self {
            outcome,
            reason_code: reason_code.into(),
            detail: Metadata::new(),
        }
    }

    /// Add a detail entry
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.detail.insert(key.to_string(), value);
        self
    }
}

/// Attempt classification
pub trait ReconciliationPolicy: Send + Sync + Debug {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Classify the attempt described by `input`
    fn evaluate(&self, input: &ReconciliationInput) -> ReconciliationResult;
}

/// Always `unknown`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReconciliation;

impl ReconciliationPolicy for NoOpReconciliation {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn evaluate(&self, input: &ReconciliationInput) -> ReconciliationResult {
        ReconciliationResult::new(ReconciliationOutcome::Unknown, "noop")
            .with_detail("state_passthrough", serde_json::to_value(input).unwrap_or_default())
    }
}

/// Retry-count policy
///
/// - attempt < threshold: continue
/// - attempt == threshold: recover
/// - attempt > threshold: finalize
/// - attempt 0: unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdReconciliation {
    threshold: u32,
}

impl ThresholdReconciliation {
    /// Default threshold
    pub const DEFAULT_THRESHOLD: u32 = 3;

    /// Create policy
    ///
    /// # Errors
    /// [`ConfigError`] when `threshold` is 0.
    pub fn new(threshold: u32) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::invalid("threshold", "must be >= 1"));
        }
        Ok(Self { threshold })
    }

    /// Configured threshold
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for ThresholdReconciliation {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

impl ReconciliationPolicy for ThresholdReconciliation {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn evaluate(&self, input: &ReconciliationInput) -> ReconciliationResult {
        let attempt = input.attempt_count;
        if attempt == 0 {
            return ReconciliationResult::new(ReconciliationOutcome::Unknown, "invalid_attempt_value")
                .with_detail("attempt_raw", json!(attempt));
        }
        let (outcome, reason) = match attempt.cmp(&self.threshold) {
            std::cmp::Ordering::Less => (ReconciliationOutcome::Continue, "below_threshold"),
            std::cmp::Ordering::Equal => (ReconciliationOutcome::Recover, "threshold_reached"),
            std::cmp::Ordering::Greater => (ReconciliationOutcome::Finalize, "exceeded_threshold"),
        };
        ReconciliationResult::new(outcome, reason)
            .with_detail("attempt", json!(attempt))
            .with_detail("threshold", json!(self.threshold))
    }
}
