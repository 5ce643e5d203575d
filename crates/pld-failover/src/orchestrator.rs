//! Failover orchestration
//!
//! [`FailoverOrchestrator::run_step`] is a pure transition over
//! [`FailoverState`]: it returns a new snapshot, the reconciliation verdict
//! and the backoff delay as data. Sleeping between attempts is the caller's
//! business; [`FailoverOrchestrator::run_to_completion`] does it on tokio
//! timers.

use crate::backoff::BackoffPolicy;
use crate::error::Result;
use crate::reconciliation::{
    ReconciliationInput, ReconciliationOutcome, ReconciliationPolicy, ReconciliationResult,
};
use crate::strategy::{FailoverContext, RecoveryStrategy, SignalSink};
use pld_core::{Metadata, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default attempt budget
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Operational status of a failover session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverStatus {
    /// No failover in progress
    #[default]
    Idle,
    /// Attempts in progress
    Active,
    /// No further attempts
    Exhausted,
}

impl fmt::Display for FailoverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailoverStatus::Idle => "idle",
            FailoverStatus::Active => "active",
            FailoverStatus::Exhausted => "exhausted",
        })
    }
}

impl From<ReconciliationOutcome> for FailoverStatus {
    fn from(outcome: ReconciliationOutcome) -> Self {
        match outcome {
            ReconciliationOutcome::Continue => FailoverStatus::Active,
            ReconciliationOutcome::Recover => FailoverStatus::Idle,
            ReconciliationOutcome::Finalize | ReconciliationOutcome::Unknown => {
                FailoverStatus::Exhausted
            }
        }
    }
}

/// Immutable failover snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverState {
    /// Session under recovery
    pub session_id: SessionId,
    /// Attempts made so far (0 before the first)
    pub attempt: u32,
    /// Status
    pub status: FailoverStatus,
    /// Error recorded by the last attempt
    pub last_error: Option<String>,
    /// Runtime metadata accumulated across attempts
    #[serde(default)]
    pub metadata: Metadata,
}

impl FailoverState {
    /// Whether no further attempts will run
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.status == FailoverStatus::Exhausted
    }
}

/// Result of one orchestration step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailoverStepResult {
    /// New snapshot
    pub state: FailoverState,
    /// Reconciliation verdict
    pub reconciliation: ReconciliationResult,
    /// Delay before the next attempt, only when the outcome is `continue`
    pub backoff_delay: Option<Duration>,
}

/// Drives a recovery strategy under backoff and reconciliation policies
#[derive(Debug, Clone)]
pub struct FailoverOrchestrator {
    strategy: Arc<dyn RecoveryStrategy>,
    backoff: Arc<dyn BackoffPolicy>,
    reconciliation: Arc<dyn ReconciliationPolicy>,
    max_attempts: u32,
}

impl FailoverOrchestrator {
    /// Create orchestrator with the default attempt budget
    pub fn new(
        strategy: Arc<dyn RecoveryStrategy>,
        backoff: Arc<dyn BackoffPolicy>,
        reconciliation: Arc<dyn ReconciliationPolicy>,
    ) -> Self {
        Self {
            strategy,
            backoff,
            reconciliation,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set attempt budget
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Attempt budget
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Recovery strategy
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> &dyn RecoveryStrategy {
        self.strategy.as_ref()
    }

    /// Backoff policy
    #[inline]
    #[must_use]
    pub fn backoff(&self) -> &dyn BackoffPolicy {
        self.backoff.as_ref()
    }

    /// Reconciliation policy
    #[inline]
    #[must_use]
    pub fn reconciliation(&self) -> &dyn ReconciliationPolicy {
        self.reconciliation.as_ref()
    }

    /// Fresh idle state for a session
    #[must_use]
    pub fn initialize(&self, session_id: impl Into<SessionId>, metadata: Metadata) -> FailoverState {
        FailoverState {
            session_id: session_id.into(),
            attempt: 0,
            status: FailoverStatus::Idle,
            last_error: None,
            metadata,
        }
    }

    fn budget_detail(&self, state: &FailoverState, reason: &str) -> ReconciliationResult {
        ReconciliationResult::new(ReconciliationOutcome::Finalize, reason)
            .with_detail("attempt", json!(state.attempt))
            .with_detail("max_attempts", json!(self.max_attempts))
    }

    /// Run one failover attempt
    ///
    /// 1. exhausted state: finalize without running the strategy
    /// 2. budget spent: exhausted state, finalize
    /// 3. run the strategy with merged metadata
    /// 4. reconcile and map the outcome to the next status
    /// 5. compute backoff only when the outcome is `continue`
    ///
    /// The input state is never modified.
    ///
    /// # Errors
    /// Propagates backoff policy errors.
    pub fn run_step(
        &self,
        state: &FailoverState,
        sink: &mut dyn SignalSink,
        extra_metadata: Option<&Metadata>,
    ) -> Result<FailoverStepResult> {
        if state.is_exhausted() {
            return Ok(FailoverStepResult {
                state: state.clone(),
                reconciliation: self.budget_detail(state, "already_exhausted"),
                backoff_delay: None,
            });
        }

        let attempt = state.attempt + 1;
        if attempt > self.max_attempts {
            tracing::warn!(
                session_id = %state.session_id,
                attempts = state.attempt,
                max_attempts = self.max_attempts,
                "failover attempts exhausted"
            );
            return Ok(FailoverStepResult {
                state: FailoverState {
                    status: FailoverStatus::Exhausted,
                    last_error: Some("max_attempts_exceeded".to_string()),
                    ..state.clone()
                },
                reconciliation: self.budget_detail(state, "max_attempts_exceeded"),
                backoff_delay: None,
            });
        }

        let mut metadata = state.metadata.clone();
        if let Some(extra) = extra_metadata {
            metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut context = FailoverContext::new(&state.session_id, attempt, &metadata, sink);
        self.strategy.execute(&mut context);
        let last_error = context.into_last_error();

        let input = ReconciliationInput {
            session_id: state.session_id.clone(),
            attempt_count: attempt,
            strategy_name: self.strategy.name().to_string(),
            metadata: metadata.clone(),
        };
        let reconciliation = self.reconciliation.evaluate(&input);
        let status = FailoverStatus::from(reconciliation.outcome);

        let backoff_delay = match reconciliation.outcome {
            ReconciliationOutcome::Continue => Some(self.backoff.next_delay(attempt)?),
            _ => None,
        };

        tracing::info!(
            session_id = %state.session_id,
            attempt,
            strategy = self.strategy.name(),
            outcome = %reconciliation.outcome,
            reason = %reconciliation.reason_code,
            status = %status,
            error = last_error.as_deref(),
            "failover step"
        );

        Ok(FailoverStepResult {
            state: FailoverState {
                session_id: state.session_id.clone(),
                attempt,
                status,
                last_error,
                metadata,
            },
            reconciliation,
            backoff_delay,
        })
    }

    /// Step until no further delay is requested, sleeping on tokio timers
    ///
    /// Returns every step result in order; the last one carries the terminal
    /// outcome. Dropping the future cancels the loop between attempts.
    ///
    /// # Errors
    /// Propagates [`FailoverOrchestrator::run_step`] errors.
    pub async fn run_to_completion(
        &self,
        state: FailoverState,
        sink: &mut dyn SignalSink,
        extra_metadata: Option<&Metadata>,
    ) -> Result<Vec<FailoverStepResult>> {
        let mut steps = Vec::new();
        let mut state = state;
        loop {
            let step = self.run_step(&state, sink, extra_metadata)?;
            let delay = step.backoff_delay;
            state = step.state.clone();
            steps.push(step);
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Ok(steps),
            }
        }
    }
}
