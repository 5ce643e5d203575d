//! `pld failover`: dry-run the configured orchestration

use anyhow::{Context, Result};
use pld_controller::RuntimeConfig;
use pld_core::Metadata;
use pld_failover::{DiscardSink, FailoverRegistry, FailoverStatus, FailoverStepResult};
use std::fmt::Write as _;

/// Run steps until the orchestration stops being active
///
/// Uses the strategy named in the configuration, or the no-op strategy, and
/// never sleeps: each step's delay is reported instead.
///
/// # Errors
/// Fails when the failover section names unknown policies or strategies.
pub fn run_failover(session_id: &str, config: &RuntimeConfig) -> Result<Vec<FailoverStepResult>> {
    let orchestrator = FailoverRegistry::with_defaults()
        .orchestrator_from_spec(&config.failover)
        .context("building failover orchestrator")?;

    let mut state = orchestrator.initialize(session_id, Metadata::new());
    let mut steps = Vec::new();
    // One extra step observes exhaustion when reconciliation never ends it.
    for _ in 0..=orchestrator.max_attempts() {
        let step = orchestrator.run_step(&state, &mut DiscardSink, None)?;
        state = step.state.clone();
        steps.push(step);
        if state.status != FailoverStatus::Active {
            break;
        }
    }
    Ok(steps)
}

/// Table of steps
#[must_use]
pub fn render_steps(session_id: &str, steps: &[FailoverStepResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Failover dry-run for session {session_id}");
    let _ = writeln!(out, "{:<8} {:<10} {:<10} {:<22} delay", "attempt", "status", "outcome", "reason");
    for step in steps {
        let delay = step
            .backoff_delay
            .map_or_else(|| "-".to_string(), |d| format!("{:.3}s", d.as_secs_f64()));
        let _ = writeln!(
            out,
            "{:<8} {:<10} {:<10} {:<22} {delay}",
            step.state.attempt,
            step.state.status.to_string(),
            step.reconciliation.outcome.to_string(),
            step.reconciliation.reason_code
        );
    }
    out
}
