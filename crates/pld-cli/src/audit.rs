//! `pld audit`: validate, apply and audit a JSON-lines transcript

use anyhow::{Context, Result};
use pld_controller::{PldController, RuntimeConfig, SessionState};
use pld_core::Event;
use pld_enforcement::{SequenceValidationResult, ValidationMode, Violation};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Line that was not applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedLine {
    /// 1-based line number
    pub line: usize,
    /// Decode error or MUST violations
    pub reason: String,
    /// MUST violations, empty for decode errors
    pub violations: Vec<Violation>,
}

/// Everything `pld audit` reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    /// Mode the transcript was validated in
    pub mode: ValidationMode,
    /// Non-blank lines read
    pub events: usize,
    /// Events applied to a session
    pub accepted: usize,
    /// Accepted events that were normalized first
    pub normalized: usize,
    /// Lines not applied
    pub rejected: Vec<RejectedLine>,
    /// Lifecycle violations raised while applying events
    pub lifecycle_violations: Vec<Violation>,
    /// Final state per session
    pub sessions: Vec<SessionState>,
    /// Sequence rules per session
    pub sequence: Vec<SequenceValidationResult>,
}

impl AuditReport {
    /// No rejected line and no session with a sequence error
    #[must_use]
    pub fn passed(&self) -> bool {
        self.rejected.is_empty() && self.sequence.iter().all(|r| r.is_valid)
    }

    /// Human readable report
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "PLD Transcript Audit ({})", self.mode);
        let _ = writeln!(out, "==========================");
        let _ = writeln!(
            out,
            "Events: {}  accepted: {}  normalized: {}  rejected: {}",
            self.events,
            self.accepted,
            self.normalized,
            self.rejected.len()
        );
        for rejected in &self.rejected {
            let _ = writeln!(out, "  line {}: {}", rejected.line, rejected.reason);
        }
        if !self.lifecycle_violations.is_empty() {
            let _ = writeln!(out, "Lifecycle violations: {}", self.lifecycle_violations.len());
            for violation in &self.lifecycle_violations {
                let _ = writeln!(out, "  {violation}");
            }
        }
        let _ = writeln!(out);
        for state in &self.sessions {
            let result = self.sequence.iter().find(|r| r.session_id == state.session_id);
            let status = match result {
                Some(r) if !r.is_valid => "NON-COMPLIANT",
                _ => "OK",
            };
            let _ = writeln!(
                out,
                "Session {}: phase={} open={} failover={} [{status}]",
                state.session_id, state.phase, state.is_open, state.failover_active
            );
            for violation in result.into_iter().flat_map(|r| &r.violations) {
                let _ = writeln!(
                    out,
                    "  {} {} {}",
                    violation.severity, violation.rule_id, violation.message
                );
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Status: {}", if self.passed() { "PASSED" } else { "FAILED" });
        out
    }
}

/// Load the configuration file if given, else defaults
///
/// # Errors
/// Fails when the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Audit the transcript at `path`
///
/// `mode` overrides the configured validation mode.
///
/// # Errors
/// Fails when the configuration is invalid or the file cannot be read.
/// Malformed lines are reported, not returned as errors.
pub fn run_audit(path: &Path, config: RuntimeConfig, mode: Option<ValidationMode>) -> Result<AuditReport> {
    let config = match mode {
        Some(mode) => config.with_mode(mode),
        None => config,
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading transcript {}", path.display()))?;
    let controller = PldController::new(config).context("building controller")?;
    Ok(audit_lines(&controller, &text))
}

/// Audit transcript text with an existing controller
#[must_use]
pub fn audit_lines(controller: &PldController, text: &str) -> AuditReport {
    let mut applied: Vec<Event> = Vec::new();
    let mut rejected = Vec::new();
    let mut lifecycle_violations = Vec::new();
    let mut events = 0;
    let mut normalized = 0;

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        events += 1;
        let line_no = index + 1;

        let outcome = match controller.ingest_json(line) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "undecodable event");
                rejected.push(RejectedLine {
                    line: line_no,
                    reason: err.to_string(),
                    violations: Vec::new(),
                });
                continue;
            }
        };

        if outcome.report.normalized.is_some() {
            normalized += usize::from(outcome.accepted.is_some());
        }
        match (outcome.accepted, outcome.transition) {
            (Some(event), Some(transition)) => {
                lifecycle_violations.extend(transition.violations);
                applied.push(event);
            }
            _ => {
                let violations: Vec<Violation> = outcome.report.must_violations().cloned().collect();
                let reason = violations
                    .iter()
                    .map(|v| v.rule_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                rejected.push(RejectedLine {
                    line: line_no,
                    reason: format!("rejected by {reason}"),
                    violations,
                });
            }
        }
    }

    let sessions = controller
        .sessions()
        .session_ids()
        .iter()
        .filter_map(|id| controller.state(id.as_str()))
        .collect();
    let sequence = controller.audit(&applied);

    tracing::info!(
        events,
        accepted = applied.len(),
        rejected = rejected.len(),
        sessions = sequence.len(),
        "transcript audited"
    );

    AuditReport {
        mode: controller.mode(),
        events,
        accepted: applied.len(),
        normalized,
        rejected,
        lifecycle_violations,
        sessions,
        sequence,
    }
}
