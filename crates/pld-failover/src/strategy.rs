//! Recovery strategies and the context they run in

use pld_core::{Metadata, SessionId};
use std::fmt::Debug;

/// Receives side effects a strategy reports during an attempt
///
/// `emit` forwards failover signals to the runtime (usually back into the
/// signal bridge); `log` is an optional structured log hook that writes a
/// `tracing` event unless overridden.
pub trait SignalSink {
    /// Report a signal of the given kind
    fn emit(&mut self, kind: &str, payload: &Metadata);

    /// Record a runtime log line
    fn log(&mut self, message: &str, fields: &Metadata) {
        tracing::debug!(?fields, "{message}");
    }
}

impl<F> SignalSink for F
where
    F: FnMut(&str, &Metadata),
{
    fn emit(&mut self, kind: &str, payload: &Metadata) {
        self(kind, payload);
    }
}

/// Sink that drops every signal
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl SignalSink for DiscardSink {
    fn emit(&mut self, _kind: &str, _payload: &Metadata) {}
}

/// Per-attempt context handed to a [`RecoveryStrategy`]
pub struct FailoverContext<'a> {
    session_id: &'a SessionId,
    attempt: u32,
    metadata: &'a Metadata,
    sink: &'a mut dyn SignalSink,
    last_error: Option<String>,
}

impl<'a> FailoverContext<'a> {
    /// Create context
    pub fn new(
        session_id: &'a SessionId,
        attempt: u32,
        metadata: &'a Metadata,
        sink: &'a mut dyn SignalSink,
    ) -> Self {
        Self {
            session_id,
            attempt,
            metadata,
            sink,
            last_error: None,
        }
    }

    /// Session under recovery
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        self.session_id
    }

    /// 1-based attempt number
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Merged runtime metadata
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        self.metadata
    }

    /// Emit a failover signal
    pub fn emit(&mut self, kind: &str, payload: &Metadata) {
        self.sink.emit(kind, payload);
    }

    /// Log through the sink's log hook, inside a span naming the attempt
    pub fn log(&mut self, message: &str, fields: &Metadata) {
        let _span = tracing::debug_span!(
            "failover_attempt",
            session_id = %self.session_id,
            attempt = self.attempt
        )
        .entered();
        self.sink.log(message, fields);
    }

    /// Record that this attempt failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Error recorded by the strategy, if any
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn into_last_error(self) -> Option<String> {
        self.last_error
    }
}

/// Pluggable recovery action executed once per failover attempt
///
/// Strategies report failure with [`FailoverContext::fail`] and side effects
/// through [`FailoverContext::emit`]; they never build events themselves.
pub trait RecoveryStrategy: Send + Sync + Debug {
    /// Strategy name
    fn name(&self) -> &str;

    /// Run one attempt
    fn execute(&self, context: &mut FailoverContext<'_>);
}

/// Strategy that does nothing; used for dry runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStrategy;

impl RecoveryStrategy for NoOpStrategy {
    fn name(&self) -> &str {
        "noop"
    }

    fn execute(&self, context: &mut FailoverContext<'_>) {
        context.log("noop recovery attempt", &Metadata::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closure_sink_receives_emits() {
        let mut seen = Vec::new();
        let mut sink = |kind: &str, payload: &Metadata| seen.push((kind.to_string(), payload.clone()));
        let session = SessionId::new("s1");
        let metadata = Metadata::new();
        let mut ctx = FailoverContext::new(&session, 1, &metadata, &mut sink);

        let mut payload = Metadata::new();
        payload.insert("reason".into(), json!("timeout"));
        ctx.emit("failover_attempt", &payload);
        ctx.fail("timeout");
        assert_eq!(ctx.last_error(), Some("timeout"));
        drop(ctx);

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "failover_attempt");
    }

    #[test]
    fn test_default_log_hook_does_not_emit() {
        let mut emitted = 0;
        let mut sink = |_: &str, _: &Metadata| emitted += 1;
        let session = SessionId::new("s1");
        let metadata = Metadata::new();
        let mut ctx = FailoverContext::new(&session, 1, &metadata, &mut sink);

        let mut fields = Metadata::new();
        fields.insert("backend".into(), json!("secondary"));
        ctx.log("switching backend", &fields);
        drop(ctx);

        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_noop_strategy_records_no_error() {
        let session = SessionId::new("s1");
        let metadata = Metadata::new();
        let mut sink = DiscardSink;
        let mut ctx = FailoverContext::new(&session, 2, &metadata, &mut sink);
        NoOpStrategy.execute(&mut ctx);
        assert_eq!(ctx.attempt(), 2);
        assert!(ctx.last_error().is_none());
    }
}
