//! Concurrent session registry
//!
//! One [`SessionStateMachine`] per session behind its own lock, so events of
//! one session are applied by a single writer while independent sessions
//! proceed in parallel.

use crate::state_machine::{SessionState, SessionStateMachine, StateTransition};
use dashmap::DashMap;
use parking_lot::Mutex;
use pld_core::{Event, SessionId};
use std::sync::Arc;

/// Session id → state machine
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Mutex<SessionStateMachine>>>,
}

impl SessionRegistry {
    /// Create empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event` to its session, creating the session on first sight
    pub fn apply(&self, event: &Event) -> StateTransition {
        let machine = self.machine(&event.session_id);
        let mut guard = machine.lock();
        guard.apply(event)
    }

    /// Copy of a session's current state
    #[must_use]
    pub fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        let machine = self.sessions.get(session_id)?.value().clone();
        let guard = machine.lock();
        Some(guard.state().clone())
    }

    /// Drop a session, returning its final state
    pub fn forget(&self, session_id: &str) -> Option<SessionState> {
        let (_, machine) = self.sessions.remove(session_id)?;
        let guard = machine.lock();
        Some(guard.state().clone())
    }

    /// Number of tracked sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// No sessions tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tracked session ids, sorted
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // The map shard lock is released before the session lock is taken.
    fn machine(&self, session_id: &SessionId) -> Arc<Mutex<SessionStateMachine>> {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.value().clone();
        }
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                tracing::debug!(session_id = %session_id, "session created");
                Arc::new(Mutex::new(SessionStateMachine::new(session_id.clone())))
            })
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pld_core::{EventType, Phase};
    use std::thread;

    fn event(session: &str, turn: u64) -> Event {
        Event::builder(session, turn, EventType::ContinueAllowed, Phase::Continue, "C0_normal").build()
    }

    #[test]
    fn registry_new_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.snapshot("s1").is_none());
    }

    #[test]
    fn registry_creates_lazily() {
        let registry = SessionRegistry::new();
        registry.apply(&event("s1", 1));
        assert_eq!(registry.len(), 1);

        let state = registry.snapshot("s1").unwrap();
        assert!(state.is_open);
        assert_eq!(state.phase, Phase::Continue);
    }

    #[test]
    fn registry_forget() {
        let registry = SessionRegistry::new();
        registry.apply(&event("s1", 1));
        assert!(registry.forget("s1").is_some());
        assert!(registry.is_empty());
        assert!(registry.forget("s1").is_none());
    }

    #[test]
    fn registry_parallel_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let session = format!("s{i}");
                    for turn in 1..=20 {
                        registry.apply(&event(&session, turn));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8);
        assert_eq!(registry.session_ids()[0].as_str(), "s0");
        assert_eq!(registry.snapshot("s7").unwrap().last_turn, Some(20));
    }
}
