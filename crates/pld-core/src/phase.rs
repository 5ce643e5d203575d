//! Lifecycle phases

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One lifecycle stage of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No lifecycle phase (observability and system events)
    #[default]
    None,
    /// Normal continuation
    Continue,
    /// Agent drifted from instructions or context
    Drift,
    /// Repair in progress
    Repair,
    /// Agent re-entered the expected trajectory
    Reentry,
    /// Session reached an outcome (terminal)
    Outcome,
    /// Recovery declared after repair failed
    Failover,
}

impl Phase {
    /// Every phase, in declaration order
    pub const ALL: [Phase; 7] = [
        Phase::None,
        Phase::Continue,
        Phase::Drift,
        Phase::Repair,
        Phase::Reentry,
        Phase::Outcome,
        Phase::Failover,
    ];

    /// Wire name of this phase
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::None => "none",
            Phase::Continue => "continue",
            Phase::Drift => "drift",
            Phase::Repair => "repair",
            Phase::Reentry => "reentry",
            Phase::Outcome => "outcome",
            Phase::Failover => "failover",
        }
    }

    /// Terminal phases have no outgoing transitions
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Phase::Outcome)
    }

    /// Whether this phase belongs to the lifecycle (anything but `none`)
    #[inline]
    #[must_use]
    pub const fn is_lifecycle(self) -> bool {
        !matches!(self, Phase::None)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseError::UnknownPhase(s.to_string()))
    }
}
