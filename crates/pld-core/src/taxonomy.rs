//! Taxonomy codes and lifecycle prefixes
//!
//! A taxonomy code such as `D4_tool_error` carries its phase in the prefix:
//! the segment before the first `_`, with trailing digits stripped. Lifecycle
//! prefixes map to exactly one phase; every other prefix (`INFO`, `SYS`,
//! `META`, `M`, ...) is non-lifecycle and implies phase `none`.

use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event schema version produced by this runtime
pub const SCHEMA_VERSION: &str = "2.0";

/// Reserved code for system-initiated session start
pub const SYSTEM_INIT_CODE: &str = "SYS_session_init";

/// Lifecycle code prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePrefix {
    /// `D` - drift
    Drift,
    /// `R` - repair
    Repair,
    /// `RE` - reentry
    Reentry,
    /// `C` - continue
    Continue,
    /// `O` - outcome
    Outcome,
    /// `F` - failover
    Failover,
}

impl LifecyclePrefix {
    /// Parse a stripped prefix (`"RE"`, `"D"`, ...)
    #[must_use]
    pub fn parse(prefix: &str) -> Option<Self> {
        match prefix {
            "D" => Some(Self::Drift),
            "R" => Some(Self::Repair),
            "RE" => Some(Self::Reentry),
            "C" => Some(Self::Continue),
            "O" => Some(Self::Outcome),
            "F" => Some(Self::Failover),
            _ => None,
        }
    }

    /// Phase implied by this prefix
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Self::Drift => Phase::Drift,
            Self::Repair => Phase::Repair,
            Self::Reentry => Phase::Reentry,
            Self::Continue => Phase::Continue,
            Self::Outcome => Phase::Outcome,
            Self::Failover => Phase::Failover,
        }
    }

    /// Prefix text
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drift => "D",
            Self::Repair => "R",
            Self::Reentry => "RE",
            Self::Continue => "C",
            Self::Outcome => "O",
            Self::Failover => "F",
        }
    }
}

/// Taxonomy code (`pld.code`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyCode(String);

impl TaxonomyCode {
    /// Wrap a code string
    #[inline]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Raw code
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix segment with trailing digits stripped
    ///
    /// `"D4_tool_error"` yields `"D"`, `"RE1_resume"` yields `"RE"`,
    /// `"INFO_generic"` yields `"INFO"`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        let head = self.0.split('_').next().unwrap_or_default();
        head.trim_end_matches(|c: char| c.is_ascii_digit())
    }

    /// Lifecycle prefix, if the code carries one
    #[inline]
    #[must_use]
    pub fn lifecycle_prefix(&self) -> Option<LifecyclePrefix> {
        LifecyclePrefix::parse(self.prefix())
    }

    /// Phase implied by the prefix (`none` for non-lifecycle prefixes)
    #[inline]
    #[must_use]
    pub fn implied_phase(&self) -> Phase {
        self.lifecycle_prefix().map_or(Phase::None, LifecyclePrefix::phase)
    }

    /// Whether the code carries a lifecycle prefix
    #[inline]
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        self.lifecycle_prefix().is_some()
    }

    /// Whether this is the reserved system-init code
    #[inline]
    #[must_use]
    pub fn is_system_init(&self) -> bool {
        self.0 == SYSTEM_INIT_CODE
    }
}

impl fmt::Display for TaxonomyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaxonomyCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaxonomyCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaxonomyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn prefix_strips_trailing_digits() {
        assert_eq!(TaxonomyCode::new("D4_tool_error").prefix(), "D");
        assert_eq!(TaxonomyCode::new("RE1_resume").prefix(), "RE");
        assert_eq!(TaxonomyCode::new("C0_normal").prefix(), "C");
        assert_eq!(TaxonomyCode::new("M1_PRDR").prefix(), "M");
        assert_eq!(TaxonomyCode::new("SYS_session_init").prefix(), "SYS");
    }

    #[test]
    fn prefix_without_underscore() {
        assert_eq!(TaxonomyCode::new("F2").prefix(), "F");
        assert_eq!(TaxonomyCode::new("").prefix(), "");
    }

    #[test]
    fn implied_phase_for_lifecycle_prefixes() {
        assert_eq!(TaxonomyCode::new("D1_instruction").implied_phase(), Phase::Drift);
        assert_eq!(TaxonomyCode::new("R5_hard_reset").implied_phase(), Phase::Repair);
        assert_eq!(TaxonomyCode::new("RE2_resume").implied_phase(), Phase::Reentry);
        assert_eq!(TaxonomyCode::new("O0_session_closed").implied_phase(), Phase::Outcome);
        assert_eq!(TaxonomyCode::new("F1_fallback").implied_phase(), Phase::Failover);
    }

    #[test]
    fn non_lifecycle_prefix_implies_none() {
        for code in ["INFO_generic", "SYS_session_init", "META_tag", "M2_VRL", "d1_lower"] {
            let code = TaxonomyCode::new(code);
            assert!(!code.is_lifecycle(), "{code}");
            assert_eq!(code.implied_phase(), Phase::None);
        }
    }

    #[test]
    fn system_init_code() {
        assert!(TaxonomyCode::new(SYSTEM_INIT_CODE).is_system_init());
        assert!(!TaxonomyCode::new("SYS_other").is_system_init());
    }

    fn lifecycle_prefix() -> impl Strategy<Value = LifecyclePrefix> {
        prop_oneof![
            Just(LifecyclePrefix::Drift),
            Just(LifecyclePrefix::Repair),
            Just(LifecyclePrefix::Reentry),
            Just(LifecyclePrefix::Continue),
            Just(LifecyclePrefix::Outcome),
            Just(LifecyclePrefix::Failover),
        ]
    }

    proptest! {
        #[test]
        fn prop_digit_suffix_never_changes_phase(
            prefix in lifecycle_prefix(),
            digits in "[0-9]{0,3}",
            tail in "[a-z_]{0,12}",
        ) {
            let code = TaxonomyCode::new(format!("{}{}_{}", prefix.as_str(), digits, tail));
            prop_assert_eq!(code.lifecycle_prefix(), Some(prefix));
            prop_assert_eq!(code.implied_phase(), prefix.phase());
        }
    }
}
