//! Error types shared by the PLD crates
//!
//! Two classes of failure are fatal and surface as `Err`:
//! - [`StructuralError`]: an event is missing a required field or a field is malformed
//! - [`ConfigError`]: a component was constructed from an invalid configuration
//!
//! Semantic rule violations are never errors; they are returned as data by
//! the enforcement layer.

/// A required event field is missing or malformed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    /// Required field absent from the wire representation
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Field present but unusable
    #[error("malformed field `{field}`: {reason}")]
    MalformedField {
        /// Dotted path of the offending field
        field: &'static str,
        /// Human readable reason
        reason: String,
    },

    /// Input could not be parsed as an event at all
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl StructuralError {
    /// Create a malformed-field error
    #[inline]
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending field, when known
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(field) | Self::MalformedField { field, .. } => Some(field),
            Self::Malformed(_) => None,
        }
    }
}

/// Construction-time configuration failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is out of range or of the wrong type
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A named component is not registered
    #[error("unknown {kind} `{name}`")]
    UnknownName {
        /// Component family (backoff policy, strategy, ...)
        kind: &'static str,
        /// Requested name
        name: String,
    },

    /// Configuration document could not be read or parsed
    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    /// Create an invalid-value error
    #[inline]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown-name error
    #[inline]
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownName {
            kind,
            name: name.into(),
        }
    }
}

/// Failure to parse a taxonomy value from its wire string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not one of the seven lifecycle phases
    #[error("unknown phase `{0}`")]
    UnknownPhase(String),

    /// Not one of the wire event types
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_error_field() {
        assert_eq!(StructuralError::MissingField("pld.code").field(), Some("pld.code"));
        assert_eq!(
            StructuralError::malformed("turn_sequence", "must be >= 1").field(),
            Some("turn_sequence")
        );
        assert_eq!(StructuralError::Malformed("eof".into()).field(), None);
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::invalid("factor", "must be > 1");
        assert_eq!(err.to_string(), "invalid value for `factor`: must be > 1");

        let err = ConfigError::unknown("backoff policy", "linear");
        assert_eq!(err.to_string(), "unknown backoff policy `linear`");
    }
}
