//! Named construction of failover components
//!
//! Provides [`FailoverRegistry`] for building backoff and reconciliation
//! policies from `name + config map`, and [`FailoverSpec`] for declarative
//! orchestrator wiring.

use crate::backoff::{BackoffPolicy, ConstantBackoff, ExponentialBackoff, ExponentialJitterBackoff};
use crate::orchestrator::{FailoverOrchestrator, DEFAULT_MAX_ATTEMPTS};
use crate::reconciliation::{NoOpReconciliation, ReconciliationPolicy, ThresholdReconciliation};
use crate::strategy::{NoOpStrategy, RecoveryStrategy};
use pld_core::{ConfigError, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Backoff factory
pub type BackoffFactory = fn(&Metadata) -> Result<Arc<dyn BackoffPolicy>, ConfigError>;

/// Reconciliation factory
pub type ReconciliationFactory = fn(&Metadata) -> Result<Arc<dyn ReconciliationPolicy>, ConfigError>;

fn float(config: &Metadata, key: &str, default: f64) -> Result<f64, ConfigError> {
    Ok(optional_float(config, key)?.unwrap_or(default))
}

fn optional_float(config: &Metadata, key: &str) -> Result<Option<f64>, ConfigError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(key, "not representable as a float")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, format!("`{s}`: {e}"))),
        Some(other) => Err(ConfigError::invalid(key, format!("expected a number, got {other}"))),
    }
}

fn integer(config: &Metadata, key: &str, default: u32) -> Result<u32, ConfigError> {
    let Some(raw) = config.get(key).filter(|v| !v.is_null()) else {
        return Ok(default);
    };
    let parsed = match raw {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigError::invalid(key, format!("expected a positive integer, got {raw}")))
}

fn build_constant(config: &Metadata) -> Result<Arc<dyn BackoffPolicy>, ConfigError> {
    Ok(Arc::new(ConstantBackoff::new(float(config, "delay_seconds", 1.0)?)?))
}

fn build_exponential(config: &Metadata) -> Result<Arc<dyn BackoffPolicy>, ConfigError> {
    Ok(Arc::new(ExponentialBackoff::new(
        float(config, "base_seconds", 1.0)?,
        float(config, "factor", 2.0)?,
        optional_float(config, "max_seconds")?,
    )?))
}

fn build_exponential_jitter(config: &Metadata) -> Result<Arc<dyn BackoffPolicy>, ConfigError> {
    Ok(Arc::new(ExponentialJitterBackoff::new(
        float(config, "base_seconds", 1.0)?,
        float(config, "factor", 2.0)?,
        float(config, "jitter_ratio", 0.2)?,
        optional_float(config, "max_seconds")?,
    )?))
}

fn build_noop(_config: &Metadata) -> Result<Arc<dyn ReconciliationPolicy>, ConfigError> {
    Ok(Arc::new(NoOpReconciliation))
}

fn build_threshold(config: &Metadata) -> Result<Arc<dyn ReconciliationPolicy>, ConfigError> {
    let threshold = integer(config, "threshold", ThresholdReconciliation::DEFAULT_THRESHOLD)?;
    Ok(Arc::new(ThresholdReconciliation::new(threshold)?))
}

/// Named policy with its configuration map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Registry name
    pub name: String,
    /// Factory configuration
    #[serde(default)]
    pub config: Metadata,
}

impl PolicySpec {
    /// Policy with empty configuration
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Metadata::new(),
        }
    }
}

/// Declarative orchestrator wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverSpec {
    /// Backoff policy
    pub backoff: PolicySpec,
    /// Reconciliation policy
    pub reconciliation: PolicySpec,
    /// Attempt budget
    pub max_attempts: u32,
    /// Registered strategy name; `None` uses the caller's strategy
    pub strategy: Option<String>,
}

impl Default for FailoverSpec {
    fn default() -> Self {
        Self {
            backoff: PolicySpec::named("exponential"),
            reconciliation: PolicySpec::named("threshold"),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategy: None,
        }
    }
}

/// Name to factory lookup for failover components
#[derive(Clone, Default)]
pub struct FailoverRegistry {
    backoff: BTreeMap<String, BackoffFactory>,
    reconciliation: BTreeMap<String, ReconciliationFactory>,
    strategies: BTreeMap<String, Arc<dyn RecoveryStrategy>>,
}

impl fmt::Debug for FailoverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverRegistry")
            .field("backoff", &self.backoff_names())
            .field("reconciliation", &self.reconciliation_names())
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl FailoverRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with built-in policies and the no-op strategy
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_backoff("constant", build_constant);
        registry.register_backoff("exponential", build_exponential);
        registry.register_backoff("exponential_jitter", build_exponential_jitter);
        registry.register_reconciliation("noop", build_noop);
        registry.register_reconciliation("threshold", build_threshold);
        registry.register_strategy(Arc::new(NoOpStrategy));
        registry
    }

    /// Register a backoff factory
    pub fn register_backoff(&mut self, name: &str, factory: BackoffFactory) {
        self.backoff.insert(name.to_string(), factory);
    }

    /// Register a reconciliation factory
    pub fn register_reconciliation(&mut self, name: &str, factory: ReconciliationFactory) {
        self.reconciliation.insert(name.to_string(), factory);
    }

    /// Register a strategy under its own name
    pub fn register_strategy(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    /// Check if a backoff policy is registered
    #[inline]
    #[must_use]
    pub fn contains_backoff(&self, name: &str) -> bool {
        self.backoff.contains_key(name)
    }

    /// Check if a reconciliation policy is registered
    #[inline]
    #[must_use]
    pub fn contains_reconciliation(&self, name: &str) -> bool {
        self.reconciliation.contains_key(name)
    }

    /// Backoff names, sorted
    #[must_use]
    pub fn backoff_names(&self) -> Vec<&str> {
        self.backoff.keys().map(String::as_str).collect()
    }

    /// Reconciliation names, sorted
    #[must_use]
    pub fn reconciliation_names(&self) -> Vec<&str> {
        self.reconciliation.keys().map(String::as_str).collect()
    }

    /// Strategy names, sorted
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }

    /// Build a backoff policy
    ///
    /// # Errors
    /// [`ConfigError`] for unknown names or invalid configuration.
    pub fn create_backoff(
        &self,
        name: &str,
        config: &Metadata,
    ) -> Result<Arc<dyn BackoffPolicy>, ConfigError> {
        let factory = self
            .backoff
            .get(name)
            .ok_or_else(|| ConfigError::unknown("backoff policy", name))?;
        factory(config)
    }

    /// Build a reconciliation policy
    ///
    /// # Errors
    /// [`ConfigError`] for unknown names or invalid configuration.
    pub fn create_reconciliation(
        &self,
        name: &str,
        config: &Metadata,
    ) -> Result<Arc<dyn ReconciliationPolicy>, ConfigError> {
        let factory = self
            .reconciliation
            .get(name)
            .ok_or_else(|| ConfigError::unknown("reconciliation policy", name))?;
        factory(config)
    }

    /// Registered strategy
    ///
    /// # Errors
    /// [`ConfigError`] for unknown names.
    pub fn strategy(&self, name: &str) -> Result<Arc<dyn RecoveryStrategy>, ConfigError> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::unknown("recovery strategy", name))
    }

    /// Build an orchestrator around `strategy`
    ///
    /// # Errors
    /// [`ConfigError`] when either policy cannot be built.
    pub fn create_orchestrator(
        &self,
        strategy: Arc<dyn RecoveryStrategy>,
        spec: &FailoverSpec,
    ) -> Result<FailoverOrchestrator, ConfigError> {
        let backoff = self.create_backoff(&spec.backoff.name, &spec.backoff.config)?;
        let reconciliation =
            self.create_reconciliation(&spec.reconciliation.name, &spec.reconciliation.config)?;
        Ok(FailoverOrchestrator::new(strategy, backoff, reconciliation)
            .with_max_attempts(spec.max_attempts))
    }

    /// Build an orchestrator entirely from `spec`
    ///
    /// Uses the registered strategy named in the spec, or the no-op strategy.
    ///
    /// # Errors
    /// [`ConfigError`] for unknown names or invalid configuration.
    pub fn orchestrator_from_spec(&self, spec: &FailoverSpec) -> Result<FailoverOrchestrator, ConfigError> {
        let strategy = self.strategy(spec.strategy.as_deref().unwrap_or("noop"))?;
        self.create_orchestrator(strategy, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn config(value: Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn registry_new_empty() {
        let registry = FailoverRegistry::new();
        assert!(registry.backoff_names().is_empty());
        assert!(registry.strategy("noop").is_err());
    }

    #[test]
    fn registry_with_defaults() {
        let registry = FailoverRegistry::with_defaults();
        assert_eq!(
            registry.backoff_names(),
            vec!["constant", "exponential", "exponential_jitter"]
        );
        assert_eq!(registry.reconciliation_names(), vec!["noop", "threshold"]);
        assert_eq!(registry.strategy_names(), vec!["noop"]);
    }

    #[test]
    fn registry_unknown_name() {
        let registry = FailoverRegistry::with_defaults();
        let err = registry.create_backoff("linear", &Metadata::new()).unwrap_err();
        assert_eq!(err, ConfigError::unknown("backoff policy", "linear"));
    }

    #[test]
    fn registry_backoff_defaults() {
        let registry = FailoverRegistry::with_defaults();
        let policy = registry.create_backoff("exponential", &Metadata::new()).unwrap();
        assert_eq!(policy.next_delay(3).unwrap(), Duration::from_secs(4));

        let constant = registry
            .create_backoff("constant", &config(json!({"delay_seconds": "2.5"})))
            .unwrap();
        assert_eq!(constant.next_delay(1).unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn registry_rejects_bad_values() {
        let registry = FailoverRegistry::with_defaults();
        assert!(registry
            .create_backoff("exponential", &config(json!({"factor": "fast"})))
            .is_err());
        assert!(registry
            .create_backoff("exponential_jitter", &config(json!({"jitter_ratio": 2})))
            .is_err());
        assert!(registry
            .create_reconciliation("threshold", &config(json!({"threshold": -1})))
            .is_err());
        assert!(registry
            .create_reconciliation("threshold", &config(json!({"threshold": 0})))
            .is_err());
    }

    #[test]
    fn registry_orchestrator_from_spec() {
        let registry = FailoverRegistry::with_defaults();
        let spec: FailoverSpec = serde_json::from_value(json!({
            "backoff": {"name": "constant", "config": {"delay_seconds": 0.5}},
            "reconciliation": {"name": "threshold", "config": {"threshold": 2}},
            "max_attempts": 4
        }))
        .unwrap();
        let orch = registry.orchestrator_from_spec(&spec).unwrap();
        assert_eq!(orch.max_attempts(), 4);
        assert_eq!(orch.strategy().name(), "noop");
        assert_eq!(orch.backoff().name(), "constant");
        assert_eq!(orch.reconciliation().name(), "threshold");
    }

    #[test]
    fn spec_defaults() {
        let spec: FailoverSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(spec, FailoverSpec::default());
        assert_eq!(spec.backoff.name, "exponential");
        assert_eq!(spec.max_attempts, 3);
    }
}
