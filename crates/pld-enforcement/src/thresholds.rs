//! Metric threshold evaluation
//!
//! Values are first clamped into the sanity bounds `[hard_min, hard_max]`
//! and then compared against `warn` / `critical` in the configured
//! direction. Bounds never replace the policy thresholds.

use pld_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a metric reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSeverity {
    /// Within policy
    Ok,
    /// At or beyond the warn threshold
    Warn,
    /// At or beyond the critical threshold
    Critical,
}

impl fmt::Display for MetricSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricSeverity::Ok => "ok",
            MetricSeverity::Warn => "warn",
            MetricSeverity::Critical => "critical",
        })
    }
}

#[derive(Deserialize)]
struct RawThreshold {
    warn: Option<f64>,
    critical: Option<f64>,
    #[serde(default = "default_higher_is_worse")]
    higher_is_worse: bool,
    hard_min: Option<f64>,
    hard_max: Option<f64>,
}

const fn default_higher_is_worse() -> bool {
    true
}

/// Threshold configuration for one metric
///
/// Only constructible through [`MetricThreshold::new`] (or deserialization,
/// which goes through the same checks).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold")]
pub struct MetricThreshold {
    warn: Option<f64>,
    critical: Option<f64>,
    higher_is_worse: bool,
    hard_min: Option<f64>,
    hard_max: Option<f64>,
}

impl TryFrom<RawThreshold> for MetricThreshold {
    type Error = ConfigError;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        MetricThreshold::new(raw.warn, raw.critical, raw.higher_is_worse)?
            .with_bounds(raw.hard_min, raw.hard_max)
    }
}

impl MetricThreshold {
    /// Create threshold
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `critical` is less extreme than `warn` in
    /// the configured direction, or a value is not finite.
    pub fn new(
        warn: Option<f64>,
        critical: Option<f64>,
        higher_is_worse: bool,
    ) -> Result<Self, ConfigError> {
        for (key, value) in [("warn", warn), ("critical", critical)] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ConfigError::invalid(key, "must be finite"));
            }
        }
        if let (Some(w), Some(c)) = (warn, critical) {
            if higher_is_worse && c < w {
                return Err(ConfigError::invalid(
                    "critical",
                    format!("critical ({c}) < warn ({w}) with higher_is_worse"),
                ));
            }
            if !higher_is_worse && c > w {
                return Err(ConfigError::invalid(
                    "critical",
                    format!("critical ({c}) > warn ({w}) with lower_is_worse"),
                ));
            }
        }
        Ok(Self {
            warn,
            critical,
            higher_is_worse,
            hard_min: None,
            hard_max: None,
        })
    }

    /// Set sanity bounds
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `hard_min > hard_max`.
    pub fn with_bounds(mut self, hard_min: Option<f64>, hard_max: Option<f64>) -> Result<Self, ConfigError> {
        if let (Some(lo), Some(hi)) = (hard_min, hard_max) {
            if lo > hi {
                return Err(ConfigError::invalid(
                    "hard_min",
                    format!("hard_min ({lo}) > hard_max ({hi})"),
                ));
            }
        }
        self.hard_min = hard_min;
        self.hard_max = hard_max;
        Ok(self)
    }

    /// Warn threshold
    #[inline]
    #[must_use]
    pub fn warn(&self) -> Option<f64> {
        self.warn
    }

    /// Critical threshold
    #[inline]
    #[must_use]
    pub fn critical(&self) -> Option<f64> {
        self.critical
    }

    /// Direction
    #[inline]
    #[must_use]
    pub fn higher_is_worse(&self) -> bool {
        self.higher_is_worse
    }

    /// Clamp into the sanity bounds
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        match (self.hard_min, self.hard_max) {
            (Some(lo), _) if value < lo => lo,
            (_, Some(hi)) if value > hi => hi,
            _ => value,
        }
    }

    /// Classify a reading
    #[must_use]
    pub fn evaluate(&self, value: f64) -> MetricSeverity {
        let value = self.clamp(value);
        let beyond = |limit: Option<f64>| {
            limit.is_some_and(|l| if self.higher_is_worse { value >= l } else { value <= l })
        };
        if beyond(self.critical) {
            MetricSeverity::Critical
        } else if beyond(self.warn) {
            MetricSeverity::Warn
        } else {
            MetricSeverity::Ok
        }
    }
}

/// Named metric thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdEvaluator {
    thresholds: BTreeMap<String, MetricThreshold>,
}

impl Default for ThresholdEvaluator {
    /// PRDR, VRL and FR defaults
    fn default() -> Self {
        let mut evaluator = Self::empty();
        let defaults = [
            ("PRDR", 30.0, 50.0, Some(0.0), Some(100.0)),
            ("VRL", 10.0, 30.0, Some(0.0), None),
            ("FR", 0.10, 0.25, Some(0.0), Some(1.0)),
        ];
        for (name, warn, critical, lo, hi) in defaults {
            if let Ok(t) = MetricThreshold::new(Some(warn), Some(critical), true)
                .and_then(|t| t.with_bounds(lo, hi))
            {
                evaluator.thresholds.insert(name.to_string(), t);
            }
        }
        evaluator
    }
}

impl ThresholdEvaluator {
    /// Evaluator without thresholds
    #[must_use]
    pub fn empty() -> Self {
        Self {
            thresholds: BTreeMap::new(),
        }
    }

    /// Add or replace a metric threshold
    #[must_use]
    pub fn with_threshold(mut self, metric: impl Into<String>, threshold: MetricThreshold) -> Self {
        self.thresholds.insert(metric.into(), threshold);
        self
    }

    /// Threshold for a metric
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<&MetricThreshold> {
        self.thresholds.get(metric)
    }

    /// Metric names
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.thresholds.keys().map(String::as_str)
    }

    /// Classify a reading; unknown metrics are `Ok`
    #[must_use]
    pub fn evaluate(&self, metric: &str, value: f64) -> MetricSeverity {
        self.thresholds
            .get(metric)
            .map_or(MetricSeverity::Ok, |t| t.evaluate(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_thresholds_rejected() {
        assert!(MetricThreshold::new(Some(50.0), Some(30.0), true).is_err());
        assert!(MetricThreshold::new(Some(0.2), Some(0.5), false).is_err());
        assert!(MetricThreshold::new(Some(0.5), Some(0.2), false).is_ok());
        assert!(MetricThreshold::new(Some(f64::NAN), None, true).is_err());
    }

    #[test]
    fn test_bounds_order() {
        let t = MetricThreshold::new(None, None, true).unwrap();
        assert!(t.with_bounds(Some(10.0), Some(1.0)).is_err());
    }

    #[test]
    fn test_defaults() {
        let eval = ThresholdEvaluator::default();
        assert_eq!(eval.evaluate("PRDR", 10.0), MetricSeverity::Ok);
        assert_eq!(eval.evaluate("PRDR", 30.0), MetricSeverity::Warn);
        assert_eq!(eval.evaluate("PRDR", 50.0), MetricSeverity::Critical);
        assert_eq!(eval.evaluate("FR", 0.3), MetricSeverity::Critical);
        assert_eq!(eval.evaluate("UNKNOWN", 1e9), MetricSeverity::Ok);
    }

    #[test]
    fn test_clamp_then_evaluate() {
        let eval = ThresholdEvaluator::default();
        // clamped to 100, still critical
        assert_eq!(eval.evaluate("PRDR", 250.0), MetricSeverity::Critical);
        // clamped to 0
        assert_eq!(eval.evaluate("VRL", -5.0), MetricSeverity::Ok);
    }

    #[test]
    fn test_lower_is_worse() {
        let t = MetricThreshold::new(Some(0.8), Some(0.5), false).unwrap();
        assert_eq!(t.evaluate(0.9), MetricSeverity::Ok);
        assert_eq!(t.evaluate(0.8), MetricSeverity::Warn);
        assert_eq!(t.evaluate(0.1), MetricSeverity::Critical);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: MetricThreshold =
            serde_json::from_str(r#"{"warn": 1.0, "critical": 2.0, "hard_min": 0.0}"#).unwrap();
        assert_eq!(ok.clamp(-1.0), 0.0);

        let bad = serde_json::from_str::<MetricThreshold>(r#"{"warn": 2.0, "critical": 1.0}"#);
        assert!(bad.is_err());
    }
}
