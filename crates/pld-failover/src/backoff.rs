//! Backoff policies
//!
//! A policy maps a 1-based attempt number to the delay before the next
//! attempt. Policies are stateless; computing a delay never sleeps.

use crate::error::{FailoverError, Result};
use pld_core::ConfigError;
use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;

/// Delay computation between failover attempts
pub trait BackoffPolicy: Send + Sync + Debug {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Delay after `attempt` (1-based)
    ///
    /// # Errors
    /// [`FailoverError::InvalidAttempt`] when `attempt` is 0.
    fn next_delay(&self, attempt: u32) -> Result<Duration>;
}

fn check_attempt(attempt: u32) -> Result<()> {
    if attempt == 0 {
        return Err(FailoverError::InvalidAttempt(attempt));
    }
    Ok(())
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn check_non_negative(key: &str, value: f64) -> std::result::Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(key, format!("must be a finite value >= 0, got {value}")));
    }
    Ok(())
}

fn check_growth(base: f64, factor: f64, max: Option<f64>) -> std::result::Result<(), ConfigError> {
    if !base.is_finite() || base <= 0.0 {
        return Err(ConfigError::invalid("base_seconds", format!("must be > 0, got {base}")));
    }
    if !factor.is_finite() || factor <= 1.0 {
        return Err(ConfigError::invalid("factor", format!("must be > 1, got {factor}")));
    }
    if let Some(max) = max {
        check_non_negative("max_seconds", max)?;
    }
    Ok(())
}

/// Same delay for every attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantBackoff {
    delay_seconds: f64,
}

impl ConstantBackoff {
    /// Create policy
    ///
    /// # Errors
    /// [`ConfigError`] when the delay is negative or not finite.
    pub fn new(delay_seconds: f64) -> std::result::Result<Self, ConfigError> {
        check_non_negative("delay_seconds", delay_seconds)?;
        Ok(Self { delay_seconds })
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn next_delay(&self, attempt: u32) -> Result<Duration> {
        check_attempt(attempt)?;
        Ok(seconds(self.delay_seconds))
    }
}

/// `base * factor^(attempt - 1)`, optionally capped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    base_seconds: f64,
    factor: f64,
    max_seconds: Option<f64>,
}

impl ExponentialBackoff {
    /// Create policy
    ///
    /// # Errors
    /// [`ConfigError`] unless `base > 0`, `factor > 1` and `max >= 0`.
    pub fn new(
        base_seconds: f64,
        factor: f64,
        max_seconds: Option<f64>,
    ) -> std::result::Result<Self, ConfigError> {
        check_growth(base_seconds, factor, max_seconds)?;
        Ok(Self {
            base_seconds,
            factor,
            max_seconds,
        })
    }

    fn raw(&self, attempt: u32) -> f64 {
        self.base_seconds * self.factor.powf(f64::from(attempt - 1))
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn name(&self) -> &'static str {
        "exponential"
    }

    fn next_delay(&self, attempt: u32) -> Result<Duration> {
        check_attempt(attempt)?;
        let delay = self.raw(attempt);
        Ok(seconds(self.max_seconds.map_or(delay, |max| delay.min(max))))
    }
}

/// Exponential delay with uniform jitter of up to `ratio * delay` either way
///
/// The cap applies after jitter; the result never goes below zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialJitterBackoff {
    inner: ExponentialBackoff,
    jitter_ratio: f64,
}

impl ExponentialJitterBackoff {
    /// Create policy
    ///
    /// # Errors
    /// [`ConfigError`] unless `base > 0`, `factor > 1`, `max >= 0` and
    /// `jitter_ratio` is in `[0, 1]`.
    pub fn new(
        base_seconds: f64,
        factor: f64,
        jitter_ratio: f64,
        max_seconds: Option<f64>,
    ) -> std::result::Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&jitter_ratio) {
            return Err(ConfigError::invalid(
                "jitter_ratio",
                format!("must be in [0, 1], got {jitter_ratio}"),
            ));
        }
        Ok(Self {
            inner: ExponentialBackoff::new(base_seconds, factor, max_seconds)?,
            jitter_ratio,
        })
    }
}

impl BackoffPolicy for ExponentialJitterBackoff {
    fn name(&self) -> &'static str {
        "exponential_jitter"
    }

    fn next_delay(&self, attempt: u32) -> Result<Duration> {
        check_attempt(attempt)?;
        let delay = self.inner.raw(attempt);
        // The sampled range must stay finite: -bound..=bound spans 2 * bound.
        let bound = (delay * self.jitter_ratio).min(f64::MAX / 2.0);
        let jitter = if bound > 0.0 && bound.is_finite() {
            rand::rng().random_range(-bound..=bound)
        } else {
            0.0
        };
        let jittered = delay + jitter;
        let capped = self
            .inner
            .max_seconds
            .map_or(jittered, |max| jittered.min(max));
        Ok(seconds(capped.max(0.0)))
    }
}

/// Compute the delay for `attempt` and block the current thread for it
///
/// Async callers should use [`crate::FailoverOrchestrator::run_to_completion`]
/// or schedule on their own timer instead.
///
/// # Errors
/// Propagates the policy's error without sleeping.
pub fn sleep_for_backoff(policy: &dyn BackoffPolicy, attempt: u32) -> Result<Duration> {
    let delay = policy.next_delay(attempt)?;
    tracing::debug!(policy = policy.name(), attempt, ?delay, "backoff sleep");
    std::thread::sleep(delay);
    Ok(delay)
}
