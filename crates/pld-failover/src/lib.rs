//! PLD Failover - bounded recovery for sessions in failover
//!
//! # Architecture
//!
//! ```text
//! FailoverOrchestrator::run_step(state)
//!     ├── RecoveryStrategy::execute(context)     (side effects via SignalSink)
//!     ├── ReconciliationPolicy::evaluate(input)  → continue | recover | finalize | unknown
//!     └── BackoffPolicy::next_delay(attempt)     (only on continue)
//! ```
//!
//! Each step returns a new [`FailoverState`]; nothing is mutated in place and
//! nothing sleeps unless the caller asks for it ([`sleep_for_backoff`],
//! [`FailoverOrchestrator::run_to_completion`]).
//!
//! # Example
//!
//! ```rust
//! use pld_core::Metadata;
//! use pld_failover::{DiscardSink, FailoverRegistry, FailoverSpec, FailoverStatus};
//!
//! let registry = FailoverRegistry::with_defaults();
//! let orchestrator = registry.orchestrator_from_spec(&FailoverSpec::default()).unwrap();
//!
//! let state = orchestrator.initialize("s1", Metadata::new());
//! let step = orchestrator.run_step(&state, &mut DiscardSink, None).unwrap();
//! assert_eq!(step.state.status, FailoverStatus::Active);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod backoff;
pub mod error;
pub mod orchestrator;
pub mod reconciliation;
pub mod registry;
pub mod strategy;

pub use backoff::{
    sleep_for_backoff, BackoffPolicy, ConstantBackoff, ExponentialBackoff, ExponentialJitterBackoff,
};
pub use error::{FailoverError, Result};
pub use orchestrator::{
    FailoverOrchestrator, FailoverState, FailoverStatus, FailoverStepResult, DEFAULT_MAX_ATTEMPTS,
};
pub use reconciliation::{
    NoOpReconciliation, ReconciliationInput, ReconciliationOutcome, ReconciliationPolicy,
    ReconciliationResult, ThresholdReconciliation,
};
pub use registry::{BackoffFactory, FailoverRegistry, FailoverSpec, PolicySpec, ReconciliationFactory};
pub use strategy::{DiscardSink, FailoverContext, NoOpStrategy, RecoveryStrategy, SignalSink};
