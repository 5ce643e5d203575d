//! PLD Controller - session lifecycle control
//!
//! # Architecture
//!
//! ```text
//! RuntimeSignal ──SignalBridge──▶ Event
//!                                   │
//!                 PldController::ingest(event)
//!                   ├── ValidationEngine      (reject / normalize)
//!                   ├── SessionRegistry       (one SessionStateMachine per session)
//!                   └── ActionRouter          (NextAction hint)
//!
//! PldController::audit(transcript) ──▶ SequenceRuleChecker
//! ```
//!
//! # Example
//!
//! ```rust
//! use pld_controller::{PldController, RuntimeConfig};
//! use pld_core::{Event, EventType, Phase};
//!
//! let controller = PldController::new(RuntimeConfig::default()).unwrap();
//! let event = Event::builder("s1", 1, EventType::ContinueAllowed, Phase::Continue, "C0_normal").build();
//!
//! let outcome = controller.ingest(&event);
//! assert!(!outcome.is_rejected());
//! assert_eq!(controller.state("s1").unwrap().phase, Phase::Continue);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod registry;
pub mod router;
pub mod state_machine;

pub use bridge::{EmitOptions, EventContext, RuntimeSignal, SignalBridge, SignalKind, SignalMapping};
pub use config::{RuntimeConfig, ValidationSettings};
pub use controller::{IngestOutcome, PldController};
pub use error::{BridgeError, ControllerError, Result};
pub use registry::SessionRegistry;
pub use router::{ActionRouter, NextAction, RouteDecision};
pub use state_machine::{
    allowed_transitions, validate_transition, SessionState, SessionStateMachine, StateTransition,
    TransitionReason,
};
