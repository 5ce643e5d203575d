//! PLD Core - lifecycle event model
//!
//! Shared, read-only vocabulary for every other PLD crate:
//! - [`Phase`]: the seven lifecycle phases
//! - [`EventType`]: the closed set of wire event types and their phase constraints
//! - [`TaxonomyCode`]: taxonomy codes whose prefix implies a phase
//! - [`Event`]: the immutable lifecycle event record and its wire decoding
//!
//! # Example
//!
//! ```rust
//! use pld_core::{Event, EventType, Phase};
//!
//! let event = Event::builder("s1", 1, EventType::ContinueAllowed, Phase::Continue, "C0_normal")
//!     .source("assistant")
//!     .build();
//!
//! assert_eq!(event.pld.code.implied_phase(), Phase::Continue);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod event;
pub mod event_type;
pub mod phase;
pub mod taxonomy;

pub use error::{ConfigError, ParseError, StructuralError};
pub use event::{check_envelope, Event, EventBuilder, Metadata, PldBlock, SessionId, UxBlock};
pub use event_type::{EventType, PhaseConstraint};
pub use phase::Phase;
pub use taxonomy::{LifecyclePrefix, TaxonomyCode, SCHEMA_VERSION, SYSTEM_INIT_CODE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
