//! Order-book synchronization, recording, and replay core.
//!
//! Four layers, leaves first: [`model`] (LOB + wire types), [`adapter`]
//! (exchange-specific normalization), [`sync`] (I/O-free state machines),
//! and [`recorder`] / [`replay`] (the two drivers that share the sync
//! engine). See SPEC_FULL.md for the full design.

pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod sync;
pub mod adapter;
pub mod inspect;
pub mod recorder;
pub mod replay;

pub use error::{CoreError, SyncAction, GapReason};
pub use model::book::LocalOrderBook;
pub use model::event::{EventRow, EventType};
pub use sync::SyncEngine;
