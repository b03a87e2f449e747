//! The live recording driver (spec §4.5), grounded on `mm_recorder/recorder.py`'s
//! `run_recorder`: connect, snapshot, feed the sync engine, durably ledger
//! every transition, stop cleanly at the end of the configured window.

pub mod driver;
pub mod metadata;
pub mod persistence;
pub mod snapshot;
pub mod state;

pub use driver::run;
