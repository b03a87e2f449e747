//! Offline maintenance and validation tools for recorded days (spec §10.5),
//! grounded on the four scripts bundled alongside `mm_recorder`/`mm_history`
//! in the original implementation: `replay_validator.py`, `combiner.py`,
//! `check_market_data_coverage.py`, and `purge_non_day_data.py`. Each one was
//! a standalone script there; here they are subcommands of one `inspect`
//! binary sharing this crate's persistence and sync-engine code directly
//! instead of re-reading CSVs by hand.

pub mod combine;
pub mod coverage;
pub mod gc;
pub mod validate;
