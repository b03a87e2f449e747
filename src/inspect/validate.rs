//! `inspect validate` — replay every segment of a recorded day and report
//! applied/gap counts, grounded on `mm_recorder/replay_validator.py`.
//!
//! The original builds one fresh engine per snapshot-bounded segment because
//! its standalone script has no continuous replay driver to call into. This
//! crate already has one ([`crate::replay::replay_day`]) that re-adopts a
//! snapshot at every `snapshot_loaded` event and keeps feeding the same
//! engine afterward, which is equivalent: each resync still starts from a
//! freshly-adopted snapshot, it just isn't thrown away between segments.

use crate::adapter;
use crate::error::CoreError;
use crate::recorder::persistence::Schema;
use crate::replay::{replay_day, ReplayWindow};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateReport {
    pub segments: u64,
    pub applied: u64,
    pub gaps: u64,
}

impl ValidateReport {
    /// Matches `replay_validator.py::main`'s exit convention: `1` if any gap
    /// was found anywhere in the day, `0` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.gaps > 0 {
            1
        } else {
            0
        }
    }
}

pub fn validate_day(day_dir: &Path) -> Result<ValidateReport, CoreError> {
    let schema = Schema::read(day_dir)?;
    let adapter = adapter::by_name(&schema.exchange)?;
    let max_buffer = schema.depth_levels.max(1) * 250;
    let engine = adapter.create_sync_engine(schema.depth_levels, max_buffer);

    let stats = replay_day(day_dir, engine, ReplayWindow::unbounded(), |_, _| {}, |_, _| {})?;

    Ok(ValidateReport { segments: stats.snapshots_loaded, applied: stats.applied + stats.synced, gaps: stats.gaps })
}
