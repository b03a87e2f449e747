//! `MetadataGuard`: cross-run tick-size/depth consistency check (spec §10.3,
//! supplementing `original_source/mm_recorder/metadata.py`).
//!
//! The Python original's `MM_METADATA_STRICT` gates whether a failed REST
//! metadata fetch is fatal or merely falls back to a default tick size. This
//! crate has no REST metadata fetch step to guard (`MM_PRICE_TICK_SIZE` is
//! either set or the book runs untethered-tick), so `MM_METADATA_STRICT` is
//! reinterpreted here as a guard against *drift*: if a previous run already
//! wrote a `schema.json` for this exchange+symbol+day, a new run's tick size
//! and depth must agree with it, strict mode turning disagreement into a
//! fatal error instead of a warning. See DESIGN.md.

use crate::recorder::persistence::Schema;
use std::path::Path;

pub struct MetadataGuard {
    pub strict: bool,
}

impl MetadataGuard {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Compares `(depth_levels, tick_size)` against a pre-existing
    /// `schema.json` in `day_dir`, if any. Returns `Ok(())` when there is
    /// nothing to compare against, when the values agree, or when mismatches
    /// are only warned about (non-strict). Returns `Err` when strict mode is
    /// on and a mismatch is found.
    pub fn check(&self, day_dir: &Path, depth_levels: usize, tick_size: Option<f64>) -> Result<(), String> {
        let Ok(previous) = Schema::read(day_dir) else { return Ok(()) };

        let mut mismatches = Vec::new();
        if previous.depth_levels != depth_levels {
            mismatches.push(format!("depth_levels changed {} -> {}", previous.depth_levels, depth_levels));
        }
        match (previous.tick_size, tick_size) {
            (Some(prev), Some(now)) if (prev - now).abs() > 1e-12 => {
                mismatches.push(format!("tick_size changed {prev} -> {now}"));
            }
            (Some(_), None) | (None, Some(_)) => {
                mismatches.push(format!("tick_size presence changed {:?} -> {:?}", previous.tick_size, tick_size));
            }
            _ => {}
        }

        if mismatches.is_empty() {
            return Ok(());
        }
        let message = format!("metadata drift vs existing schema.json in {}: {}", day_dir.display(), mismatches.join("; "));
        if self.strict {
            Err(message)
        } else {
            tracing::warn!("{message}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_no_prior_schema_exists() {
        let dir = tempfile::tempdir().unwrap();
        let guard = MetadataGuard::new(true);
        assert!(guard.check(dir.path(), 20, Some(0.01)).is_ok());
    }

    #[test]
    fn strict_mode_rejects_depth_drift() {
        let dir = tempfile::tempdir().unwrap();
        let schema = Schema {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            symbol_fs: "BTCUSDT".into(),
            depth_levels: 20,
            decimals: 8,
            tick_size: Some(0.01),
            checksum_depth: None,
            run_id: 1,
        };
        schema.write(dir.path()).unwrap();

        let guard = MetadataGuard::new(true);
        assert!(guard.check(dir.path(), 25, Some(0.01)).is_err());

        let lenient = MetadataGuard::new(false);
        assert!(lenient.check(dir.path(), 25, Some(0.01)).is_ok());
    }
}
