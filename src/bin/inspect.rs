//! `inspect` — offline maintenance and validation tools for recorded days
//! (spec §10.5): `validate`, `combine`, `coverage`, `gc`.

use anyhow::Result;
use clap::Parser;
use lob_sync::config::{InspectArgs, InspectCommand};
use lob_sync::inspect::{combine, coverage, gc, validate};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("inspect=info".parse().unwrap()))
        .init();

    let args = InspectArgs::parse();
    match args.command {
        InspectCommand::Validate { day_dir } => {
            let report = validate::validate_day(&day_dir)?;
            println!("segments={} applied={} gaps={}", report.segments, report.applied, report.gaps);
            std::process::exit(report.exit_code());
        }
        InspectCommand::Combine { day_dir, interval } => {
            let report = combine::combine_day(&day_dir, &interval)?;
            println!(
                "interval={} trades_read={} candles_written={} out={}",
                report.interval,
                report.trades_read,
                report.candles_written,
                report.out_path.display()
            );
        }
        InspectCommand::Coverage { day_dir } => {
            print_coverage(&coverage::coverage_day(&day_dir)?);
        }
        InspectCommand::Gc { day_dir, tz, dry_run } => {
            print_gc(&gc::gc_day(&day_dir, &tz, dry_run)?);
        }
    }
    Ok(())
}

fn human_ts(ms: Option<i64>) -> String {
    match ms {
        None => "n/a".to_string(),
        Some(ms) => chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339()).unwrap_or_else(|| ms.to_string()),
    }
}

fn print_coverage(report: &coverage::CoverageReport) {
    println!("{}", "=".repeat(80));
    println!("Market data coverage report | exchange={} symbol={} day={} (UTC)", report.exchange, report.symbol, report.day);
    println!("{}", "=".repeat(80));
    println!("sync epochs: {}", report.epoch_count);
    println!("recorder-flagged gaps: {}", report.recorder_gap_count);

    for file in &report.files {
        println!();
        println!("[{}] {}", file.kind, file.path.display());
        if !file.exists {
            println!("  status: MISSING");
            continue;
        }
        println!("  rows: {}", file.n_rows);
        println!("  first: {}", human_ts(file.first_ms));
        println!("  last : {}", human_ts(file.last_ms));
        match file.inferred_expected_ms {
            Some(ms) => println!("  inferred cadence (ms): {ms:.1}"),
            None => println!("  inferred cadence (ms): n/a"),
        }
        if file.gaps.is_empty() {
            println!("  gaps: none detected");
            continue;
        }
        let mut sorted = file.gaps.clone();
        sorted.sort_by_key(|(start, end)| -(end - start));
        println!("  gaps detected: {}", sorted.len());
        for (start, end) in sorted.iter().take(30) {
            println!("    - {}  ->  {}   gap={:.3}s", human_ts(Some(*start)), human_ts(Some(*end)), (*end - *start) as f64 / 1000.0);
        }
        if sorted.len() > 30 {
            println!("    ... and {} more", sorted.len() - 30);
        }
    }
}

fn print_gc(report: &gc::GcReport) {
    println!("Mode: {}", if report.dry_run { "scan" } else { "delete" });
    println!("Target: {}", report.day_dir.display());
    println!("Day window ms: [{}, {})", report.start_ms, report.end_ms);
    println!();
    println!("Records/lines kept: {}", report.total_kept());
    println!("Records/lines removed: {}", report.total_removed());
    println!();
    for file in report.affected() {
        println!("- {:11} | removed={:8} kept={:8} total={:8} | {} | {}", file.kind, file.total - file.kept, file.kept, file.total, file.reason, file.path.display());
    }
    if !report.dry_run {
        println!();
        println!("Delete mode completed. Files were rewritten/purged in-place.");
        println!("Recommendation: run `inspect validate` for this day to confirm integrity.");
    }
}
