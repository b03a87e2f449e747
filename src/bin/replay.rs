//! `replay` — deterministically re-feed one recorded day through the same
//! sync engine used live (spec §4.6), reporting tick/gap/trade counts.

use anyhow::Result;
use clap::Parser;
use lob_sync::adapter;
use lob_sync::config::ReplayArgs;
use lob_sync::recorder::persistence::Schema;
use lob_sync::replay::{replay_day, ReplayWindow};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("replay=info".parse().unwrap()))
        .init();

    let args = ReplayArgs::parse();
    let schema = Schema::read(&args.day_dir)?;
    let adapter = adapter::by_name(&args.exchange)?;
    let engine = adapter.create_sync_engine(schema.depth_levels, 5000);

    let window = ReplayWindow { time_min_ms: args.from_ms, time_max_ms: args.to_ms };
    let mut ticks = 0u64;
    let mut trades = 0u64;
    let stats = replay_day(
        &args.day_dir,
        engine,
        window,
        |_recv_ms, _engine| ticks += 1,
        |_trade, _engine| trades += 1,
    )?;

    println!(
        "depth_msgs={} trade_msgs={} snapshots_loaded={} gaps={} applied={} synced={} buffered={} stale={} ticks_emitted={} trades_emitted={}",
        stats.depth_msgs,
        stats.trade_msgs,
        stats.snapshots_loaded,
        stats.gaps,
        stats.applied,
        stats.synced,
        stats.buffered,
        stats.stale,
        ticks,
        trades,
    );
    Ok(())
}
