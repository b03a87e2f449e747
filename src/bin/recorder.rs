//! `recorder` — records one exchange/symbol's limit order book and trade
//! prints for a configured daily window (spec §4.5). All configuration comes
//! from the environment; see `lob_sync::config::RecorderConfig::from_env`.

use anyhow::Result;
use lob_sync::config::RecorderConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("recorder=info".parse().unwrap()))
        .init();

    let _ = dotenv::dotenv();
    let cfg = RecorderConfig::from_env()?;
    lob_sync::recorder::run(cfg).await
}
