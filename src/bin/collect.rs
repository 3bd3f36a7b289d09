//! ESR Data Collection Binary
//!
//! One-shot collection run against the USDA FAS ESR API: refreshes the
//! reference tables, diffs upstream release timestamps, and upserts the
//! batches that changed. Intended to run from cron or by hand.
//!
//! # Usage
//!
//! ```bash
//! ESR_CONFIG=esr.toml cargo run --bin esr-collect --features sqlite-repo
//! ```

use std::env;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use esr_dashboard::db::{AppConfig, RepositoryFactory};
use esr_dashboard::services::{Collector, CollectorConfig, EsrClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse::<LevelFilter>().ok())
                .unwrap_or(LevelFilter::INFO),
        )
        .init();

    let config = AppConfig::from_default_location().map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let repo_type = config
        .repository_type()
        .map_err(|e| anyhow::anyhow!("Invalid repository type: {}", e))?;
    let sqlite_config = config
        .to_sqlite_config()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let repository = RepositoryFactory::create(repo_type, sqlite_config.as_ref())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let client = EsrClient::new(CollectorConfig::from_settings(&config.collector))?;
    let collector = Collector::new(client, repository);

    let outcome = collector.run().await?;

    println!(
        "Checked {} release(s): applied {} batch(es), upserted {} record(s), {} failure(s)",
        outcome.releases_checked,
        outcome.batches_applied,
        outcome.records_upserted,
        outcome.failures.len()
    );
    for failure in &outcome.failures {
        eprintln!(
            "  failed: commodity {} MY {}: {}",
            failure.commodity, failure.market_year, failure.error
        );
    }

    if !outcome.failures.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
