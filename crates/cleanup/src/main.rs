//! GPTLens Cleanup
//!
//! One-shot retention sweep, meant to be run from a scheduler:
//! 1. Loads the same configuration as the gateway
//! 2. Computes a cutoff per plan tier from the retention settings
//! 3. Deletes (or with `--dry-run`, counts) expired events and daily metrics
//! 4. Prints the JSON report on stdout

use anyhow::{bail, Context};
use chrono::Utc;
use gptlens_common::{
    config::AppConfig,
    db::{AnalyticsStore, DbPool, Repository},
    services::{CleanupJob, CleanupReport, RetentionPolicy},
    telemetry, VERSION,
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, PartialEq)]
struct Options {
    dry_run: bool,
}

fn parse_args<I>(args: I) -> anyhow::Result<Options>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    for arg in args {
        match arg.as_str() {
            "--dry-run" | "-n" => options.dry_run = true,
            other => bail!("unknown argument: {} (usage: cleanup [--dry-run])", other),
        }
    }
    Ok(options)
}

async fn sweep(
    store: Arc<dyn AnalyticsStore>,
    config: &AppConfig,
    dry_run: bool,
) -> gptlens_common::Result<CleanupReport> {
    let job = CleanupJob::new(store, RetentionPolicy::from(&config.retention));
    job.run(dry_run, Utc::now()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let options = parse_args(std::env::args().skip(1))?;

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.observability);

    info!(dry_run = options.dry_run, "Starting GPTLens Cleanup v{}", VERSION);

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    let store: Arc<dyn AnalyticsStore> = Arc::new(Repository::new(db));

    let report = sweep(store, &config, options.dry_run).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
