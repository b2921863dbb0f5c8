use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use newsmind::{config::Config, runtime, telemetry};

/// Headless pipeline: scheduled crawl, enrichment and retention without the
/// HTTP API.
#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    telemetry::init(&config);

    let shutdown = CancellationToken::new();
    let pipeline = runtime::build_pipeline(&config, shutdown.clone()).await?;

    tokio::spawn(runtime::shutdown_signal(shutdown.clone()));

    info!("worker started");
    pipeline.scheduler(&config, shutdown).run().await?;
    info!("worker stopped");
    Ok(())
}
