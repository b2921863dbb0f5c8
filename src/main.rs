use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use newsmind::{api, app_state::AppState, config::Config, runtime, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    telemetry::init(&config);

    let shutdown = CancellationToken::new();
    let pipeline = runtime::build_pipeline(&config, shutdown.clone()).await?;

    let scheduler = if config.embedded_scheduler {
        Some(tokio::spawn(pipeline.scheduler(&config, shutdown.clone()).run()))
    } else {
        info!("embedded scheduler disabled, leaving scheduled jobs to the worker");
        None
    };

    let state = AppState::new(
        pipeline.store,
        pipeline.crawler,
        pipeline.enricher,
        config.clone(),
    );
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, prefix = %config.api_prefix, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(runtime::shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(scheduler) = scheduler {
        match scheduler.await {
            Ok(Ok(())) => info!("scheduler stopped"),
            Ok(Err(e)) => error!(error = %e, "scheduler failed"),
            Err(e) => error!(error = %e, "scheduler task panicked"),
        }
    }
    Ok(())
}
