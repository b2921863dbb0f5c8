//! Process wiring shared by the binaries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::crawler::{Crawler, CrawlerOptions};
use crate::enricher::{Enricher, EnricherOptions};
use crate::fetcher::{FetcherOptions, HttpFetcher};
use crate::llm::LlmGateway;
use crate::repositories::{MemoryNewsRepository, NewsRepository, PgNewsRepository, postgres};
use crate::retry::RetryPolicy;
use crate::scheduler::{Scheduler, SchedulerOptions};
use crate::seed;

/// Everything the scheduler and the API drive.
pub struct Pipeline {
    pub store: Arc<dyn NewsRepository>,
    pub crawler: Arc<Crawler>,
    pub enricher: Arc<Enricher>,
}

impl Pipeline {
    pub fn scheduler(&self, config: &Config, shutdown: CancellationToken) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.crawler),
            Arc::clone(&self.enricher),
            SchedulerOptions::from(config),
            shutdown,
        )
    }
}

/// Open the configured store: Postgres with migrations applied, or the
/// in-process store for `memory:` urls.
pub async fn open_store(config: &Config) -> Result<Arc<dyn NewsRepository>> {
    if config.uses_memory_store() {
        warn!("using the in-memory store, nothing survives a restart");
        return Ok(Arc::new(MemoryNewsRepository::new()));
    }

    let pool = postgres::connect(
        &config.database_url,
        RetryPolicy::exponential(5, Duration::from_secs(1)),
    )
    .await
    .context("connecting to the database")?;
    postgres::migrate(&pool).await.context("running migrations")?;
    info!("database ready");
    Ok(Arc::new(PgNewsRepository::new(pool)))
}

/// Build store, gateway, crawler and enricher, and install the default
/// sources on an empty store.
pub async fn build_pipeline(config: &Config, shutdown: CancellationToken) -> Result<Pipeline> {
    let store = open_store(config).await?;
    seed::seed_sources(store.as_ref())
        .await
        .context("installing default sources")?;

    let gateway = Arc::new(LlmGateway::connect(&config.llm).await?);

    let fetcher = HttpFetcher::new(FetcherOptions {
        politeness_delay: config.politeness_delay,
        ..FetcherOptions::default()
    })?;

    let crawler = Arc::new(Crawler::new(
        Arc::clone(&store),
        fetcher,
        CrawlerOptions {
            max_per_source: config.max_per_source,
            concurrency: config.crawl_concurrency,
        },
        shutdown.clone(),
    ));

    let enricher = Arc::new(Enricher::new(
        Arc::clone(&store),
        gateway,
        EnricherOptions {
            max_body_for_prompt: config.max_body_for_prompt,
            ..EnricherOptions::default()
        },
        shutdown,
    ));

    Ok(Pipeline {
        store,
        crawler,
        enricher,
    })
}

/// Resolves on Ctrl+C or SIGTERM and cancels `token`.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
        _ = token.cancelled() => {}
    }
    token.cancel();
}
