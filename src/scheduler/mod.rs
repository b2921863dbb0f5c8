//! Periodic crawl, enrichment and retention ticks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::Config;
use crate::crawler::Crawler;
use crate::enricher::Enricher;
use crate::repositories::NewsRepository;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub crawl_interval: Duration,
    pub retention_days: i64,
    /// Local wall-clock time of the daily retention run.
    pub retention_at: NaiveTime,
    /// `None` disables scheduled enrichment.
    pub enrich_interval: Option<Duration>,
    pub batch_size: i64,
}

impl From<&Config> for SchedulerOptions {
    fn from(config: &Config) -> Self {
        Self {
            crawl_interval: config.crawl_interval,
            retention_days: config.retention_days,
            retention_at: config.retention_at,
            enrich_interval: config.enrich_interval,
            batch_size: config.max_processing_batch_size,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn NewsRepository>,
    crawler: Arc<Crawler>,
    enricher: Arc<Enricher>,
    options: SchedulerOptions,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn NewsRepository>,
        crawler: Arc<Crawler>,
        enricher: Arc<Enricher>,
        options: SchedulerOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            crawler,
            enricher,
            options,
            shutdown,
        }
    }

    /// Run every loop until the shutdown token fires.
    pub async fn run(self) -> Result<()> {
        info!(
            crawl_every = ?self.options.crawl_interval,
            retention_at = %self.options.retention_at,
            enrich_every = ?self.options.enrich_interval,
            "scheduler started"
        );

        let crawl = tokio::spawn(
            crawl_loop(
                Arc::clone(&self.crawler),
                self.options.crawl_interval,
                self.shutdown.clone(),
            )
            .instrument(info_span!("crawl_tick")),
        );

        let retention = tokio::spawn(
            retention_loop(
                Arc::clone(&self.store),
                self.options.retention_days,
                self.options.retention_at,
                self.shutdown.clone(),
            )
            .instrument(info_span!("retention_tick")),
        );

        let enrich = self.options.enrich_interval.map(|period| {
            tokio::spawn(
                enrich_loop(
                    Arc::clone(&self.enricher),
                    period,
                    self.options.batch_size,
                    self.shutdown.clone(),
                )
                .instrument(info_span!("enrich_tick")),
            )
        });

        self.shutdown.cancelled().await;
        info!("scheduler shutting down, waiting for running ticks");

        crawl.await?;
        retention.await?;
        if let Some(enrich) = enrich {
            enrich.await?;
        }
        Ok(())
    }
}

async fn crawl_loop(crawler: Arc<Crawler>, period: Duration, shutdown: CancellationToken) {
    // first tick fires immediately
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match crawler.try_crawl_all().await {
                    Some(Ok(report)) => debug!(new_articles = report.new_articles, "crawl tick done"),
                    Some(Err(e)) => error!(error = %e, "crawl tick failed"),
                    None => warn!("crawl still running, tick skipped"),
                }
            }
        }
    }
}

async fn enrich_loop(
    enricher: Arc<Enricher>,
    period: Duration,
    batch_size: i64,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match enricher.try_enrich_batch(batch_size).await {
                    Some(Ok(report)) => debug!(ok = report.ok, failed = report.failed, "enrich tick done"),
                    Some(Err(e)) => error!(error = %e, "enrich tick failed"),
                    None => warn!("enrichment still running, tick skipped"),
                }
            }
        }
    }
}

async fn retention_loop(
    store: Arc<dyn NewsRepository>,
    days: i64,
    at: NaiveTime,
    shutdown: CancellationToken,
) {
    loop {
        let now = Local::now();
        let wait = (next_fire(&now, at) - now)
            .to_std()
            .unwrap_or(Duration::from_secs(60));
        debug!(?wait, "next retention run");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(wait) => {
                match store.delete_articles_older_than(days).await {
                    Ok(deleted) => info!(deleted, days, "retention run finished"),
                    Err(e) => error!(error = %e, "retention run failed"),
                }
            }
        }
    }
}

/// The first instant strictly after `now` whose wall-clock time is `at`.
/// Days where `at` does not exist locally are skipped.
pub fn next_fire<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.naive_local().date();

    (0..3)
        .filter_map(|offset| today.checked_add_days(chrono::Days::new(offset)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(at)).earliest())
        .find(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
}
