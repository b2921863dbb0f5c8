//! Source crawling: feeds and landing pages in, validated articles out.
//!
//! Sources are crawled concurrently on a bounded pool, each source walks its
//! candidates sequentially. Every candidate goes through the same steps:
//! check the url against the store, validate, detect the language and insert.

pub mod feed;
pub mod selectors;
pub mod web;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;
use utoipa::ToSchema;

use crate::entities::{NewArticle, Source, SourceKind};
use crate::extractor::{BodyExtractor, clean, detect_language, validate};
use crate::fetcher::{FetchError, HttpFetcher};
use crate::repositories::{NewsRepository, StoreError};

/// Feed summaries shorter than this are replaced by the article page body
/// when one can be extracted.
const MIN_SUMMARY_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("unreadable feed: {0}")]
    Feed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    /// Cap on articles persisted per source and run.
    pub max_per_source: usize,
    /// Sources crawled at the same time.
    pub concurrency: usize,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            max_per_source: 20,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CrawlReport {
    pub sources_total: u32,
    pub ok: u32,
    pub failed: u32,
    pub new_articles: u32,
    pub duplicates: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct SourceOutcome {
    new_articles: u32,
    duplicates: u32,
}

enum Persisted {
    Inserted,
    Duplicate,
    Rejected,
}

/// A candidate article. The title still carries markup; the body is plain
/// text, either a cleaned feed summary or an extracted page body.
struct Candidate {
    title: String,
    url: String,
    body: String,
    published: Option<DateTime<Utc>>,
}

struct Context {
    store: Arc<dyn NewsRepository>,
    fetcher: HttpFetcher,
    bodies: BodyExtractor,
    options: CrawlerOptions,
    shutdown: CancellationToken,
}

pub struct Crawler {
    ctx: Arc<Context>,
    run_lock: Mutex<()>,
}

impl Crawler {
    pub fn new(
        store: Arc<dyn NewsRepository>,
        fetcher: HttpFetcher,
        options: CrawlerOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let bodies = BodyExtractor::new(fetcher.clone());
        Self::with_extractor(store, fetcher, bodies, options, shutdown)
    }

    pub fn with_extractor(
        store: Arc<dyn NewsRepository>,
        fetcher: HttpFetcher,
        bodies: BodyExtractor,
        options: CrawlerOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx: Arc::new(Context {
                store,
                fetcher,
                bodies,
                options,
                shutdown,
            }),
            run_lock: Mutex::new(()),
        }
    }

    /// Crawl every active source. Waits for a running crawl to finish.
    pub async fn crawl_all(&self) -> Result<CrawlReport, StoreError> {
        let _guard = self.run_lock.lock().await;
        self.run().await
    }

    /// Like [`Crawler::crawl_all`] but returns `None` when a crawl is already
    /// running.
    pub async fn try_crawl_all(&self) -> Option<Result<CrawlReport, StoreError>> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.run().await)
    }

    async fn run(&self) -> Result<CrawlReport, StoreError> {
        let sources = self.ctx.store.get_active_sources().await?;
        let mut report = CrawlReport {
            sources_total: sources.len() as u32,
            ..Default::default()
        };
        info!(sources = sources.len(), "crawl started");

        let semaphore = Arc::new(Semaphore::new(self.ctx.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for source in sources {
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&semaphore);
            let span = info_span!("source", id = source.id, name = %source.name);
            tasks.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await;
                    ctx.crawl_source(&source).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    report.ok += 1;
                    report.new_articles += outcome.new_articles;
                    report.duplicates += outcome.duplicates;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "source failed");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "source task aborted");
                    report.failed += 1;
                }
            }
        }

        info!(
            sources = report.sources_total,
            ok = report.ok,
            failed = report.failed,
            new_articles = report.new_articles,
            duplicates = report.duplicates,
            "crawl finished"
        );
        Ok(report)
    }
}

impl Context {
    async fn crawl_source(&self, source: &Source) -> Result<SourceOutcome, CrawlError> {
        if self.shutdown.is_cancelled() {
            return Ok(SourceOutcome::default());
        }
        let outcome = match source.kind {
            SourceKind::Feed => self.crawl_feed(source).await?,
            SourceKind::Web => self.crawl_web(source).await?,
        };
        debug!(
            new_articles = outcome.new_articles,
            duplicates = outcome.duplicates,
            "source done"
        );
        Ok(outcome)
    }

    async fn crawl_feed(&self, source: &Source) -> Result<SourceOutcome, CrawlError> {
        let page = self.fetcher.fetch(&source.url).await?;
        let entries = feed::parse_entries(&page.body_raw, &source.name)?;
        let mut outcome = SourceOutcome::default();

        for entry in entries {
            if self.done(&outcome) {
                break;
            }
            let Some(link) = entry.link else {
                debug!(title = %entry.title, "entry without link skipped");
                continue;
            };
            if self.known(&link).await {
                outcome.duplicates += 1;
                continue;
            }

            let mut body = clean(&entry.summary);
            if body.chars().count() < MIN_SUMMARY_CHARS
                && let Some(full) = self.bodies.extract_full_body(&link).await
                && full.chars().count() > body.chars().count()
            {
                body = full;
            }

            let candidate = Candidate {
                title: entry.title,
                url: link,
                body,
                published: entry.published,
            };
            self.persist(source, candidate, &mut outcome).await;
        }

        Ok(outcome)
    }

    async fn crawl_web(&self, source: &Source) -> Result<SourceOutcome, CrawlError> {
        let page = self.fetcher.fetch(&source.url).await?;
        let base = Url::parse(&source.url).unwrap_or(page.url_final);
        let links = web::extract_links(&page.body_utf8, &base, Local::now().year());
        debug!(links = links.len(), "landing page links");
        let mut outcome = SourceOutcome::default();

        for link in links {
            if self.done(&outcome) {
                break;
            }
            if self.known(&link.url).await {
                outcome.duplicates += 1;
                continue;
            }
            let Some(body) = self.bodies.extract_full_body(&link.url).await else {
                debug!(url = %link.url, "no body extracted");
                continue;
            };

            let candidate = Candidate {
                title: link.title,
                url: link.url,
                body,
                published: None,
            };
            self.persist(source, candidate, &mut outcome).await;
        }

        Ok(outcome)
    }

    fn done(&self, outcome: &SourceOutcome) -> bool {
        self.shutdown.is_cancelled()
            || outcome.new_articles as usize >= self.options.max_per_source
    }

    async fn known(&self, url: &str) -> bool {
        match self.store.get_article_by_source_url(url).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(url, error = %e, "duplicate lookup failed");
                false
            }
        }
    }

    async fn persist(&self, source: &Source, candidate: Candidate, outcome: &mut SourceOutcome) {
        match self.store_candidate(source, candidate).await {
            Persisted::Inserted => outcome.new_articles += 1,
            Persisted::Duplicate => outcome.duplicates += 1,
            Persisted::Rejected => {}
        }
    }

    async fn store_candidate(&self, source: &Source, candidate: Candidate) -> Persisted {
        let title = clean(&candidate.title);
        let body = candidate.body;

        let verdict = validate(&title, &body);
        if !verdict.ok {
            debug!(url = %candidate.url, reason = ?verdict.reason, "candidate rejected");
            return Persisted::Rejected;
        }

        let language = detect_language(&title, Some(&body), Some(&source.name));
        let article = NewArticle {
            source_id: source.id,
            source_name: source.name.clone(),
            source_url: candidate.url,
            original_title: title,
            original_content: body,
            publish_time: candidate.published,
            detected_language: language,
            category: source.category.clone(),
        };

        match self.store.insert_article(&article).await {
            Ok(stored) => {
                debug!(article_id = stored.id, language = %language, "article stored");
                Persisted::Inserted
            }
            Err(StoreError::DuplicateKey(_)) => Persisted::Duplicate,
            Err(e) => {
                warn!(url = %article.source_url, error = %e, "storing article failed");
                Persisted::Rejected
            }
        }
    }
}
