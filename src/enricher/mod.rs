pub mod prompts;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::entities::{Article, ArtifactFields};
use crate::extractor::cleaner::truncate_chars;
use crate::llm::{BackendKind, LlmGateway};
use crate::repositories::{CategoryCount, NewsRepository, QualityBucket, StoreError};

use prompts::{DETAILED_ZH, QUALITY, SUMMARY_EN, SUMMARY_ZH, TITLE_ZH, TRANSLATION_ZH, Task};

#[derive(Debug, Clone)]
pub struct EnricherOptions {
    /// Article bodies are cut to this many code points before prompting.
    pub max_body_for_prompt: usize,
    /// Pause between two articles of a batch.
    pub pause: Duration,
}

impl Default for EnricherOptions {
    fn default() -> Self {
        Self {
            max_body_for_prompt: 1500,
            pause: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BatchReport {
    pub total: u32,
    pub ok: u32,
    pub failed: u32,
    pub api_calls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EnrichmentStats {
    pub processed_count: i64,
    pub pending_count: i64,
    pub avg_quality: f64,
    pub avg_seconds: f64,
    pub per_category: Vec<CategoryCount>,
    pub quality_buckets: Vec<QualityBucket>,
    #[schema(value_type = String)]
    pub active_backend: BackendKind,
}

struct Outcome {
    ok: bool,
    api_calls: u32,
}

/// Drives the LLM gateway over unprocessed articles, one at a time.
pub struct Enricher {
    store: Arc<dyn NewsRepository>,
    gateway: Arc<LlmGateway>,
    options: EnricherOptions,
    shutdown: CancellationToken,
    run_lock: Mutex<()>,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn NewsRepository>,
        gateway: Arc<LlmGateway>,
        options: EnricherOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            gateway,
            options,
            shutdown,
            run_lock: Mutex::new(()),
        }
    }

    pub fn gateway(&self) -> &LlmGateway {
        &self.gateway
    }

    /// Enrich up to `limit` pending articles, oldest first. Waits for a
    /// running batch to finish.
    pub async fn enrich_batch(&self, limit: i64) -> Result<BatchReport, StoreError> {
        let _guard = self.run_lock.lock().await;
        self.run_batch(limit).await
    }

    /// Like [`Enricher::enrich_batch`] but returns `None` when a batch is
    /// already running.
    pub async fn try_enrich_batch(&self, limit: i64) -> Option<Result<BatchReport, StoreError>> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.run_batch(limit).await)
    }

    #[instrument(skip(self))]
    async fn run_batch(&self, limit: i64) -> Result<BatchReport, StoreError> {
        let pending = self.store.get_unprocessed(limit).await?;
        let mut report = BatchReport::default();
        if pending.is_empty() {
            debug!("no pending articles");
            return Ok(report);
        }

        self.gateway.reprobe().await;

        for (i, article) in pending.into_iter().enumerate() {
            if self.shutdown.is_cancelled() {
                info!("enrichment batch cancelled");
                break;
            }
            if i > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("enrichment batch cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(self.options.pause) => {}
                }
            }

            report.total += 1;
            match self.enrich_article(&article).await {
                Ok(outcome) => {
                    report.api_calls += outcome.api_calls;
                    if outcome.ok {
                        report.ok += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    warn!(article_id = article.id, error = %e, "storing enrichment failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            total = report.total,
            ok = report.ok,
            failed = report.failed,
            api_calls = report.api_calls,
            "enrichment batch finished"
        );
        Ok(report)
    }

    /// Enrich one article. Returns `false` when the article is unknown,
    /// already processed, or a required field could not be produced.
    /// Waits for a running batch to finish.
    pub async fn enrich_one(&self, article_id: i64) -> Result<bool, StoreError> {
        let _guard = self.run_lock.lock().await;
        self.run_one(article_id).await
    }

    /// Drop the existing artifact and enrich again.
    pub async fn reenrich_one(&self, article_id: i64) -> Result<bool, StoreError> {
        let _guard = self.run_lock.lock().await;
        self.store.delete_artifact(article_id).await?;
        self.run_one(article_id).await
    }

    async fn run_one(&self, article_id: i64) -> Result<bool, StoreError> {
        let Some(article) = self.store.get_article(article_id).await? else {
            debug!(article_id, "article not found");
            return Ok(false);
        };
        if article.is_processed {
            debug!(article_id, "article already processed");
            return Ok(false);
        }
        Ok(self.enrich_article(&article).await?.ok)
    }

    pub async fn stats(&self) -> Result<EnrichmentStats, StoreError> {
        let processing = self.store.processing_statistics().await?;
        let pending_count = self.store.count_unprocessed().await?;
        Ok(EnrichmentStats {
            processed_count: processing.total_processed,
            pending_count,
            avg_quality: processing.average_quality,
            avg_seconds: processing.average_processing_seconds,
            per_category: processing.categories,
            quality_buckets: processing.quality_distribution,
            active_backend: self.gateway.active(),
        })
    }

    async fn ask(&self, task: &Task, text: &str, calls: &mut u32) -> Option<String> {
        *calls += 1;
        let raw = self
            .gateway
            .generate(task.system, &task.user_prompt(text), task.max_tokens, task.temperature)
            .await?;
        let accepted = prompts::accept(task, &raw);
        if accepted.is_none() {
            debug!(task = task.name, "answer rejected after cleaning");
        }
        accepted
    }

    #[instrument(skip_all, fields(article_id = article.id, lang = %article.detected_language))]
    async fn enrich_article(&self, article: &Article) -> Result<Outcome, StoreError> {
        let started = Instant::now();
        let mut calls = 0;
        let body = truncate_chars(&article.original_content, self.options.max_body_for_prompt);
        let text = format!("{}\n\n{}", article.original_title, body);

        let failed = |task: &Task, calls: u32| -> Result<Outcome, StoreError> {
            warn!(task = task.name, "required field failed, article stays pending");
            Ok(Outcome {
                ok: false,
                api_calls: calls,
            })
        };

        let Some(summary_zh) = self.ask(&SUMMARY_ZH, &text, &mut calls).await else {
            return failed(&SUMMARY_ZH, calls);
        };
        let Some(summary_en) = self.ask(&SUMMARY_EN, &text, &mut calls).await else {
            return failed(&SUMMARY_EN, calls);
        };
        let Some(detailed_summary_zh) = self.ask(&DETAILED_ZH, &text, &mut calls).await else {
            return failed(&DETAILED_ZH, calls);
        };

        let (translation_zh, translated_title) = if article.detected_language.is_chinese() {
            (None, None)
        } else {
            let Some(translation) = self.ask(&TRANSLATION_ZH, body, &mut calls).await else {
                return failed(&TRANSLATION_ZH, calls);
            };
            let title = self.ask(&TITLE_ZH, &article.original_title, &mut calls).await;
            (Some(translation), title)
        };

        calls += 1;
        let quality_score = self
            .gateway
            .generate(
                QUALITY.system,
                &QUALITY.user_prompt(&text),
                QUALITY.max_tokens,
                QUALITY.temperature,
            )
            .await
            .map(|answer| prompts::parse_quality(&answer))
            .unwrap_or(0.0);

        let fields = ArtifactFields {
            summary_zh,
            summary_en,
            detailed_summary_zh,
            translation_zh,
            translated_title,
            quality_score,
            processing_seconds: started.elapsed().as_secs_f64(),
            api_calls_used: calls as i32,
        };

        self.store.complete_enrichment(article.id, &fields).await?;
        info!(
            api_calls = calls,
            quality = quality_score,
            seconds = fields.processing_seconds,
            "article enriched"
        );
        Ok(Outcome {
            ok: true,
            api_calls: calls,
        })
    }
}
