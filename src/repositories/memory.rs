use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::entities::{
    Article, ArtifactFields, NewArticle, NewSource, ProcessedArtifact, Source,
};
use crate::extractor::reject::validate;
use crate::repositories::{
    ArticleQuery, CategoryCount, NewsRepository, OrderBy, ProcessingStatistics, QualityBucket,
    Statistics, StoreError, check_artifact, processing_rate, round2,
};

#[derive(Default)]
struct Tables {
    sources: BTreeMap<i64, Source>,
    articles: BTreeMap<i64, Article>,
    /// Keyed by article id.
    artifacts: HashMap<i64, ProcessedArtifact>,
    next_source_id: i64,
    next_article_id: i64,
    next_artifact_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn article(&self, id: i64) -> Result<&Article, StoreError> {
        self.articles
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("article {id}")))
    }

    fn upsert_artifact(
        &mut self,
        article_id: i64,
        fields: &ArtifactFields,
        now: DateTime<Utc>,
    ) -> Result<ProcessedArtifact, StoreError> {
        check_artifact(self.article(article_id)?, fields)?;

        let (id, created_at) = match self.artifacts.get(&article_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Self::next_id(&mut self.next_artifact_id), now),
        };
        let artifact = ProcessedArtifact {
            id,
            article_id,
            summary_zh: fields.summary_zh.clone(),
            summary_en: fields.summary_en.clone(),
            detailed_summary_zh: fields.detailed_summary_zh.clone(),
            translation_zh: fields.translation_zh.clone(),
            translated_title: fields.translated_title.clone(),
            quality_score: fields.quality_score,
            processing_seconds: fields.processing_seconds,
            api_calls_used: fields.api_calls_used,
            created_at,
            updated_at: now,
        };
        self.artifacts.insert(article_id, artifact.clone());
        Ok(artifact)
    }

    fn category_counts<'a>(articles: impl Iterator<Item = &'a Article>) -> Vec<CategoryCount> {
        let mut counts: HashMap<Option<String>, i64> = HashMap::new();
        for article in articles {
            *counts.entry(article.category.clone()).or_default() += 1;
        }
        let mut out: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        out
    }
}

/// In-process store with the same semantics as the PostgreSQL one.
#[derive(Default)]
pub struct MemoryNewsRepository {
    tables: RwLock<Tables>,
}

impl MemoryNewsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an article's creation time, e.g. when importing archives.
    pub async fn set_created_at(&self, article_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let article = tables
            .articles
            .get_mut(&article_id)
            .ok_or_else(|| StoreError::NotFound(format!("article {article_id}")))?;
        article.created_at = at;
        Ok(())
    }
}

fn compare(a: &Article, b: &Article, order_by: OrderBy, descending: bool) -> Ordering {
    let primary = match order_by {
        OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
        OrderBy::OriginalTitle => a.original_title.cmp(&b.original_title),
        OrderBy::PublishTime => match (a.publish_time, b.publish_time) {
            (Some(x), Some(y)) => x.cmp(&y),
            // Missing publish times sort last in both directions.
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (None, None) => Ordering::Equal,
        },
    };
    let ordering = primary.then_with(|| a.id.cmp(&b.id));
    if descending { ordering.reverse() } else { ordering }
}

fn page<T>(items: impl Iterator<Item = T>, skip: i64, limit: i64) -> Vec<T> {
    items
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl NewsRepository for MemoryNewsRepository {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_source(&self, source: &NewSource) -> Result<Source, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(existing) = tables.sources.values_mut().find(|s| s.url == source.url) {
            existing.name = source.name.clone();
            existing.kind = source.kind;
            existing.category = source.category.clone();
            existing.weight = source.weight;
            existing.active = source.active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = Tables::next_id(&mut tables.next_source_id);
        let created = Source {
            id,
            name: source.name.clone(),
            url: source.url.clone(),
            kind: source.kind,
            category: source.category.clone(),
            weight: source.weight,
            active: source.active,
            created_at: now,
            updated_at: now,
        };
        tables.sources.insert(id, created.clone());
        Ok(created)
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.tables.read().await.sources.values().cloned().collect())
    }

    async fn get_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.sources.values().filter(|s| s.active).cloned().collect())
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError> {
        Ok(self.tables.read().await.articles.get(&id).cloned())
    }

    async fn get_article_by_source_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.articles.values().find(|a| a.source_url == url).cloned())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<Article, StoreError> {
        let validation = validate(&article.original_title, &article.original_content);
        if let Some(reason) = validation.reason {
            return Err(StoreError::InvalidArticle(reason));
        }

        let mut tables = self.tables.write().await;
        if !tables.sources.contains_key(&article.source_id) {
            return Err(StoreError::NotFound(format!("source {}", article.source_id)));
        }
        if tables.articles.values().any(|a| a.source_url == article.source_url) {
            return Err(StoreError::DuplicateKey(article.source_url.clone()));
        }

        let now = Utc::now();
        let id = Tables::next_id(&mut tables.next_article_id);
        let stored = Article {
            id,
            source_id: article.source_id,
            source_name: article.source_name.clone(),
            source_url: article.source_url.clone(),
            original_title: article.original_title.clone(),
            original_content: article.original_content.clone(),
            publish_time: article.publish_time,
            detected_language: article.detected_language,
            category: article.category.clone(),
            quality_score: 0.0,
            is_processed: false,
            created_at: now,
            updated_at: now,
        };
        tables.articles.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_unprocessed(&self, limit: i64) -> Result<Vec<Article>, StoreError> {
        let tables = self.tables.read().await;
        let mut pending: Vec<&Article> =
            tables.articles.values().filter(|a| !a.is_processed).collect();
        pending.sort_by(|a, b| compare(a, b, OrderBy::CreatedAt, false));
        Ok(page(pending.into_iter().cloned(), 0, limit))
    }

    async fn count_unprocessed(&self) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.articles.values().filter(|a| !a.is_processed).count() as i64)
    }

    async fn get_artifact(&self, article_id: i64) -> Result<Option<ProcessedArtifact>, StoreError> {
        Ok(self.tables.read().await.artifacts.get(&article_id).cloned())
    }

    async fn upsert_artifact(
        &self,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError> {
        let mut tables = self.tables.write().await;
        tables.upsert_artifact(article_id, fields, Utc::now())
    }

    async fn mark_processed(&self, article_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.article(article_id)?;
        if !tables.artifacts.contains_key(&article_id) {
            return Err(StoreError::MissingArtifact(article_id));
        }
        if let Some(article) = tables.articles.get_mut(&article_id) {
            article.is_processed = true;
            article.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_enrichment(
        &self,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError> {
        // A single write guard makes the three steps atomic.
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let artifact = tables.upsert_artifact(article_id, fields, now)?;
        if let Some(article) = tables.articles.get_mut(&article_id) {
            article.quality_score = fields.quality_score.clamp(0.0, 10.0);
            article.is_processed = true;
            article.updated_at = now;
        }
        Ok(artifact)
    }

    async fn delete_artifact(&self, article_id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables.artifacts.remove(&article_id).is_some();
        if let Some(article) = tables.articles.get_mut(&article_id)
            && article.is_processed
        {
            article.is_processed = false;
            article.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn delete_articles_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let cutoff = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                StoreError::InvalidFilter(format!("retention of {days} days is out of range"))
            })?;
        let mut tables = self.tables.write().await;
        let expired: Vec<i64> = tables
            .articles
            .values()
            .filter(|a| a.created_at < cutoff)
            .map(|a| a.id)
            .collect();
        for id in &expired {
            tables.articles.remove(id);
            tables.artifacts.remove(id);
        }
        Ok(expired.len() as u64)
    }

    async fn search(&self, keyword: &str, limit: i64) -> Result<Vec<Article>, StoreError> {
        let needle = keyword.to_lowercase();
        let tables = self.tables.read().await;
        let mut hits: Vec<&Article> = tables
            .articles
            .values()
            .filter(|a| {
                a.original_title.to_lowercase().contains(&needle)
                    || a.original_content.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort_by(|a, b| compare(a, b, OrderBy::CreatedAt, true));
        Ok(page(hits.into_iter().cloned(), 0, limit))
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<(Vec<Article>, i64), StoreError> {
        let filter = &query.filter;
        let today = Utc::now().date_naive();
        let tables = self.tables.read().await;

        let mut matching: Vec<&Article> = tables
            .articles
            .values()
            .filter(|a| {
                filter.category.as_ref().is_none_or(|c| a.category.as_ref() == Some(c))
                    && filter.source_id.is_none_or(|id| a.source_id == id)
                    && filter.language.is_none_or(|lang| a.detected_language == lang)
                    && filter.processed.is_none_or(|p| a.is_processed == p)
                    && filter
                        .date
                        .is_none_or(|bucket| bucket.contains(today, a.created_at.date_naive()))
            })
            .collect();

        let total = matching.len() as i64;
        matching.sort_by(|a, b| compare(a, b, query.order_by, query.descending));
        Ok((page(matching.into_iter().cloned(), query.skip, query.limit), total))
    }

    async fn list_processed(
        &self,
        skip: i64,
        limit: i64,
        category: Option<&str>,
        min_quality: Option<f64>,
    ) -> Result<Vec<(Article, ProcessedArtifact)>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<(&Article, &ProcessedArtifact)> = tables
            .articles
            .values()
            .filter_map(|a| tables.artifacts.get(&a.id).map(|p| (a, p)))
            .filter(|(a, p)| {
                category.is_none_or(|c| a.category.as_deref() == Some(c))
                    && min_quality.is_none_or(|q| p.quality_score >= q)
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| compare(a, b, OrderBy::CreatedAt, true));
        Ok(page(
            rows.into_iter().map(|(a, p)| (a.clone(), p.clone())),
            skip,
            limit,
        ))
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let tables = self.tables.read().await;
        let total = tables.articles.len() as i64;
        let processed: Vec<&Article> = tables.articles.values().filter(|a| a.is_processed).collect();
        let processed_count = processed.len() as i64;
        let average_quality = if processed.is_empty() {
            0.0
        } else {
            processed.iter().map(|a| a.quality_score).sum::<f64>() / processed.len() as f64
        };

        Ok(Statistics {
            total_articles: total,
            processed_articles: processed_count,
            unprocessed_articles: total - processed_count,
            total_sources: tables.sources.values().filter(|s| s.active).count() as i64,
            processing_rate: round2(processing_rate(processed_count, total)),
            average_quality: round2(average_quality),
            categories: Tables::category_counts(tables.articles.values()),
        })
    }

    async fn processing_statistics(&self) -> Result<ProcessingStatistics, StoreError> {
        let tables = self.tables.read().await;
        let artifacts: Vec<&ProcessedArtifact> = tables.artifacts.values().collect();
        let n = artifacts.len();
        let mean = |f: fn(&ProcessedArtifact) -> f64| {
            if n == 0 {
                0.0
            } else {
                round2(artifacts.iter().map(|p| f(p)).sum::<f64>() / n as f64)
            }
        };

        let mut buckets: BTreeMap<i32, i64> = BTreeMap::new();
        for artifact in &artifacts {
            *buckets.entry(artifact.quality_score.floor() as i32).or_default() += 1;
        }

        let enriched = tables
            .articles
            .values()
            .filter(|a| tables.artifacts.contains_key(&a.id));

        Ok(ProcessingStatistics {
            total_processed: n as i64,
            average_quality: mean(|p| p.quality_score),
            average_processing_seconds: mean(|p| p.processing_seconds),
            quality_distribution: buckets
                .into_iter()
                .map(|(score, count)| QualityBucket { score, count })
                .collect(),
            categories: Tables::category_counts(enriched),
        })
    }
}
