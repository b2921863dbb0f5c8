pub mod memory;
pub mod postgres;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::entities::{
    Article, ArtifactFields, Language, NewArticle, NewSource, ProcessedArtifact, Source,
};
use crate::extractor::reject::RejectReason;

pub use memory::MemoryNewsRepository;
pub use postgres::PgNewsRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("article {0} has no processed content")]
    MissingArtifact(i64),

    #[error("article rejected: {0}")]
    InvalidArticle(RejectReason),

    #[error("invalid processed content: {0}")]
    InvalidArtifact(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Connection-level failures that are worth retrying at start-up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
            )
        )
    }
}

/// Calendar window over `created_at`, resolved against the store's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBucket {
    Today,
    Yesterday,
    /// The last 7 days, today included.
    Week,
    /// The last 30 days, today included.
    Month,
    Day(NaiveDate),
}

impl DateBucket {
    /// Half-open `[start, end)` date range; `end` is open-ended for the
    /// rolling windows.
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, Option<NaiveDate>) {
        match self {
            Self::Today => (today, today.succ_opt()),
            Self::Yesterday => (today - Duration::days(1), Some(today)),
            Self::Week => (today - Duration::days(7), None),
            Self::Month => (today - Duration::days(30), None),
            Self::Day(day) => (*day, day.succ_opt()),
        }
    }

    pub fn contains(&self, today: NaiveDate, date: NaiveDate) -> bool {
        let (start, end) = self.range(today);
        date >= start && end.is_none_or(|end| date < end)
    }
}

impl FromStr for DateBucket {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(Self::Day)
                .map_err(|_| StoreError::InvalidFilter(format!("unknown date bucket '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    CreatedAt,
    PublishTime,
    OriginalTitle,
}

impl OrderBy {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::PublishTime => "publish_time",
            Self::OriginalTitle => "original_title",
        }
    }
}

impl FromStr for OrderBy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "created_at" => Ok(Self::CreatedAt),
            "publish_time" => Ok(Self::PublishTime),
            "original_title" => Ok(Self::OriginalTitle),
            other => Err(StoreError::InvalidFilter(format!("cannot order by '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub source_id: Option<i64>,
    pub language: Option<Language>,
    pub processed: Option<bool>,
    pub date: Option<DateBucket>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleQuery {
    pub skip: i64,
    pub limit: i64,
    pub filter: ArticleFilter,
    pub order_by: OrderBy,
    pub descending: bool,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 20,
            filter: ArticleFilter::default(),
            order_by: OrderBy::CreatedAt,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema, sqlx::FromRow)]
pub struct CategoryCount {
    pub category: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Statistics {
    pub total_articles: i64,
    pub processed_articles: i64,
    pub unprocessed_articles: i64,
    pub total_sources: i64,
    /// Percentage of articles that have been enriched.
    pub processing_rate: f64,
    /// Mean quality score over processed articles.
    pub average_quality: f64,
    pub categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema, sqlx::FromRow)]
pub struct QualityBucket {
    /// Integer floor of the quality score.
    pub score: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProcessingStatistics {
    pub total_processed: i64,
    pub average_quality: f64,
    pub average_processing_seconds: f64,
    pub quality_distribution: Vec<QualityBucket>,
    pub categories: Vec<CategoryCount>,
}

pub(crate) fn processing_rate(processed: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        processed as f64 / total as f64 * 100.0
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Checks an artifact against the article it belongs to.
pub(crate) fn check_artifact(article: &Article, fields: &ArtifactFields) -> Result<(), StoreError> {
    if fields.summary_zh.trim().is_empty() || fields.summary_en.trim().is_empty() {
        return Err(StoreError::InvalidArtifact(
            "summaries must not be empty".to_string(),
        ));
    }
    let chinese = article.detected_language.is_chinese();
    match (&fields.translation_zh, chinese) {
        (Some(_), true) => Err(StoreError::InvalidArtifact(
            "chinese articles carry no translation".to_string(),
        )),
        (None, false) => Err(StoreError::InvalidArtifact(format!(
            "{} article requires a chinese translation",
            article.detected_language
        ))),
        (Some(t), false) if t.trim().is_empty() => Err(StoreError::InvalidArtifact(
            "translation must not be empty".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Durable store for sources, articles and their processed content.
#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert or update a source keyed by its url.
    async fn upsert_source(&self, source: &NewSource) -> Result<Source, StoreError>;

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;

    /// Active sources ordered by id.
    async fn get_active_sources(&self) -> Result<Vec<Source>, StoreError>;

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError>;

    async fn get_article_by_source_url(&self, url: &str) -> Result<Option<Article>, StoreError>;

    /// Validates and inserts; a known `source_url` yields `DuplicateKey`.
    async fn insert_article(&self, article: &NewArticle) -> Result<Article, StoreError>;

    /// Unprocessed articles, oldest first.
    async fn get_unprocessed(&self, limit: i64) -> Result<Vec<Article>, StoreError>;

    async fn count_unprocessed(&self) -> Result<i64, StoreError>;

    async fn get_artifact(&self, article_id: i64) -> Result<Option<ProcessedArtifact>, StoreError>;

    /// Create or replace the artifact of an article in place.
    async fn upsert_artifact(
        &self,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError>;

    /// Flag an article as processed. Refuses when it has no artifact.
    async fn mark_processed(&self, article_id: i64) -> Result<(), StoreError>;

    /// Upsert the artifact, copy its quality score to the article and set
    /// the processed flag, all in one transaction.
    async fn complete_enrichment(
        &self,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError>;

    /// Remove the artifact and reset the processed flag. Returns whether an
    /// artifact existed.
    async fn delete_artifact(&self, article_id: i64) -> Result<bool, StoreError>;

    /// Delete articles created more than `days` days ago.
    async fn delete_articles_older_than(&self, days: i64) -> Result<u64, StoreError>;

    /// Case-insensitive substring match over title and content, newest first.
    async fn search(&self, keyword: &str, limit: i64) -> Result<Vec<Article>, StoreError>;

    /// One page of articles plus the total count matching the filters.
    async fn list_articles(&self, query: &ArticleQuery) -> Result<(Vec<Article>, i64), StoreError>;

    async fn list_processed(
        &self,
        skip: i64,
        limit: i64,
        category: Option<&str>,
        min_quality: Option<f64>,
    ) -> Result<Vec<(Article, ProcessedArtifact)>, StoreError>;

    async fn statistics(&self) -> Result<Statistics, StoreError>;

    async fn processing_statistics(&self) -> Result<ProcessingStatistics, StoreError>;
}
