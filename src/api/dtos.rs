use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::error::ApiError;
use crate::crawler::CrawlReport;
use crate::enricher::{BatchReport, EnrichmentStats};
use crate::entities::{Article, Language, ProcessedArtifact, Source};
use crate::extractor::truncate_chars;
use crate::repositories::{ArticleFilter, ArticleQuery, DateBucket, OrderBy};

const PREVIEW_CHARS: usize = 200;

/// First 200 characters of a body, marked with `...` when cut.
pub fn preview(content: &str) -> String {
    let cut = truncate_chars(content, PREVIEW_CHARS);
    if cut.len() < content.len() {
        format!("{cut}...")
    } else {
        content.to_string()
    }
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<i64, ApiError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(format!(
            "{name} must be between {min} and {max}"
        )))
    }
}

fn check_skip(skip: Option<i64>) -> Result<i64, ApiError> {
    let skip = skip.unwrap_or(0);
    if skip < 0 {
        return Err(ApiError::BadRequest("skip must not be negative".to_string()));
    }
    Ok(skip)
}

// --- Query parameters ---

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ArticlesParams {
    pub skip: Option<i64>,
    /// 1 to 1000, default 100.
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub source_id: Option<i64>,
    /// Language tag such as `en` or `zh`.
    pub language: Option<String>,
    #[serde(alias = "is_processed")]
    pub processed: Option<bool>,
    /// `today`, `yesterday`, `week`, `month` or `YYYY-MM-DD`.
    pub date: Option<String>,
    /// `created_at`, `publish_time` or `original_title`.
    pub order_by: Option<String>,
    pub order_desc: Option<bool>,
}

impl ArticlesParams {
    pub fn into_query(self) -> Result<ArticleQuery, ApiError> {
        let language = self
            .language
            .as_deref()
            .map(str::parse::<Language>)
            .transpose()
            .map_err(|e| ApiError::BadRequest(format!("language: {e}")))?;
        let date = self.date.as_deref().map(str::parse::<DateBucket>).transpose()?;
        let order_by = self
            .order_by
            .as_deref()
            .map(str::parse::<OrderBy>)
            .transpose()?
            .unwrap_or_default();

        Ok(ArticleQuery {
            skip: check_skip(self.skip)?,
            limit: check_range("limit", self.limit.unwrap_or(100), 1, 1000)?,
            filter: ArticleFilter {
                category: self.category.filter(|c| !c.trim().is_empty()),
                source_id: self.source_id,
                language,
                processed: self.processed,
                date,
            },
            order_by,
            descending: self.order_desc.unwrap_or(true),
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    pub keyword: String,
    /// 1 to 100, default 50.
    pub limit: Option<i64>,
}

impl SearchParams {
    pub fn validate(&self) -> Result<(String, i64), ApiError> {
        let keyword = self.keyword.trim();
        if keyword.is_empty() {
            return Err(ApiError::BadRequest("keyword must not be empty".to_string()));
        }
        let limit = check_range("limit", self.limit.unwrap_or(50), 1, 100)?;
        Ok((keyword.to_string(), limit))
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CleanupParams {
    /// Retention window in days, defaults to the configured one.
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ProcessParams {
    /// 1 to 50, default 10.
    pub limit: Option<i64>,
}

impl ProcessParams {
    pub fn limit(&self) -> Result<i64, ApiError> {
        check_range("limit", self.limit.unwrap_or(10), 1, 50)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ProcessedParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub min_quality: Option<f64>,
}

impl ProcessedParams {
    pub fn validate(&self) -> Result<(i64, i64, Option<String>, Option<f64>), ApiError> {
        if let Some(q) = self.min_quality
            && !(0.0..=10.0).contains(&q)
        {
            return Err(ApiError::BadRequest(
                "min_quality must be between 0 and 10".to_string(),
            ));
        }
        Ok((
            check_skip(self.skip)?,
            check_range("limit", self.limit.unwrap_or(100), 1, 1000)?,
            self.category.clone().filter(|c| !c.trim().is_empty()),
            self.min_quality,
        ))
    }
}

// --- Responses ---

/// Article as listed, body cut to a preview.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArticleSummary {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub source_url: String,
    pub original_title: String,
    pub original_content: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub detected_language: Language,
    pub category: Option<String>,
    pub quality_score: f64,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Article> for ArticleSummary {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            source_id: article.source_id,
            source_name: article.source_name.clone(),
            source_url: article.source_url.clone(),
            original_title: article.original_title.clone(),
            original_content: preview(&article.original_content),
            publish_time: article.publish_time,
            detected_language: article.detected_language,
            category: article.category.clone(),
            quality_score: article.quality_score,
            is_processed: article.is_processed,
            created_at: article.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArticleList {
    pub articles: Vec<ArticleSummary>,
    /// Matches across all pages.
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessedContent {
    pub summary_zh: String,
    pub summary_en: String,
    pub detailed_summary_zh: String,
    pub translation_zh: Option<String>,
    pub translated_title: Option<String>,
    pub quality_score: f64,
    pub processing_seconds: f64,
    pub api_calls_used: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProcessedArtifact> for ProcessedContent {
    fn from(artifact: ProcessedArtifact) -> Self {
        Self {
            summary_zh: artifact.summary_zh,
            summary_en: artifact.summary_en,
            detailed_summary_zh: artifact.detailed_summary_zh,
            translation_zh: artifact.translation_zh,
            translated_title: artifact.translated_title,
            quality_score: artifact.quality_score,
            processing_seconds: artifact.processing_seconds,
            api_calls_used: artifact.api_calls_used,
            created_at: artifact.created_at,
            updated_at: artifact.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArticleDetail {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub source_url: String,
    pub original_title: String,
    /// Translated title when one exists, the original otherwise.
    pub display_title: String,
    pub original_content: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub detected_language: Language,
    pub category: Option<String>,
    pub quality_score: f64,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_content: Option<ProcessedContent>,
}

impl ArticleDetail {
    pub fn new(article: Article, artifact: Option<ProcessedArtifact>) -> Self {
        let display_title = artifact
            .as_ref()
            .and_then(|a| a.translated_title.clone())
            .unwrap_or_else(|| article.original_title.clone());
        Self {
            id: article.id,
            source_id: article.source_id,
            source_name: article.source_name,
            source_url: article.source_url,
            original_title: article.original_title,
            display_title,
            original_content: article.original_content,
            publish_time: article.publish_time,
            detected_language: article.detected_language,
            category: article.category,
            quality_score: article.quality_score,
            is_processed: article.is_processed,
            created_at: article.created_at,
            updated_at: article.updated_at,
            processed_content: artifact.map(ProcessedContent::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResults {
    pub keyword: String,
    pub articles: Vec<ArticleSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourceList {
    pub sources: Vec<Source>,
    pub total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CrawlResponse {
    pub message: String,
    pub results: CrawlReport,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub message: String,
    pub days: i64,
    pub deleted_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessBatchResponse {
    pub message: String,
    pub results: BatchReport,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessOneResponse {
    pub article_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AiStatisticsResponse {
    pub ai_processing_statistics: EnrichmentStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessedBrief {
    pub summary_zh: String,
    pub summary_en: String,
    pub translated_title: Option<String>,
    pub quality_score: f64,
    pub processing_seconds: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessedArticle {
    #[serde(flatten)]
    pub article: ArticleSummary,
    pub processed_content: ProcessedBrief,
}

impl From<(Article, ProcessedArtifact)> for ProcessedArticle {
    fn from((article, artifact): (Article, ProcessedArtifact)) -> Self {
        Self {
            article: ArticleSummary::from(&article),
            processed_content: ProcessedBrief {
                summary_zh: artifact.summary_zh,
                summary_en: artifact.summary_en,
                translated_title: artifact.translated_title,
                quality_score: artifact.quality_score,
                processing_seconds: artifact.processing_seconds,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessedList {
    pub articles: Vec<ProcessedArticle>,
    pub total: usize,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnprocessedCount {
    pub unprocessed_count: i64,
}

/// Which enrichment outputs an article already has.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArticleStatus {
    pub article_id: i64,
    pub original_title: String,
    pub detected_language: Language,
    pub is_processed: bool,
    pub has_summary_zh: bool,
    pub has_summary_en: bool,
    pub has_translation: bool,
    pub needs_translation: bool,
    pub needs_processing: bool,
}

impl ArticleStatus {
    pub fn new(article: &Article, artifact: Option<&ProcessedArtifact>) -> Self {
        let filled = |text: Option<&str>| text.is_some_and(|t| !t.trim().is_empty());
        let has_summary_zh = filled(artifact.map(|a| a.summary_zh.as_str()));
        let has_summary_en = filled(artifact.map(|a| a.summary_en.as_str()));
        let has_translation = filled(artifact.and_then(|a| a.translation_zh.as_deref()));
        let needs_translation = !article.detected_language.is_chinese() && !has_translation;

        Self {
            article_id: article.id,
            original_title: article.original_title.clone(),
            detected_language: article.detected_language,
            is_processed: article.is_processed,
            has_summary_zh,
            has_summary_en,
            has_translation,
            needs_translation,
            needs_processing: !has_summary_zh || !has_summary_en || needs_translation,
        }
    }
}
