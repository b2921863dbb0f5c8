use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use tracing::info;

use super::dtos::{
    AiStatisticsResponse, ArticleStatus, ProcessBatchResponse, ProcessOneResponse,
    ProcessParams, ProcessedArticle, ProcessedList, ProcessedParams, UnprocessedCount,
};
use super::error::{ApiError, ErrorResponse};
use crate::app_state::AppState;

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Article {id} not found"))
}

#[utoipa::path(
    post,
    path = "/ai/process",
    tag = "ai",
    params(ProcessParams),
    responses(
        (status = 200, description = "Batch finished", body = ProcessBatchResponse),
        (status = 400, description = "Limit out of range", body = ErrorResponse)
    )
)]
pub async fn process_batch(
    State(state): State<AppState>,
    params: Result<Query<ProcessParams>, QueryRejection>,
) -> Result<Json<ProcessBatchResponse>, ApiError> {
    let Query(params) = params?;
    let limit = params.limit()?;
    info!(limit, "manual enrichment requested");

    let results = state.enricher.enrich_batch(limit).await?;
    Ok(Json(ProcessBatchResponse {
        message: "AI processing completed".to_string(),
        results,
    }))
}

#[utoipa::path(
    post,
    path = "/ai/process/{id}",
    tag = "ai",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article processed or already processed", body = ProcessOneResponse),
        (status = 404, description = "Unknown article", body = ErrorResponse),
        (status = 500, description = "Enrichment failed", body = ErrorResponse)
    )
)]
pub async fn process_one(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ProcessOneResponse>, ApiError> {
    let Path(id) = id?;
    let article = state.store.get_article(id).await?.ok_or_else(|| not_found(id))?;
    if article.is_processed {
        return Ok(Json(ProcessOneResponse {
            article_id: id,
            message: format!("Article {id} is already processed"),
        }));
    }

    if state.enricher.enrich_one(id).await? {
        Ok(Json(ProcessOneResponse {
            article_id: id,
            message: format!("Article {id} processed successfully"),
        }))
    } else {
        Err(ApiError::Internal(format!("Article {id} could not be processed")))
    }
}

#[utoipa::path(
    post,
    path = "/ai/reprocess/{id}",
    tag = "ai",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article processed again", body = ProcessOneResponse),
        (status = 404, description = "Unknown article", body = ErrorResponse),
        (status = 500, description = "Enrichment failed", body = ErrorResponse)
    )
)]
pub async fn reprocess_one(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ProcessOneResponse>, ApiError> {
    let Path(id) = id?;
    if state.store.get_article(id).await?.is_none() {
        return Err(not_found(id));
    }

    if state.enricher.reenrich_one(id).await? {
        Ok(Json(ProcessOneResponse {
            article_id: id,
            message: format!("Article {id} reprocessed successfully"),
        }))
    } else {
        Err(ApiError::Internal(format!("Article {id} could not be reprocessed")))
    }
}

#[utoipa::path(
    get,
    path = "/ai/statistics",
    tag = "ai",
    responses((status = 200, description = "Enrichment statistics", body = AiStatisticsResponse))
)]
pub async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<AiStatisticsResponse>, ApiError> {
    Ok(Json(AiStatisticsResponse {
        ai_processing_statistics: state.enricher.stats().await?,
    }))
}

#[utoipa::path(
    get,
    path = "/ai/processed-articles",
    tag = "ai",
    params(ProcessedParams),
    responses(
        (status = 200, description = "Processed articles with their summaries", body = ProcessedList),
        (status = 400, description = "Malformed filter", body = ErrorResponse)
    )
)]
pub async fn processed_articles(
    State(state): State<AppState>,
    params: Result<Query<ProcessedParams>, QueryRejection>,
) -> Result<Json<ProcessedList>, ApiError> {
    let Query(params) = params?;
    let (skip, limit, category, min_quality) = params.validate()?;
    let rows = state
        .store
        .list_processed(skip, limit, category.as_deref(), min_quality)
        .await?;

    let articles: Vec<ProcessedArticle> = rows.into_iter().map(ProcessedArticle::from).collect();
    Ok(Json(ProcessedList {
        total: articles.len(),
        articles,
        skip,
        limit,
    }))
}

#[utoipa::path(
    get,
    path = "/ai/unprocessed-count",
    tag = "ai",
    responses((status = 200, description = "Articles waiting for enrichment", body = UnprocessedCount))
)]
pub async fn unprocessed_count(
    State(state): State<AppState>,
) -> Result<Json<UnprocessedCount>, ApiError> {
    Ok(Json(UnprocessedCount {
        unprocessed_count: state.store.count_unprocessed().await?,
    }))
}

#[utoipa::path(
    get,
    path = "/ai/article-status/{id}",
    tag = "ai",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 200, description = "Enrichment state of the article", body = ArticleStatus),
        (status = 404, description = "Unknown article", body = ErrorResponse)
    )
)]
pub async fn article_status(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ArticleStatus>, ApiError> {
    let Path(id) = id?;
    let article = state.store.get_article(id).await?.ok_or_else(|| not_found(id))?;
    let artifact = state.store.get_artifact(id).await?;
    Ok(Json(ArticleStatus::new(&article, artifact.as_ref())))
}
