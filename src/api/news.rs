use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use tracing::info;

use super::dtos::{
    ArticleDetail, ArticleList, ArticleSummary, ArticlesParams, CleanupParams, CleanupResponse,
    CrawlResponse, SearchParams, SearchResults, SourceList,
};
use super::error::{ApiError, ErrorResponse};
use crate::app_state::AppState;
use crate::repositories::Statistics;

#[utoipa::path(
    get,
    path = "/news/articles",
    tag = "news",
    params(ArticlesParams),
    responses(
        (status = 200, description = "One page of articles", body = ArticleList),
        (status = 400, description = "Malformed filter", body = ErrorResponse)
    )
)]
pub async fn list_articles(
    State(state): State<AppState>,
    params: Result<Query<ArticlesParams>, QueryRejection>,
) -> Result<Json<ArticleList>, ApiError> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let (articles, total) = state.store.list_articles(&query).await?;

    Ok(Json(ArticleList {
        articles: articles.iter().map(ArticleSummary::from).collect(),
        total,
        skip: query.skip,
        limit: query.limit,
    }))
}

#[utoipa::path(
    get,
    path = "/news/articles/{id}",
    tag = "news",
    params(("id" = i64, Path, description = "Article id")),
    responses(
        (status = 200, description = "Article with its processed content", body = ArticleDetail),
        (status = 404, description = "Unknown article", body = ErrorResponse)
    )
)]
pub async fn get_article(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ArticleDetail>, ApiError> {
    let Path(id) = id?;
    let article = state
        .store
        .get_article(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Article not found".to_string()))?;
    let artifact = state.store.get_artifact(id).await?;
    Ok(Json(ArticleDetail::new(article, artifact)))
}

#[utoipa::path(
    get,
    path = "/news/search",
    tag = "news",
    params(SearchParams),
    responses(
        (status = 200, description = "Articles matching the keyword", body = SearchResults),
        (status = 400, description = "Missing or empty keyword", body = ErrorResponse)
    )
)]
pub async fn search_articles(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResults>, ApiError> {
    let Query(params) = params?;
    let (keyword, limit) = params.validate()?;
    let articles = state.store.search(&keyword, limit).await?;

    Ok(Json(SearchResults {
        total: articles.len(),
        articles: articles.iter().map(ArticleSummary::from).collect(),
        keyword,
    }))
}

#[utoipa::path(
    get,
    path = "/news/sources",
    tag = "news",
    responses((status = 200, description = "Active sources", body = SourceList))
)]
pub async fn list_sources(State(state): State<AppState>) -> Result<Json<SourceList>, ApiError> {
    let sources = state.store.get_active_sources().await?;
    Ok(Json(SourceList {
        total: sources.len(),
        sources,
    }))
}

#[utoipa::path(
    get,
    path = "/news/statistics",
    tag = "news",
    responses((status = 200, description = "Store statistics", body = Statistics))
)]
pub async fn statistics(State(state): State<AppState>) -> Result<Json<Statistics>, ApiError> {
    Ok(Json(state.store.statistics().await?))
}

#[utoipa::path(
    post,
    path = "/news/crawl",
    tag = "news",
    responses((status = 200, description = "Crawl finished", body = CrawlResponse))
)]
pub async fn crawl(State(state): State<AppState>) -> Result<Json<CrawlResponse>, ApiError> {
    info!("manual crawl requested");
    let results = state.crawler.crawl_all().await?;
    Ok(Json(CrawlResponse {
        message: "News crawling completed".to_string(),
        results,
    }))
}

#[utoipa::path(
    post,
    path = "/news/cleanup",
    tag = "news",
    params(CleanupParams),
    responses(
        (status = 200, description = "Old articles removed", body = CleanupResponse),
        (status = 400, description = "Negative window", body = ErrorResponse)
    )
)]
pub async fn cleanup(
    State(state): State<AppState>,
    params: Result<Query<CleanupParams>, QueryRejection>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Query(params) = params?;
    let days = params.days.unwrap_or(state.config.retention_days);
    if days < 0 {
        return Err(ApiError::BadRequest("days must not be negative".to_string()));
    }

    info!(days, "manual cleanup requested");
    let deleted_count = state.store.delete_articles_older_than(days).await?;
    Ok(Json(CleanupResponse {
        message: "Data cleanup completed".to_string(),
        days,
        deleted_count,
    }))
}
