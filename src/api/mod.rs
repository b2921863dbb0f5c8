//! HTTP read and control API.

pub mod ai;
pub mod dtos;
pub mod error;
pub mod news;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::health;

pub use error::{ApiError, ErrorResponse};

#[derive(OpenApi)]
#[openapi(
    info(title = "NewsMind", description = "News aggregation and enrichment API"),
    paths(
        health::health_check,
        news::list_articles,
        news::get_article,
        news::search_articles,
        news::list_sources,
        news::statistics,
        news::crawl,
        news::cleanup,
        ai::process_batch,
        ai::process_one,
        ai::reprocess_one,
        ai::statistics,
        ai::processed_articles,
        ai::unprocessed_count,
        ai::article_status,
    ),
    tags(
        (name = "news", description = "Articles, sources and crawling"),
        (name = "ai", description = "LLM enrichment"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// OpenAPI document with the api routes moved under `prefix`.
pub fn openapi(prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let paths = std::mem::take(&mut doc.paths.paths);
    doc.paths.paths = paths
        .into_iter()
        .map(|(path, item)| {
            if path == "/healthz" {
                (path, item)
            } else {
                (format!("{prefix}{path}"), item)
            }
        })
        .collect();
    doc
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/news/articles", get(news::list_articles))
        .route("/news/articles/{id}", get(news::get_article))
        .route("/news/search", get(news::search_articles))
        .route("/news/sources", get(news::list_sources))
        .route("/news/statistics", get(news::statistics))
        .route("/news/crawl", post(news::crawl))
        .route("/news/cleanup", post(news::cleanup))
        .route("/ai/process", post(ai::process_batch))
        .route("/ai/process/{id}", post(ai::process_one))
        .route("/ai/reprocess/{id}", post(ai::reprocess_one))
        .route("/ai/statistics", get(ai::statistics))
        .route("/ai/processed-articles", get(ai::processed_articles))
        .route("/ai/unprocessed-count", get(ai::unprocessed_count))
        .route("/ai/article-status/{id}", get(ai::article_status))
}

/// The full application router: api routes under the configured prefix,
/// `/healthz` and the Swagger UI at `/docs`.
pub fn router(state: AppState) -> Router {
    let prefix = normalize_prefix(&state.config.api_prefix);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = if prefix.is_empty() {
        api_routes()
    } else {
        Router::new().nest(&prefix, api_routes())
    };

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi(&prefix)))
        .route("/healthz", get(health::health_check))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
        .with_state(state)
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
