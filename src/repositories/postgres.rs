use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use tracing::{info, instrument};

use crate::entities::{
    Article, ArtifactFields, NewArticle, NewSource, ProcessedArtifact, Source,
};
use crate::extractor::reject::validate;
use crate::repositories::{
    ArticleFilter, ArticleQuery, CategoryCount, DateBucket, NewsRepository, OrderBy,
    ProcessingStatistics, QualityBucket, Statistics, StoreError, check_artifact, processing_rate,
    round2,
};
use crate::retry::{RetryPolicy, retry};

const SOURCE_COLUMNS: &str =
    "id, name, url, kind, category, weight, active, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "id, source_id, source_name, source_url, original_title, \
     original_content, publish_time, detected_language, category, quality_score, is_processed, \
     created_at, updated_at";

const ARTIFACT_COLUMNS: &str = "id, article_id, summary_zh, summary_en, detailed_summary_zh, \
     translation_zh, translated_title, quality_score, processing_seconds, api_calls_used, \
     created_at, updated_at";

/// Open a pool, retrying connection failures with exponential backoff.
pub async fn connect(database_url: &str, policy: RetryPolicy) -> Result<PgPool, StoreError> {
    retry(policy, StoreError::is_transient, || async {
        PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(StoreError::from)
    })
    .await
}

/// Apply pending migrations; a no-op when the schema is current.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

#[derive(Clone)]
pub struct PgNewsRepository {
    pool: PgPool,
}

impl PgNewsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unique_violation(err: sqlx::Error, key: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateKey(key.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ArticleFilter) {
    builder.push(" WHERE TRUE");
    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(source_id) = filter.source_id {
        builder.push(" AND source_id = ").push_bind(source_id);
    }
    if let Some(language) = filter.language {
        builder
            .push(" AND detected_language = ")
            .push_bind(language.as_str());
    }
    if let Some(processed) = filter.processed {
        builder.push(" AND is_processed = ").push_bind(processed);
    }
    match filter.date {
        None => {}
        Some(DateBucket::Today) => {
            builder.push(" AND created_at::date = CURRENT_DATE");
        }
        Some(DateBucket::Yesterday) => {
            builder.push(" AND created_at::date = CURRENT_DATE - 1");
        }
        Some(DateBucket::Week) => {
            builder.push(" AND created_at >= CURRENT_DATE - 7");
        }
        Some(DateBucket::Month) => {
            builder.push(" AND created_at >= CURRENT_DATE - 30");
        }
        Some(DateBucket::Day(day)) => {
            builder.push(" AND created_at::date = ").push_bind(day);
        }
    }
}

fn order_clause(order_by: OrderBy, descending: bool) -> String {
    let dir = if descending { "DESC" } else { "ASC" };
    match order_by {
        OrderBy::PublishTime => format!("publish_time {dir} NULLS LAST, id {dir}"),
        other => format!("{} {dir}, id {dir}", other.column()),
    }
}

impl PgNewsRepository {
    async fn upsert_artifact_in(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError> {
        let article: Article = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1 FOR UPDATE"
        ))
        .bind(article_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("article {article_id}")))?;

        check_artifact(&article, fields)?;

        let artifact = sqlx::query_as(&format!(
            r#"
            INSERT INTO processed_content
                  (article_id, summary_zh, summary_en, detailed_summary_zh, translation_zh,
                   translated_title, quality_score, processing_seconds, api_calls_used)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (article_id) DO UPDATE
              SET summary_zh          = EXCLUDED.summary_zh,
                  summary_en          = EXCLUDED.summary_en,
                  detailed_summary_zh = EXCLUDED.detailed_summary_zh,
                  translation_zh      = EXCLUDED.translation_zh,
                  translated_title    = EXCLUDED.translated_title,
                  quality_score       = EXCLUDED.quality_score,
                  processing_seconds  = EXCLUDED.processing_seconds,
                  api_calls_used      = EXCLUDED.api_calls_used,
                  updated_at          = now()
            RETURNING {ARTIFACT_COLUMNS}
            "#
        ))
        .bind(article_id)
        .bind(&fields.summary_zh)
        .bind(&fields.summary_en)
        .bind(&fields.detailed_summary_zh)
        .bind(&fields.translation_zh)
        .bind(&fields.translated_title)
        .bind(fields.quality_score)
        .bind(fields.processing_seconds)
        .bind(fields.api_calls_used)
        .fetch_one(&mut **tx)
        .await?;

        Ok(artifact)
    }
}

#[async_trait]
impl NewsRepository for PgNewsRepository {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(url = %source.url))]
    async fn upsert_source(&self, source: &NewSource) -> Result<Source, StoreError> {
        let row = sqlx::query_as(&format!(
            r#"
            INSERT INTO sources (name, url, kind, category, weight, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (url) DO UPDATE
              SET name       = EXCLUDED.name,
                  kind       = EXCLUDED.kind,
                  category   = EXCLUDED.category,
                  weight     = EXCLUDED.weight,
                  active     = EXCLUDED.active,
                  updated_at = now()
            RETURNING {SOURCE_COLUMNS}
            "#
        ))
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.kind)
        .bind(&source.category)
        .bind(source.weight)
        .bind(source.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query_as(&format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE active ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query_as(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_article_by_source_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE source_url = $1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip_all, fields(url = %article.source_url))]
    async fn insert_article(&self, article: &NewArticle) -> Result<Article, StoreError> {
        let validation = validate(&article.original_title, &article.original_content);
        if let Some(reason) = validation.reason {
            return Err(StoreError::InvalidArticle(reason));
        }

        let row = sqlx::query_as(&format!(
            r#"
            INSERT INTO articles
                  (source_id, source_name, source_url, original_title, original_content,
                   publish_time, detected_language, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ARTICLE_COLUMNS}
            "#
        ))
        .bind(article.source_id)
        .bind(&article.source_name)
        .bind(&article.source_url)
        .bind(&article.original_title)
        .bind(&article.original_content)
        .bind(article.publish_time)
        .bind(article.detected_language.as_str())
        .bind(&article.category)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, &article.source_url))?;

        Ok(row)
    }

    async fn get_unprocessed(&self, limit: i64) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE NOT is_processed \
             ORDER BY created_at ASC, id ASC LIMIT $1"
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_unprocessed(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE NOT is_processed")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_artifact(&self, article_id: i64) -> Result<Option<ProcessedArtifact>, StoreError> {
        let row = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM processed_content WHERE article_id = $1"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_artifact(
        &self,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError> {
        let mut tx = self.pool.begin().await?;
        let artifact = Self::upsert_artifact_in(&mut tx, article_id, fields).await?;
        tx.commit().await?;
        Ok(artifact)
    }

    async fn mark_processed(&self, article_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
               SET is_processed = TRUE, updated_at = now()
             WHERE id = $1
               AND EXISTS (SELECT 1 FROM processed_content WHERE article_id = $1)
            "#,
        )
        .bind(article_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_article(article_id).await? {
                Some(_) => Err(StoreError::MissingArtifact(article_id)),
                None => Err(StoreError::NotFound(format!("article {article_id}"))),
            };
        }
        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn complete_enrichment(
        &self,
        article_id: i64,
        fields: &ArtifactFields,
    ) -> Result<ProcessedArtifact, StoreError> {
        let mut tx = self.pool.begin().await?;
        let artifact = Self::upsert_artifact_in(&mut tx, article_id, fields).await?;

        sqlx::query(
            "UPDATE articles SET quality_score = $2, is_processed = TRUE, updated_at = now() \
             WHERE id = $1",
        )
        .bind(article_id)
        .bind(fields.quality_score.clamp(0.0, 10.0))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(artifact)
    }

    async fn delete_artifact(&self, article_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM processed_content WHERE article_id = $1")
            .bind(article_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        sqlx::query(
            "UPDATE articles SET is_processed = FALSE, updated_at = now() \
             WHERE id = $1 AND is_processed",
        )
        .bind(article_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn delete_articles_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM articles WHERE created_at < now() - make_interval(days => $1)")
                .bind(i32::try_from(days).map_err(|_| {
                    StoreError::InvalidFilter(format!("retention of {days} days is out of range"))
                })?)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn search(&self, keyword: &str, limit: i64) -> Result<Vec<Article>, StoreError> {
        let escaped = keyword
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");

        let rows = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE original_title ILIKE $1 OR original_content ILIKE $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(pattern)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<(Vec<Article>, i64), StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM articles");
        push_filters(&mut count, &query.filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        push_filters(&mut select, &query.filter);
        select
            .push(" ORDER BY ")
            .push(order_clause(query.order_by, query.descending))
            .push(" OFFSET ")
            .push_bind(query.skip.max(0))
            .push(" LIMIT ")
            .push_bind(query.limit.max(0));

        let rows: Vec<Article> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    async fn list_processed(
        &self,
        skip: i64,
        limit: i64,
        category: Option<&str>,
        min_quality: Option<f64>,
    ) -> Result<Vec<(Article, ProcessedArtifact)>, StoreError> {
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM articles a JOIN processed_content p ON p.article_id = a.id WHERE TRUE",
            ARTICLE_COLUMNS
                .split(", ")
                .map(|c| format!("a.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        if let Some(category) = category {
            select.push(" AND a.category = ").push_bind(category.to_string());
        }
        if let Some(min_quality) = min_quality {
            select.push(" AND p.quality_score >= ").push_bind(min_quality);
        }
        select
            .push(" ORDER BY a.created_at DESC, a.id DESC OFFSET ")
            .push_bind(skip.max(0))
            .push(" LIMIT ")
            .push_bind(limit.max(0));

        let articles: Vec<Article> = select.build_query_as().fetch_all(&self.pool).await?;
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();

        let artifacts: Vec<ProcessedArtifact> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM processed_content WHERE article_id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_article: HashMap<i64, ProcessedArtifact> =
            artifacts.into_iter().map(|p| (p.article_id, p)).collect();

        Ok(articles
            .into_iter()
            .filter_map(|a| by_article.remove(&a.id).map(|p| (a, p)))
            .collect())
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let (total, processed, average_quality): (i64, i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE is_processed), \
                    COALESCE(AVG(quality_score) FILTER (WHERE is_processed), 0)::float8 \
               FROM articles",
        )
        .fetch_one(&self.pool)
        .await?;

        let total_sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE active")
            .fetch_one(&self.pool)
            .await?;

        let categories: Vec<CategoryCount> = sqlx::query_as(
            "SELECT category, COUNT(*) AS count FROM articles \
             GROUP BY category ORDER BY count DESC, category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(Statistics {
            total_articles: total,
            processed_articles: processed,
            unprocessed_articles: total - processed,
            total_sources,
            processing_rate: round2(processing_rate(processed, total)),
            average_quality: round2(average_quality),
            categories,
        })
    }

    async fn processing_statistics(&self) -> Result<ProcessingStatistics, StoreError> {
        let (total_processed, average_quality, average_seconds): (i64, f64, f64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COALESCE(AVG(quality_score), 0)::float8, \
                    COALESCE(AVG(processing_seconds), 0)::float8 \
               FROM processed_content",
        )
        .fetch_one(&self.pool)
        .await?;

        let quality_distribution: Vec<QualityBucket> = sqlx::query_as(
            "SELECT FLOOR(quality_score)::int4 AS score, COUNT(*) AS count \
               FROM processed_content GROUP BY 1 ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let categories: Vec<CategoryCount> = sqlx::query_as(
            "SELECT a.category, COUNT(p.id) AS count \
               FROM articles a JOIN processed_content p ON p.article_id = a.id \
              GROUP BY a.category ORDER BY count DESC, a.category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ProcessingStatistics {
            total_processed,
            average_quality: round2(average_quality),
            average_processing_seconds: round2(average_seconds),
            quality_distribution,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Language, SourceKind};
    use chrono::Utc;

    async fn setup_test_db() -> Option<PgNewsRepository> {
        // Skip tests if TEST_DATABASE_URL is not set
        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("Skipping database tests: TEST_DATABASE_URL not set");
                return None;
            }
        };

        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        migrate(&pool).await.expect("Failed to run migrations");

        Some(PgNewsRepository::new(pool))
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    async fn insert_test_source(repo: &PgNewsRepository) -> Source {
        repo.upsert_source(&NewSource {
            name: "Test Wire".to_string(),
            url: format!("https://wire.example/{}", unique("feed")),
            kind: SourceKind::Feed,
            category: Some("world".to_string()),
            weight: 1.0,
            active: true,
        })
        .await
        .expect("Failed to insert source")
    }

    fn test_article(source: &Source, lang: Language) -> NewArticle {
        NewArticle {
            source_id: source.id,
            source_name: source.name.clone(),
            source_url: format!("https://wire.example/{}", unique("story")),
            original_title: "Integration headline".to_string(),
            original_content: "An article body that is comfortably longer than fifty characters."
                .to_string(),
            publish_time: None,
            detected_language: lang,
            category: source.category.clone(),
        }
    }

    fn test_fields() -> ArtifactFields {
        ArtifactFields {
            summary_zh: "中文摘要内容足够长，可以通过最小长度检查。".to_string(),
            summary_en: "An English summary of adequate length.".to_string(),
            detailed_summary_zh: "详细摘要".to_string(),
            translation_zh: Some("中文翻译".to_string()),
            translated_title: Some("标题".to_string()),
            quality_score: 8.2,
            processing_seconds: 2.5,
            api_calls_used: 5,
        }
    }

    #[tokio::test]
    async fn test_insert_article_duplicate() {
        let Some(repo) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let source = insert_test_source(&repo).await;
        let article = test_article(&source, Language::En);

        let stored = repo.insert_article(&article).await.expect("insert");
        assert_eq!(stored.detected_language, Language::En);
        assert!(!stored.is_processed);

        let err = repo.insert_article(&article).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn test_mark_processed_guard() {
        let Some(repo) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let source = insert_test_source(&repo).await;
        let article = repo
            .insert_article(&test_article(&source, Language::En))
            .await
            .expect("insert");

        let err = repo.mark_processed(article.id).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingArtifact(_)));

        let err = repo.mark_processed(i64::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_and_delete_artifact() {
        let Some(repo) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let source = insert_test_source(&repo).await;
        let article = repo
            .insert_article(&test_article(&source, Language::En))
            .await
            .expect("insert");

        repo.complete_enrichment(article.id, &test_fields())
            .await
            .expect("complete");
        let stored = repo.get_article(article.id).await.unwrap().unwrap();
        assert!(stored.is_processed);
        assert_eq!(stored.quality_score, 8.2);

        // reprocessing overwrites in place
        let again = repo
            .complete_enrichment(article.id, &test_fields())
            .await
            .expect("recomplete");
        assert_eq!(again.article_id, article.id);

        assert!(repo.delete_artifact(article.id).await.unwrap());
        let stored = repo.get_article(article.id).await.unwrap().unwrap();
        assert!(!stored.is_processed);
        assert!(repo.get_artifact(article.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_cascades() {
        let Some(repo) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let source = insert_test_source(&repo).await;
        let article = repo
            .insert_article(&test_article(&source, Language::En))
            .await
            .expect("insert");
        repo.complete_enrichment(article.id, &test_fields())
            .await
            .expect("complete");

        sqlx::query("UPDATE articles SET created_at = now() - interval '31 days' WHERE id = $1")
            .bind(article.id)
            .execute(repo.pool())
            .await
            .expect("backdate");

        let deleted = repo.delete_articles_older_than(30).await.expect("retention");
        assert!(deleted >= 1);
        assert!(repo.get_article(article.id).await.unwrap().is_none());
        assert!(repo.get_artifact(article.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_articles_with_filters() {
        let Some(repo) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let source = insert_test_source(&repo).await;
        for lang in [Language::Fr, Language::Fr, Language::De] {
            repo.insert_article(&test_article(&source, lang))
                .await
                .expect("insert");
        }

        let query = ArticleQuery {
            filter: ArticleFilter {
                source_id: Some(source.id),
                language: Some(Language::Fr),
                date: Some(DateBucket::Today),
                ..Default::default()
            },
            order_by: OrderBy::PublishTime,
            ..Default::default()
        };
        let (rows, total) = repo.list_articles(&query).await.expect("list");
        assert_eq!(total, 2);
        assert!(rows.iter().all(|a| a.detected_language == Language::Fr));
    }
}
