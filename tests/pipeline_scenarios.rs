mod helpers;

use std::sync::Arc;

use chrono::{Duration, Utc};
use newsmind::entities::{Language, NewSource, SourceKind};
use newsmind::extractor::{detect_language, validate};
use newsmind::llm::BackendKind;
use newsmind::repositories::{MemoryNewsRepository, NewsRepository};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use helpers::*;

#[tokio::test]
async fn english_feed_is_ingested_and_enriched() {
    let site = MockServer::start().await;
    let llm = llm_server().await;
    let summary = english_body(600);
    serve_feed(
        &site,
        "/bbc.xml",
        &[(
            "Breaking: global summit concludes",
            "https://example.test/a1",
            summary.as_str(),
        )],
    )
    .await;

    let store = Arc::new(MemoryNewsRepository::new());
    add_feed_source(&store, "BBC News", &format!("{}/bbc.xml", site.uri())).await;
    let pipeline = Pipeline::new(store.clone(), gateway(&chat_url(&llm), None).await);

    let crawl = pipeline.crawler.crawl_all().await.unwrap();
    assert_eq!(crawl.new_articles, 1);

    let article = store
        .get_article_by_source_url("https://example.test/a1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.detected_language, Language::En);
    assert!(!article.is_processed);
    assert!(article.publish_time.is_none());
    assert!(validate(&article.original_title, &article.original_content).ok);

    let batch = pipeline.enricher.enrich_batch(10).await.unwrap();
    assert_eq!(batch.total, 1);
    assert_eq!(batch.ok, 1);
    assert_eq!(batch.api_calls, 6);

    let article = store.get_article(article.id).await.unwrap().unwrap();
    assert!(article.is_processed);
    assert_eq!(article.quality_score, 8.5);

    let artifact = store.get_artifact(article.id).await.unwrap().unwrap();
    assert_eq!(artifact.summary_zh, SUMMARY_ZH);
    assert_eq!(artifact.summary_en, SUMMARY_EN);
    assert!(!artifact.detailed_summary_zh.is_empty());
    assert!(artifact.translation_zh.as_deref().is_some_and(|t| !t.is_empty()));
    assert_eq!(artifact.translated_title.as_deref(), Some(TITLE_ZH));
    assert_eq!(artifact.api_calls_used, 6);
}

#[tokio::test]
async fn repeated_crawl_inserts_nothing() {
    let site = MockServer::start().await;
    let (first_body, second_body) = (english_body(600), english_body(500));
    serve_feed(
        &site,
        "/bbc.xml",
        &[
            ("Breaking: global summit concludes", "https://example.test/a1", first_body.as_str()),
            ("Markets rally after the summit", "https://example.test/a2", second_body.as_str()),
        ],
    )
    .await;

    let store = Arc::new(MemoryNewsRepository::new());
    add_feed_source(&store, "BBC News", &format!("{}/bbc.xml", site.uri())).await;
    let pipeline = Pipeline::new(store.clone(), gateway(UNREACHABLE_LLM, None).await);

    let first = pipeline.crawler.crawl_all().await.unwrap();
    assert_eq!(first.new_articles, 2);
    let before = store.statistics().await.unwrap().total_articles;

    let second = pipeline.crawler.crawl_all().await.unwrap();
    assert_eq!(second.new_articles, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(store.statistics().await.unwrap().total_articles, before);
}

async fn serve_article_page(server: &MockServer, route: &str, body: &str) {
    let html = format!(
        "<html><head><title>Story</title></head><body>\
         <nav>Home World Business</nav>\
         <article><p>{body}</p></article>\
         <footer>Copyright</footer></body></html>"
    );
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn web_source_is_crawled_from_landing_page() {
    let site = MockServer::start().await;
    let landing = r#"<html><body>
        <a href="/news/harbour-vote">Harbour expansion approved by the council</a>
        <a href="/about">About this newsroom and its editors</a>
        </body></html>"#;
    Mock::given(method("GET"))
        .and(path("/front"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(landing, "text/html"))
        .mount(&site)
        .await;
    let full = english_body(600);
    serve_article_page(&site, "/news/harbour-vote", &full).await;

    let store = Arc::new(MemoryNewsRepository::new());
    store
        .upsert_source(&NewSource {
            name: "Harbour Gazette".to_string(),
            url: format!("{}/front", site.uri()),
            kind: SourceKind::Web,
            category: Some("local".to_string()),
            weight: 1.0,
            active: true,
        })
        .await
        .unwrap();
    let pipeline = Pipeline::new(store.clone(), gateway(UNREACHABLE_LLM, None).await);

    let report = pipeline.crawler.crawl_all().await.unwrap();
    assert_eq!(report.sources_total, 1);
    assert_eq!(report.ok, 1);
    assert_eq!(report.new_articles, 1);

    let article = store
        .get_article_by_source_url(&format!("{}/news/harbour-vote", site.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.original_title, "Harbour expansion approved by the council");
    assert_eq!(article.original_content, full);
    assert!(!article.original_content.contains("Copyright"));
    assert_eq!(article.category.as_deref(), Some("local"));

    let again = pipeline.crawler.crawl_all().await.unwrap();
    assert_eq!(again.new_articles, 0);
    assert_eq!(again.duplicates, 1);
}

#[tokio::test]
async fn short_feed_summary_is_replaced_by_page_body() {
    let site = MockServer::start().await;
    let full = english_body(700);
    serve_article_page(&site, "/news/summit", &full).await;
    let link = format!("{}/news/summit", site.uri());
    serve_feed(
        &site,
        "/wire.xml",
        &[("Summit ends with a joint statement", link.as_str(), "Leaders met in Geneva.")],
    )
    .await;

    let store = Arc::new(MemoryNewsRepository::new());
    add_feed_source(&store, "World Wire", &format!("{}/wire.xml", site.uri())).await;
    let pipeline = Pipeline::new(store.clone(), gateway(UNREACHABLE_LLM, None).await);

    assert_eq!(pipeline.crawler.crawl_all().await.unwrap().new_articles, 1);
    let article = store.get_article_by_source_url(&link).await.unwrap().unwrap();
    assert_eq!(article.original_content, full);
}

#[tokio::test]
async fn chinese_source_skips_translation() {
    let site = MockServer::start().await;
    let llm = llm_server().await;
    let body = "国务院常务会议今天召开，会议听取了关于今年以来稳就业工作情况的汇报，\
研究部署进一步做好高校毕业生等重点群体就业工作。会议指出，就业是最基本的民生，\
各地区各部门要把稳就业摆在更加突出的位置，强化政策支持，拓宽就业渠道，\
加强职业技能培训，切实兜牢民生底线。会议还研究了促进消费持续恢复的相关举措，\
要求加快落实已出台的各项政策，推动重点领域消费扩容提质，增强经济发展内生动力。";
    assert!(body.chars().count() >= 200);

    let link = format!("{}/missing-page", site.uri());
    serve_feed(&site, "/thepaper.xml", &[("国务院部署稳就业工作", link.as_str(), body)]).await;

    let store = Arc::new(MemoryNewsRepository::new());
    add_feed_source(&store, "澎湃新闻", &format!("{}/thepaper.xml", site.uri())).await;
    let pipeline = Pipeline::new(store.clone(), gateway(&chat_url(&llm), None).await);

    assert_eq!(pipeline.crawler.crawl_all().await.unwrap().new_articles, 1);
    let article = store.get_unprocessed(10).await.unwrap().remove(0);
    assert_eq!(article.detected_language, Language::Zh);

    assert!(pipeline.enricher.enrich_one(article.id).await.unwrap());
    let artifact = store.get_artifact(article.id).await.unwrap().unwrap();
    assert!(artifact.translation_zh.is_none());
    assert!(artifact.translated_title.is_none());
    assert!(!artifact.summary_zh.is_empty());
    assert!(!artifact.summary_en.is_empty());
    assert!(!artifact.detailed_summary_zh.is_empty());
    assert_eq!(artifact.api_calls_used, 4);
}

#[tokio::test]
async fn llm_fallback_then_failure_leaves_article_pending() {
    let remote = llm_server().await;
    let gateway = gateway(UNREACHABLE_LLM, Some(&chat_url(&remote))).await;
    assert_eq!(gateway.active(), BackendKind::Remote);

    let store = Arc::new(MemoryNewsRepository::new());
    let article = insert_article(
        &store,
        "https://example.test/fallback",
        "Parliament debates the budget",
        Language::En,
    )
    .await;
    let pipeline = Pipeline::new(store.clone(), gateway);

    assert!(pipeline.enricher.enrich_one(article.id).await.unwrap());
    assert!(store.get_artifact(article.id).await.unwrap().is_some());

    remote.reset().await;
    mount_failures(&remote).await;

    assert!(!pipeline.enricher.reenrich_one(article.id).await.unwrap());
    let article = store.get_article(article.id).await.unwrap().unwrap();
    assert!(!article.is_processed);
    assert!(store.get_artifact(article.id).await.unwrap().is_none());
    assert_eq!(store.count_unprocessed().await.unwrap(), 1);
}

#[tokio::test]
async fn local_backend_is_preferred_when_healthy() {
    let local = llm_server().await;
    let remote = MockServer::start().await;
    mount_failures(&remote).await;

    let gateway = gateway(&chat_url(&local), Some(&chat_url(&remote))).await;
    assert_eq!(gateway.active(), BackendKind::Local);
    assert_eq!(
        gateway.generate("", "ping", 1, 0.0).await.as_deref(),
        Some("pong")
    );
    assert!(remote.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn retention_keeps_recent_articles() {
    let llm = llm_server().await;
    let store = Arc::new(MemoryNewsRepository::new());
    let old = insert_article(&store, "https://example.test/old", "An old story here", Language::En).await;
    let recent = insert_article(
        &store,
        "https://example.test/recent",
        "A recent story here",
        Language::En,
    )
    .await;

    let pipeline = Pipeline::new(store.clone(), gateway(&chat_url(&llm), None).await);
    assert!(pipeline.enricher.enrich_one(old.id).await.unwrap());

    store
        .set_created_at(old.id, Utc::now() - Duration::days(40))
        .await
        .unwrap();
    store
        .set_created_at(recent.id, Utc::now() - Duration::days(10))
        .await
        .unwrap();

    assert_eq!(store.delete_articles_older_than(30).await.unwrap(), 1);
    assert!(store.get_article(old.id).await.unwrap().is_none());
    assert!(store.get_artifact(old.id).await.unwrap().is_none());
    assert!(store.get_article(recent.id).await.unwrap().is_some());

    assert_eq!(store.delete_articles_older_than(0).await.unwrap(), 1);
    assert_eq!(store.statistics().await.unwrap().total_articles, 0);
}

#[test]
fn language_triage() {
    assert_eq!(detect_language("朝日新聞: 大雨警戒", None, None), Language::Ja);
    assert_eq!(detect_language("Macron annonce une réforme", None, None), Language::Fr);
    assert_eq!(detect_language("Putin meets ministers", None, None), Language::En);

    for hint in ["Some Blog", "Unknown Wire"] {
        assert_eq!(detect_language("朝日新聞: 大雨警戒", None, Some(hint)), Language::Ja);
        assert_eq!(
            detect_language("Macron annonce une réforme", None, Some(hint)),
            Language::Fr
        );
        assert_eq!(detect_language("Putin meets ministers", None, Some(hint)), Language::En);
    }
}
