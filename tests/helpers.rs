#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use newsmind::{
    api,
    app_state::AppState,
    config::{Config, LlmSettings},
    crawler::{Crawler, CrawlerOptions},
    enricher::{Enricher, EnricherOptions},
    entities::{Article, Language, NewArticle, NewSource, SourceKind},
    extractor::BodyExtractor,
    fetcher::{FetcherOptions, HttpFetcher},
    llm::LlmGateway,
    repositories::{MemoryNewsRepository, NewsRepository},
    retry::RetryPolicy,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, Request, ResponseTemplate,
    matchers::{method, path},
};

pub const CHAT_PATH: &str = "/v1/chat/completions";
/// Nothing listens on port 1.
pub const UNREACHABLE_LLM: &str = "http://127.0.0.1:1/v1/chat/completions";

pub const SUMMARY_ZH: &str = "市议会在长时间辩论后批准了港口扩建计划，工程预计将于明年春季正式开工。";
pub const SUMMARY_EN: &str =
    "The city council approved the harbour expansion after a long debate; work starts next spring.";
pub const DETAILED_ZH: &str =
    "背景：港口吞吐能力多年不足。进展：市议会批准扩建计划并确定预算。影响：预计将增加就业岗位并促进地区贸易。";
pub const TRANSLATION_ZH: &str = "市议会周二批准了港口扩建计划。议员们经过长时间辩论后达成一致，\
该计划涵盖资金、人员配置以及未来三年的时间表，并将在明年春天由独立专家小组再次审查。";
pub const TITLE_ZH: &str = "港口扩建获批";

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
}

/// Answers every enrichment prompt with a canned, valid answer.
fn answer(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    let system = body["messages"]
        .as_array()
        .and_then(|messages| messages.iter().find(|m| m["role"] == "system"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    let content = if system.contains("质量评估") {
        "8.5"
    } else if system.contains("新闻标题") {
        TITLE_ZH
    } else if system.contains("翻译专家") {
        TRANSLATION_ZH
    } else if system.contains("English summary") {
        SUMMARY_EN
    } else if system.contains("详细摘要") {
        DETAILED_ZH
    } else if system.contains("中文摘要") {
        SUMMARY_ZH
    } else {
        "pong"
    };
    chat_reply(content)
}

/// A chat-completion endpoint that answers every prompt.
pub async fn llm_server() -> MockServer {
    let server = MockServer::start().await;
    mount_answers(&server).await;
    server
}

pub async fn mount_answers(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(answer)
        .mount(server)
        .await;
}

pub async fn mount_failures(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(server)
        .await;
}

pub fn chat_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), CHAT_PATH)
}

/// Gateway over a local and a remote endpoint, probed once.
pub async fn gateway(local_url: &str, remote_url: Option<&str>) -> Arc<LlmGateway> {
    let settings = LlmSettings {
        local_url: local_url.to_string(),
        local_model: "test-local".to_string(),
        deepseek_url: remote_url.unwrap_or(UNREACHABLE_LLM).to_string(),
        deepseek_model: "test-remote".to_string(),
        deepseek_api_key: remote_url.map(|_| "sk-test".to_string()),
    };
    let gateway = LlmGateway::from_settings(&settings)
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(2));
    gateway.probe().await;
    Arc::new(gateway)
}

pub struct Pipeline {
    pub store: Arc<MemoryNewsRepository>,
    pub crawler: Arc<Crawler>,
    pub enricher: Arc<Enricher>,
    pub shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(store: Arc<MemoryNewsRepository>, gateway: Arc<LlmGateway>) -> Self {
        let shutdown = CancellationToken::new();
        let fetcher = HttpFetcher::new(FetcherOptions {
            politeness_delay: Duration::ZERO,
            retry: RetryPolicy::once(),
            ..FetcherOptions::default()
        })
        .unwrap();
        let bodies = BodyExtractor::new(fetcher.clone())
            .with_policy(RetryPolicy::once(), Duration::from_secs(5));

        let crawler = Arc::new(Crawler::with_extractor(
            store.clone(),
            fetcher,
            bodies,
            CrawlerOptions::default(),
            shutdown.clone(),
        ));
        let enricher = Arc::new(Enricher::new(
            store.clone(),
            gateway,
            EnricherOptions {
                pause: Duration::ZERO,
                ..EnricherOptions::default()
            },
            shutdown.clone(),
        ));

        Self {
            store,
            crawler,
            enricher,
            shutdown,
        }
    }

    pub fn app(&self) -> Router {
        let config = Config {
            database_url: "memory://".to_string(),
            ..Config::default()
        };
        api::router(AppState::new(
            self.store.clone(),
            self.crawler.clone(),
            self.enricher.clone(),
            config,
        ))
    }
}

pub async fn add_feed_source(store: &MemoryNewsRepository, name: &str, url: &str) {
    store
        .upsert_source(&NewSource {
            name: name.to_string(),
            url: url.to_string(),
            kind: SourceKind::Feed,
            category: Some("world".to_string()),
            weight: 1.0,
            active: true,
        })
        .await
        .unwrap();
}

/// Serve an RSS document at `route`.
pub async fn serve_feed(server: &MockServer, route: &str, items: &[(&str, &str, &str)]) {
    let items: String = items
        .iter()
        .map(|(title, link, summary)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description><![CDATA[{summary}]]></description></item>"
            )
        })
        .collect();
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Feed</title>{items}</channel></rss>"#
    );
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"))
        .mount(server)
        .await;
}

/// An English body of exactly `chars` characters.
pub fn english_body(chars: usize) -> String {
    let sentence = "World leaders closed the summit with a joint statement on trade and climate. ";
    sentence.chars().cycle().take(chars).collect::<String>().trim_end().to_string()
}

pub async fn insert_article(
    store: &MemoryNewsRepository,
    url: &str,
    title: &str,
    language: Language,
) -> Article {
    let source = match store.list_sources().await.unwrap().into_iter().next() {
        Some(source) => source,
        None => store
            .upsert_source(&NewSource {
                name: "Fixture".to_string(),
                url: "https://fixture.test/feed".to_string(),
                kind: SourceKind::Feed,
                category: Some("world".to_string()),
                weight: 1.0,
                active: false,
            })
            .await
            .unwrap(),
    };

    store
        .insert_article(&NewArticle {
            source_id: source.id,
            source_name: source.name.clone(),
            source_url: url.to_string(),
            original_title: title.to_string(),
            original_content: english_body(400),
            publish_time: None,
            detected_language: language,
            category: source.category.clone(),
        })
        .await
        .unwrap()
}
