use std::sync::LazyLock;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::extractor::cleaner::{NON_CONTENT_TAGS, collapse_whitespace, visible_text};
use crate::fetcher::{FetchError, HttpFetcher};
use crate::retry::RetryPolicy;

/// Container selectors tried in order; the first one holding enough text wins.
const CONTENT_SELECTORS: [&str; 14] = [
    "article",
    ".article-content",
    ".story-body",
    ".post-content",
    ".entry-content",
    ".article-body",
    ".content-body",
    ".story-content",
    "[itemprop='articleBody']",
    "main",
    "[role='main']",
    ".content",
    "#content",
    "#main",
];

const MIN_CONTAINER_CHARS: usize = 100;
const MIN_PARAGRAPH_CHARS: usize = 20;
const MAX_PARAGRAPHS: usize = 10;
const PARAGRAPH_TARGET_CHARS: usize = 500;
const MIN_BODY_CHARS: usize = 100;

static CONTENT_SELECTOR_LIST: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("content selector parses"))
        .collect()
});

static PARAGRAPH_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("p selector parses"));

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector parses"));

/// Pull the main text out of an article page.
///
/// Returns `None` when nothing on the page looks like article content.
pub fn extract_body_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for selector in CONTENT_SELECTOR_LIST.iter() {
        for element in document.select(selector) {
            let text = visible_text(element, &NON_CONTENT_TAGS);
            if text.chars().count() >= MIN_CONTAINER_CHARS {
                return Some(text);
            }
        }
    }

    if let Some(text) = longest_paragraphs(&document) {
        return Some(text);
    }

    let body = document.select(&BODY_SELECTOR).next()?;
    let text = visible_text(body, &NON_CONTENT_TAGS);
    (text.chars().count() >= MIN_BODY_CHARS).then_some(text)
}

fn longest_paragraphs(document: &Html) -> Option<String> {
    let mut paragraphs: Vec<(usize, String)> = document
        .select(&PARAGRAPH_SELECTOR)
        .enumerate()
        .map(|(pos, p)| (pos, visible_text(p, &NON_CONTENT_TAGS)))
        .filter(|(_, text)| text.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect();

    paragraphs.sort_by_key(|(_, text)| std::cmp::Reverse(text.chars().count()));
    paragraphs.truncate(MAX_PARAGRAPHS);

    let mut chosen = Vec::new();
    let mut total = 0;
    for (pos, text) in paragraphs {
        total += text.chars().count();
        chosen.push((pos, text));
        if total > PARAGRAPH_TARGET_CHARS {
            break;
        }
    }

    if total <= PARAGRAPH_TARGET_CHARS {
        return None;
    }

    // Keep reading order.
    chosen.sort_by_key(|(pos, _)| *pos);
    let joined = chosen
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join(" ");
    Some(collapse_whitespace(&joined))
}

/// Fetches article pages and extracts their body text.
#[derive(Clone)]
pub struct BodyExtractor {
    fetcher: HttpFetcher,
    policy: RetryPolicy,
    deadline: Duration,
}

impl BodyExtractor {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            // two retries, two seconds apart
            policy: RetryPolicy::fixed(3, Duration::from_secs(2)),
            deadline: Duration::from_secs(15),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy, deadline: Duration) -> Self {
        self.policy = policy;
        self.deadline = deadline;
        self
    }

    /// Best-effort full text of the article at `url`.
    #[instrument(skip(self))]
    pub async fn extract_full_body(&self, url: &str) -> Option<String> {
        let fetched = tokio::time::timeout(self.deadline, self.fetcher.fetch_with(url, self.policy))
            .await
            .unwrap_or(Err(FetchError::RequestTimeout));

        match fetched {
            Ok(page) => {
                let text = extract_body_text(&page.body_utf8);
                if text.is_none() {
                    debug!("no article body found");
                }
                text
            }
            Err(e) => {
                debug!(error = %e, "body fetch failed");
                None
            }
        }
    }
}
