use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use super::selectors::{GENERIC_SELECTOR, link_selector};
use crate::extractor::cleaner::collapse_whitespace;

const MIN_ANCHOR_CHARS: usize = 10;

/// An article link found on a landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebLink {
    pub title: String,
    pub url: String,
}

/// Article links of a landing page, resolved against `base`, in document
/// order and without repeats.
pub fn extract_links(html: &str, base: &Url, year: i32) -> Vec<WebLink> {
    let raw_selector = link_selector(base.host_str().unwrap_or_default(), year);
    let selector = match Selector::parse(&raw_selector) {
        Ok(selector) => selector,
        Err(e) => {
            warn!(selector = %raw_selector, error = ?e, "bad link selector, using generic");
            match Selector::parse(GENERIC_SELECTOR) {
                Ok(selector) => selector,
                Err(_) => return Vec::new(),
            }
        }
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&selector) {
        let title = collapse_whitespace(&anchor.text().collect::<String>());
        if title.chars().count() < MIN_ANCHOR_CHARS {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        url.set_fragment(None);

        let url = url.to_string();
        if seen.insert(url.clone()) {
            links.push(WebLink { title, url });
        }
    }

    links
}
