use tracing::info;

use crate::entities::{NewSource, SourceKind};
use crate::repositories::{NewsRepository, StoreError};

/// `(name, url, kind, category)` of the sources installed on first start.
const DEFAULT_SOURCES: [(&str, &str, SourceKind, &str); 9] = [
    ("CNN", "http://rss.cnn.com/rss/edition.rss", SourceKind::Feed, "国际"),
    ("BBC News", "http://feeds.bbci.co.uk/news/rss.xml", SourceKind::Feed, "国际"),
    ("Reuters", "https://www.reuters.com/world/", SourceKind::Web, "国际"),
    ("TechCrunch", "https://techcrunch.com/feed/", SourceKind::Feed, "科技"),
    ("Bloomberg", "https://www.bloomberg.com/feed/podcast/etf-report.xml", SourceKind::Feed, "财经"),
    ("澎湃新闻", "https://www.thepaper.cn/rss_newsDetail.xml", SourceKind::Feed, "国内"),
    ("NHK News", "https://www3.nhk.or.jp/rss/news/cat0.xml", SourceKind::Feed, "国际"),
    ("Le Monde", "https://www.lemonde.fr/rss/une.xml", SourceKind::Feed, "国际"),
    ("Deutsche Welle", "https://rss.dw.com/xml/rss-de-all", SourceKind::Feed, "国际"),
];

pub fn default_sources() -> Vec<NewSource> {
    DEFAULT_SOURCES
        .iter()
        .map(|(name, url, kind, category)| NewSource {
            name: name.to_string(),
            url: url.to_string(),
            kind: *kind,
            category: Some(category.to_string()),
            weight: 1.0,
            active: true,
        })
        .collect()
}

/// Install the default sources when the store has none. Returns how many
/// were written.
pub async fn seed_sources(store: &dyn NewsRepository) -> Result<usize, StoreError> {
    if !store.list_sources().await?.is_empty() {
        return Ok(0);
    }

    let sources = default_sources();
    for source in &sources {
        store.upsert_source(source).await?;
    }
    info!(count = sources.len(), "default sources installed");
    Ok(sources.len())
}
