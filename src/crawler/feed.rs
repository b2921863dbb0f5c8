use chrono::{DateTime, Utc};

use super::CrawlError;

/// One entry of an RSS or Atom feed, fields still carrying markup.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parse a feed document. Entries repeating the feed's own title or the
/// source name are channel furniture, not articles, and are dropped.
pub fn parse_entries(bytes: &[u8], source_name: &str) -> Result<Vec<FeedEntry>, CrawlError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| CrawlError::Feed(e.to_string()))?;
    let feed_title = feed.title.map(|t| t.content.trim().to_string());

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            if feed_title.as_deref() == Some(title.as_str()) || title == source_name.trim() {
                return None;
            }

            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| !href.is_empty());
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            Some(FeedEntry {
                title,
                link,
                summary,
                published: entry.published.or(entry.updated),
            })
        })
        .collect();

    Ok(entries)
}
