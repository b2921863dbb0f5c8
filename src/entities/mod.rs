use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// --- PostgreSQL Enums ---
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "source_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS 2.0 or Atom syndication feed.
    Feed,
    /// HTML landing page scraped for article links.
    Web,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Web => "web",
        }
    }
}

impl FromStr for SourceKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" | "atom" => Ok(Self::Feed),
            "web" => Ok(Self::Web),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

/// Closed set of language tags produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
    Ja,
    Ko,
    Fr,
    De,
    It,
    Es,
    Pt,
    Ru,
    Ar,
    Other,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Self::Zh,
        Self::En,
        Self::Ja,
        Self::Ko,
        Self::Fr,
        Self::De,
        Self::It,
        Self::Es,
        Self::Pt,
        Self::Ru,
        Self::Ar,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Fr => "fr",
            Self::De => "de",
            Self::It => "it",
            Self::Es => "es",
            Self::Pt => "pt",
            Self::Ru => "ru",
            Self::Ar => "ar",
            Self::Other => "other",
        }
    }

    pub fn is_chinese(&self) -> bool {
        matches!(self, Self::Zh)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == tag)
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

impl TryFrom<String> for Language {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownValue(pub String);

/// --- Tables ---

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, ToSchema)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub category: Option<String>,
    pub weight: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrative description of a source, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub category: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_weight() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub source_url: String,
    pub original_title: String,
    pub original_content: String,
    pub publish_time: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub detected_language: Language,
    pub category: Option<String>,
    pub quality_score: f64,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cleaned, validated candidate ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub source_id: i64,
    pub source_name: String,
    pub source_url: String,
    pub original_title: String,
    pub original_content: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub detected_language: Language,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProcessedArtifact {
    pub id: i64,
    pub article_id: i64,
    pub summary_zh: String,
    pub summary_en: String,
    pub detailed_summary_zh: String,
    pub translation_zh: Option<String>,
    pub translated_title: Option<String>,
    pub quality_score: f64,
    pub processing_seconds: f64,
    pub api_calls_used: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The LLM-produced fields of an artifact.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArtifactFields {
    pub summary_zh: String,
    pub summary_en: String,
    pub detailed_summary_zh: String,
    pub translation_zh: Option<String>,
    pub translated_title: Option<String>,
    pub quality_score: f64,
    pub processing_seconds: f64,
    pub api_calls_used: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tags_round_trip_through_text() {
        for lang in Language::ALL {
            assert_eq!(lang.as_str().parse::<Language>(), Ok(lang));
        }
        assert_eq!("ZH".parse::<Language>(), Ok(Language::Zh));
        assert!("klingon".parse::<Language>().is_err());
    }

    #[test]
    fn source_kind_accepts_legacy_rss_label() {
        assert_eq!("rss".parse::<SourceKind>(), Ok(SourceKind::Feed));
        assert_eq!("web".parse::<SourceKind>(), Ok(SourceKind::Web));
        assert!("ftp".parse::<SourceKind>().is_err());
    }
}
