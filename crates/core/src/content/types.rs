//! Content item types shared by the store and the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of content an item represents.
///
/// Every content type has its own pipeline, rate limit window and
/// processing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Post,
    Comment,
}

impl ContentType {
    /// All content types, in pipeline order.
    pub const ALL: [ContentType; 3] = [ContentType::Article, ContentType::Post, ContentType::Comment];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Post => "post",
            ContentType::Comment => "comment",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown content type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown content type: {0}")]
pub struct UnknownContentType(pub String);

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "article" | "articles" => Ok(ContentType::Article),
            "post" | "posts" => Ok(ContentType::Post),
            "comment" | "comments" => Ok(ContentType::Comment),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// One unit of text to annotate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub content_type: ContentType,
    pub text: String,
    /// Language hint from the source (e.g. "ar", "fr", "en").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
    /// Publication time, used for time-window selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    pub fn new(id: i64, content_type: ContentType, text: impl Into<String>) -> Self {
        Self {
            id,
            content_type,
            text: text.into(),
            language_hint: None,
            published_at: None,
        }
    }

    pub fn with_language_hint(mut self, language: impl Into<String>) -> Self {
        self.language_hint = Some(language.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// An item to be inserted into a content store.
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub content_type: ContentType,
    pub text: String,
    pub language_hint: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl NewContentItem {
    pub fn new(content_type: ContentType, text: impl Into<String>) -> Self {
        Self {
            content_type,
            text: text.into(),
            language_hint: None,
            published_at: None,
        }
    }

    pub fn with_language_hint(mut self, language: impl Into<String>) -> Self {
        self.language_hint = Some(language.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// Selection of items to enrich.
///
/// Without `force_reprocess`, only items with no stored result (or a
/// stored `failed` result) are returned.
#[derive(Debug, Clone)]
pub struct ContentQuery {
    pub content_type: ContentType,
    pub ids: Option<Vec<i64>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub force_reprocess: bool,
}

impl ContentQuery {
    pub fn pending(content_type: ContentType) -> Self {
        Self {
            content_type,
            ids: None,
            since: None,
            until: None,
            limit: None,
            force_reprocess: false,
        }
    }

    /// Whether an item passes the id and time-window filters.
    ///
    /// Items without a publication time never match a time window.
    pub fn matches(&self, item: &ContentItem) -> bool {
        if item.content_type != self.content_type {
            return false;
        }
        if let Some(ref ids) = self.ids {
            if !ids.contains(&item.id) {
                return false;
            }
        }
        if self.since.is_some() || self.until.is_some() {
            let Some(published_at) = item.published_at else {
                return false;
            };
            if self.since.is_some_and(|since| published_at < since) {
                return false;
            }
            if self.until.is_some_and(|until| published_at > until) {
                return false;
            }
        }
        true
    }
}

/// Store counters for one content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCounts {
    pub total: u64,
    pub enriched: u64,
    pub failed: u64,
    pub pending: u64,
}
