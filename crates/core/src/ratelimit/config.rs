//! Rate limiter configuration.

use serde::{Deserialize, Serialize};

use crate::content::ContentType;

/// Per-content-type and global request limits.
///
/// Limits count requests over a trailing window of `window_secs` seconds
/// (one minute by default, hence the field names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Limit shared by every content type. `None` disables the global window.
    #[serde(default = "default_global_rpm")]
    pub global_requests_per_minute: Option<u32>,
    #[serde(default = "default_article_rpm")]
    pub article_requests_per_minute: u32,
    #[serde(default = "default_post_rpm")]
    pub post_requests_per_minute: u32,
    #[serde(default = "default_comment_rpm")]
    pub comment_requests_per_minute: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// When set, callers wait up to this long for a permit instead of
    /// failing immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,
}

fn default_global_rpm() -> Option<u32> {
    Some(120)
}

fn default_article_rpm() -> u32 {
    30
}

fn default_post_rpm() -> u32 {
    60
}

fn default_comment_rpm() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global_requests_per_minute: default_global_rpm(),
            article_requests_per_minute: default_article_rpm(),
            post_requests_per_minute: default_post_rpm(),
            comment_requests_per_minute: default_comment_rpm(),
            window_secs: default_window_secs(),
            acquire_timeout_ms: None,
        }
    }
}

impl RateLimiterConfig {
    pub fn requests_per_minute(&self, content_type: ContentType) -> u32 {
        match content_type {
            ContentType::Article => self.article_requests_per_minute,
            ContentType::Post => self.post_requests_per_minute,
            ContentType::Comment => self.comment_requests_per_minute,
        }
    }

    pub fn acquire_timeout(&self) -> Option<std::time::Duration> {
        self.acquire_timeout_ms.map(std::time::Duration::from_millis)
    }

    /// Same limit for every content type, no global window.
    pub fn uniform(requests_per_minute: u32) -> Self {
        Self {
            global_requests_per_minute: None,
            article_requests_per_minute: requests_per_minute,
            post_requests_per_minute: requests_per_minute,
            comment_requests_per_minute: requests_per_minute,
            window_secs: default_window_secs(),
            acquire_timeout_ms: None,
        }
    }
}
