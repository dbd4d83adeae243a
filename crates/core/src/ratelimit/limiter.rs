//! Per-content-type rate limiter with an optional global window.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::content::ContentType;
use crate::metrics;

use super::config::RateLimiterConfig;
use super::window::{RateLimitStatus, SlidingWindow};

/// Which window refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    ContentType,
    Global,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::ContentType => "content_type",
            LimitScope::Global => "global",
        }
    }
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limited for {content_type} ({scope}), retry after {retry_after:?}")]
    Limited {
        content_type: ContentType,
        scope: LimitScope,
        retry_after: Duration,
    },

    #[error("No permit for {content_type} before deadline")]
    DeadlineExceeded { content_type: ContentType },

    #[error("Rate limiter state is unavailable")]
    Unavailable,
}

struct LimiterState {
    per_type: HashMap<ContentType, SlidingWindow>,
    global: Option<SlidingWindow>,
}

/// Process-local throughput gate for outbound provider calls.
///
/// A permit is taken only when both the content type's window and the
/// global window (if any) have room, so a refusal never consumes capacity.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        let window = Duration::from_secs(config.window_secs.max(1));
        let per_type = ContentType::ALL
            .into_iter()
            .map(|ct| (ct, SlidingWindow::new(config.requests_per_minute(ct), window)))
            .collect();
        let global = config
            .global_requests_per_minute
            .map(|limit| SlidingWindow::new(limit, window));

        Self {
            state: Mutex::new(LimiterState { per_type, global }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LimiterState>, RateLimitError> {
        self.state.lock().map_err(|_| RateLimitError::Unavailable)
    }

    /// Fails if the limiter can no longer be used.
    pub fn ensure_available(&self) -> Result<(), RateLimitError> {
        if self.state.is_poisoned() {
            Err(RateLimitError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Take a permit without waiting.
    pub fn try_acquire(&self, content_type: ContentType) -> Result<(), RateLimitError> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let LimiterState { per_type, global } = &mut *state;

        let window = per_type
            .entry(content_type)
            .or_insert_with(|| SlidingWindow::new(0, Duration::from_secs(60)));
        if !window.has_capacity(now) {
            return Err(self.reject(content_type, LimitScope::ContentType, window.wait_time(now)));
        }
        if let Some(global) = global.as_mut() {
            if !global.has_capacity(now) {
                return Err(self.reject(content_type, LimitScope::Global, global.wait_time(now)));
            }
            global.record(now);
        }
        window.record(now);
        Ok(())
    }

    /// Non-blocking acquire; `true` when a permit was taken.
    pub fn acquire(&self, content_type: ContentType) -> bool {
        self.try_acquire(content_type).is_ok()
    }

    /// Wait for a permit until `deadline`.
    ///
    /// Returns early with `DeadlineExceeded` when the next free slot is
    /// already known to fall after the deadline.
    pub async fn acquire_blocking(
        &self,
        content_type: ContentType,
        deadline: Instant,
    ) -> Result<(), RateLimitError> {
        loop {
            match self.try_acquire(content_type) {
                Ok(()) => return Ok(()),
                Err(RateLimitError::Limited { retry_after, .. }) => {
                    let wake_at = Instant::now() + retry_after;
                    if wake_at > deadline {
                        return Err(RateLimitError::DeadlineExceeded { content_type });
                    }
                    tokio::time::sleep_until(wake_at).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn status(&self, content_type: ContentType) -> Option<RateLimitStatus> {
        let mut state = self.lock().ok()?;
        let now = Instant::now();
        state.per_type.get_mut(&content_type).map(|w| w.status(now))
    }

    pub fn global_status(&self) -> Option<RateLimitStatus> {
        let mut state = self.lock().ok()?;
        let now = Instant::now();
        state.global.as_mut().map(|w| w.status(now))
    }

    pub fn all_status(&self) -> Vec<(ContentType, RateLimitStatus)> {
        ContentType::ALL
            .into_iter()
            .filter_map(|ct| self.status(ct).map(|s| (ct, s)))
            .collect()
    }

    fn reject(
        &self,
        content_type: ContentType,
        scope: LimitScope,
        retry_after: Duration,
    ) -> RateLimitError {
        debug!(
            content_type = %content_type,
            scope = scope.as_str(),
            retry_after_ms = retry_after.as_millis() as u64,
            "Rate limit reached"
        );
        metrics::RATE_LIMIT_REJECTIONS
            .with_label_values(&[content_type.as_str(), scope.as_str()])
            .inc();
        RateLimitError::Limited {
            content_type,
            scope,
            retry_after,
        }
    }
}
