//! Sliding-window request counter.

use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

/// Rate limit status for one window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimitStatus {
    /// Requests allowed per window.
    pub limit: u32,
    pub window_secs: f64,
    /// Requests recorded in the current window.
    pub used: u32,
    pub available: u32,
    pub next_available_in_ms: Option<u64>,
}

/// Counts requests over a trailing window of fixed length.
///
/// A request is admitted while fewer than `limit` requests were recorded in
/// the last `window`; timestamps older than the window are dropped lazily.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: u32,
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            stamps: VecDeque::with_capacity(limit as usize),
        }
    }

    /// Whether a request could be recorded at `now`.
    pub fn has_capacity(&mut self, now: Instant) -> bool {
        self.prune(now);
        (self.stamps.len() as u32) < self.limit
    }

    pub fn record(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }

    /// How long until the oldest request leaves the window.
    ///
    /// Zero when there is capacity now.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        if self.has_capacity(now) {
            return Duration::ZERO;
        }
        match self.stamps.front() {
            Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
            // limit == 0: nothing will ever be admitted
            None => self.window,
        }
    }

    pub fn status(&mut self, now: Instant) -> RateLimitStatus {
        self.prune(now);
        let used = self.stamps.len() as u32;
        let wait = self.wait_time(now);
        RateLimitStatus {
            limit: self.limit,
            window_secs: self.window.as_secs_f64(),
            used,
            available: self.limit.saturating_sub(used),
            next_available_in_ms: (!wait.is_zero()).then(|| wait.as_millis() as u64),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }
}
