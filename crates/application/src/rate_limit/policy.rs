//! Rate limit policies and consumption results.

use chrono::{DateTime, Duration, Utc};

/// How hits are counted over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitStrategy {
    /// Counter resets `interval` after the first hit of the window.
    #[default]
    FixedWindow,
    /// Current window plus the previous one, weighted by how much of it
    /// still overlaps.
    SlidingWindow,
}

/// Capacity rule for one guarded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Prefix of every limiter key built from this policy.
    pub id: String,
    /// Units allowed per window.
    pub limit: u32,
    /// Window length.
    pub interval: Duration,
    pub strategy: RateLimitStrategy,
}

impl RateLimitPolicy {
    pub fn fixed_window(id: impl Into<String>, limit: u32, interval: Duration) -> Self {
        Self {
            id: id.into(),
            limit,
            interval,
            strategy: RateLimitStrategy::FixedWindow,
        }
    }

    pub fn sliding_window(id: impl Into<String>, limit: u32, interval: Duration) -> Self {
        Self {
            id: id.into(),
            limit,
            interval,
            strategy: RateLimitStrategy::SlidingWindow,
        }
    }
}

/// Outcome of one consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub accepted: bool,
    /// Units left in the current window.
    pub remaining: u32,
    /// When enough capacity is expected back. `None` if unknown or if the
    /// request can never fit.
    pub retry_after: Option<DateTime<Utc>>,
}

impl RateLimitResult {
    pub fn accepted(remaining: u32) -> Self {
        Self {
            accepted: true,
            remaining,
            retry_after: None,
        }
    }

    pub fn rejected(retry_after: Option<DateTime<Utc>>) -> Self {
        Self {
            accepted: false,
            remaining: 0,
            retry_after,
        }
    }
}
