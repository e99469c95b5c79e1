//! Turns limiter rejections into retry-hinted errors.

use std::sync::Arc;

use common::Clock;
use thiserror::Error;

use super::limiter::RateLimiter;

/// Seconds advertised when the limiter gives no retry timestamp.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// A guarded action ran out of capacity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RateLimitExceeded {
    /// Seconds until a retry may succeed. Always at least 1.
    pub retry_after_secs: u64,
    pub message: String,
}

/// Consumes one unit per call and fails with [`RateLimitExceeded`] when
/// none is left.
#[derive(Clone)]
pub struct RateLimitGuard {
    clock: Arc<dyn Clock>,
}

impl RateLimitGuard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Takes one unit from `limiter`.
    ///
    /// The attempt counts against the budget whether or not it is accepted.
    pub fn consume_or_throw<L>(
        &self,
        limiter: &L,
        message: impl Into<String>,
    ) -> Result<(), RateLimitExceeded>
    where
        L: RateLimiter + ?Sized,
    {
        let result = limiter.consume(1);
        if result.accepted {
            return Ok(());
        }

        let retry_after_secs = match result.retry_after {
            Some(at) => {
                let millis = (at - self.clock.now()).num_milliseconds();
                // Round up partial seconds, never advertise zero.
                (millis.max(0) as u64).div_ceil(1000).max(1)
            }
            None => DEFAULT_RETRY_AFTER_SECS,
        };

        metrics::counter!("rate_limit_rejections_total").increment(1);
        tracing::debug!(retry_after_secs, "rate limit exceeded");

        Err(RateLimitExceeded {
            retry_after_secs,
            message: message.into(),
        })
    }
}

impl std::fmt::Debug for RateLimitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{InMemoryLimiterStore, RateLimitPolicy, RateLimitResult, RateLimiterFactory};
    use chrono::{DateTime, Duration, Utc};
    use common::ManualClock;

    struct Fixed(RateLimitResult);

    impl RateLimiter for Fixed {
        fn consume(&self, _tokens: u32) -> RateLimitResult {
            self.0
        }
    }

    fn guard_at(clock: &ManualClock) -> RateLimitGuard {
        RateLimitGuard::new(Arc::new(clock.clone()))
    }

    #[test]
    fn capacity_one_accepts_then_rejects() {
        let clock = ManualClock::starting_now();
        let factory = RateLimiterFactory::new(
            RateLimitPolicy::fixed_window("test", 1, Duration::minutes(5)),
            InMemoryLimiterStore::new(),
            Arc::new(clock.clone()),
        );
        let guard = guard_at(&clock);
        let limiter = factory.create("actor");

        guard.consume_or_throw(&limiter, "too many").unwrap();
        let err = guard.consume_or_throw(&limiter, "too many").unwrap_err();

        assert_eq!(err.message, "too many");
        assert_eq!(err.to_string(), "too many");
        assert_eq!(err.retry_after_secs, 300);
    }

    #[test]
    fn exactly_n_calls_succeed() {
        let clock = ManualClock::starting_now();
        let factory = RateLimiterFactory::new(
            RateLimitPolicy::sliding_window("test", 4, Duration::minutes(1)),
            InMemoryLimiterStore::new(),
            Arc::new(clock.clone()),
        );
        let guard = guard_at(&clock);
        let limiter = factory.create("actor");

        for _ in 0..4 {
            guard.consume_or_throw(&limiter, "x").unwrap();
        }
        let err = guard.consume_or_throw(&limiter, "x").unwrap_err();
        assert!(err.retry_after_secs >= 1);
    }

    #[test]
    fn waiting_the_advertised_time_is_enough() {
        let clock = ManualClock::starting_now();
        let factory = RateLimiterFactory::new(
            RateLimitPolicy::sliding_window("test", 4, Duration::minutes(1)),
            InMemoryLimiterStore::new(),
            Arc::new(clock.clone()),
        );
        let guard = guard_at(&clock);
        let limiter = factory.create("actor");

        for _ in 0..4 {
            guard.consume_or_throw(&limiter, "x").unwrap();
        }
        clock.advance(Duration::seconds(10));
        let err = guard.consume_or_throw(&limiter, "x").unwrap_err();
        assert_eq!(err.retry_after_secs, 63);

        clock.advance(Duration::seconds(err.retry_after_secs as i64));
        guard.consume_or_throw(&limiter, "x").unwrap();
    }

    #[test]
    fn missing_timestamp_defaults_to_sixty() {
        let clock = ManualClock::starting_now();
        let err = guard_at(&clock)
            .consume_or_throw(&Fixed(RateLimitResult::rejected(None)), "x")
            .unwrap_err();
        assert_eq!(err.retry_after_secs, DEFAULT_RETRY_AFTER_SECS);
    }

    #[test]
    fn past_timestamp_floors_to_one() {
        let clock = ManualClock::starting_now();
        let past: DateTime<Utc> = clock.now() - Duration::seconds(30);
        let err = guard_at(&clock)
            .consume_or_throw(&Fixed(RateLimitResult::rejected(Some(past))), "x")
            .unwrap_err();
        assert_eq!(err.retry_after_secs, 1);

        let now = clock.now();
        let err = guard_at(&clock)
            .consume_or_throw(&Fixed(RateLimitResult::rejected(Some(now))), "x")
            .unwrap_err();
        assert_eq!(err.retry_after_secs, 1);
    }

    #[test]
    fn partial_seconds_round_up() {
        let clock = ManualClock::starting_now();
        let soon = clock.now() + Duration::milliseconds(1500);
        let err = guard_at(&clock)
            .consume_or_throw(&Fixed(RateLimitResult::rejected(Some(soon))), "x")
            .unwrap_err();
        assert_eq!(err.retry_after_secs, 2);
    }

    #[test]
    fn accepted_is_ok() {
        let clock = ManualClock::starting_now();
        assert!(
            guard_at(&clock)
                .consume_or_throw(&Fixed(RateLimitResult::accepted(3)), "x")
                .is_ok()
        );
    }
}
