//! Shared limiter state.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use super::policy::{RateLimitPolicy, RateLimitResult, RateLimitStrategy};

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: DateTime<Utc>,
    hits: u32,
    /// Hits of the window just before `window_start`. Sliding window only.
    previous_hits: u32,
}

impl WindowState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            hits: 0,
            previous_hits: 0,
        }
    }
}

/// Process-wide limiter state keyed by `policy:actor`.
///
/// Backed by a sharded map. Each key is created lazily on first consume,
/// and the check and the increment happen while holding that key's entry,
/// so two concurrent callers can never both take the last unit. Distinct
/// keys never contend on the same lock unless they share a shard.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLimiterStore {
    windows: Arc<DashMap<String, WindowState>>,
}

impl InMemoryLimiterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `tokens` units for `key` under `policy`.
    ///
    /// Every attempt counts, including rejected ones. Asking for more than
    /// `policy.limit` at once is rejected with no retry hint.
    pub fn consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        tokens: u32,
        now: DateTime<Utc>,
    ) -> RateLimitResult {
        if tokens > policy.limit {
            return RateLimitResult::rejected(None);
        }

        let mut state = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState::fresh(now));

        match policy.strategy {
            RateLimitStrategy::FixedWindow => consume_fixed(&mut state, policy, tokens, now),
            RateLimitStrategy::SlidingWindow => consume_sliding(&mut state, policy, tokens, now),
        }
    }
}

fn consume_fixed(
    state: &mut WindowState,
    policy: &RateLimitPolicy,
    tokens: u32,
    now: DateTime<Utc>,
) -> RateLimitResult {
    if now >= state.window_start + policy.interval {
        *state = WindowState::fresh(now);
    }

    let fits = state.hits.saturating_add(tokens) <= policy.limit;
    state.hits = state.hits.saturating_add(tokens);

    if fits {
        RateLimitResult::accepted(policy.limit - state.hits)
    } else {
        RateLimitResult::rejected(Some(state.window_start + policy.interval))
    }
}

fn consume_sliding(
    state: &mut WindowState,
    policy: &RateLimitPolicy,
    tokens: u32,
    now: DateTime<Utc>,
) -> RateLimitResult {
    let interval = policy.interval;
    if now >= state.window_start + interval * 2 {
        *state = WindowState::fresh(now);
    } else if now >= state.window_start + interval {
        state.previous_hits = state.hits;
        state.hits = 0;
        state.window_start += interval;
    }

    let interval_ms = interval.num_milliseconds().max(1);
    let elapsed_ms = (now - state.window_start).num_milliseconds();
    let estimate = carried(state.previous_hits, elapsed_ms, interval_ms).saturating_add(state.hits);

    let fits = estimate.saturating_add(tokens) <= policy.limit;
    state.hits = state.hits.saturating_add(tokens);

    if fits {
        let used = estimate.saturating_add(tokens);
        return RateLimitResult::accepted(policy.limit.saturating_sub(used));
    }

    let retry_at = sliding_retry_at(state, policy, tokens, interval_ms);
    RateLimitResult::rejected(Some(retry_at.max(now)))
}

/// Share of `previous` hits still counted `elapsed_ms` into a window.
fn carried(previous: u32, elapsed_ms: i64, interval_ms: i64) -> u32 {
    let remaining = (interval_ms - elapsed_ms).clamp(0, interval_ms);
    u32::try_from(i64::from(previous) * remaining / interval_ms).unwrap_or(u32::MAX)
}

/// First millisecond into a window at which `carried(previous, ..)` drops
/// to `allowed` or below.
fn decay_point(previous: u32, allowed: u32, interval_ms: i64) -> i64 {
    if previous <= allowed {
        return 0;
    }
    let budget = (i64::from(allowed) + 1) * interval_ms - 1;
    interval_ms - budget / i64::from(previous)
}

/// Earliest time a consume of `tokens` fits, given the state left behind
/// by the rejected attempt and no further attempts.
fn sliding_retry_at(
    state: &WindowState,
    policy: &RateLimitPolicy,
    tokens: u32,
    interval_ms: i64,
) -> DateTime<Utc> {
    // Still inside this window if the decaying carry is all that is in the way.
    if let Some(allowed) = policy.limit.checked_sub(state.hits.saturating_add(tokens)) {
        let at = decay_point(state.previous_hits, allowed, interval_ms);
        return state.window_start + Duration::milliseconds(at);
    }

    // Otherwise after the roll, once this window's hits have decayed.
    let at = decay_point(state.hits, policy.limit - tokens, interval_ms);
    state.window_start + policy.interval + Duration::milliseconds(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn fixed_window_allows_limit_then_rejects() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::fixed_window("p", 3, Duration::minutes(1));

        for expected_remaining in [2, 1, 0] {
            let result = store.consume("k", &policy, 1, t0());
            assert!(result.accepted);
            assert_eq!(result.remaining, expected_remaining);
        }

        let rejected = store.consume("k", &policy, 1, t0() + Duration::seconds(10));
        assert!(!rejected.accepted);
        assert_eq!(rejected.retry_after, Some(t0() + Duration::minutes(1)));
    }

    #[test]
    fn fixed_window_resets_after_interval() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::fixed_window("p", 1, Duration::minutes(1));

        assert!(store.consume("k", &policy, 1, t0()).accepted);
        assert!(!store.consume("k", &policy, 1, t0()).accepted);
        assert!(store.consume("k", &policy, 1, t0() + Duration::minutes(1)).accepted);
    }

    #[test]
    fn keys_are_independent() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::fixed_window("p", 1, Duration::minutes(1));

        assert!(store.consume("a", &policy, 1, t0()).accepted);
        assert!(!store.consume("a", &policy, 1, t0()).accepted);
        assert!(store.consume("b", &policy, 1, t0()).accepted);
    }

    #[test]
    fn oversized_request_has_no_retry_hint() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::fixed_window("p", 2, Duration::minutes(1));

        let result = store.consume("k", &policy, 3, t0());
        assert!(!result.accepted);
        assert_eq!(result.retry_after, None);
    }

    #[test]
    fn sliding_window_weights_previous_window() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::sliding_window("p", 4, Duration::minutes(1));

        for _ in 0..4 {
            assert!(store.consume("k", &policy, 1, t0()).accepted);
        }

        // Halfway through the next window, half of the 4 previous hits still count.
        let mid = t0() + Duration::seconds(90);
        assert!(store.consume("k", &policy, 1, mid).accepted);
        assert!(store.consume("k", &policy, 1, mid).accepted);
        let rejected = store.consume("k", &policy, 1, mid);
        assert!(!rejected.accepted);
        let retry_at = rejected.retry_after.unwrap();
        assert!(retry_at > mid);
        assert!(retry_at <= t0() + Duration::minutes(2));
    }

    #[test]
    fn sliding_window_forgets_after_two_intervals() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::sliding_window("p", 1, Duration::minutes(1));

        assert!(store.consume("k", &policy, 1, t0()).accepted);
        assert!(!store.consume("k", &policy, 1, t0() + Duration::seconds(30)).accepted);
        assert!(store.consume("k", &policy, 1, t0() + Duration::minutes(2)).accepted);
    }

    #[test]
    fn sliding_retry_hint_accounts_for_rejected_hits() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::sliding_window("p", 4, Duration::minutes(1));

        for _ in 0..4 {
            assert!(store.consume("k", &policy, 1, t0()).accepted);
        }

        // The rejected hit counts, so 5 hits must decay to 3 after the roll.
        let rejected_at = t0() + Duration::seconds(10);
        let rejected = store.consume("k", &policy, 1, rejected_at);
        assert!(!rejected.accepted);
        let retry_at = rejected.retry_after.unwrap();
        assert_eq!(retry_at, t0() + Duration::milliseconds(72_001));

        // What a client sees: the advertised whole seconds, rounded up.
        let advertised = ((retry_at - rejected_at).num_milliseconds() as u64).div_ceil(1000);
        assert_eq!(advertised, 63);
        let later = rejected_at + Duration::seconds(advertised as i64);
        assert!(store.consume("k", &policy, 1, later).accepted);
    }

    #[test]
    fn sliding_retry_hint_is_exact() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::sliding_window("p", 4, Duration::minutes(1));

        for _ in 0..4 {
            assert!(store.consume("k", &policy, 1, t0()).accepted);
        }
        let rejected = store.consume("k", &policy, 1, t0() + Duration::seconds(10));
        let retry_at = rejected.retry_after.unwrap();

        assert!(store.consume("k", &policy, 1, retry_at).accepted);
    }

    #[test]
    fn sliding_retry_hint_within_current_window() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::sliding_window("p", 4, Duration::minutes(1));

        for _ in 0..4 {
            assert!(store.consume("k", &policy, 1, t0()).accepted);
        }

        // At +75s the 4 previous hits still weigh 3, so one hit fills the
        // budget and the next is rejected until the carry decays.
        let now = t0() + Duration::seconds(75);
        assert!(store.consume("k", &policy, 1, now).accepted);
        let rejected = store.consume("k", &policy, 1, now);
        assert!(!rejected.accepted);

        // 2 current hits plus 1 more leave room for a carry of 1.
        let retry_at = rejected.retry_after.unwrap();
        assert_eq!(retry_at, t0() + Duration::milliseconds(90_001));
        assert!(retry_at < t0() + Duration::minutes(2));
        assert!(store.consume("k", &policy, 1, retry_at).accepted);
    }

    #[test]
    fn concurrent_consumers_on_many_keys_never_exceed_capacity() {
        let store = InMemoryLimiterStore::new();
        let policy = RateLimitPolicy::sliding_window("p", 5, Duration::minutes(1));

        let accepted: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|key| {
                    let store = store.clone();
                    let policy = &policy;
                    scope.spawn(move || {
                        (0..40)
                            .filter(|_| store.consume(&format!("k{}", key % 4), policy, 1, t0()).accepted)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(accepted.iter().sum::<usize>(), 4 * 5);
    }
}
