//! Limiters bound to one (policy, actor) pair.

use std::sync::Arc;

use common::Clock;

use super::policy::{RateLimitPolicy, RateLimitResult};
use super::store::InMemoryLimiterStore;

/// Something that hands out capacity.
pub trait RateLimiter: Send + Sync {
    /// Tries to take `tokens` units. Must be atomic per limiter key.
    fn consume(&self, tokens: u32) -> RateLimitResult;
}

/// A limiter for one actor under one policy.
#[derive(Clone)]
pub struct Limiter {
    key: String,
    policy: Arc<RateLimitPolicy>,
    store: InMemoryLimiterStore,
    clock: Arc<dyn Clock>,
}

impl Limiter {
    /// The `policy:actor` key this limiter consumes from.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RateLimiter for Limiter {
    fn consume(&self, tokens: u32) -> RateLimitResult {
        self.store
            .consume(&self.key, &self.policy, tokens, self.clock.now())
    }
}

/// Builds [`Limiter`]s for one policy over a shared store.
#[derive(Clone)]
pub struct RateLimiterFactory {
    policy: Arc<RateLimitPolicy>,
    store: InMemoryLimiterStore,
    clock: Arc<dyn Clock>,
}

impl RateLimiterFactory {
    pub fn new(policy: RateLimitPolicy, store: InMemoryLimiterStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy: Arc::new(policy),
            store,
            clock,
        }
    }

    /// Returns the limiter for `actor_key`. State is created on first consume.
    pub fn create(&self, actor_key: &str) -> Limiter {
        Limiter {
            key: format!("{}:{}", self.policy.id, actor_key),
            policy: Arc::clone(&self.policy),
            store: self.store.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for RateLimiterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterFactory")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
