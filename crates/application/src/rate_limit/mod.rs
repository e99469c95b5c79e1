//! Rate limiting for request-path actions.
//!
//! A [`RateLimiterFactory`] binds a [`RateLimitPolicy`] to an actor key and
//! hands out [`Limiter`]s backed by a shared [`InMemoryLimiterStore`]. The
//! [`RateLimitGuard`] consumes one unit and converts exhaustion into
//! [`RateLimitExceeded`] with a retry hint in seconds.

mod guard;
mod limiter;
mod policy;
mod store;

pub use guard::{DEFAULT_RETRY_AFTER_SECS, RateLimitExceeded, RateLimitGuard};
pub use limiter::{Limiter, RateLimiter, RateLimiterFactory};
pub use policy::{RateLimitPolicy, RateLimitResult, RateLimitStrategy};
pub use store::InMemoryLimiterStore;
