//! Application layer for the user notification backend.
//!
//! Wires the domain to its collaborators:
//! - [`rate_limit`]: limiter store, factory, and the guard used on request paths
//! - [`events`]: the in-process [`EventBus`] implementing the dispatch port
//! - [`notifications`]: the `Mailer` port, its adapters, and the queue handler
//! - [`subscribers`]: event subscribers that queue notification emails
//! - [`config`]: the configuration port with environment and map adapters
//! - [`services`]: adapters for the domain's hashing, id, and storage ports
//! - [`user_service`]: the user account use cases

pub mod config;
pub mod error;
pub mod events;
pub mod notifications;
pub mod rate_limit;
pub mod services;
pub mod subscribers;
pub mod user_service;

pub use config::{ConfigError, ConfigPort, ConfigPortExt, EnvConfig, MapConfig};
pub use error::{ApplicationError, Result};
pub use events::{EventBus, EventSubscriber, SubscriberError};
pub use notifications::{
    InMemoryMailer, Mailer, MailerError, NotificationDispatchHandler, SentEmail, TracingMailer,
};
pub use rate_limit::{
    InMemoryLimiterStore, Limiter, RateLimitExceeded, RateLimitGuard, RateLimitPolicy,
    RateLimitResult, RateLimitStrategy, RateLimiter, RateLimiterFactory,
};
pub use services::{Argon2PasswordHasher, InMemoryUserRepository, UuidV4Generator};
pub use subscribers::UserNotificationSubscriber;
pub use user_service::{RegisterUser, ResetPassword, UserService};
