//! Application configuration.

use std::time::Duration;

use application::{ConfigError, ConfigPort, ConfigPortExt, EnvConfig, RateLimitPolicy};
use messaging::{RetryPolicy, WorkerConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Server, queue, and rate-limit settings with sensible defaults.
///
/// Keys:
/// - `HOST` (`0.0.0.0`), `PORT` (`3000`)
/// - `RUST_LOG` (`info`), `LOG_FORMAT` (`text` or `json`)
/// - `DATABASE_URL`: PostgreSQL queue when set, in-memory queue otherwise
/// - `WORKER_CONCURRENCY` (`2`)
/// - `QUEUE_MAX_ATTEMPTS` (`5`), `QUEUE_BACKOFF_BASE_MS` (`1000`),
///   `QUEUE_BACKOFF_MAX_MS` (`60000`), `QUEUE_VISIBILITY_TIMEOUT_SECS` (`30`)
/// - `ACTIVATION_EMAIL_LIMIT` (`3`) per `ACTIVATION_EMAIL_INTERVAL_SECS` (`3600`)
/// - `PASSWORD_RESET_LIMIT` (`3`) per `PASSWORD_RESET_INTERVAL_SECS` (`3600`)
/// - `MAX_FAILED_LOGINS` (`5`)
/// - `ARGON2_MEMORY_KIB` (`19456`), `ARGON2_ITERATIONS` (`2`), `ARGON2_PARALLELISM` (`1`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub worker_concurrency: usize,
    pub queue_max_attempts: u32,
    pub queue_backoff_base_ms: u64,
    pub queue_backoff_max_ms: u64,
    pub queue_visibility_timeout_secs: i64,
    pub activation_email_limit: u32,
    pub activation_email_interval_secs: i64,
    pub password_reset_limit: u32,
    pub password_reset_interval_secs: i64,
    pub max_failed_logins: u32,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&EnvConfig::new())
    }

    /// Loads configuration from any source.
    pub fn load(source: &dyn ConfigPort) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            host: source.get_string("HOST", Some(d.host.as_str()))?,
            port: source.get_parsed("PORT", d.port)?,
            log_level: source.get_string("RUST_LOG", Some(d.log_level.as_str()))?,
            log_format: source.get_parsed("LOG_FORMAT", d.log_format)?,
            database_url: source.get("DATABASE_URL").filter(|url| !url.is_empty()),
            worker_concurrency: source.get_parsed("WORKER_CONCURRENCY", d.worker_concurrency)?,
            queue_max_attempts: source.get_parsed("QUEUE_MAX_ATTEMPTS", d.queue_max_attempts)?,
            queue_backoff_base_ms: source
                .get_parsed("QUEUE_BACKOFF_BASE_MS", d.queue_backoff_base_ms)?,
            queue_backoff_max_ms: source.get_parsed("QUEUE_BACKOFF_MAX_MS", d.queue_backoff_max_ms)?,
            queue_visibility_timeout_secs: source.get_parsed(
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                d.queue_visibility_timeout_secs,
            )?,
            activation_email_limit: source
                .get_parsed("ACTIVATION_EMAIL_LIMIT", d.activation_email_limit)?,
            activation_email_interval_secs: source.get_parsed(
                "ACTIVATION_EMAIL_INTERVAL_SECS",
                d.activation_email_interval_secs,
            )?,
            password_reset_limit: source.get_parsed("PASSWORD_RESET_LIMIT", d.password_reset_limit)?,
            password_reset_interval_secs: source.get_parsed(
                "PASSWORD_RESET_INTERVAL_SECS",
                d.password_reset_interval_secs,
            )?,
            max_failed_logins: source.get_parsed("MAX_FAILED_LOGINS", d.max_failed_logins)?,
            argon2_memory_kib: source.get_parsed("ARGON2_MEMORY_KIB", d.argon2_memory_kib)?,
            argon2_iterations: source.get_parsed("ARGON2_ITERATIONS", d.argon2_iterations)?,
            argon2_parallelism: source.get_parsed("ARGON2_PARALLELISM", d.argon2_parallelism)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.queue_max_attempts)
            .with_base_delay(Duration::from_millis(self.queue_backoff_base_ms))
            .with_max_delay(Duration::from_millis(self.queue_backoff_max_ms))
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            retry_policy: self.retry_policy(),
            ..WorkerConfig::default()
        }
    }

    pub fn visibility_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.queue_visibility_timeout_secs.max(1))
    }

    pub fn activation_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::fixed_window(
            "activation_email",
            self.activation_email_limit,
            chrono::Duration::seconds(self.activation_email_interval_secs.max(1)),
        )
    }

    pub fn reset_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::fixed_window(
            "password_reset",
            self.password_reset_limit,
            chrono::Duration::seconds(self.password_reset_interval_secs.max(1)),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            worker_concurrency: 2,
            queue_max_attempts: 5,
            queue_backoff_base_ms: 1_000,
            queue_backoff_max_ms: 60_000,
            queue_visibility_timeout_secs: 30,
            activation_email_limit: 3,
            activation_email_interval_secs: 3_600,
            password_reset_limit: 3,
            password_reset_interval_secs: 3_600,
            max_failed_logins: 5,
            argon2_memory_kib: 19_456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}
