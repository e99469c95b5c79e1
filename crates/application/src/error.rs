//! Application error types.

use domain::{DomainError, UserError, ValidationError};
use messaging::MessagingError;
use thiserror::Error;

use crate::rate_limit::RateLimitExceeded;

/// Errors returned by use cases.
///
/// Domain violations pass through unchanged so the presentation layer can
/// map them by category.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A user-domain violation.
    #[error(transparent)]
    User(#[from] UserError),

    /// A guarded action ran out of capacity.
    #[error("{}", .exceeded.message)]
    RateLimited {
        kind: UserError,
        exceeded: RateLimitExceeded,
    },

    /// Invalid input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No user with this identifier.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Activation or reset token does not match.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Unknown user or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Login attempted before activation.
    #[error("Account is not activated")]
    NotActivated,

    /// The account kept changing underneath the use case.
    #[error("Concurrent update, please retry")]
    Conflict,

    /// Queue failure.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Storage or hashing failure.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// Wraps a guard rejection for the given rate-limit violation.
    pub fn rate_limited(kind: UserError, exceeded: RateLimitExceeded) -> Self {
        ApplicationError::RateLimited { kind, exceeded }
    }

    /// Seconds to wait before retrying, for rate-limit rejections.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApplicationError::RateLimited { exceeded, .. } => Some(exceeded.retry_after_secs),
            _ => None,
        }
    }

    /// The user-domain violation behind this error, if any.
    pub fn user_error(&self) -> Option<UserError> {
        match self {
            ApplicationError::User(e) => Some(*e),
            ApplicationError::RateLimited { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::User(e) => ApplicationError::User(e),
            DomainError::Validation(e) => ApplicationError::Validation(e),
            DomainError::InvalidToken => ApplicationError::InvalidToken,
            DomainError::ConcurrencyConflict { .. } => ApplicationError::Conflict,
            DomainError::PasswordHash(msg) | DomainError::Repository(msg) => {
                ApplicationError::Infrastructure(msg)
            }
        }
    }
}

/// Result type for use cases.
pub type Result<T> = std::result::Result<T, ApplicationError>;
