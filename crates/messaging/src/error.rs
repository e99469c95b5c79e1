use thiserror::Error;

use crate::MessageId;

/// Errors raised by queue implementations.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The message is not (or no longer) in the queue.
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Failure reported by a message handler.
///
/// Only [`HandlerError::Retryable`] goes through the retry policy; the other
/// variants send the message straight to the dead-letter store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Transient failure (transport down, timeout). Retried with backoff.
    #[error("Retryable failure: {0}")]
    Retryable(String),

    /// The message can never succeed, e.g. its payload does not decode.
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Nothing is registered for the message type.
    #[error("No handler registered for message type '{0}'")]
    NoHandler(String),
}

impl HandlerError {
    /// Returns true if another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retryable_is_retryable() {
        assert!(HandlerError::Retryable("smtp down".into()).is_retryable());
        assert!(!HandlerError::Permanent("bad payload".into()).is_retryable());
        assert!(!HandlerError::NoHandler("email".into()).is_retryable());
    }

    #[test]
    fn no_handler_message_names_the_type() {
        let err = HandlerError::NoHandler("notification.email".into());
        assert_eq!(
            err.to_string(),
            "No handler registered for message type 'notification.email'"
        );
    }
}
