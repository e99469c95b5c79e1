//! Domain error types.

use common::UserId;
use thiserror::Error;

/// Broad failure category, used by the presentation layer to pick a
/// protocol-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Too many attempts; the caller may retry later.
    RateLimit,
    /// A unique field is already taken.
    Uniqueness,
    /// The account is not allowed to act.
    AccountSecurity,
}

/// Violations raised by the user domain.
///
/// The display text is part of the contract: clients show it verbatim.
/// Each variant also has a stable [`code`](UserError::code) for clients
/// that key off something other than the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum UserError {
    /// Too many activation emails requested.
    #[error("Nombre maximal d'emails d'activation atteint.")]
    ActivationLimitReached,

    /// Too many password reset requests.
    #[error("Nombre maximal de demandes de réinitialisation de mot de passe atteint.")]
    ResetPasswordLimitReached,

    /// The account is locked.
    #[error("Ce compte est verrouillé.")]
    UserLocked,

    /// Another account already uses this email.
    #[error("Cette adresse email est déjà utilisée.")]
    EmailAlreadyUsed,

    /// Another account already uses this username.
    #[error("Ce nom d'utilisateur est déjà utilisé.")]
    UsernameAlreadyUsed,
}

impl UserError {
    /// Every variant, in declaration order.
    pub const ALL: [UserError; 5] = [
        UserError::ActivationLimitReached,
        UserError::ResetPasswordLimitReached,
        UserError::UserLocked,
        UserError::EmailAlreadyUsed,
        UserError::UsernameAlreadyUsed,
    ];

    /// Stable machine-readable code, unique per variant.
    pub fn code(&self) -> &'static str {
        match self {
            UserError::ActivationLimitReached => "activation_limit_reached",
            UserError::ResetPasswordLimitReached => "reset_password_limit_reached",
            UserError::UserLocked => "user_locked",
            UserError::EmailAlreadyUsed => "email_already_used",
            UserError::UsernameAlreadyUsed => "username_already_used",
        }
    }

    /// The broad category this violation belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            UserError::ActivationLimitReached | UserError::ResetPasswordLimitReached => {
                ErrorCategory::RateLimit
            }
            UserError::EmailAlreadyUsed | UserError::UsernameAlreadyUsed => {
                ErrorCategory::Uniqueness
            }
            UserError::UserLocked => ErrorCategory::AccountSecurity,
        }
    }
}

/// Input that cannot form a valid value object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Not an email address.
    #[error("Invalid email address: '{0}'")]
    InvalidEmail(String),

    /// Username is blank.
    #[error("Username must not be empty")]
    EmptyUsername,

    /// Username exceeds the length limit.
    #[error("Username must be at most {max} characters")]
    UsernameTooLong { max: usize },

    /// Notification subject is blank.
    #[error("Subject must not be empty")]
    EmptySubject,

    /// Notification template is blank.
    #[error("Template must not be empty")]
    EmptyTemplate,

    /// Password is too short.
    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A user-domain violation.
    #[error(transparent)]
    User(#[from] UserError),

    /// Invalid input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Activation or reset token does not match.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Password hashing failed.
    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    /// The stored user changed since it was loaded.
    #[error("Concurrency conflict for user {user_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        user_id: UserId,
        expected: u64,
        actual: u64,
    },

    /// Storage failure.
    #[error("Repository error: {0}")]
    Repository(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn activation_limit_message_is_fixed() {
        assert_eq!(
            UserError::ActivationLimitReached.to_string(),
            "Nombre maximal d'emails d'activation atteint."
        );
    }

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<_> = UserError::ALL.iter().map(UserError::code).collect();
        assert_eq!(codes.len(), UserError::ALL.len());
    }

    #[test]
    fn messages_are_unique_and_non_empty() {
        let messages: HashSet<_> = UserError::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), UserError::ALL.len());
        assert!(messages.iter().all(|m| !m.is_empty()));
    }

    #[test]
    fn categories() {
        assert_eq!(
            UserError::ActivationLimitReached.category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            UserError::ResetPasswordLimitReached.category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(UserError::UserLocked.category(), ErrorCategory::AccountSecurity);
        assert_eq!(UserError::EmailAlreadyUsed.category(), ErrorCategory::Uniqueness);
        assert_eq!(
            UserError::UsernameAlreadyUsed.category(),
            ErrorCategory::Uniqueness
        );
    }

    #[test]
    fn domain_error_is_transparent_over_user_error() {
        let err = DomainError::from(UserError::UserLocked);
        assert_eq!(err.to_string(), "Ce compte est verrouillé.");
    }
}
