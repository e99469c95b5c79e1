//! Ports implemented by infrastructure adapters.

use async_trait::async_trait;
use common::UserId;

use crate::error::DomainError;
use crate::user::{Email, HashedPassword, User, Username};

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password with a fresh salt.
    fn hash(&self, plaintext: &str) -> Result<HashedPassword, DomainError>;

    /// Returns true if `plaintext` matches `hashed`. Malformed hashes never match.
    fn verify(&self, plaintext: &str, hashed: &HashedPassword) -> bool;
}

/// Produces random identifiers, in canonical UUID v4 text form.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Storage for user aggregates.
///
/// `save` inserts or replaces by id. It must refuse to store a user whose
/// email or username belongs to a different user, returning
/// [`UserError::EmailAlreadyUsed`](crate::UserError::EmailAlreadyUsed) or
/// [`UserError::UsernameAlreadyUsed`](crate::UserError::UsernameAlreadyUsed).
///
/// Saves are optimistic: the stored version must equal
/// [`User::version`], otherwise the save fails with
/// [`DomainError::ConcurrencyConflict`]. On success the repository bumps
/// the version and records it on `user` with [`User::mark_saved`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, user: &mut User) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, DomainError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, DomainError>;

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, DomainError>;
}

/// Extension trait for repository existence checks.
#[async_trait]
pub trait UserRepositoryExt: UserRepository {
    async fn email_exists(&self, email: &Email) -> Result<bool, DomainError> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn username_exists(&self, username: &Username) -> Result<bool, DomainError> {
        Ok(self.find_by_username(username).await?.is_some())
    }
}

impl<R: UserRepository + ?Sized> UserRepositoryExt for R {}
