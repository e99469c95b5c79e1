//! In-memory user storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use domain::{DomainError, Email, RecordsEvents, User, UserError, UserRepository, Username};
use tokio::sync::RwLock;

/// In-memory [`UserRepository`].
///
/// Uniqueness, the version check and the write all happen under a single
/// write lock, so two concurrent saves cannot both win.
/// Stored copies never carry pending domain events.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn save(&self, user: &mut User) -> Result<(), DomainError> {
        let mut users = self.users.write().await;

        let actual = users.get(&user.id()).map_or(0, User::version);
        if actual != user.version() {
            return Err(DomainError::ConcurrencyConflict {
                user_id: user.id(),
                expected: user.version(),
                actual,
            });
        }

        for other in users.values().filter(|u| u.id() != user.id()) {
            if other.email() == user.email() {
                return Err(UserError::EmailAlreadyUsed.into());
            }
            if other.username() == user.username() {
                return Err(UserError::UsernameAlreadyUsed.into());
            }
        }

        user.mark_saved(actual + 1);
        let mut stored = user.clone();
        stored.clear_domain_events();
        users.insert(user.id(), stored);
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, DomainError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, DomainError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email() == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, DomainError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username() == username)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{HashedPassword, UserRepositoryExt};

    fn user(email: &str, username: &str) -> User {
        User::register(
            UserId::new(),
            Email::parse(email).unwrap(),
            Username::parse(username).unwrap(),
            HashedPassword::new("h"),
            "tok",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_and_find() {
        let repo = InMemoryUserRepository::new();
        let mut alice = user("alice@example.com", "alice");
        repo.save(&mut alice).await.unwrap();

        let found = repo.find_by_id(alice.id()).await.unwrap().unwrap();
        assert_eq!(found.email(), alice.email());
        assert!(found.domain_events().is_empty());

        let email = Email::parse("ALICE@example.com").unwrap();
        assert!(repo.email_exists(&email).await.unwrap());
        assert!(
            repo.username_exists(&Username::parse("alice").unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn rejects_taken_email_and_username() {
        let repo = InMemoryUserRepository::new();
        repo.save(&mut user("alice@example.com", "alice")).await.unwrap();

        let err = repo
            .save(&mut user("alice@example.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::User(UserError::EmailAlreadyUsed)));

        let err = repo
            .save(&mut user("other@example.com", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::User(UserError::UsernameAlreadyUsed)));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn resaving_same_user_updates() {
        let repo = InMemoryUserRepository::new();
        let mut alice = user("alice@example.com", "alice");
        repo.save(&mut alice).await.unwrap();
        assert_eq!(alice.version(), 1);

        alice.activate("tok", Utc::now()).unwrap();
        repo.save(&mut alice).await.unwrap();
        assert_eq!(alice.version(), 2);

        let stored = repo.find_by_id(alice.id()).await.unwrap().unwrap();
        assert!(stored.is_active());
        assert_eq!(stored.version(), 2);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn stale_save_is_a_conflict() {
        let repo = InMemoryUserRepository::new();
        let mut alice = user("alice@example.com", "alice");
        repo.save(&mut alice).await.unwrap();

        let mut first = repo.find_by_id(alice.id()).await.unwrap().unwrap();
        let mut second = first.clone();

        first.record_failed_login(5, Utc::now());
        repo.save(&mut first).await.unwrap();

        second.record_failed_login(5, Utc::now());
        let err = repo.save(&mut second).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::ConcurrencyConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(second.version(), 1);

        let stored = repo.find_by_id(alice.id()).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts(), 1);
    }
}
