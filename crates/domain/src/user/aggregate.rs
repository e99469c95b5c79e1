//! User aggregate implementation.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, UserError};
use crate::event::{EventRecorder, RecordsEvents};

use super::{
    Email, HashedPassword, UserEvent, UserStatus, Username,
    events::{
        ActivationEmailRequestedData, PasswordChangedData, PasswordResetRequestedData,
        UserActivatedData, UserLockedData, UserRegisteredData,
    },
};

/// User aggregate root.
///
/// Every state change records a [`UserEvent`]. The application layer reads
/// them through [`RecordsEvents::domain_events`] after persisting, dispatches
/// them, then clears the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    email: Email,
    username: Username,
    password: HashedPassword,
    status: UserStatus,

    /// Set once the failed-login threshold is reached.
    locked: bool,

    failed_login_attempts: u32,

    /// Token expected by `activate`. Cleared on activation.
    activation_token: Option<String>,

    /// Token expected by `reset_password`. Cleared once used.
    reset_token: Option<String>,

    created_at: DateTime<Utc>,

    /// Number of committed saves. Zero until first stored.
    #[serde(default)]
    version: u64,

    #[serde(skip)]
    events: EventRecorder<UserEvent>,
}

impl RecordsEvents for User {
    type Event = UserEvent;

    fn recorder(&self) -> &EventRecorder<UserEvent> {
        &self.events
    }

    fn recorder_mut(&mut self) -> &mut EventRecorder<UserEvent> {
        &mut self.events
    }
}

// Query methods
impl User {
    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn password(&self) -> &HashedPassword {
        &self.password
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn failed_login_attempts(&self) -> u32 {
        self.failed_login_attempts
    }

    pub fn activation_token(&self) -> Option<&str> {
        self.activation_token.as_deref()
    }

    pub fn reset_token(&self) -> Option<&str> {
        self.reset_token.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Fails with [`UserError::UserLocked`] when the account is locked.
    pub fn ensure_not_locked(&self) -> Result<(), UserError> {
        if self.locked {
            return Err(UserError::UserLocked);
        }
        Ok(())
    }
}

// Behavior
impl User {
    /// Records that a repository committed this state as `version`.
    pub fn mark_saved(&mut self, version: u64) {
        self.version = version;
    }

    /// Creates a new account pending activation and records `UserRegistered`.
    pub fn register(
        id: UserId,
        email: Email,
        username: Username,
        password: HashedPassword,
        activation_token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let activation_token = activation_token.into();
        let mut user = Self {
            id,
            email,
            username,
            password,
            status: UserStatus::PendingActivation,
            locked: false,
            failed_login_attempts: 0,
            activation_token: Some(activation_token.clone()),
            reset_token: None,
            created_at: now,
            version: 0,
            events: EventRecorder::new(),
        };

        user.events
            .record(UserEvent::UserRegistered(UserRegisteredData {
                user_id: id,
                email: user.email.clone(),
                username: user.username.clone(),
                activation_token,
                occurred_on: now,
            }));
        user
    }

    /// Issues a fresh activation token.
    ///
    /// Returns `Ok(false)` without recording anything when the account is
    /// already active.
    pub fn request_activation_email(
        &mut self,
        token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, UserError> {
        self.ensure_not_locked()?;
        if self.is_active() {
            return Ok(false);
        }

        let token = token.into();
        self.activation_token = Some(token.clone());
        self.events
            .record(UserEvent::ActivationEmailRequested(ActivationEmailRequestedData {
                user_id: self.id,
                email: self.email.clone(),
                username: self.username.clone(),
                activation_token: token,
                occurred_on: now,
            }));
        Ok(true)
    }

    /// Activates the account if `token` matches the outstanding one.
    ///
    /// Activating an already active account is a no-op.
    pub fn activate(&mut self, token: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_not_locked()?;
        if self.is_active() {
            return Ok(());
        }
        if self.activation_token.as_deref() != Some(token) {
            return Err(DomainError::InvalidToken);
        }

        self.status = UserStatus::Active;
        self.activation_token = None;
        self.events.record(UserEvent::UserActivated(UserActivatedData {
            user_id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            occurred_on: now,
        }));
        Ok(())
    }

    /// Issues a password reset token. Replaces any outstanding one.
    pub fn request_password_reset(
        &mut self,
        token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), UserError> {
        self.ensure_not_locked()?;

        let token = token.into();
        self.reset_token = Some(token.clone());
        self.events
            .record(UserEvent::PasswordResetRequested(PasswordResetRequestedData {
                user_id: self.id,
                email: self.email.clone(),
                username: self.username.clone(),
                reset_token: token,
                occurred_on: now,
            }));
        Ok(())
    }

    /// Replaces the password if `token` matches the outstanding reset token.
    pub fn reset_password(
        &mut self,
        token: &str,
        new_password: HashedPassword,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_locked()?;
        if self.reset_token.is_none() || self.reset_token.as_deref() != Some(token) {
            return Err(DomainError::InvalidToken);
        }

        self.password = new_password;
        self.reset_token = None;
        self.failed_login_attempts = 0;
        self.events
            .record(UserEvent::PasswordChanged(PasswordChangedData {
                user_id: self.id,
                occurred_on: now,
            }));
        Ok(())
    }

    /// Counts a failed login. Locks the account once `max_attempts` is reached.
    ///
    /// Returns true if this call locked the account.
    pub fn record_failed_login(&mut self, max_attempts: u32, now: DateTime<Utc>) -> bool {
        self.failed_login_attempts = self.failed_login_attempts.saturating_add(1);
        if self.locked || self.failed_login_attempts < max_attempts.max(1) {
            return false;
        }

        self.locked = true;
        self.events.record(UserEvent::UserLocked(UserLockedData {
            user_id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            failed_attempts: self.failed_login_attempts,
            occurred_on: now,
        }));
        true
    }

    /// Resets the failed-login counter.
    pub fn record_successful_login(&mut self) {
        self.failed_login_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DomainEvent;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn new_user() -> User {
        User::register(
            UserId::new(),
            Email::parse("alice@example.com").unwrap(),
            Username::parse("alice").unwrap(),
            HashedPassword::new("hash"),
            "activate-1",
            now(),
        )
    }

    fn names(user: &User) -> Vec<&'static str> {
        user.domain_events().iter().map(|e| e.event_name()).collect()
    }

    #[test]
    fn test_register_records_event() {
        let user = new_user();

        assert_eq!(user.status(), UserStatus::PendingActivation);
        assert_eq!(user.activation_token(), Some("activate-1"));
        assert_eq!(names(&user), vec!["user.registered"]);
        match &user.domain_events()[0] {
            UserEvent::UserRegistered(data) => {
                assert_eq!(data.email.as_str(), "alice@example.com");
                assert_eq!(data.activation_token, "activate-1");
                assert_eq!(data.occurred_on, now());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_activate_with_matching_token() {
        let mut user = new_user();
        user.clear_domain_events();

        user.activate("activate-1", now()).unwrap();

        assert!(user.is_active());
        assert_eq!(user.activation_token(), None);
        assert_eq!(names(&user), vec!["user.activated"]);
    }

    #[test]
    fn test_activate_with_wrong_token_fails() {
        let mut user = new_user();
        user.clear_domain_events();

        let err = user.activate("nope", now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidToken));
        assert!(!user.is_active());
        assert!(user.domain_events().is_empty());
    }

    #[test]
    fn test_activate_twice_is_noop() {
        let mut user = new_user();
        user.activate("activate-1", now()).unwrap();
        user.clear_domain_events();

        user.activate("whatever", now()).unwrap();
        assert!(user.domain_events().is_empty());
    }

    #[test]
    fn test_request_activation_email_rotates_token() {
        let mut user = new_user();
        user.clear_domain_events();

        assert!(user.request_activation_email("activate-2", now()).unwrap());
        assert_eq!(user.activation_token(), Some("activate-2"));
        assert_eq!(names(&user), vec!["user.activation_email_requested"]);
    }

    #[test]
    fn test_request_activation_email_when_active_is_skipped() {
        let mut user = new_user();
        user.activate("activate-1", now()).unwrap();
        user.clear_domain_events();

        assert!(!user.request_activation_email("activate-2", now()).unwrap());
        assert!(user.domain_events().is_empty());
    }

    #[test]
    fn test_password_reset_flow() {
        let mut user = new_user();
        user.clear_domain_events();

        user.request_password_reset("reset-1", now()).unwrap();
        assert_eq!(user.reset_token(), Some("reset-1"));

        user.reset_password("reset-1", HashedPassword::new("new-hash"), now())
            .unwrap();
        assert_eq!(user.password().as_str(), "new-hash");
        assert_eq!(user.reset_token(), None);
        assert_eq!(
            names(&user),
            vec!["user.password_reset_requested", "user.password_changed"]
        );
    }

    #[test]
    fn test_reset_without_request_fails() {
        let mut user = new_user();
        let err = user
            .reset_password("reset-1", HashedPassword::new("x"), now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidToken));
    }

    #[test]
    fn test_reset_token_is_single_use() {
        let mut user = new_user();
        user.request_password_reset("reset-1", now()).unwrap();
        user.reset_password("reset-1", HashedPassword::new("a"), now())
            .unwrap();

        assert!(
            user.reset_password("reset-1", HashedPassword::new("b"), now())
                .is_err()
        );
        assert_eq!(user.password().as_str(), "a");
    }

    #[test]
    fn test_locks_after_max_failed_logins() {
        let mut user = new_user();
        user.clear_domain_events();

        assert!(!user.record_failed_login(3, now()));
        assert!(!user.record_failed_login(3, now()));
        assert!(user.record_failed_login(3, now()));
        assert!(user.is_locked());
        assert_eq!(names(&user), vec!["user.locked"]);

        // Further failures do not record another lock.
        assert!(!user.record_failed_login(3, now()));
        assert_eq!(user.domain_events().len(), 1);
    }

    #[test]
    fn test_successful_login_resets_counter() {
        let mut user = new_user();
        user.record_failed_login(3, now());
        user.record_failed_login(3, now());
        user.record_successful_login();
        assert_eq!(user.failed_login_attempts(), 0);
        assert!(!user.record_failed_login(3, now()));
    }

    #[test]
    fn test_locked_user_is_rejected() {
        let mut user = new_user();
        user.record_failed_login(1, now());

        assert_eq!(
            user.request_activation_email("t", now()),
            Err(UserError::UserLocked)
        );
        assert_eq!(
            user.request_password_reset("t", now()),
            Err(UserError::UserLocked)
        );
        assert!(matches!(
            user.activate("activate-1", now()),
            Err(DomainError::User(UserError::UserLocked))
        ));
    }

    #[test]
    fn test_serialization_skips_events() {
        let user = new_user();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("events"));

        let restored: User = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id(), user.id());
        assert_eq!(restored.email(), user.email());
        assert!(restored.domain_events().is_empty());
        assert_eq!(restored.version(), 0);
    }

    #[test]
    fn test_mark_saved_tracks_version() {
        let mut user = new_user();
        assert_eq!(user.version(), 0);
        user.mark_saved(3);
        assert_eq!(user.version(), 3);

        let restored: User = serde_json::from_str(&serde_json::to_string(&user).unwrap()).unwrap();
        assert_eq!(restored.version(), 3);
    }
}
