//! User domain events.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;

use super::{Email, Username};

pub const USER_REGISTERED: &str = "user.registered";
pub const ACTIVATION_EMAIL_REQUESTED: &str = "user.activation_email_requested";
pub const USER_ACTIVATED: &str = "user.activated";
pub const PASSWORD_RESET_REQUESTED: &str = "user.password_reset_requested";
pub const PASSWORD_CHANGED: &str = "user.password_changed";
pub const USER_LOCKED: &str = "user.locked";

/// Events that can occur on a user aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    /// Account was created, pending activation.
    UserRegistered(UserRegisteredData),

    /// A new activation email was requested.
    ActivationEmailRequested(ActivationEmailRequestedData),

    /// Account was activated.
    UserActivated(UserActivatedData),

    /// A password reset link was requested.
    PasswordResetRequested(PasswordResetRequestedData),

    /// Password was changed through a reset.
    PasswordChanged(PasswordChangedData),

    /// Account was locked after too many failed logins.
    UserLocked(UserLockedData),
}

impl UserEvent {
    /// The user this event belongs to.
    pub fn user_id(&self) -> UserId {
        match self {
            UserEvent::UserRegistered(d) => d.user_id,
            UserEvent::ActivationEmailRequested(d) => d.user_id,
            UserEvent::UserActivated(d) => d.user_id,
            UserEvent::PasswordResetRequested(d) => d.user_id,
            UserEvent::PasswordChanged(d) => d.user_id,
            UserEvent::UserLocked(d) => d.user_id,
        }
    }
}

impl DomainEvent for UserEvent {
    fn event_name(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered(_) => USER_REGISTERED,
            UserEvent::ActivationEmailRequested(_) => ACTIVATION_EMAIL_REQUESTED,
            UserEvent::UserActivated(_) => USER_ACTIVATED,
            UserEvent::PasswordResetRequested(_) => PASSWORD_RESET_REQUESTED,
            UserEvent::PasswordChanged(_) => PASSWORD_CHANGED,
            UserEvent::UserLocked(_) => USER_LOCKED,
        }
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        match self {
            UserEvent::UserRegistered(d) => d.occurred_on,
            UserEvent::ActivationEmailRequested(d) => d.occurred_on,
            UserEvent::UserActivated(d) => d.occurred_on,
            UserEvent::PasswordResetRequested(d) => d.occurred_on,
            UserEvent::PasswordChanged(d) => d.occurred_on,
            UserEvent::UserLocked(d) => d.occurred_on,
        }
    }
}

/// Data for UserRegistered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegisteredData {
    pub user_id: UserId,
    pub email: Email,
    pub username: Username,
    pub activation_token: String,
    pub occurred_on: DateTime<Utc>,
}

/// Data for ActivationEmailRequested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationEmailRequestedData {
    pub user_id: UserId,
    pub email: Email,
    pub username: Username,
    pub activation_token: String,
    pub occurred_on: DateTime<Utc>,
}

/// Data for UserActivated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivatedData {
    pub user_id: UserId,
    pub email: Email,
    pub username: Username,
    pub occurred_on: DateTime<Utc>,
}

/// Data for PasswordResetRequested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordResetRequestedData {
    pub user_id: UserId,
    pub email: Email,
    pub username: Username,
    pub reset_token: String,
    pub occurred_on: DateTime<Utc>,
}

/// Data for PasswordChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordChangedData {
    pub user_id: UserId,
    pub occurred_on: DateTime<Utc>,
}

/// Data for UserLocked event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLockedData {
    pub user_id: UserId,
    pub email: Email,
    pub username: Username,
    pub failed_attempts: u32,
    pub occurred_on: DateTime<Utc>,
}
