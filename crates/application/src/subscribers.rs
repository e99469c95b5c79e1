//! Event subscribers that turn user events into queued emails.

use std::sync::Arc;

use async_trait::async_trait;
use domain::notification::templates;
use domain::user::events::{
    ACTIVATION_EMAIL_REQUESTED, PASSWORD_RESET_REQUESTED, USER_ACTIVATED, USER_LOCKED,
    USER_REGISTERED,
};
use domain::{NotificationMessage, UserEvent, ValidationError};
use messaging::{MessageQueue, MessageQueueExt};
use serde_json::Value;

use crate::events::{EventBus, EventSubscriber, SubscriberError};

/// Publishes a [`NotificationMessage`] for every user event that warrants
/// an email. Sending happens later, on a worker.
pub struct UserNotificationSubscriber {
    queue: Arc<dyn MessageQueue>,
}

impl UserNotificationSubscriber {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    /// Subscribes to every user event that produces an email.
    pub fn register(self: Arc<Self>, bus: &mut EventBus<UserEvent>) {
        for name in [
            USER_REGISTERED,
            ACTIVATION_EMAIL_REQUESTED,
            USER_ACTIVATED,
            PASSWORD_RESET_REQUESTED,
            USER_LOCKED,
        ] {
            bus.subscribe(name, Arc::clone(&self) as Arc<dyn EventSubscriber<UserEvent>>);
        }
    }

    /// The email for `event`, or `None` if it sends nothing.
    pub fn notification_for(
        event: &UserEvent,
    ) -> Result<Option<NotificationMessage>, ValidationError> {
        let message = match event {
            UserEvent::UserRegistered(data) => NotificationMessage::to_email(
                data.email.clone(),
                "Activez votre compte",
                templates::ACTIVATION,
                [
                    ("username", Value::from(data.username.as_str())),
                    ("user_id", Value::from(data.user_id.to_string())),
                    ("token", Value::from(data.activation_token.as_str())),
                ],
            )?,
            UserEvent::ActivationEmailRequested(data) => NotificationMessage::to_email(
                data.email.clone(),
                "Activez votre compte",
                templates::ACTIVATION,
                [
                    ("username", Value::from(data.username.as_str())),
                    ("user_id", Value::from(data.user_id.to_string())),
                    ("token", Value::from(data.activation_token.as_str())),
                ],
            )?,
            UserEvent::UserActivated(data) => NotificationMessage::to_email(
                data.email.clone(),
                "Bienvenue",
                templates::WELCOME,
                [("username", Value::from(data.username.as_str()))],
            )?,
            UserEvent::PasswordResetRequested(data) => NotificationMessage::to_email(
                data.email.clone(),
                "Réinitialisation de votre mot de passe",
                templates::RESET_PASSWORD,
                [
                    ("username", Value::from(data.username.as_str())),
                    ("token", Value::from(data.reset_token.as_str())),
                ],
            )?,
            UserEvent::UserLocked(data) => NotificationMessage::to_email(
                data.email.clone(),
                "Votre compte a été verrouillé",
                templates::ACCOUNT_LOCKED,
                [
                    ("username", Value::from(data.username.as_str())),
                    ("failed_attempts", Value::from(data.failed_attempts)),
                ],
            )?,
            UserEvent::PasswordChanged(_) => return Ok(None),
        };
        Ok(Some(message))
    }
}

#[async_trait]
impl EventSubscriber<UserEvent> for UserNotificationSubscriber {
    fn name(&self) -> &str {
        "user_notifications"
    }

    async fn on_event(&self, event: &UserEvent) -> Result<(), SubscriberError> {
        let Some(message) = Self::notification_for(event)? else {
            return Ok(());
        };
        let id = self.queue.publish_message(&message).await?;
        tracing::debug!(message_id = %id, template = message.template(), "notification queued");
        Ok(())
    }
}
