//! Queued email notification intent.

use std::collections::BTreeMap;

use messaging::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::user::Email;

/// Template names known to the mailer.
pub mod templates {
    pub const ACTIVATION: &str = "activation";
    pub const WELCOME: &str = "welcome";
    pub const RESET_PASSWORD: &str = "reset_password";
    pub const ACCOUNT_LOCKED: &str = "account_locked";
}

/// "Send this templated email to this address."
///
/// Validated on construction and on deserialization, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNotification")]
pub struct NotificationMessage {
    to: Email,
    subject: String,
    template: String,
    context: BTreeMap<String, Value>,
}

/// Unvalidated wire shape.
#[derive(Deserialize)]
struct RawNotification {
    to: Email,
    subject: String,
    template: String,
    #[serde(default)]
    context: BTreeMap<String, Value>,
}

impl TryFrom<RawNotification> for NotificationMessage {
    type Error = ValidationError;

    fn try_from(raw: RawNotification) -> Result<Self, Self::Error> {
        Self::build(raw.to, raw.subject, raw.template, raw.context)
    }
}

impl NotificationMessage {
    /// Creates a message. Fails on a bad address or blank subject/template.
    pub fn new<K, V>(
        to: &str,
        subject: impl Into<String>,
        template: impl Into<String>,
        context: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, ValidationError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let context = context
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::build(Email::parse(to)?, subject.into(), template.into(), context)
    }

    /// Creates a message for an already validated address.
    pub fn to_email<K, V>(
        to: Email,
        subject: impl Into<String>,
        template: impl Into<String>,
        context: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, ValidationError>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let context = context
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::build(to, subject.into(), template.into(), context)
    }

    fn build(
        to: Email,
        subject: String,
        template: String,
        context: BTreeMap<String, Value>,
    ) -> Result<Self, ValidationError> {
        if subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        if template.trim().is_empty() {
            return Err(ValidationError::EmptyTemplate);
        }
        Ok(Self {
            to,
            subject,
            template,
            context,
        })
    }

    pub fn to(&self) -> &Email {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }
}

impl Message for NotificationMessage {
    fn message_type() -> &'static str {
        "notification.email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_context() -> Vec<(String, Value)> {
        Vec::new()
    }

    #[test]
    fn builds_with_context() {
        let msg = NotificationMessage::new(
            "a@b.co",
            "Welcome",
            templates::WELCOME,
            [("username", "alice")],
        )
        .unwrap();

        assert_eq!(msg.to().as_str(), "a@b.co");
        assert_eq!(msg.subject(), "Welcome");
        assert_eq!(msg.template(), "welcome");
        assert_eq!(msg.context()["username"], json!("alice"));
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(matches!(
            NotificationMessage::new("nope", "s", "t", no_context()),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert_eq!(
            NotificationMessage::new("a@b.co", " ", "t", no_context()),
            Err(ValidationError::EmptySubject)
        );
        assert_eq!(
            NotificationMessage::new("a@b.co", "s", "", no_context()),
            Err(ValidationError::EmptyTemplate)
        );
    }

    #[test]
    fn deserialization_validates() {
        let ok: NotificationMessage = serde_json::from_value(json!({
            "to": "a@b.co",
            "subject": "Hi",
            "template": "welcome",
        }))
        .unwrap();
        assert!(ok.context().is_empty());

        let bad = serde_json::from_value::<NotificationMessage>(json!({
            "to": "a@b.co",
            "subject": "",
            "template": "welcome",
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn message_type_is_stable() {
        assert_eq!(NotificationMessage::message_type(), "notification.email");
    }
}
