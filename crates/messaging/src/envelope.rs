use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Message, MessageId};

/// A message as it sits in the queue, along with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identifier, stable across redeliveries.
    pub id: MessageId,

    /// Routing key used to find the handler (see [`Message::message_type`]).
    pub message_type: String,

    /// The message body as JSON.
    pub payload: serde_json::Value,

    /// How many times the message has been leased to a consumer.
    pub attempts: u32,

    /// When the message was first published.
    pub enqueued_at: DateTime<Utc>,

    /// Earliest instant the message may be leased.
    pub available_at: DateTime<Utc>,

    /// Error from the most recent failed attempt, if any.
    pub last_error: Option<String>,
}

impl Envelope {
    /// Starts building an envelope.
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Decodes the payload back into a typed message.
    pub fn decode<M: Message>(&self) -> Result<M, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Builder for [`Envelope`].
///
/// Built envelopes get a fresh id, no attempts yet, and are available as
/// soon as they are enqueued.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    message_type: Option<String>,
    payload: Option<serde_json::Value>,
    enqueued_at: Option<DateTime<Utc>>,
}

impl EnvelopeBuilder {
    /// Sets the routing key.
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the publish time. If not set, the current time will be used.
    pub fn enqueued_at(mut self, at: DateTime<Utc>) -> Self {
        self.enqueued_at = Some(at);
        self
    }

    /// Builds the envelope.
    ///
    /// # Panics
    ///
    /// Panics if `message_type` or `payload` is not set.
    pub fn build(self) -> Envelope {
        self.try_build()
            .expect("message_type and payload are required")
    }

    /// Tries to build the envelope, returning None if required fields are missing.
    pub fn try_build(self) -> Option<Envelope> {
        let enqueued_at = self.enqueued_at.unwrap_or_else(Utc::now);
        Some(Envelope {
            id: MessageId::new(),
            message_type: self.message_type?,
            payload: self.payload?,
            attempts: 0,
            enqueued_at,
            available_at: enqueued_at,
            last_error: None,
        })
    }
}

/// A message that exhausted its retry budget or failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The envelope as it was on its final attempt.
    pub envelope: Envelope,

    /// The error that sent it here.
    pub error: String,

    /// When it was dead-lettered.
    pub failed_at: DateTime<Utc>,
}
