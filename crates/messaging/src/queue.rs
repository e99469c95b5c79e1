use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{DeadLetter, Envelope, Message, MessageId, Result};

/// Core trait for queue implementations.
///
/// A queue decouples the publisher of a message from its consumer. Every
/// published message is leased to at least one consumer; leases that are
/// neither acknowledged nor released before they expire make the message
/// visible again. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Stores a message for later consumption.
    ///
    /// Returns once the message is stored, not once it has been handled.
    async fn publish(&self, message_type: &str, payload: serde_json::Value)
    -> Result<MessageId>;

    /// Leases the next available message, incrementing its attempt counter.
    ///
    /// The returned `attempts` value identifies the lease: `ack`, `retry`
    /// and `dead_letter` only take effect while the message is still on
    /// that attempt. Returns None when nothing is currently available.
    async fn receive(&self) -> Result<Option<Envelope>>;

    /// Acknowledges successful handling of lease `attempt` and removes the
    /// message.
    ///
    /// Settling a lease that is no longer current (the message is gone, or
    /// was leased again after this lease expired) is a logged no-op: under
    /// at-least-once delivery a redelivered copy may have been settled first.
    /// The same holds for `retry` and `dead_letter`.
    async fn ack(&self, id: MessageId, attempt: u32) -> Result<()>;

    /// Releases lease `attempt` and schedules another attempt.
    async fn retry(
        &self,
        id: MessageId,
        attempt: u32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Moves the message held under lease `attempt` to the dead-letter store.
    async fn dead_letter(&self, id: MessageId, attempt: u32, error: &str) -> Result<()>;

    /// Lists dead-lettered messages, oldest failure first.
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;

    /// Moves a dead-lettered message back to the live queue with a fresh
    /// attempt budget.
    async fn requeue_dead_letter(&self, id: MessageId) -> Result<()>;

    /// Number of live messages (available, delayed, or leased).
    async fn pending_count(&self) -> Result<usize>;

    /// Parks the caller until a message may have become available or the
    /// timeout elapses, whichever is first.
    async fn wait_for_message(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait MessageQueueExt: MessageQueue {
    /// Serializes and publishes a typed message.
    async fn publish_message<M: Message>(&self, message: &M) -> Result<MessageId> {
        let payload = serde_json::to_value(message)?;
        let id = self.publish(M::message_type(), payload).await?;
        metrics::counter!("messages_published_total", "message_type" => M::message_type())
            .increment(1);
        Ok(id)
    }
}

// Blanket implementation for all MessageQueue implementations
impl<T: MessageQueue + ?Sized> MessageQueueExt for T {}

#[async_trait]
impl<Q: MessageQueue + ?Sized> MessageQueue for Arc<Q> {
    async fn publish(
        &self,
        message_type: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId> {
        (**self).publish(message_type, payload).await
    }

    async fn receive(&self) -> Result<Option<Envelope>> {
        (**self).receive().await
    }

    async fn ack(&self, id: MessageId, attempt: u32) -> Result<()> {
        (**self).ack(id, attempt).await
    }

    async fn retry(
        &self,
        id: MessageId,
        attempt: u32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> Result<()> {
        (**self).retry(id, attempt, error, available_at).await
    }

    async fn dead_letter(&self, id: MessageId, attempt: u32, error: &str) -> Result<()> {
        (**self).dead_letter(id, attempt, error).await
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        (**self).dead_letters().await
    }

    async fn requeue_dead_letter(&self, id: MessageId) -> Result<()> {
        (**self).requeue_dead_letter(id).await
    }

    async fn pending_count(&self) -> Result<usize> {
        (**self).pending_count().await
    }

    async fn wait_for_message(&self, timeout: Duration) {
        (**self).wait_for_message(timeout).await
    }
}
