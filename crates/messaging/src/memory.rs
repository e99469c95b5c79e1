use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, SystemClock};
use tokio::sync::{Mutex, Notify};

use crate::{
    DeadLetter, Envelope, MessageId, MessagingError, Result, queue::MessageQueue,
};

/// Default time a consumer may hold a message before it is redelivered.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct Slot {
    envelope: Envelope,
    seq: u64,
    leased_until: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.envelope.available_at <= now && self.leased_until.is_none_or(|until| until <= now)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    live: Vec<Slot>,
    dead: Vec<DeadLetter>,
    next_seq: u64,
}

impl QueueState {
    fn push(&mut self, envelope: Envelope) {
        self.next_seq += 1;
        self.live.push(Slot {
            envelope,
            seq: self.next_seq,
            leased_until: None,
        });
    }

    /// Index of `id` if it is still on lease `attempt`.
    fn leased(&self, id: MessageId, attempt: u32) -> Option<usize> {
        let index = self
            .live
            .iter()
            .position(|slot| slot.envelope.id == id && slot.envelope.attempts == attempt);
        if index.is_none() {
            tracing::debug!(message_id = %id, attempt, "stale lease, settle ignored");
        }
        index
    }
}

/// In-memory queue.
///
/// Provides the same delivery semantics as the PostgreSQL queue (leases,
/// delayed retries, dead letters) without durability across restarts.
/// Clones share the same underlying queue.
#[derive(Clone)]
pub struct InMemoryMessageQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
    visibility_timeout: chrono::Duration,
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageQueue {
    /// Creates an empty queue on the system clock.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            notify: Arc::new(Notify::new()),
            clock: Arc::new(SystemClock),
            visibility_timeout: chrono::Duration::seconds(DEFAULT_VISIBILITY_TIMEOUT_SECS),
        }
    }

    /// Uses the given clock for publish times and lease expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how long a lease lasts before the message is redelivered.
    pub fn with_visibility_timeout(mut self, timeout: chrono::Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Returns every live envelope, leased or not, in publish order.
    pub async fn snapshot(&self) -> Vec<Envelope> {
        let state = self.state.lock().await;
        let mut slots = state.live.clone();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.envelope).collect()
    }

    /// Drops all live and dead-lettered messages.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.live.clear();
        state.dead.clear();
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(
        &self,
        message_type: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId> {
        let envelope = Envelope::builder()
            .message_type(message_type)
            .payload_raw(payload)
            .enqueued_at(self.clock.now())
            .build();
        let id = envelope.id;

        self.state.lock().await.push(envelope);
        self.notify.notify_one();

        tracing::debug!(message_id = %id, message_type, "message published");
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<Envelope>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let next = state
            .live
            .iter_mut()
            .filter(|slot| slot.is_available(now))
            .min_by_key(|slot| (slot.envelope.available_at, slot.seq));

        Ok(next.map(|slot| {
            slot.leased_until = Some(now + self.visibility_timeout);
            slot.envelope.attempts += 1;
            slot.envelope.clone()
        }))
    }

    async fn ack(&self, id: MessageId, attempt: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(index) = state.leased(id, attempt) {
            state.live.remove(index);
        }
        Ok(())
    }

    async fn retry(
        &self,
        id: MessageId,
        attempt: u32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(index) = state.leased(id, attempt) else {
            return Ok(());
        };

        let slot = &mut state.live[index];
        slot.leased_until = None;
        slot.envelope.available_at = available_at;
        slot.envelope.last_error = Some(error.to_string());
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, id: MessageId, attempt: u32, error: &str) -> Result<()> {
        let failed_at = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(index) = state.leased(id, attempt) else {
            return Ok(());
        };

        let mut envelope = state.live.remove(index).envelope;
        envelope.last_error = Some(error.to_string());
        state.dead.push(DeadLetter {
            envelope,
            error: error.to_string(),
            failed_at,
        });
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.state.lock().await.dead.clone())
    }

    async fn requeue_dead_letter(&self, id: MessageId) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let index = state
            .dead
            .iter()
            .position(|dead| dead.envelope.id == id)
            .ok_or(MessagingError::MessageNotFound(id))?;

        let mut envelope = state.dead.remove(index).envelope;
        envelope.attempts = 0;
        envelope.available_at = now;
        state.push(envelope);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.state.lock().await.live.len())
    }

    async fn wait_for_message(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}
