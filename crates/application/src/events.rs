//! In-process event bus.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{DispatchError, DomainEvent, EventDispatcher, SubscriberFailure};
use thiserror::Error;

/// A subscriber failed to handle an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl From<messaging::MessagingError> for SubscriberError {
    fn from(err: messaging::MessagingError) -> Self {
        Self(err.to_string())
    }
}

impl From<domain::ValidationError> for SubscriberError {
    fn from(err: domain::ValidationError) -> Self {
        Self(err.to_string())
    }
}

/// Reacts to domain events of type `E`.
#[async_trait]
pub trait EventSubscriber<E: DomainEvent>: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    async fn on_event(&self, event: &E) -> Result<(), SubscriberError>;
}

/// [`EventDispatcher`] that routes events to subscribers by event name.
///
/// Within one dispatch every subscriber runs, in registration order, even
/// if an earlier one fails. Failures are logged and returned together.
pub struct EventBus<E: DomainEvent> {
    subscribers: HashMap<&'static str, Vec<Arc<dyn EventSubscriber<E>>>>,
}

impl<E: DomainEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }
}

impl<E: DomainEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `subscriber` for events named `event_name`.
    pub fn subscribe(
        &mut self,
        event_name: &'static str,
        subscriber: Arc<dyn EventSubscriber<E>>,
    ) -> &mut Self {
        self.subscribers
            .entry(event_name)
            .or_default()
            .push(subscriber);
        self
    }

    /// Number of subscribers for `event_name`.
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.subscribers.get(event_name).map_or(0, Vec::len)
    }
}

impl<E: DomainEvent> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.subscribers.keys().collect();
        names.sort();
        f.debug_struct("EventBus").field("events", &names).finish()
    }
}

#[async_trait]
impl<E: DomainEvent> EventDispatcher<E> for EventBus<E> {
    #[tracing::instrument(skip_all, fields(event = event.event_name()))]
    async fn dispatch(&self, event: &E) -> Result<(), DispatchError> {
        let event_name = event.event_name();
        metrics::counter!("domain_events_dispatched_total", "event" => event_name).increment(1);

        let Some(subscribers) = self.subscribers.get(event_name) else {
            tracing::debug!("no subscribers");
            return Ok(());
        };

        let mut failures = Vec::new();
        for subscriber in subscribers {
            if let Err(err) = subscriber.on_event(event).await {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    error = %err,
                    "event subscriber failed"
                );
                metrics::counter!(
                    "domain_event_subscriber_failures_total",
                    "event" => event_name
                )
                .increment(1);
                failures.push(SubscriberFailure {
                    event_name,
                    subscriber: subscriber.name().to_string(),
                    error: err.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::SubscribersFailed {
                event_name,
                failures,
            })
        }
    }
}
