//! Domain event capability and dispatch port.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: fmt::Debug + Clone + Send + Sync + 'static {
    /// Dotted event name, used as the subscription key.
    fn event_name(&self) -> &'static str;

    /// When the fact happened.
    fn occurred_on(&self) -> DateTime<Utc>;
}

/// Ordered buffer of events raised by an aggregate and not yet dispatched.
///
/// Aggregates embed one of these as a field. Events are appended in the
/// order they were raised and stay there until the application layer
/// clears them after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecorder<E> {
    pending: Vec<E>,
}

impl<E> Default for EventRecorder<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<E> EventRecorder<E> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Recorded events in the order they were raised.
    pub fn domain_events(&self) -> &[E] {
        &self.pending
    }

    /// Drops every recorded event.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Removes and returns every recorded event.
    pub fn take(&mut self) -> Vec<E> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Implemented by aggregates that record domain events.
pub trait RecordsEvents {
    /// The event type this aggregate raises.
    type Event: DomainEvent;

    fn recorder(&self) -> &EventRecorder<Self::Event>;

    fn recorder_mut(&mut self) -> &mut EventRecorder<Self::Event>;

    /// Events raised since the last clear.
    fn domain_events(&self) -> &[Self::Event] {
        self.recorder().domain_events()
    }

    /// Forgets all raised events. Called after dispatch.
    fn clear_domain_events(&mut self) {
        self.recorder_mut().clear();
    }
}

/// One subscriber that failed while handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    pub event_name: &'static str,
    pub subscriber: String,
    pub error: String,
}

impl fmt::Display for SubscriberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subscriber '{}' failed on '{}': {}",
            self.subscriber, self.event_name, self.error
        )
    }
}

/// Errors surfaced by an [`EventDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// One or more subscribers failed. The others still ran.
    #[error("{} subscriber(s) failed for event '{event_name}'", .failures.len())]
    SubscribersFailed {
        event_name: &'static str,
        failures: Vec<SubscriberFailure>,
    },
}

impl DispatchError {
    /// The individual subscriber failures.
    pub fn failures(&self) -> &[SubscriberFailure] {
        match self {
            DispatchError::SubscribersFailed { failures, .. } => failures,
        }
    }
}

/// Outcome of dispatching a batch of events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of events dispatched.
    pub dispatched: usize,
    /// Every subscriber failure across the batch.
    pub failures: Vec<SubscriberFailure>,
}

impl DispatchReport {
    /// True when no subscriber failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Port for delivering domain events to interested subscribers.
///
/// A failing subscriber must not stop the others from receiving the event.
#[async_trait]
pub trait EventDispatcher<E: DomainEvent>: Send + Sync {
    /// Delivers one event to every subscriber registered for its name.
    async fn dispatch(&self, event: &E) -> Result<(), DispatchError>;

    /// Delivers each event in order. Failures are collected, never raised.
    async fn dispatch_all(&self, events: &[E]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            report.dispatched += 1;
            if let Err(err) = self.dispatch(event).await {
                report.failures.extend(err.failures().iter().cloned());
            }
        }
        report
    }
}
