//! Asynchronous message transport.
//!
//! Producers publish [`Message`]s onto a [`MessageQueue`]; a pool of
//! [`Worker`]s leases them, routes each to the handler registered for its
//! type in the [`HandlerRegistry`], and acknowledges, retries (per
//! [`RetryPolicy`]) or dead-letters the result.
//!
//! Delivery is at-least-once: a lease that expires before the worker
//! settles the message makes it visible again, so handlers must tolerate
//! being invoked more than once for the same [`MessageId`].

pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod worker;

pub use common::MessageId;
pub use envelope::{DeadLetter, Envelope};
pub use error::{HandlerError, MessagingError, Result};
pub use memory::InMemoryMessageQueue;
pub use message::Message;
pub use postgres::PostgresMessageQueue;
pub use queue::{MessageQueue, MessageQueueExt};
pub use registry::{HandlerRegistry, MessageHandler};
pub use retry::RetryPolicy;
pub use worker::{ProcessOutcome, Worker, WorkerConfig, WorkerPool};
