//! Startup-time routing table from message type to handler.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Envelope, HandlerError, Message};

/// Consumes messages of one type.
///
/// Under at-least-once delivery the same message can arrive more than
/// once, so implementations must not fail just because they have seen it
/// before.
#[async_trait]
pub trait MessageHandler<M: Message>: Send + Sync {
    /// Handles a single message.
    ///
    /// Returning [`HandlerError::Retryable`] hands the message back to the
    /// queue's retry policy.
    async fn handle(&self, message: M) -> Result<(), HandlerError>;
}

#[async_trait]
impl<M: Message, H: MessageHandler<M> + ?Sized> MessageHandler<M> for Arc<H> {
    async fn handle(&self, message: M) -> Result<(), HandlerError> {
        (**self).handle(message).await
    }
}

#[async_trait]
trait EnvelopeHandler: Send + Sync {
    async fn handle_envelope(&self, envelope: &Envelope) -> Result<(), HandlerError>;
}

struct Typed<M, H> {
    handler: H,
    _message: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M, H> EnvelopeHandler for Typed<M, H>
where
    M: Message,
    H: MessageHandler<M>,
{
    async fn handle_envelope(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let message: M = envelope.decode().map_err(|e| {
            HandlerError::Permanent(format!(
                "cannot decode {} payload: {e}",
                envelope.message_type
            ))
        })?;
        self.handler.handle(message).await
    }
}

/// Maps each message type to exactly one handler.
///
/// Built once at startup and shared (read-only) by all workers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn EnvelopeHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for messages of type `M`, replacing any
    /// previous one.
    pub fn register<M, H>(&mut self, handler: H) -> &mut Self
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        let previous = self.handlers.insert(
            M::message_type(),
            Arc::new(Typed {
                handler,
                _message: PhantomData,
            }),
        );
        if previous.is_some() {
            tracing::warn!(message_type = M::message_type(), "handler replaced");
        }
        self
    }

    /// Returns true if a handler is registered for the type.
    pub fn handles(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Lists the registered message types.
    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Routes an envelope to its handler.
    pub async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        match self.handlers.get(envelope.message_type.as_str()) {
            Some(handler) => handler.handle_envelope(envelope).await,
            None => Err(HandlerError::NoHandler(envelope.message_type.clone())),
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Greet {
        name: String,
    }

    impl Message for Greet {
        fn message_type() -> &'static str {
            "test.greet"
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageHandler<Greet> for CountingHandler {
        async fn handle(&self, message: Greet) -> Result<(), HandlerError> {
            assert_eq!(message.name, "Ana");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn greet_envelope(payload: serde_json::Value) -> Envelope {
        Envelope::builder()
            .message_type("test.greet")
            .payload_raw(payload)
            .build()
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let handler = Arc::new(CountingHandler::default());
        let mut registry = HandlerRegistry::new();
        registry.register::<Greet, _>(Arc::clone(&handler));

        registry
            .handle(&greet_envelope(serde_json::json!({"name": "Ana"})))
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(registry.handles("test.greet"));
        assert_eq!(registry.message_types(), vec!["test.greet"]);
    }

    #[tokio::test]
    async fn unknown_type_has_no_handler() {
        let registry = HandlerRegistry::new();
        let envelope = Envelope::builder()
            .message_type("test.unknown")
            .payload_raw(serde_json::json!({}))
            .build();

        let err = registry.handle(&envelope).await.unwrap_err();
        assert_eq!(err, HandlerError::NoHandler("test.unknown".into()));
    }

    #[tokio::test]
    async fn undecodable_payload_is_permanent() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Greet, _>(CountingHandler::default());

        let err = registry
            .handle(&greet_envelope(serde_json::json!({"nom": 3})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Permanent(_)));
    }
}
