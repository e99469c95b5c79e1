//! The contract every queued payload satisfies.

use serde::{Serialize, de::DeserializeOwned};

/// A unit of asynchronous work.
///
/// Messages are serialized to JSON when published and decoded again by the
/// handler registered for [`Message::message_type`].
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable routing key, e.g. `"notification.email"`.
    fn message_type() -> &'static str;
}
