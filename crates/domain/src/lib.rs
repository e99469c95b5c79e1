//! Domain layer for the user notification backend.
//!
//! This crate provides the core domain abstractions including:
//! - `DomainEvent` capability and the `EventRecorder` embedded by aggregates
//! - `EventDispatcher` port used by the application layer to publish events
//! - `User` aggregate with its events and the `UserError` taxonomy
//! - `NotificationMessage`, the queued "send this templated email" intent
//! - Ports for password hashing, identifier generation, and user storage

pub mod error;
pub mod event;
pub mod notification;
pub mod ports;
pub mod user;

pub use error::{DomainError, ErrorCategory, UserError, ValidationError};
pub use event::{
    DispatchError, DispatchReport, DomainEvent, EventDispatcher, EventRecorder, RecordsEvents,
    SubscriberFailure,
};
pub use notification::NotificationMessage;
pub use ports::{IdGenerator, PasswordHasher, UserRepository, UserRepositoryExt};
pub use user::{Email, HashedPassword, User, UserEvent, UserStatus, Username};
