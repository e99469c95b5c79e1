//! User aggregate and related types.

mod aggregate;
pub mod events;
mod state;
mod value_objects;

pub use aggregate::User;
pub use events::{
    ActivationEmailRequestedData, PasswordChangedData, PasswordResetRequestedData,
    UserActivatedData, UserEvent, UserLockedData, UserRegisteredData,
};
pub use state::UserStatus;
pub use value_objects::{
    Email, HashedPassword, PASSWORD_MIN_LEN, USERNAME_MAX_LEN, Username, validate_password,
};
