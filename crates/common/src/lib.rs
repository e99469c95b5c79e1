//! Shared kernel: typed identifiers and the clock port.

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{MessageId, UserId};
