//! User account status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a user account.
///
/// ```text
/// PendingActivation ──► Active
/// ```
///
/// Locking is tracked separately so a pending account can be locked too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Registered, email not yet confirmed.
    #[default]
    PendingActivation,
    /// Email confirmed.
    Active,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UserStatus::Active)
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::PendingActivation => write!(f, "pending_activation"),
            UserStatus::Active => write!(f, "active"),
        }
    }
}
