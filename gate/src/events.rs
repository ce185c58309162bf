//! Login domain events.
//!
//! Published fire-and-forget after the gate has decided; a failed publish
//! never changes the outcome of the request that produced it.

use crate::state::{AppRole, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain events emitted by the gate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GateEvent {
    /// A login completed and tokens were issued.
    LoginSucceeded {
        /// Authenticated user.
        user_id: UserId,
        /// Masked email.
        email: String,
        /// Application role.
        role: AppRole,
        /// Masked caller IP.
        ip: String,
        /// How the user logged in.
        method: String,
        /// When the login completed.
        timestamp: DateTime<Utc>,
    },

    /// Credentials were rejected.
    LoginFailed {
        /// Masked email.
        email: String,
        /// Masked caller IP.
        ip: String,
        /// Failure description.
        reason: String,
        /// When the attempt failed.
        timestamp: DateTime<Utc>,
    },

    /// An access token was refreshed.
    TokenRefreshed {
        /// Token owner, when the payload named one.
        user_id: Option<UserId>,
        /// When the refresh happened.
        timestamp: DateTime<Utc>,
    },
}

impl GateEvent {
    /// Topic the event belongs on.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::LoginSucceeded { .. } => "user-logged-in-events",
            Self::LoginFailed { .. } => "user-login-failed-events",
            Self::TokenRefreshed { .. } => "token-refreshed-events",
        }
    }
}
