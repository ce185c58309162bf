//! Redis-based location tracker.
//!
//! One JSON [`LocationRecord`] per user under `location:{user_id}`, kept for
//! 30 days after the last login.

use crate::constants::{keys, limits};
use crate::error::{GateError, Result};
use crate::providers::LocationTracker;
use crate::state::{LocationRecord, UserId};
use crate::stores::{connect, ttl_secs};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// `Redis`-backed last-location records.
#[derive(Clone)]
pub struct RedisLocationTracker {
    conn_manager: ConnectionManager,
}

impl RedisLocationTracker {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns error if connection to `Redis` fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        Ok(Self::from_connection(connect(redis_url).await?))
    }

    /// Share an existing connection.
    #[must_use]
    pub const fn from_connection(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

impl LocationTracker for RedisLocationTracker {
    async fn record_location(&self, user_id: &UserId, country_code: &str, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let record = LocationRecord {
            country_code: country_code.to_string(),
            observed_at: now,
        };
        let json = serde_json::to_string(&record)?;

        let _: () = conn
            .set_ex(keys::location(user_id.as_str()), json, ttl_secs(limits::TRACKING_TTL))
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to record location: {e}")))?;
        Ok(())
    }

    async fn last_location(&self, user_id: &UserId) -> Result<Option<LocationRecord>> {
        let mut conn = self.conn_manager.clone();
        let json: Option<String> = conn
            .get(keys::location(user_id.as_str()))
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to read location: {e}")))?;

        json.map(|j| serde_json::from_str(&j).map_err(GateError::from))
            .transpose()
    }
}
