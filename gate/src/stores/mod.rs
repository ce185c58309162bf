//! Redis implementations of the cache-backed providers.
//!
//! Every entity lives under its own key prefix (see
//! [`crate::constants::keys`]). Read-modify-write operations run as Lua
//! scripts so each call is a single atomic step on the server:
//!
//! - **Counter Store** - `INCR` with first-hit expiry, flags with `SET EX`
//! - **Device Tracker** - hashes, created and promoted by script
//! - **Location Tracker** - JSON records with a 30-day lifetime
//! - **Session Registry** - bounded JSON lists mutated by script
//! - **Challenge Store** - hashes verified by script, handoffs taken via `GETDEL`

pub mod challenge_redis;
pub mod counter_redis;
pub mod device_redis;
pub mod location_redis;
pub mod session_redis;

pub use challenge_redis::RedisChallengeStore;
pub use counter_redis::RedisCounterStore;
pub use device_redis::RedisDeviceTracker;
pub use location_redis::RedisLocationTracker;
pub use session_redis::RedisSessionRegistry;

use crate::error::{GateError, Result};
use redis::Client;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Open a pooled connection.
///
/// # Errors
///
/// Returns `GateError::StoreUnavailable` if the URL is invalid or the server
/// cannot be reached.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url).map_err(|e| {
        GateError::StoreUnavailable(format!("Failed to create Redis client: {e}"))
    })?;

    ConnectionManager::new(client).await.map_err(|e| {
        GateError::StoreUnavailable(format!("Failed to create Redis connection manager: {e}"))
    })
}

/// Whole seconds for `EXPIRE`, never zero.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
