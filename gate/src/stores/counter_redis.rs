//! Redis-based counter store.
//!
//! # Algorithm
//!
//! Fixed windows anchored at the first hit:
//! 1. `INCR` the key
//! 2. If the result is 1 (or the key somehow has no expiry), set the window
//!    as its lifetime
//!
//! Later increments never touch the lifetime, so a burst cannot keep a
//! window open forever.

use crate::error::{GateError, Result};
use crate::providers::CounterStore;
use crate::stores::{connect, ttl_secs};
use crate::utils::key_prefix;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

const INCREMENT_SCRIPT: &str = r"
    local count = redis.call('INCR', KEYS[1])
    if count == 1 or redis.call('PTTL', KEYS[1]) < 0 then
        redis.call('PEXPIRE', KEYS[1], ARGV[1])
    end
    return count
";

/// `Redis`-backed counters and flags.
///
/// # Example
///
/// ```no_run
/// use auth_gate::stores::RedisCounterStore;
/// use auth_gate::providers::CounterStore;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let counters = RedisCounterStore::new("redis://127.0.0.1:6379").await?;
/// let hits = counters.increment("rate_limit:ip:203.0.113.7", Duration::from_secs(60)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisCounterStore {
    conn_manager: ConnectionManager,
    increment: redis::Script,
}

impl RedisCounterStore {
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
    pub fn from_connection(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            increment: redis::Script::new(INCREMENT_SCRIPT),
        }
    }
}

impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_possible_truncation)] // Windows are minutes to days
        let window_ms = window.as_millis().max(1) as u64;

        let count: u64 = self
            .increment
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to increment counter: {e}")))?;

        tracing::debug!(counter = key_prefix(key), count, "Counter incremented");
        Ok(count)
    }

    async fn count(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let count: Option<u64> = conn
            .get(key)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to read counter: {e}")))?;
        Ok(count.unwrap_or(0))
    }

    async fn set_flag(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, "1", ttl_secs(ttl))
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to set flag: {e}")))?;
        Ok(())
    }

    async fn has_flag(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        conn.exists(key)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to read flag: {e}")))
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to clear key: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_increment_keeps_first_window() {
        let store = RedisCounterStore::new("redis://127.0.0.1:6379").await.unwrap();
        let key = format!("test:counter:{}", uuid::Uuid::new_v4());
        let mut conn = store.conn_manager.clone();

        assert_eq!(store.increment(&key, Duration::from_secs(60)).await.unwrap(), 1);
        let first_ttl: i64 = conn.ttl(&key).await.unwrap();

        assert_eq!(store.increment(&key, Duration::from_secs(3600)).await.unwrap(), 2);
        let second_ttl: i64 = conn.ttl(&key).await.unwrap();

        assert!(first_ttl <= 60);
        assert!(second_ttl <= first_ttl);

        store.clear(&key).await.unwrap();
        assert_eq!(store.count(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_flag_lifecycle() {
        let store = RedisCounterStore::new("redis://127.0.0.1:6379").await.unwrap();
        let key = format!("test:flag:{}", uuid::Uuid::new_v4());

        assert!(!store.has_flag(&key).await.unwrap());
        store.set_flag(&key, Duration::from_secs(30)).await.unwrap();
        assert!(store.has_flag(&key).await.unwrap());
        store.clear(&key).await.unwrap();
        assert!(!store.has_flag(&key).await.unwrap());
    }
}
