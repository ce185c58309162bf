//! Mock counter store for testing.

use crate::clock::Clock;
use crate::error::Result;
use crate::mocks::{Availability, FixedClock, lock};
use crate::providers::CounterStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    count: u64,
    expires_at: DateTime<Utc>,
}

/// In-memory counter store.
///
/// Windows are anchored at the first increment, exactly like the Redis
/// script: later increments never extend them.
#[derive(Debug, Clone, Default)]
pub struct MockCounterStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: FixedClock,
    available: Availability,
}

impl MockCounterStore {
    /// Create an empty store on its own clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: FixedClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    /// Simulate an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Live keys, for assertions.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        lock(&self.entries)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, e)| e.expires_at > now)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500))
    }
}

impl CounterStore for MockCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        self.available.check("counter store")?;
        let now = self.clock.now();
        let expires_at = self.expiry(window);
        let mut entries = lock(&self.entries)?;

        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    *e = Entry { count: 0, expires_at };
                }
            })
            .or_insert(Entry { count: 0, expires_at });
        entry.count += 1;
        Ok(entry.count)
    }

    async fn count(&self, key: &str) -> Result<u64> {
        self.available.check("counter store")?;
        let now = self.clock.now();
        Ok(lock(&self.entries)?
            .get(key)
            .filter(|e| e.expires_at > now)
            .map_or(0, |e| e.count))
    }

    async fn set_flag(&self, key: &str, ttl: Duration) -> Result<()> {
        self.available.check("counter store")?;
        let expires_at = self.expiry(ttl);
        lock(&self.entries)?.insert(key.to_string(), Entry { count: 1, expires_at });
        Ok(())
    }

    async fn has_flag(&self, key: &str) -> Result<bool> {
        Ok(self.count(key).await? > 0)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.available.check("counter store")?;
        lock(&self.entries)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_expires_from_first_hit() {
        let clock = FixedClock::default();
        let store = MockCounterStore::with_clock(clock.clone());
        let window = Duration::from_secs(60);

        assert_eq!(store.increment("k", window).await.unwrap(), 1);
        clock.advance(chrono::Duration::seconds(50));
        assert_eq!(store.increment("k", window).await.unwrap(), 2);

        clock.advance(chrono::Duration::seconds(11));
        assert_eq!(store.count("k").await.unwrap(), 0);
        assert_eq!(store.increment("k", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outage_errors() {
        let store = MockCounterStore::new();
        store.set_available(false);
        assert!(store.increment("k", Duration::from_secs(1)).await.is_err());
        assert!(store.has_flag("k").await.is_err());
    }
}
