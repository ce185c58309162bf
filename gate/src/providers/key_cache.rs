//! Lazily refreshed value cache.
//!
//! Holds one value fetched from a remote source (a signing-key set, a
//! service-account token) and refreshes it once it is older than the TTL.
//! Concurrent callers that find the value stale queue on a single refresh
//! guard; the first one fetches and the rest reuse its result.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Get-or-refresh cache for a single value.
///
/// # Example
///
/// ```
/// use auth_gate::providers::KeyCache;
/// use std::time::Duration;
///
/// # async fn example() -> auth_gate::Result<()> {
/// let cache: KeyCache<String> = KeyCache::new(Duration::from_secs(60));
/// let value = cache.get_or_refresh(|| async { Ok("fresh".to_string()) }).await?;
/// assert_eq!(value, "fresh");
/// # Ok(())
/// # }
/// ```
pub struct KeyCache<T> {
    ttl: Duration,
    entry: RwLock<Option<Cached<T>>>,
    refresh_guard: Mutex<()>,
}

impl<T: Clone + Send + Sync> KeyCache<T> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
            refresh_guard: Mutex::new(()),
        }
    }

    async fn fresh(&self) -> Option<T> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.value.clone())
    }

    /// Return the cached value, fetching a new one if it is missing or stale.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. A failed fetch leaves the previous value in
    /// place but does not serve it.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.fresh().await {
            return Ok(value);
        }

        let _guard = self.refresh_guard.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(value) = self.fresh().await {
            return Ok(value);
        }

        let value = fetch().await?;
        *self.entry.write().await = Some(Cached {
            value: value.clone(),
            fetched_at: Instant::now(),
        });

        tracing::debug!(ttl_secs = self.ttl.as_secs(), "Cache refreshed");

        Ok(value)
    }

    /// Drop the cached value so the next read fetches.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

impl<T> std::fmt::Debug for KeyCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_value_is_reused_within_ttl() {
        let cache = KeyCache::new(Duration::from_secs(3600));
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_refresh(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(42_u32)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let cache = KeyCache::new(Duration::ZERO);
        let fetches = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_refresh(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_refresh() {
        let cache = Arc::new(KeyCache::new(Duration::from_secs(3600)));
        let fetches = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let fetches = Arc::clone(&fetches);
                tokio::spawn(async move {
                    cache
                        .get_or_refresh(|| async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok("keys".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "keys");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache: KeyCache<u8> = KeyCache::new(Duration::from_secs(3600));
        let err = cache
            .get_or_refresh(|| async {
                Err(crate::error::GateError::StoreUnavailable("down".into()))
            })
            .await;
        assert!(err.is_err());

        let value = cache.get_or_refresh(|| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
