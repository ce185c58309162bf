//! Counter store trait.

use crate::error::Result;
use std::time::Duration;

/// Time-windowed counters and flags in the shared cache.
///
/// Every operation is individually atomic. Keys come from
/// [`crate::constants::keys`].
///
/// # Implementation Notes
///
/// - `increment` creates the key with `window` as its lifetime on the first
///   call and never extends that lifetime afterwards, so a window closes a
///   fixed time after its first hit.
/// - Callers treat any error as "store unavailable" and fail open.
pub trait CounterStore: Send + Sync {
    /// Increment a counter and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the cache cannot be reached.
    fn increment(
        &self,
        key: &str,
        window: Duration,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Current value of a counter, zero if absent.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the cache cannot be reached.
    fn count(&self, key: &str) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Set a flag that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the cache cannot be reached.
    fn set_flag(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Whether a flag is set.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the cache cannot be reached.
    fn has_flag(&self, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Delete a counter or flag.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the cache cannot be reached.
    fn clear(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}
