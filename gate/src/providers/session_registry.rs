//! Session registry trait.

use crate::error::Result;
use crate::state::{AddSessionOutcome, ReplaceOutcome, SessionHandle, UserId};

/// Bounded, ordered set of active session handles per user.
///
/// Each mutation is a single atomic read-modify-write on the user's set.
/// Two concurrent inserts both land; their relative order is unspecified.
///
/// # Implementation Notes
///
/// - The set never holds more than `max_sessions` handles. Inserting into a
///   full set evicts the oldest handle in the same atomic step.
/// - Every insert refreshes the set's 7-day lifetime.
/// - An empty set is deleted, not stored.
pub trait SessionRegistry: Send + Sync {
    /// Append a handle, evicting the oldest when the set is full.
    ///
    /// Re-adding a handle already in the set moves it to the newest slot.
    ///
    /// # Returns
    ///
    /// `Stored` with the evicted handle, or `Degraded` if the atomic path
    /// failed. A degraded insert keeps only this handle under the fallback
    /// key; when even that write fails the handle is logged and dropped.
    ///
    /// # Errors
    ///
    /// Cache failures never surface here; only a broken implementation
    /// (such as a poisoned lock) returns an error.
    fn add_session(
        &self,
        user_id: &UserId,
        handle: &SessionHandle,
        max_sessions: usize,
    ) -> impl std::future::Future<Output = Result<AddSessionOutcome>> + Send;

    /// Swap `old` for `new` in place.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn replace_session(
        &self,
        user_id: &UserId,
        old: &SessionHandle,
        new: &SessionHandle,
    ) -> impl std::future::Future<Output = Result<ReplaceOutcome>> + Send;

    /// Remove a handle.
    ///
    /// # Returns
    ///
    /// `true` if the handle was present.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn remove_session(
        &self,
        user_id: &UserId,
        handle: &SessionHandle,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Handles in the set, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn list_sessions(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<SessionHandle>>> + Send;
}
