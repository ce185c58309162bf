//! Second-factor challenge storage trait.
//!
//! # Security
//!
//! Verification must be a single atomic step: two concurrent verifications
//! of the same challenge can never both succeed, and attempts are counted
//! without a read-then-write window.

use crate::error::Result;
use crate::state::{ChallengeVerdict, PendingLoginHandoff, ResendVerdict, UserId};
use std::time::Duration;

/// Pending challenge and its parked login result.
pub trait ChallengeStore: Send + Sync {
    /// Store a new challenge with zero attempts.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn create_challenge(
        &self,
        token: &str,
        user_id: &UserId,
        code: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Check a code.
    ///
    /// In order: absent → `NotFound`; attempts already at `max_attempts` →
    /// delete, `Exhausted`; code matches → delete, `Verified`; otherwise
    /// count the attempt without touching the lifetime, deleting the
    /// challenge if that used up the budget.
    ///
    /// Exhaustion also takes the parked login result, so a burned challenge
    /// leaves nothing behind to resume.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn verify_challenge(
        &self,
        token: &str,
        code: &str,
        max_attempts: u32,
    ) -> impl std::future::Future<Output = Result<ChallengeVerdict>> + Send;

    /// User a live challenge belongs to.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn challenge_user(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserId>>> + Send;

    /// Replace the code of a live challenge and reset its attempts.
    ///
    /// The lifetime is left alone. A challenge that was already reset
    /// `max_resends` times keeps its current code and answers
    /// `LimitReached`.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn reset_challenge(
        &self,
        token: &str,
        code: &str,
        max_resends: u32,
    ) -> impl std::future::Future<Output = Result<ResendVerdict>> + Send;

    /// Park a login result behind a challenge token.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached or encoding fails.
    fn park_handoff(
        &self,
        token: &str,
        handoff: &PendingLoginHandoff,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load and delete a parked login result.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached or decoding fails.
    fn take_handoff(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Option<PendingLoginHandoff>>> + Send;
}
