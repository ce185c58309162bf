//! Second-factor handoff.
//!
//! A login that needs a second factor is parked: the gate stores a one-time
//! code under an unguessable challenge token, optionally parks the tokens it
//! already received next to it, and hands the caller only the challenge
//! token. Verifying the code releases the parked result exactly once.
//!
//! # Security
//!
//! - Tokens are UUID v4; codes are six digits from a CSPRNG
//! - Verification is one atomic step in the [`ChallengeStore`]
//! - A challenge gets a bounded number of fresh codes within its original
//!   lifetime
//! - Codes never appear in logs

use crate::constants::limits;
use crate::error::{GateError, RateLimitScope, Result};
use crate::providers::{ChallengeStore, CodeNotifier};
use crate::state::{
    ChallengeToken, ChallengeVerdict, PendingChallenge, PendingLoginHandoff, ResendVerdict, UserId,
};
use crate::utils::{require, within};
use rand::Rng;
use std::time::Duration;

/// Generate a zero-padded numeric one-time code.
#[must_use]
pub fn generate_code() -> String {
    let upper = 10_u32.pow(limits::CODE_DIGITS);
    let code = rand::thread_rng().gen_range(0..upper);
    format!("{code:0width$}", width = limits::CODE_DIGITS as usize)
}

/// Issues, verifies and resumes second-factor challenges.
#[derive(Clone)]
pub struct SecondFactorHandoff<H, N>
where
    H: ChallengeStore + Clone,
    N: CodeNotifier + Clone,
{
    challenges: H,
    notifier: N,
    timeout: Duration,
}

impl<H, N> SecondFactorHandoff<H, N>
where
    H: ChallengeStore + Clone,
    N: CodeNotifier + Clone,
{
    /// Create a handoff service; every store call is bounded by `timeout`.
    #[must_use]
    pub const fn new(challenges: H, notifier: N, timeout: Duration) -> Self {
        Self {
            challenges,
            notifier,
            timeout,
        }
    }

    /// Issue a challenge for `user_id`, parking `handoff` behind it.
    ///
    /// Parking and delivery failures are logged; the challenge still stands
    /// and resumption falls back to a freshly minted token.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the challenge itself cannot
    /// be stored.
    pub async fn issue(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        handoff: Option<&PendingLoginHandoff>,
        reasons: Vec<String>,
    ) -> Result<PendingChallenge> {
        let token = ChallengeToken::generate();
        let code = generate_code();

        within(
            self.timeout,
            self.challenges
                .create_challenge(token.as_str(), user_id, &code, limits::CHALLENGE_TTL),
        )
        .await?;

        if let Some(handoff) = handoff {
            if let Err(e) = within(
                self.timeout,
                self.challenges
                    .park_handoff(token.as_str(), handoff, limits::CHALLENGE_TTL),
            )
            .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to park login result");
            }
        }

        self.deliver(user_id, email, &code).await;
        tracing::info!(user_id = %user_id, "Second-factor challenge issued");

        Ok(PendingChallenge {
            challenge_token: token,
            reasons,
            expires_in: limits::CHALLENGE_TTL.as_secs(),
        })
    }

    /// Check a code.
    ///
    /// Anything but `Verified` means the code was not accepted; `Exhausted`
    /// hands back the login result that was parked behind the burned
    /// challenge so its tokens can be revoked.
    ///
    /// # Errors
    ///
    /// - `GateError::InvalidInput` - token or code missing
    /// - `GateError::StoreUnavailable` - the store did not answer
    pub async fn verify(&self, token: &str, code: &str) -> Result<ChallengeVerdict> {
        require("challenge token", token)?;
        require("code", code)?;

        let verdict = within(
            self.timeout,
            self.challenges
                .verify_challenge(token, code.trim(), limits::MAX_CHALLENGE_ATTEMPTS),
        )
        .await?;

        match &verdict {
            ChallengeVerdict::Verified { .. } | ChallengeVerdict::NotFound => {}
            ChallengeVerdict::Mismatch { attempts_left } => {
                tracing::warn!(attempts_left, "Second-factor code mismatch");
            }
            ChallengeVerdict::Exhausted { abandoned } => {
                tracing::warn!(
                    parked = abandoned.is_some(),
                    "Second-factor attempts exhausted, challenge deleted"
                );
            }
        }
        Ok(verdict)
    }

    /// Owner of a live challenge, without touching it.
    ///
    /// # Errors
    ///
    /// Returns `GateError::StoreUnavailable` if the store did not answer.
    pub async fn owner(&self, token: &str) -> Result<Option<UserId>> {
        within(self.timeout, self.challenges.challenge_user(token)).await
    }

    /// Take the login result parked behind a verified challenge.
    ///
    /// A store failure is treated as "nothing parked".
    pub async fn resume(&self, token: &str) -> Option<PendingLoginHandoff> {
        match within(self.timeout, self.challenges.take_handoff(token)).await {
            Ok(handoff) => handoff,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load parked login result");
                None
            }
        }
    }

    /// Replace the code of a live challenge and deliver it again.
    ///
    /// Attempts start over; the challenge keeps its original expiry.
    /// Returns the seconds left before it expires.
    ///
    /// # Errors
    ///
    /// - `GateError::ChallengeInvalid` - no such live challenge
    /// - `GateError::RateLimitExceeded` - the challenge had all its resends
    /// - `GateError::StoreUnavailable` - the store did not answer
    pub async fn resend(&self, token: &str, user_id: &UserId, email: Option<&str>) -> Result<u64> {
        let code = generate_code();
        let verdict = within(
            self.timeout,
            self.challenges
                .reset_challenge(token, &code, limits::MAX_CHALLENGE_RESENDS),
        )
        .await?;

        let expires_in = match verdict {
            ResendVerdict::Reset { expires_in } => expires_in,
            ResendVerdict::LimitReached { expires_in } => {
                tracing::warn!(user_id = %user_id, "Second-factor resend limit reached");
                return Err(GateError::RateLimitExceeded {
                    scope: RateLimitScope::Challenge,
                    retry_after: Duration::from_secs(expires_in),
                });
            }
            ResendVerdict::NotFound => return Err(GateError::ChallengeInvalid),
        };

        self.deliver(user_id, email, &code).await;
        tracing::info!(user_id = %user_id, "Second-factor code resent");
        Ok(expires_in)
    }

    async fn deliver(&self, user_id: &UserId, email: Option<&str>, code: &str) {
        if let Err(e) = within(self.timeout, self.notifier.send_code(user_id, email, code)).await {
            tracing::error!(user_id = %user_id, error = %e, "Second-factor code delivery failed");
        }
    }
}
