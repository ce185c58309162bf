//! Mock second-factor challenge store for testing.

use crate::clock::Clock;
use crate::error::Result;
use crate::mocks::{Availability, FixedClock, lock};
use crate::providers::ChallengeStore;
use crate::state::{ChallengeVerdict, PendingLoginHandoff, ResendVerdict, UserId};
use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Challenge {
    user_id: UserId,
    code: String,
    attempts: u32,
    resends: u32,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Records {
    challenges: HashMap<String, Challenge>,
    handoffs: HashMap<String, (PendingLoginHandoff, DateTime<Utc>)>,
}

impl Records {
    /// Drop a challenge together with its parked login.
    fn burn(&mut self, token: &str, now: DateTime<Utc>) -> ChallengeVerdict {
        self.challenges.remove(token);
        let abandoned = self
            .handoffs
            .remove(token)
            .filter(|(_, exp)| *exp > now)
            .map(|(handoff, _)| handoff);
        ChallengeVerdict::Exhausted { abandoned }
    }
}

/// In-memory challenges and parked logins.
///
/// Expired records are treated as absent; time comes from the shared clock.
#[derive(Debug, Clone, Default)]
pub struct MockChallengeStore {
    records: Arc<Mutex<Records>>,
    clock: FixedClock,
    available: Availability,
}

impl MockChallengeStore {
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

    /// Current code of a live challenge, for tests that play the user.
    #[must_use]
    pub fn code_for(&self, token: &str) -> Option<String> {
        let now = self.clock.now();
        lock(&self.records).ok().and_then(|r| {
            r.challenges
                .get(token)
                .filter(|c| c.expires_at > now)
                .map(|c| c.code.clone())
        })
    }

    /// Whether a parked login exists for `token`.
    #[must_use]
    pub fn has_handoff(&self, token: &str) -> bool {
        let now = self.clock.now();
        lock(&self.records).is_ok_and(|r| r.handoffs.get(token).is_some_and(|(_, exp)| *exp > now))
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1))
    }
}

impl ChallengeStore for MockChallengeStore {
    async fn create_challenge(&self, token: &str, user_id: &UserId, code: &str, ttl: Duration) -> Result<()> {
        self.available.check("challenge store")?;
        let challenge = Challenge {
            user_id: user_id.clone(),
            code: code.to_string(),
            attempts: 0,
            resends: 0,
            expires_at: self.expiry(ttl),
        };
        lock(&self.records)?.challenges.insert(token.to_string(), challenge);
        Ok(())
    }

    async fn verify_challenge(&self, token: &str, code: &str, max_attempts: u32) -> Result<ChallengeVerdict> {
        self.available.check("challenge store")?;
        let now = self.clock.now();
        let mut records = lock(&self.records)?;

        let Some(challenge) = records.challenges.get_mut(token).filter(|c| c.expires_at > now) else {
            records.challenges.remove(token);
            return Ok(ChallengeVerdict::NotFound);
        };

        if challenge.attempts >= max_attempts {
            return Ok(records.burn(token, now));
        }

        if constant_time_eq(challenge.code.as_bytes(), code.as_bytes()) {
            let user_id = challenge.user_id.clone();
            records.challenges.remove(token);
            return Ok(ChallengeVerdict::Verified { user_id });
        }

        challenge.attempts += 1;
        if challenge.attempts >= max_attempts {
            return Ok(records.burn(token, now));
        }
        Ok(ChallengeVerdict::Mismatch {
            attempts_left: max_attempts - challenge.attempts,
        })
    }

    async fn challenge_user(&self, token: &str) -> Result<Option<UserId>> {
        self.available.check("challenge store")?;
        let now = self.clock.now();
        Ok(lock(&self.records)?
            .challenges
            .get(token)
            .filter(|c| c.expires_at > now)
            .map(|c| c.user_id.clone()))
    }

    async fn reset_challenge(&self, token: &str, code: &str, max_resends: u32) -> Result<ResendVerdict> {
        self.available.check("challenge store")?;
        let now = self.clock.now();
        let mut records = lock(&self.records)?;

        let Some(challenge) = records.challenges.get_mut(token).filter(|c| c.expires_at > now) else {
            return Ok(ResendVerdict::NotFound);
        };
        let expires_in = u64::try_from((challenge.expires_at - now).num_seconds()).unwrap_or(0);

        if challenge.resends >= max_resends {
            return Ok(ResendVerdict::LimitReached { expires_in });
        }
        challenge.code = code.to_string();
        challenge.attempts = 0;
        challenge.resends += 1;
        Ok(ResendVerdict::Reset { expires_in })
    }

    async fn park_handoff(&self, token: &str, handoff: &PendingLoginHandoff, ttl: Duration) -> Result<()> {
        self.available.check("challenge store")?;
        let expires_at = self.expiry(ttl);
        lock(&self.records)?
            .handoffs
            .insert(token.to_string(), (handoff.clone(), expires_at));
        Ok(())
    }

    async fn take_handoff(&self, token: &str) -> Result<Option<PendingLoginHandoff>> {
        self.available.check("challenge store")?;
        let now = self.clock.now();
        Ok(lock(&self.records)?
            .handoffs
            .remove(token)
            .filter(|(_, exp)| *exp > now)
            .map(|(handoff, _)| handoff))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_challenge_is_not_found() {
        let clock = FixedClock::default();
        let store = MockChallengeStore::with_clock(clock.clone());
        let user = UserId::new("u1");

        store
            .create_challenge("t", &user, "123456", Duration::from_secs(600))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(11));

        assert_eq!(
            store.verify_challenge("t", "123456", 3).await.unwrap(),
            ChallengeVerdict::NotFound
        );
    }

    #[tokio::test]
    async fn test_resend_keeps_expiry() {
        let clock = FixedClock::default();
        let store = MockChallengeStore::with_clock(clock.clone());
        let user = UserId::new("u1");

        store
            .create_challenge("t", &user, "123456", Duration::from_secs(600))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(4));

        assert_eq!(
            store.reset_challenge("t", "654321", 3).await.unwrap(),
            ResendVerdict::Reset { expires_in: 360 }
        );
        clock.advance(chrono::Duration::minutes(7));
        assert_eq!(store.code_for("t"), None);
    }
}
