//! Redis-based second-factor challenge store.
//!
//! # Architecture
//!
//! - **Challenge**: `2fa:{<token>}` (hash) → `user_id`, `code`, `attempts`,
//!   `resends`
//! - **Handoff**: `pending_login:{<token>}` → JSON [`PendingLoginHandoff`]
//! - **TTL**: 10 minutes on both; neither counting an attempt nor a resend
//!   extends it
//! - **Slot**: the token is the hash tag of both keys, so the scripts can
//!   touch them together on a cluster
//!
//! # Security
//!
//! - **Single-use**: a matching code deletes the challenge inside the same
//!   script that compared it
//! - **Bounded guessing**: the attempt that reaches the budget deletes the
//!   challenge and its handoff, so later codes find nothing
//! - **Bounded resends**: each challenge gets a fixed number of fresh codes
//! - **Handoff consumption**: `GETDEL`, so a parked login resumes once

use crate::constants::keys;
use crate::error::{GateError, Result};
use crate::providers::ChallengeStore;
use crate::state::{ChallengeVerdict, PendingLoginHandoff, ResendVerdict, UserId};
use crate::stores::{connect, ttl_secs};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

const VERIFY_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return {-1, ''}
    end

    local function burn()
        local parked = redis.call('GET', KEYS[2]) or ''
        redis.call('DEL', KEYS[1], KEYS[2])
        return {-2, parked}
    end

    local max = tonumber(ARGV[2])
    local attempts = tonumber(redis.call('HGET', KEYS[1], 'attempts') or '0')
    if attempts >= max then
        return burn()
    end

    if redis.call('HGET', KEYS[1], 'code') == ARGV[1] then
        local user = redis.call('HGET', KEYS[1], 'user_id') or ''
        redis.call('DEL', KEYS[1])
        return {1, user}
    end

    attempts = redis.call('HINCRBY', KEYS[1], 'attempts', 1)
    if attempts >= max then
        return burn()
    end
    return {0, tostring(max - attempts)}
";

const RESET_SCRIPT: &str = r"
    local ttl = redis.call('TTL', KEYS[1])
    if ttl == -2 then
        return {-1, 0}
    end

    local resends = tonumber(redis.call('HGET', KEYS[1], 'resends') or '0')
    if resends >= tonumber(ARGV[2]) then
        return {0, ttl}
    end

    redis.call('HSET', KEYS[1], 'code', ARGV[1], 'attempts', '0', 'resends', tostring(resends + 1))
    return {1, ttl}
";

/// `Redis`-backed challenges and parked login results.
#[derive(Clone)]
pub struct RedisChallengeStore {
    conn_manager: ConnectionManager,
    verify: redis::Script,
    reset: redis::Script,
}

impl RedisChallengeStore {
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
            verify: redis::Script::new(VERIFY_SCRIPT),
            reset: redis::Script::new(RESET_SCRIPT),
        }
    }
}

impl ChallengeStore for RedisChallengeStore {
    async fn create_challenge(&self, token: &str, user_id: &UserId, code: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let key = keys::challenge(token);

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &key,
                &[("user_id", user_id.as_str()), ("code", code), ("attempts", "0"), ("resends", "0")],
            )
            .ignore()
            .expire(&key, i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to store challenge: {e}")))?;

        tracing::info!(user_id = %user_id, ttl_seconds = ttl.as_secs(), "Stored second-factor challenge");
        Ok(())
    }

    async fn verify_challenge(&self, token: &str, code: &str, max_attempts: u32) -> Result<ChallengeVerdict> {
        let mut conn = self.conn_manager.clone();
        let (status, detail): (i64, String) = self
            .verify
            .key(keys::challenge(token))
            .key(keys::pending_login(token))
            .arg(code)
            .arg(max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to verify challenge: {e}")))?;

        Ok(match status {
            1 => ChallengeVerdict::Verified { user_id: UserId::new(detail) },
            0 => ChallengeVerdict::Mismatch {
                attempts_left: detail.parse().unwrap_or(0),
            },
            -2 => ChallengeVerdict::Exhausted {
                abandoned: decode_abandoned(&detail),
            },
            _ => ChallengeVerdict::NotFound,
        })
    }

    async fn challenge_user(&self, token: &str) -> Result<Option<UserId>> {
        let mut conn = self.conn_manager.clone();
        let user: Option<String> = conn
            .hget(keys::challenge(token), "user_id")
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to read challenge: {e}")))?;
        Ok(user.map(UserId))
    }

    async fn reset_challenge(&self, token: &str, code: &str, max_resends: u32) -> Result<ResendVerdict> {
        let mut conn = self.conn_manager.clone();
        let (status, ttl): (i64, i64) = self
            .reset
            .key(keys::challenge(token))
            .arg(code)
            .arg(max_resends)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to reset challenge: {e}")))?;

        let expires_in = u64::try_from(ttl).unwrap_or(0);
        Ok(match status {
            1 => ResendVerdict::Reset { expires_in },
            0 => ResendVerdict::LimitReached { expires_in },
            _ => ResendVerdict::NotFound,
        })
    }

    async fn park_handoff(&self, token: &str, handoff: &PendingLoginHandoff, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let json = serde_json::to_string(handoff)?;
        let _: () = conn
            .set_ex(keys::pending_login(token), json, ttl_secs(ttl))
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to park login: {e}")))?;
        Ok(())
    }

    async fn take_handoff(&self, token: &str) -> Result<Option<PendingLoginHandoff>> {
        let mut conn = self.conn_manager.clone();
        let json: Option<String> = conn
            .get_del(keys::pending_login(token))
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to take parked login: {e}")))?;

        json.map(|j| serde_json::from_str(&j).map_err(GateError::from))
            .transpose()
    }
}

/// Parked login taken by the exhaustion branch; an unreadable one is dropped.
fn decode_abandoned(json: &str) -> Option<PendingLoginHandoff> {
    if json.is_empty() {
        return None;
    }
    match serde_json::from_str(json) {
        Ok(handoff) => Some(handoff),
        Err(e) => {
            tracing::warn!(error = %e, "Discarded unreadable parked login");
            None
        }
    }
}
