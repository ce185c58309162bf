//! Redis-based session registry.
//!
//! # Architecture
//!
//! - **Primary key**: `session:{<user_id>}` → JSON array of session handles,
//!   oldest first
//! - **Fallback key**: `session:{<user_id>}:token` → newest handle only,
//!   written when the script path fails
//! - **Slot**: the user id is the hash tag of both keys, so the two-key
//!   scripts run on a cluster
//! - **TTL**: 7 days on the array, refreshed on every insert and replace;
//!   1 day on the fallback
//!
//! # Security
//!
//! Each mutation runs as one Lua script, so the load, evict, append and
//! store happen without another request observing an intermediate list.
//! A get-then-set from the client would let two concurrent logins each read
//! a full list, evict, and overwrite each other, leaving more sessions alive
//! than the bound allows.

use crate::constants::{keys, limits};
use crate::error::{GateError, Result};
use crate::providers::SessionRegistry;
use crate::state::{AddSessionOutcome, ReplaceOutcome, SessionHandle, UserId};
use crate::stores::{connect, ttl_secs};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const ADD_SCRIPT: &str = r"
    local sessions = {}
    local raw = redis.call('GET', KEYS[1])
    if raw then
        local ok, decoded = pcall(cjson.decode, raw)
        if ok and type(decoded) == 'table' then
            sessions = decoded
        end
    end

    local handle = ARGV[1]
    local max = tonumber(ARGV[2])
    local kept = {}
    for _, h in ipairs(sessions) do
        if h ~= handle then
            table.insert(kept, h)
        end
    end

    -- Fold a handle kept during a degraded period back into the set.
    local fallback = redis.call('GET', KEYS[2])
    if fallback and fallback ~= handle then
        local seen = false
        for _, h in ipairs(kept) do
            if h == fallback then
                seen = true
            end
        end
        if not seen then
            table.insert(kept, fallback)
        end
    end

    local evicted = nil
    while #kept >= max do
        local removed = table.remove(kept, 1)
        if evicted == nil then
            evicted = removed
        end
    end
    table.insert(kept, handle)

    redis.call('SET', KEYS[1], cjson.encode(kept), 'EX', ARGV[3])
    redis.call('DEL', KEYS[2])
    if evicted then
        return evicted
    end
    return false
";

const REPLACE_SCRIPT: &str = r"
    local raw = redis.call('GET', KEYS[1])
    if not raw then
        return 0
    end
    local ok, sessions = pcall(cjson.decode, raw)
    if not ok or type(sessions) ~= 'table' then
        return 0
    end

    local found = false
    local kept = {}
    for _, h in ipairs(sessions) do
        if h == ARGV[1] and not found then
            found = true
            table.insert(kept, ARGV[2])
        elseif h ~= ARGV[2] then
            table.insert(kept, h)
        end
    end
    if not found then
        return 0
    end

    redis.call('SET', KEYS[1], cjson.encode(kept), 'EX', ARGV[3])
    return 1
";

const REMOVE_SCRIPT: &str = r"
    local removed = 0
    if redis.call('GET', KEYS[2]) == ARGV[1] then
        redis.call('DEL', KEYS[2])
        removed = 1
    end

    local raw = redis.call('GET', KEYS[1])
    if not raw then
        return removed
    end
    local ok, sessions = pcall(cjson.decode, raw)
    if not ok or type(sessions) ~= 'table' then
        return removed
    end

    local kept = {}
    for _, h in ipairs(sessions) do
        if h == ARGV[1] then
            removed = 1
        else
            table.insert(kept, h)
        end
    end

    if #kept == 0 then
        redis.call('DEL', KEYS[1])
    else
        redis.call('SET', KEYS[1], cjson.encode(kept), 'KEEPTTL')
    end
    return removed
";

/// `Redis`-backed bounded session sets.
///
/// # Example
///
/// ```no_run
/// use auth_gate::stores::RedisSessionRegistry;
/// use auth_gate::providers::SessionRegistry;
/// use auth_gate::{SessionHandle, UserId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = RedisSessionRegistry::new("redis://127.0.0.1:6379").await?;
/// let handle = SessionHandle::from_refresh_token("refresh-token");
/// registry.add_session(&UserId::new("user-1"), &handle, 3).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisSessionRegistry {
    conn_manager: ConnectionManager,
    add: redis::Script,
    replace: redis::Script,
    remove: redis::Script,
}

impl RedisSessionRegistry {
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
            add: redis::Script::new(ADD_SCRIPT),
            replace: redis::Script::new(REPLACE_SCRIPT),
            remove: redis::Script::new(REMOVE_SCRIPT),
        }
    }

    /// Keep only the newest handle under the fallback key.
    async fn store_fallback(&self, user_id: &UserId, handle: &SessionHandle) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(
                keys::session_fallback(user_id.as_str()),
                handle.as_str(),
                ttl_secs(limits::SESSION_FALLBACK_TTL),
            )
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to store fallback session: {e}")))?;
        Ok(())
    }
}

impl SessionRegistry for RedisSessionRegistry {
    async fn add_session(
        &self,
        user_id: &UserId,
        handle: &SessionHandle,
        max_sessions: usize,
    ) -> Result<AddSessionOutcome> {
        let mut conn = self.conn_manager.clone();

        let result: redis::RedisResult<Option<String>> = self
            .add
            .key(keys::sessions(user_id.as_str()))
            .key(keys::session_fallback(user_id.as_str()))
            .arg(handle.as_str())
            .arg(max_sessions.max(1))
            .arg(ttl_secs(limits::SESSION_TTL))
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(evicted) => {
                let evicted = evicted.map(SessionHandle);
                tracing::info!(
                    user_id = %user_id,
                    evicted = evicted.is_some(),
                    max_sessions,
                    "Session registered"
                );
                Ok(AddSessionOutcome::Stored { evicted })
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Session script failed, keeping newest session only"
                );
                if let Err(e) = self.store_fallback(user_id, handle).await {
                    tracing::error!(user_id = %user_id, error = %e, "Fallback session write failed, session untracked");
                }
                Ok(AddSessionOutcome::Degraded)
            }
        }
    }

    async fn replace_session(
        &self,
        user_id: &UserId,
        old: &SessionHandle,
        new: &SessionHandle,
    ) -> Result<ReplaceOutcome> {
        let mut conn = self.conn_manager.clone();
        let replaced: i64 = self
            .replace
            .key(keys::sessions(user_id.as_str()))
            .arg(old.as_str())
            .arg(new.as_str())
            .arg(ttl_secs(limits::SESSION_TTL))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to replace session: {e}")))?;

        Ok(if replaced == 1 {
            ReplaceOutcome::Replaced
        } else {
            tracing::debug!(user_id = %user_id, "Session to replace not found");
            ReplaceOutcome::NotFound
        })
    }

    async fn remove_session(&self, user_id: &UserId, handle: &SessionHandle) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let removed: i64 = self
            .remove
            .key(keys::sessions(user_id.as_str()))
            .key(keys::session_fallback(user_id.as_str()))
            .arg(handle.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to remove session: {e}")))?;

        tracing::info!(user_id = %user_id, removed = removed == 1, "Session removed");
        Ok(removed == 1)
    }

    async fn list_sessions(&self, user_id: &UserId) -> Result<Vec<SessionHandle>> {
        let mut conn = self.conn_manager.clone();
        let (raw, fallback): (Option<String>, Option<String>) = redis::pipe()
            .get(keys::sessions(user_id.as_str()))
            .get(keys::session_fallback(user_id.as_str()))
            .query_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to list sessions: {e}")))?;

        let mut handles: Vec<String> = match raw {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        if let Some(latest) = fallback.filter(|f| !handles.contains(f)) {
            handles.push(latest);
        }

        Ok(handles.into_iter().map(SessionHandle).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(n: u32) -> SessionHandle {
        SessionHandle::from_refresh_token(&format!("refresh-{n}"))
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_fourth_session_evicts_oldest() {
        let registry = RedisSessionRegistry::new("redis://127.0.0.1:6379").await.unwrap();
        let user = UserId::new(uuid::Uuid::new_v4().to_string());

        for n in 1..=3 {
            registry.add_session(&user, &handle(n), 3).await.unwrap();
        }
        let outcome = registry.add_session(&user, &handle(4), 3).await.unwrap();

        assert_eq!(outcome, AddSessionOutcome::Stored { evicted: Some(handle(1)) });
        assert_eq!(
            registry.list_sessions(&user).await.unwrap(),
            vec![handle(2), handle(3), handle(4)]
        );
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_concurrent_adds_respect_bound() {
        let registry = RedisSessionRegistry::new("redis://127.0.0.1:6379").await.unwrap();
        let user = UserId::new(uuid::Uuid::new_v4().to_string());

        let tasks: Vec<_> = (0..20)
            .map(|n| {
                let registry = registry.clone();
                let user = user.clone();
                tokio::spawn(async move { registry.add_session(&user, &handle(n), 3).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.list_sessions(&user).await.unwrap().len(), 3);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_removing_last_session_deletes_key() {
        let registry = RedisSessionRegistry::new("redis://127.0.0.1:6379").await.unwrap();
        let user = UserId::new(uuid::Uuid::new_v4().to_string());
        let mut conn = registry.conn_manager.clone();

        registry.add_session(&user, &handle(1), 3).await.unwrap();
        assert!(registry.remove_session(&user, &handle(1)).await.unwrap());

        let exists: bool = conn.exists(keys::sessions(user.as_str())).await.unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_replace_unknown_handle_is_not_found() {
        let registry = RedisSessionRegistry::new("redis://127.0.0.1:6379").await.unwrap();
        let user = UserId::new(uuid::Uuid::new_v4().to_string());

        registry.add_session(&user, &handle(1), 3).await.unwrap();
        let outcome = registry.replace_session(&user, &handle(9), &handle(2)).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::NotFound);

        let outcome = registry.replace_session(&user, &handle(1), &handle(2)).await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(registry.list_sessions(&user).await.unwrap(), vec![handle(2)]);
    }
}
