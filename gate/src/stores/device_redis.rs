//! Redis-based device trust tracker.
//!
//! # Architecture
//!
//! - **Key**: `device:{user_id}:{sha256(fingerprint)}` (hash)
//! - **Fields**: `user_id`, `trusted` (`0`/`1`), `first_seen`, `trusted_at`,
//!   `ip` (masked), `user_agent`, `device_type`
//! - **TTL**: 30 days, restarted on registration and promotion
//!
//! Creation and promotion are scripts so a concurrent promote can never be
//! overwritten by a late registration.

use crate::constants::{keys, limits};
use crate::error::{GateError, Result};
use crate::providers::DeviceTracker;
use crate::state::{DeviceRecord, UserId};
use crate::stores::{connect, ttl_secs};
use crate::utils::{mask_ip, parse_device_type, sha256_hex};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::net::IpAddr;

const REGISTER_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
    redis.call('HSET', KEYS[1],
        'user_id', ARGV[1], 'trusted', '0', 'first_seen', ARGV[2],
        'ip', ARGV[3], 'user_agent', ARGV[4], 'device_type', ARGV[6])
    redis.call('EXPIRE', KEYS[1], ARGV[5])
    return 1
";

const TRUST_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'trusted', '1', 'trusted_at', ARGV[1])
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return 1
";

/// `Redis`-backed device trust records.
#[derive(Clone)]
pub struct RedisDeviceTracker {
    conn_manager: ConnectionManager,
    register: redis::Script,
    trust: redis::Script,
}

impl RedisDeviceTracker {
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
            register: redis::Script::new(REGISTER_SCRIPT),
            trust: redis::Script::new(TRUST_SCRIPT),
        }
    }

    fn device_key(user_id: &UserId, fingerprint: &str) -> String {
        keys::device(user_id.as_str(), &sha256_hex(fingerprint))
    }
}

fn parse_time(field: &str, value: Option<&String>) -> Result<Option<DateTime<Utc>>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| GateError::Serialization(format!("bad {field}: {e}")))
        })
        .transpose()
}

impl DeviceTracker for RedisDeviceTracker {
    async fn register_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        ip: &IpAddr,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let key = Self::device_key(user_id, fingerprint);

        let created: i64 = self
            .register
            .key(&key)
            .arg(user_id.as_str())
            .arg(now.to_rfc3339())
            .arg(mask_ip(ip))
            .arg(user_agent)
            .arg(ttl_secs(limits::TRACKING_TTL))
            .arg(parse_device_type(user_agent))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to register device: {e}")))?;

        if created == 1 {
            tracing::info!(user_id = %user_id, "New device registered");
        }
        Ok(created == 1)
    }

    async fn is_trusted(&self, user_id: &UserId, fingerprint: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let trusted: Option<String> = conn
            .hget(Self::device_key(user_id, fingerprint), "trusted")
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to read device: {e}")))?;
        Ok(trusted.as_deref() == Some("1"))
    }

    async fn trust(&self, user_id: &UserId, fingerprint: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let promoted: i64 = self
            .trust
            .key(Self::device_key(user_id, fingerprint))
            .arg(now.to_rfc3339())
            .arg(ttl_secs(limits::TRACKING_TTL))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to trust device: {e}")))?;

        tracing::debug!(user_id = %user_id, promoted = promoted == 1, "Device trust updated");
        Ok(promoted == 1)
    }

    async fn get_device(&self, user_id: &UserId, fingerprint: &str) -> Result<Option<DeviceRecord>> {
        let mut conn = self.conn_manager.clone();
        let fingerprint_hash = sha256_hex(fingerprint);
        let fields: HashMap<String, String> = conn
            .hgetall(keys::device(user_id.as_str(), &fingerprint_hash))
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("Failed to read device: {e}")))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let first_seen = parse_time("first_seen", fields.get("first_seen"))?
            .ok_or_else(|| GateError::Serialization("device record has no first_seen".into()))?;

        Ok(Some(DeviceRecord {
            user_id: user_id.clone(),
            fingerprint_hash,
            trusted: fields.get("trusted").map(String::as_str) == Some("1"),
            first_seen,
            trusted_at: parse_time("trusted_at", fields.get("trusted_at"))?,
            ip: fields.get("ip").cloned().unwrap_or_default(),
            user_agent: fields.get("user_agent").cloned().unwrap_or_default(),
            device_type: fields.get("device_type").cloned().unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_register_then_trust() {
        let tracker = RedisDeviceTracker::new("redis://127.0.0.1:6379").await.unwrap();
        let user = UserId::new(uuid::Uuid::new_v4().to_string());
        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
        let now = Utc::now();

        assert!(!tracker.trust(&user, "fp-1", now).await.unwrap());
        assert!(tracker.register_device(&user, "fp-1", &ip, "Firefox (Android; Mobile)", now).await.unwrap());
        assert!(!tracker.register_device(&user, "fp-1", &ip, "Firefox (Windows)", now).await.unwrap());
        assert!(!tracker.is_trusted(&user, "fp-1").await.unwrap());

        assert!(tracker.trust(&user, "fp-1", now).await.unwrap());
        assert!(tracker.is_trusted(&user, "fp-1").await.unwrap());

        let record = tracker.get_device(&user, "fp-1").await.unwrap().unwrap();
        assert!(record.trusted);
        assert_eq!(record.ip, "203.0.***.***");
        assert_eq!(record.device_type, "mobile");
    }
}
