//! Mock device tracker for testing.

use crate::error::Result;
use crate::mocks::{Availability, lock};
use crate::providers::DeviceTracker;
use crate::state::{DeviceRecord, UserId};
use crate::utils::{mask_ip, parse_device_type, sha256_hex};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// In-memory device trust records keyed by (user, fingerprint hash).
#[derive(Debug, Clone, Default)]
pub struct MockDeviceTracker {
    devices: Arc<Mutex<HashMap<(UserId, String), DeviceRecord>>>,
    available: Availability,
}

impl MockDeviceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    fn key(user_id: &UserId, fingerprint: &str) -> (UserId, String) {
        (user_id.clone(), sha256_hex(fingerprint))
    }
}

impl DeviceTracker for MockDeviceTracker {
    async fn register_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        ip: &IpAddr,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.available.check("device tracker")?;
        let key = Self::key(user_id, fingerprint);
        let mut devices = lock(&self.devices)?;
        if devices.contains_key(&key) {
            return Ok(false);
        }

        let record = DeviceRecord {
            user_id: user_id.clone(),
            fingerprint_hash: key.1.clone(),
            trusted: false,
            first_seen: now,
            trusted_at: None,
            ip: mask_ip(ip),
            user_agent: user_agent.to_string(),
            device_type: parse_device_type(user_agent).to_string(),
        };
        devices.insert(key, record);
        Ok(true)
    }

    async fn is_trusted(&self, user_id: &UserId, fingerprint: &str) -> Result<bool> {
        self.available.check("device tracker")?;
        Ok(lock(&self.devices)?
            .get(&Self::key(user_id, fingerprint))
            .is_some_and(|d| d.trusted))
    }

    async fn trust(&self, user_id: &UserId, fingerprint: &str, now: DateTime<Utc>) -> Result<bool> {
        self.available.check("device tracker")?;
        let mut devices = lock(&self.devices)?;
        Ok(match devices.get_mut(&Self::key(user_id, fingerprint)) {
            Some(device) => {
                device.trusted = true;
                device.trusted_at = Some(now);
                true
            }
            None => false,
        })
    }

    async fn get_device(&self, user_id: &UserId, fingerprint: &str) -> Result<Option<DeviceRecord>> {
        self.available.check("device tracker")?;
        Ok(lock(&self.devices)?.get(&Self::key(user_id, fingerprint)).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_first_sighting_records_device_class() {
        let tracker = MockDeviceTracker::new();
        let user = UserId::new("u1");
        let ip = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4));
        let now = Utc::now();

        tracker
            .register_device(&user, "fp", &ip, "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)", now)
            .await
            .unwrap();
        tracker
            .register_device(&user, "fp", &ip, "Mozilla/5.0 (Windows NT 10.0)", now)
            .await
            .unwrap();

        let record = tracker.get_device(&user, "fp").await.unwrap().unwrap();
        assert_eq!(record.device_type, "tablet");
        assert_eq!(record.ip, "198.51.***.***");
    }
}
