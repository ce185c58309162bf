//! Risk evaluator.
//!
//! Combines device trust, last-known location, the suspicious-IP flag and a
//! velocity check into one [`SecurityContext`]. Every signal is evaluated,
//! none short-circuits, and a failing lookup only removes that signal:
//! evaluation itself never fails.

use crate::config::GateConfig;
use crate::constants::keys;
use crate::geo::detect_impossible_travel;
use crate::providers::{CounterStore, DeviceTracker, LocationTracker};
use crate::state::{RequestContext, SecurityContext, UserId};
use crate::utils::{mask_ip, within};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Reason recorded for an untrusted fingerprint.
pub const NEW_DEVICE: &str = "New device detected";
/// Reason recorded for a flagged IP.
pub const SUSPICIOUS_IP: &str = "Suspicious IP address";

/// Per-login anomaly detection.
#[derive(Clone)]
pub struct RiskEvaluator<C, D, L>
where
    C: CounterStore + Clone,
    D: DeviceTracker + Clone,
    L: LocationTracker + Clone,
{
    counters: C,
    devices: D,
    locations: L,
    config: Arc<GateConfig>,
}

impl<C, D, L> RiskEvaluator<C, D, L>
where
    C: CounterStore + Clone,
    D: DeviceTracker + Clone,
    L: LocationTracker + Clone,
{
    /// Create an evaluator.
    #[must_use]
    pub const fn new(counters: C, devices: D, locations: L, config: Arc<GateConfig>) -> Self {
        Self {
            counters,
            devices,
            locations,
            config,
        }
    }

    /// Evaluate one login attempt.
    ///
    /// `country` is the caller country resolved during admission, if any.
    /// Steps, in order:
    ///
    /// 1. register the fingerprint (idempotent); untrusted → new device
    /// 2. last country differs → new location
    /// 3. suspicious-IP flag → suspicious IP
    /// 4. country change faster than a traveller could manage → impossible travel
    /// 5. store the current country as the last location
    pub async fn evaluate(
        &self,
        user_id: &UserId,
        ctx: &RequestContext,
        country: Option<&str>,
        now: DateTime<Utc>,
    ) -> SecurityContext {
        let mut security = SecurityContext::default();

        if let Some(fingerprint) = ctx.device_fingerprint.as_deref().filter(|f| !f.is_empty()) {
            security.device_trusted = self.device_trusted(user_id, fingerprint, ctx, now).await;
            if !security.device_trusted {
                security.flag(NEW_DEVICE);
            }
        }

        let previous = match country {
            Some(_) => match within(self.config.store_timeout, self.locations.last_location(user_id)).await {
                Ok(previous) => previous,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Location lookup failed, continuing without it");
                    None
                }
            },
            None => None,
        };

        if let (Some(current), Some(last)) = (country, previous.as_ref()) {
            if !last.country_code.eq_ignore_ascii_case(current) {
                security.flag(format!("New location detected: {current}"));
            }
        }

        let key = keys::suspicious_ip(&ctx.ip.to_string());
        match within(self.config.store_timeout, self.counters.has_flag(&key)).await {
            Ok(true) => security.flag(SUSPICIOUS_IP),
            Ok(false) => {}
            Err(e) => tracing::warn!(ip = %mask_ip(&ctx.ip), error = %e, "Suspicious IP check failed"),
        }

        if let (Some(current), Some(last)) = (country, previous.as_ref()) {
            if let Some(travel) = detect_impossible_travel(last, current, now) {
                tracing::warn!(
                    user_id = %user_id,
                    distance_km = travel.distance_km,
                    elapsed_minutes = travel.elapsed_minutes,
                    "Impossible travel detected"
                );
                security.flag(travel.reason());
            }
        }

        if let Some(current) = country {
            if let Err(e) = within(
                self.config.store_timeout,
                self.locations.record_location(user_id, current, now),
            )
            .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Location update failed");
            }
        }

        if security.suspicious {
            tracing::info!(user_id = %user_id, reasons = ?security.reasons, "Login flagged as suspicious");
        }
        security
    }

    async fn device_trusted(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> bool {
        let timeout = self.config.store_timeout;
        if let Err(e) = within(
            timeout,
            self.devices
                .register_device(user_id, fingerprint, &ctx.ip, &ctx.user_agent, now),
        )
        .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "Device registration failed");
        }

        match within(timeout, self.devices.is_trusted(user_id, fingerprint)).await {
            Ok(trusted) => trusted,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Device trust lookup failed");
                false
            }
        }
    }

    /// Promote a device after a login completed.
    pub async fn trust_device(&self, user_id: &UserId, fingerprint: &str, now: DateTime<Utc>) {
        match within(self.config.store_timeout, self.devices.trust(user_id, fingerprint, now)).await {
            Ok(true) => tracing::debug!(user_id = %user_id, "Device trusted"),
            Ok(false) => tracing::debug!(user_id = %user_id, "No device record to trust"),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Device trust update failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{FixedClock, MockCounterStore, MockDeviceTracker, MockLocationTracker};
    use crate::clock::Clock;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    type Evaluator = RiskEvaluator<MockCounterStore, MockDeviceTracker, MockLocationTracker>;

    fn evaluator() -> (Evaluator, MockCounterStore, MockDeviceTracker, MockLocationTracker) {
        let counters = MockCounterStore::new();
        let devices = MockDeviceTracker::new();
        let locations = MockLocationTracker::new();
        let evaluator = RiskEvaluator::new(
            counters.clone(),
            devices.clone(),
            locations.clone(),
            Arc::new(GateConfig::default()),
        );
        (evaluator, counters, devices, locations)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)), "Firefox").with_fingerprint("fp-1")
    }

    #[tokio::test]
    async fn test_new_device_then_trusted() {
        let (evaluator, _, _, _) = evaluator();
        let user = UserId::new("u1");
        let now = Utc::now();

        let first = evaluator.evaluate(&user, &ctx(), Some("US"), now).await;
        assert_eq!(first.reasons, vec![NEW_DEVICE.to_string()]);
        assert!(!first.device_trusted);

        evaluator.trust_device(&user, "fp-1", now).await;
        let second = evaluator.evaluate(&user, &ctx(), Some("US"), now).await;
        assert!(!second.suspicious);
        assert!(second.device_trusted);
    }

    #[tokio::test]
    async fn test_us_then_japan_is_impossible_travel() {
        let (evaluator, _, _, _) = evaluator();
        let clock = FixedClock::default();
        let user = UserId::new("u1");
        let plain = RequestContext::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)), "Firefox");

        evaluator.evaluate(&user, &plain, Some("US"), clock.now()).await;
        clock.advance(chrono::Duration::minutes(10));
        let security = evaluator.evaluate(&user, &plain, Some("JP"), clock.now()).await;

        assert_eq!(security.reasons.len(), 2);
        assert_eq!(security.reasons[0], "New location detected: JP");
        assert!(security.reasons[1].starts_with("Impossible travel detected: "));
        assert!(security.reasons[1].ends_with(" km in 10 minutes"));
    }

    #[tokio::test]
    async fn test_suspicious_ip_flag() {
        let (evaluator, counters, _, _) = evaluator();
        let plain = RequestContext::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)), "Firefox");
        counters
            .set_flag(&keys::suspicious_ip("198.51.100.4"), Duration::from_secs(60))
            .await
            .unwrap();

        let security = evaluator.evaluate(&UserId::new("u1"), &plain, None, Utc::now()).await;
        assert_eq!(security.reasons, vec![SUSPICIOUS_IP.to_string()]);
    }

    #[tokio::test]
    async fn test_outages_never_flag() {
        let (evaluator, counters, devices, locations) = evaluator();
        counters.set_available(false);
        locations.set_available(false);
        devices.set_available(false);

        let plain = RequestContext::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)), "Firefox");
        let security = evaluator.evaluate(&UserId::new("u1"), &plain, Some("US"), Utc::now()).await;
        assert!(!security.suspicious);
    }

    #[tokio::test]
    async fn test_location_recorded_last() {
        let (evaluator, _, _, locations) = evaluator();
        let user = UserId::new("u1");
        let plain = RequestContext::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)), "Firefox");

        evaluator.evaluate(&user, &plain, Some("DE"), Utc::now()).await;
        let stored = locations.last_location(&user).await.unwrap().unwrap();
        assert_eq!(stored.country_code, "DE");
    }
}
