//! Admission control.
//!
//! Runs before any credential reaches the identity provider:
//!
//! 1. **Rate limiting** - 60-second windows per IP and per identifier;
//!    overflowing the IP window also flags the IP as suspicious
//! 2. **Geo-block** - callers resolved to a denied country are refused
//! 3. **Lockout** - too many recent failures for the email
//! 4. **CAPTCHA escalation** - after a few failures, a verified CAPTCHA is
//!    mandatory for both the email and the calling IP
//!
//! Counter reads and writes fail open: a slow or unreachable store is
//! logged and the check passes. CAPTCHA verification itself fails closed,
//! because the caller can always retry with a fresh solution.

use crate::config::GateConfig;
use crate::constants::{UNKNOWN_COUNTRY, keys};
use crate::error::{GateError, RateLimitScope, Result};
use crate::providers::{CaptchaVerifier, CounterStore, GeoLocator};
use crate::utils::{mask_email, mask_ip, within};
use std::net::IpAddr;
use std::sync::Arc;

/// What admission learned about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Resolved country, if the lookup succeeded.
    pub country: Option<String>,
    /// Failed attempts on record for the email (password logins only).
    pub failed_attempts: u64,
}

/// Normalised counter identifier for an email.
#[must_use]
pub fn identifier_for(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Admission checks over the shared counters.
#[derive(Clone)]
pub struct AdmissionControl<C, G, V>
where
    C: CounterStore + Clone,
    G: GeoLocator + Clone,
    V: CaptchaVerifier + Clone,
{
    counters: C,
    geo: G,
    captcha: V,
    config: Arc<GateConfig>,
}

impl<C, G, V> AdmissionControl<C, G, V>
where
    C: CounterStore + Clone,
    G: GeoLocator + Clone,
    V: CaptchaVerifier + Clone,
{
    /// Create admission control.
    #[must_use]
    pub const fn new(counters: C, geo: G, captcha: V, config: Arc<GateConfig>) -> Self {
        Self {
            counters,
            geo,
            captcha,
            config,
        }
    }

    /// Admit a password login.
    ///
    /// # Errors
    ///
    /// - `GateError::InvalidInput` - email or password missing or malformed
    /// - `GateError::RateLimitExceeded` - IP or email window overflowed
    /// - `GateError::GeoBlocked` - caller country is denied
    /// - `GateError::AccountLocked` - too many recent failures
    /// - `GateError::CaptchaRequired` - escalation active and no valid CAPTCHA
    pub async fn admit_password(
        &self,
        email: &str,
        password: &str,
        captcha_token: Option<&str>,
        ip: &IpAddr,
    ) -> Result<Admission> {
        crate::utils::require("email", email)?;
        crate::utils::require("password", password)?;
        if !crate::utils::is_valid_email(email.trim()) {
            return Err(GateError::InvalidInput("Invalid email format".into()));
        }

        let identifier = identifier_for(email);
        self.check_rate_limits(&identifier, ip).await?;
        let country = self.check_geo(ip).await?;
        let failed_attempts = self.check_lockout(&identifier).await?;
        self.check_captcha(&identifier, ip, failed_attempts, captcha_token)
            .await?;

        Ok(Admission {
            country,
            failed_attempts,
        })
    }

    /// Admit a login that carries no password: rate limit and geo-block only.
    ///
    /// # Errors
    ///
    /// - `GateError::RateLimitExceeded` - IP or identifier window overflowed
    /// - `GateError::GeoBlocked` - caller country is denied
    pub async fn admit_identifier(&self, identifier: &str, ip: &IpAddr) -> Result<Admission> {
        self.check_rate_limits(identifier, ip).await?;
        let country = self.check_geo(ip).await?;
        Ok(Admission {
            country,
            failed_attempts: 0,
        })
    }

    /// Count this request against the IP and identifier windows.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RateLimitExceeded` when either window overflows.
    pub async fn check_rate_limits(&self, identifier: &str, ip: &IpAddr) -> Result<()> {
        let window = self.config.rate_window;

        if let Some(hits) = self
            .fail_open("ip rate limit", self.counters.increment(&keys::rate_limit_ip(&ip.to_string()), window))
            .await
        {
            if hits > self.config.ip_rate_limit {
                self.mark_suspicious(ip).await;
                tracing::warn!(ip = %mask_ip(ip), hits, "IP rate limit exceeded");
                return Err(GateError::RateLimitExceeded {
                    scope: RateLimitScope::Ip,
                    retry_after: window,
                });
            }
        }

        if let Some(hits) = self
            .fail_open("email rate limit", self.counters.increment(&keys::rate_limit_email(identifier), window))
            .await
        {
            if hits > self.config.email_rate_limit {
                tracing::warn!(email = %mask_email(identifier), hits, "Email rate limit exceeded");
                return Err(GateError::RateLimitExceeded {
                    scope: RateLimitScope::Email,
                    retry_after: window,
                });
            }
        }

        Ok(())
    }

    /// Resolve the caller country and refuse denied ones.
    ///
    /// A failed lookup, or one answering `UNKNOWN`, yields `None` and passes.
    ///
    /// # Errors
    ///
    /// Returns `GateError::GeoBlocked` for a denied country.
    pub async fn check_geo(&self, ip: &IpAddr) -> Result<Option<String>> {
        let country = self.resolve_country(ip).await;
        if let Some(code) = country.as_deref() {
            if self.config.is_blocked_country(code) {
                tracing::warn!(ip = %mask_ip(ip), country = code, "Login from blocked country");
                return Err(GateError::GeoBlocked);
            }
        }
        Ok(country)
    }

    /// Look up the caller country, swallowing failures.
    pub async fn resolve_country(&self, ip: &IpAddr) -> Option<String> {
        match within(self.config.store_timeout, self.geo.country_code(ip)).await {
            Ok(code) if code.eq_ignore_ascii_case(UNKNOWN_COUNTRY) || code.is_empty() => None,
            Ok(code) => Some(code.to_uppercase()),
            Err(e) => {
                tracing::warn!(ip = %mask_ip(ip), error = %e, "Country lookup failed, continuing without it");
                None
            }
        }
    }

    /// Refuse locked accounts; returns the current failure count.
    ///
    /// # Errors
    ///
    /// Returns `GateError::AccountLocked` once the failure count reaches the
    /// lockout threshold.
    pub async fn check_lockout(&self, identifier: &str) -> Result<u64> {
        let failures = self
            .fail_open("lockout check", self.counters.count(&keys::login_attempts(identifier)))
            .await
            .unwrap_or(0);

        if failures >= self.config.max_login_attempts {
            tracing::warn!(email = %mask_email(identifier), failures, "Account locked");
            return Err(GateError::AccountLocked {
                retry_after: self.config.lockout_window,
            });
        }
        Ok(failures)
    }

    /// Demand a verified CAPTCHA while escalation is active.
    ///
    /// # Errors
    ///
    /// Returns `GateError::CaptchaRequired` when escalation is active and the
    /// token is missing, rejected, or cannot be verified.
    pub async fn check_captcha(
        &self,
        identifier: &str,
        ip: &IpAddr,
        failed_attempts: u64,
        captcha_token: Option<&str>,
    ) -> Result<()> {
        if !self.config.captcha_enabled || !self.captcha_escalated(identifier, ip, failed_attempts).await {
            return Ok(());
        }

        let Some(token) = captcha_token.filter(|t| !t.trim().is_empty()) else {
            tracing::info!(email = %mask_email(identifier), "CAPTCHA required but not supplied");
            return Err(GateError::CaptchaRequired);
        };

        match within(self.config.store_timeout, self.captcha.verify(token, ip)).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(email = %mask_email(identifier), ip = %mask_ip(ip), "CAPTCHA rejected");
                Err(GateError::CaptchaRequired)
            }
            Err(e) => {
                tracing::error!(error = %e, "CAPTCHA verification failed");
                Err(GateError::CaptchaRequired)
            }
        }
    }

    async fn captcha_escalated(&self, identifier: &str, ip: &IpAddr, failed_attempts: u64) -> bool {
        if failed_attempts >= self.config.captcha_threshold {
            return true;
        }
        let email_flag = self
            .fail_open("captcha flag", self.counters.has_flag(&keys::captcha_required(identifier)))
            .await
            .unwrap_or(false);
        if email_flag {
            return true;
        }
        self.fail_open("captcha flag", self.counters.has_flag(&keys::captcha_required(&ip.to_string())))
            .await
            .unwrap_or(false)
    }

    /// Count a credential failure; returns the new count when the store
    /// answered.
    ///
    /// At the escalation threshold, CAPTCHA flags are set for both the email
    /// and the IP.
    pub async fn record_failure(&self, identifier: &str, ip: &IpAddr) -> Option<u64> {
        let failures = self
            .fail_open(
                "failed login record",
                self.counters.increment(&keys::login_attempts(identifier), self.config.lockout_window),
            )
            .await?;

        if failures >= self.config.captcha_threshold {
            let ttl = self.config.captcha_flag_ttl;
            self.fail_open("captcha flag", self.counters.set_flag(&keys::captcha_required(identifier), ttl))
                .await;
            self.fail_open(
                "captcha flag",
                self.counters.set_flag(&keys::captcha_required(&ip.to_string()), ttl),
            )
            .await;
        }

        tracing::warn!(
            email = %mask_email(identifier),
            ip = %mask_ip(ip),
            failures,
            "Failed login attempt"
        );
        Some(failures)
    }

    /// Forget failures and CAPTCHA escalation for the email.
    pub async fn record_success(&self, identifier: &str) {
        self.fail_open("clear login attempts", self.counters.clear(&keys::login_attempts(identifier)))
            .await;
        self.fail_open("clear captcha flag", self.counters.clear(&keys::captcha_required(identifier)))
            .await;
    }

    /// Whether the IP carries the suspicious flag.
    pub async fn is_suspicious_ip(&self, ip: &IpAddr) -> bool {
        self.fail_open("suspicious ip check", self.counters.has_flag(&keys::suspicious_ip(&ip.to_string())))
            .await
            .unwrap_or(false)
    }

    async fn mark_suspicious(&self, ip: &IpAddr) {
        let key = keys::suspicious_ip(&ip.to_string());
        if self
            .fail_open("mark suspicious ip", self.counters.set_flag(&key, self.config.suspicious_ip_ttl))
            .await
            .is_some()
        {
            tracing::warn!(ip = %mask_ip(ip), "IP marked as suspicious");
        }
    }

    /// Run a counter call under the store timeout; errors become `None`.
    async fn fail_open<T>(
        &self,
        what: &'static str,
        call: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Option<T> {
        match within(self.config.store_timeout, call).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(check = what, error = %e, "Counter store unavailable, failing open");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockCaptchaVerifier, MockCounterStore, MockGeoLocator};
    use std::net::Ipv4Addr;

    type Control = AdmissionControl<MockCounterStore, MockGeoLocator, MockCaptchaVerifier>;

    fn control(config: GateConfig) -> (Control, MockCounterStore, MockGeoLocator) {
        let counters = MockCounterStore::new();
        let geo = MockGeoLocator::default();
        let control = AdmissionControl::new(
            counters.clone(),
            geo.clone(),
            MockCaptchaVerifier::new(),
            Arc::new(config),
        );
        (control, counters, geo)
    }

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

    #[tokio::test]
    async fn test_ip_overflow_marks_suspicious() {
        let (control, _, _) = control(GateConfig::default().with_rate_limits(2, 100));

        control.check_rate_limits("a@example.com", &IP).await.unwrap();
        control.check_rate_limits("b@example.com", &IP).await.unwrap();
        let err = control.check_rate_limits("c@example.com", &IP).await.unwrap_err();

        assert!(matches!(
            err,
            GateError::RateLimitExceeded {
                scope: RateLimitScope::Ip,
                ..
            }
        ));
        assert!(control.is_suspicious_ip(&IP).await);
    }

    #[tokio::test]
    async fn test_email_window_is_separate_from_ip() {
        let (control, _, _) = control(GateConfig::default().with_rate_limits(100, 1));

        control.check_rate_limits("a@example.com", &IP).await.unwrap();
        let err = control.check_rate_limits("a@example.com", &IP).await.unwrap_err();

        assert!(matches!(
            err,
            GateError::RateLimitExceeded {
                scope: RateLimitScope::Email,
                ..
            }
        ));
        assert!(!control.is_suspicious_ip(&IP).await);
    }

    #[tokio::test]
    async fn test_blocked_country_rejected() {
        let (control, _, geo) = control(GateConfig::default().with_blocked_countries(["kp"]));
        geo.set_country(IP, "KP");

        assert_eq!(control.check_geo(&IP).await, Err(GateError::GeoBlocked));
    }

    #[tokio::test]
    async fn test_geo_outage_fails_open() {
        let (control, _, geo) = control(GateConfig::default().with_blocked_countries(["US"]));
        geo.set_available(false);

        assert_eq!(control.check_geo(&IP).await, Ok(None));
    }

    #[tokio::test]
    async fn test_unknown_country_is_no_country() {
        let (control, _, geo) = control(GateConfig::default());
        geo.set_country(IP, UNKNOWN_COUNTRY);

        assert_eq!(control.resolve_country(&IP).await, None);
    }

    #[tokio::test]
    async fn test_failures_escalate_then_lock() {
        let (control, _, _) = control(GateConfig::default());
        let id = identifier_for("User@Example.com");

        for _ in 0..3 {
            control.record_failure(&id, &IP).await;
        }
        assert_eq!(
            control.check_captcha(&id, &IP, 0, None).await,
            Err(GateError::CaptchaRequired)
        );
        assert!(control
            .check_captcha(&id, &IP, 0, Some(MockCaptchaVerifier::VALID_TOKEN))
            .await
            .is_ok());

        for _ in 0..2 {
            control.record_failure(&id, &IP).await;
        }
        assert!(matches!(
            control.check_lockout(&id).await,
            Err(GateError::AccountLocked { .. })
        ));

        control.record_success(&id).await;
        assert_eq!(control.check_lockout(&id).await, Ok(0));
    }

    #[tokio::test]
    async fn test_ip_flag_escalates_other_emails() {
        let (control, _, _) = control(GateConfig::default());
        for _ in 0..3 {
            control.record_failure("victim@example.com", &IP).await;
        }

        assert_eq!(
            control.check_captcha("other@example.com", &IP, 0, None).await,
            Err(GateError::CaptchaRequired)
        );
    }

    #[tokio::test]
    async fn test_store_outage_admits() {
        let (control, counters, _) = control(GateConfig::default());
        counters.set_available(false);

        let admission = control
            .admit_password("user@example.com", "pw", None, &IP)
            .await
            .unwrap();
        assert_eq!(admission.failed_attempts, 0);
        assert_eq!(control.record_failure("user@example.com", &IP).await, None);
    }

    #[tokio::test]
    async fn test_malformed_email_rejected() {
        let (control, _, _) = control(GateConfig::default());
        assert!(matches!(
            control.admit_password("nope", "pw", None, &IP).await,
            Err(GateError::InvalidInput(_))
        ));
    }
}
