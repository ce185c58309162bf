//! Gate configuration.
//!
//! Thresholds, windows and policies are supplied by the application. The
//! defaults match the production service.

use crate::constants::limits;
use std::collections::HashSet;
use std::time::Duration;

/// When a second factor is demanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecondFactorPolicy {
    /// Challenge only suspicious logins.
    #[default]
    RiskBased,
    /// Challenge every password login.
    Always,
    /// Never challenge.
    ///
    /// Suspicious logins that would have been challenged are completed and
    /// recorded as `SecondFactorBypassed` audit entries.
    Disabled,
}

/// Risk gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Failed attempts that lock an account. Default: 5
    pub max_login_attempts: u64,

    /// Failed attempts that make CAPTCHA mandatory. Default: 3
    pub captcha_threshold: u64,

    /// Failed-attempt counter lifetime. Default: 15 minutes
    pub lockout_window: Duration,

    /// Requests per IP per window. Default: 10
    pub ip_rate_limit: u64,

    /// Requests per email per window. Default: 15
    pub email_rate_limit: u64,

    /// Rate window length. Default: 60 seconds
    pub rate_window: Duration,

    /// CAPTCHA flag lifetime. Default: 1 hour
    pub captcha_flag_ttl: Duration,

    /// Suspicious-IP flag lifetime. Default: 24 hours
    pub suspicious_ip_ttl: Duration,

    /// Whether CAPTCHA escalation is enforced. Default: true
    pub captcha_enabled: bool,

    /// Upper-case ISO country codes refused before any credential check.
    pub blocked_countries: HashSet<String>,

    /// Session set bound per user. Default: 3
    pub max_sessions: usize,

    /// Second-factor policy. Default: risk based
    pub second_factor: SecondFactorPolicy,

    /// Timeout for each cache and provider call. Default: 3 seconds
    pub store_timeout: Duration,

    /// HMAC secret for access tokens minted after a challenge without a
    /// parked login result.
    pub token_signing_secret: Vec<u8>,

    /// Redirect URI used when an authorization-code login omits one.
    pub default_redirect_uri: String,
}

impl GateConfig {
    /// Create a configuration with default thresholds.
    ///
    /// # Arguments
    ///
    /// * `token_signing_secret` - HMAC key for minted access tokens
    #[must_use]
    pub fn new(token_signing_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            token_signing_secret: token_signing_secret.into(),
            ..Self::default()
        }
    }

    /// Set lockout threshold and counter lifetime.
    #[must_use]
    pub const fn with_lockout(mut self, max_attempts: u64, window: Duration) -> Self {
        self.max_login_attempts = max_attempts;
        self.lockout_window = window;
        self
    }

    /// Set the CAPTCHA escalation threshold.
    #[must_use]
    pub const fn with_captcha_threshold(mut self, threshold: u64) -> Self {
        self.captcha_threshold = threshold;
        self
    }

    /// Enable or disable CAPTCHA escalation.
    #[must_use]
    pub const fn with_captcha_enabled(mut self, enabled: bool) -> Self {
        self.captcha_enabled = enabled;
        self
    }

    /// Set per-IP and per-email caps.
    #[must_use]
    pub const fn with_rate_limits(mut self, per_ip: u64, per_email: u64) -> Self {
        self.ip_rate_limit = per_ip;
        self.email_rate_limit = per_email;
        self
    }

    /// Add countries to the deny-list.
    #[must_use]
    pub fn with_blocked_countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_countries
            .extend(countries.into_iter().map(|c| c.as_ref().to_ascii_uppercase()));
        self
    }

    /// Set the session bound.
    #[must_use]
    pub const fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Set the second-factor policy.
    #[must_use]
    pub const fn with_second_factor(mut self, policy: SecondFactorPolicy) -> Self {
        self.second_factor = policy;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the default redirect URI.
    #[must_use]
    pub fn with_default_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.default_redirect_uri = uri.into();
        self
    }

    /// Whether a country is on the deny-list.
    #[must_use]
    pub fn is_blocked_country(&self, country_code: &str) -> bool {
        self.blocked_countries
            .contains(&country_code.to_ascii_uppercase())
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: limits::MAX_LOGIN_ATTEMPTS,
            captcha_threshold: limits::CAPTCHA_THRESHOLD,
            lockout_window: limits::LOCKOUT_WINDOW,
            ip_rate_limit: limits::IP_RATE_LIMIT,
            email_rate_limit: limits::EMAIL_RATE_LIMIT,
            rate_window: limits::RATE_WINDOW,
            captcha_flag_ttl: limits::CAPTCHA_FLAG_TTL,
            suspicious_ip_ttl: limits::SUSPICIOUS_IP_TTL,
            captcha_enabled: true,
            blocked_countries: HashSet::new(),
            max_sessions: limits::MAX_SESSIONS,
            second_factor: SecondFactorPolicy::RiskBased,
            store_timeout: limits::STORE_TIMEOUT,
            token_signing_secret: Vec::new(),
            default_redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        }
    }
}

/// OpenID Connect identity provider configuration.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Realm base URL, e.g. `https://idp.example.com/realms/main`.
    pub issuer_url: String,

    /// Admin API base URL, e.g. `https://idp.example.com/admin/realms/main`.
    pub admin_url: String,

    /// Client identifier.
    pub client_id: String,

    /// Client secret.
    pub client_secret: String,

    /// Client scopes requested on password grants.
    ///
    /// Default: `openid email profile`
    pub scope: String,
}

impl OidcConfig {
    /// Create a configuration for a realm.
    #[must_use]
    pub fn new(
        issuer_url: impl Into<String>,
        admin_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            admin_url: admin_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: "openid email profile".to_string(),
        }
    }

    /// Set requested scopes.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer_url)
    }

    /// Logout endpoint.
    #[must_use]
    pub fn logout_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.issuer_url)
    }
}

/// reCAPTCHA verifier configuration.
#[derive(Debug, Clone)]
pub struct RecaptchaConfig {
    /// Server-side secret.
    pub secret: String,

    /// Verification endpoint.
    ///
    /// Default: `https://www.google.com/recaptcha/api/siteverify`
    pub verify_url: String,

    /// Minimum accepted score. Default: 0.5
    pub min_score: f64,
}

impl RecaptchaConfig {
    /// Create a configuration with the default endpoint and score.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            verify_url: "https://www.google.com/recaptcha/api/siteverify".to_string(),
            min_score: limits::CAPTCHA_MIN_SCORE,
        }
    }

    /// Set the minimum accepted score.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}
