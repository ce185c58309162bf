//! Gate constants.
//!
//! Cache key prefixes, default thresholds and record lifetimes shared by the
//! stores, the mocks and the orchestrator.

use std::time::Duration;

/// Cache key builders.
///
/// Every entity lives in the shared cache under its own prefix. Keys that a
/// single script touches together share a `{..}` hash tag so they land in
/// the same cluster slot.
pub mod keys {
    /// Failed-login counter for an email.
    #[must_use]
    pub fn login_attempts(email: &str) -> String {
        format!("login_attempts:{email}")
    }

    /// Per-IP request window.
    #[must_use]
    pub fn rate_limit_ip(ip: &str) -> String {
        format!("rate_limit:ip:{ip}")
    }

    /// Per-email request window.
    #[must_use]
    pub fn rate_limit_email(email: &str) -> String {
        format!("rate_limit:email:{email}")
    }

    /// CAPTCHA escalation flag for an email or IP.
    #[must_use]
    pub fn captcha_required(identifier: &str) -> String {
        format!("captcha_required:{identifier}")
    }

    /// Suspicious-IP flag.
    #[must_use]
    pub fn suspicious_ip(ip: &str) -> String {
        format!("suspicious_ip:{ip}")
    }

    /// Device trust record, keyed by the hashed fingerprint.
    #[must_use]
    pub fn device(user_id: &str, fingerprint_hash: &str) -> String {
        format!("device:{user_id}:{fingerprint_hash}")
    }

    /// Last known location of a user.
    #[must_use]
    pub fn location(user_id: &str) -> String {
        format!("location:{user_id}")
    }

    /// Bounded session set of a user.
    #[must_use]
    pub fn sessions(user_id: &str) -> String {
        format!("session:{{{user_id}}}")
    }

    /// Single-handle fallback written when the session script fails.
    #[must_use]
    pub fn session_fallback(user_id: &str) -> String {
        format!("session:{{{user_id}}}:token")
    }

    /// Second-factor challenge.
    #[must_use]
    pub fn challenge(token: &str) -> String {
        format!("2fa:{{{token}}}")
    }

    /// Login result parked behind a challenge.
    #[must_use]
    pub fn pending_login(token: &str) -> String {
        format!("pending_login:{{{token}}}")
    }
}

/// Default thresholds and windows.
pub mod limits {
    use super::Duration;

    /// Failed attempts that lock an account.
    pub const MAX_LOGIN_ATTEMPTS: u64 = 5;

    /// Failed attempts that make CAPTCHA mandatory.
    pub const CAPTCHA_THRESHOLD: u64 = 3;

    /// Lifetime of the failed-login counter, and the lockout length.
    pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

    /// Requests per IP per window.
    pub const IP_RATE_LIMIT: u64 = 10;

    /// Requests per email per window.
    pub const EMAIL_RATE_LIMIT: u64 = 15;

    /// Rate window length.
    pub const RATE_WINDOW: Duration = Duration::from_secs(60);

    /// Lifetime of a CAPTCHA flag.
    pub const CAPTCHA_FLAG_TTL: Duration = Duration::from_secs(60 * 60);

    /// Lifetime of a suspicious-IP flag.
    pub const SUSPICIOUS_IP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Lifetime of device and location records.
    pub const TRACKING_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    /// Default bound of a user's session set.
    pub const MAX_SESSIONS: usize = 3;

    /// Sliding lifetime of a session set.
    pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Lifetime of the degraded single-handle fallback.
    pub const SESSION_FALLBACK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Lifetime of a challenge and its handoff.
    pub const CHALLENGE_TTL: Duration = Duration::from_secs(10 * 60);

    /// Verification attempts per challenge.
    pub const MAX_CHALLENGE_ATTEMPTS: u32 = 3;

    /// Fresh codes a challenge may get after the first one.
    pub const MAX_CHALLENGE_RESENDS: u32 = 3;

    /// Digits in a one-time code.
    pub const CODE_DIGITS: u32 = 6;

    /// Timeout applied to every cache and provider call.
    pub const STORE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Recency window for the impossible-travel check.
    pub const TRAVEL_WINDOW_MINUTES: i64 = 30;

    /// Speed above which travel is impossible.
    pub const MAX_TRAVEL_SPEED_KMH: f64 = 500.0;

    /// Lifetime of minted access tokens.
    pub const MINTED_TOKEN_TTL_SECS: i64 = 60 * 60;

    /// Lifetime of cached federated signing keys.
    pub const SIGNING_KEY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Minimum reCAPTCHA score accepted.
    pub const CAPTCHA_MIN_SCORE: f64 = 0.5;
}

/// Identifiers used as the `email` of non-password logins for rate limiting.
pub mod login_methods {
    /// Password login.
    pub const PASSWORD: &str = "password";

    /// Federated ID-token login.
    pub const FEDERATED: &str = "federated_login";

    /// Authorization-code login.
    pub const AUTHORIZATION_CODE: &str = "authorization_code";

    /// Second-factor completion.
    pub const SECOND_FACTOR: &str = "second_factor";

    /// Request for a fresh second-factor code.
    pub const SECOND_FACTOR_RESEND: &str = "second_factor_resend";
}

/// Country code returned when a lookup has no answer.
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

/// Log target for audit entries.
pub const AUDIT_TARGET: &str = "security_audit";

/// Prefix of the warning attached to suspicious logins.
pub const SECURITY_WARNING_PREFIX: &str = "Unusual activity detected: ";
