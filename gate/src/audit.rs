//! Security audit entries.
//!
//! Every gate decision that matters to an investigator produces one
//! [`AuditEntry`]. Entries carry masked identifiers only; the raw email and
//! IP never leave the gate.

use crate::state::UserId;
use crate::utils::{mask_email, mask_ip};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Kind of security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// Login completed.
    LoginSuccess,
    /// Credentials rejected.
    LoginFailed,
    /// Identity provider failed or timed out.
    LoginError,
    /// Caller country is on the deny-list.
    LoginBlockedGeo,
    /// Account locked after repeated failures.
    LoginAccountLocked,
    /// CAPTCHA missing or rejected.
    LoginCaptchaFailed,
    /// A request window was exceeded.
    RateLimitExceeded,
    /// Login parked behind a second factor.
    Login2faRequired,
    /// Second factor passed.
    Login2faSuccess,
    /// Second factor rejected.
    Login2faFailed,
    /// Suspicious login completed because second factors are disabled.
    SecondFactorBypassed,
    /// Access token refreshed.
    TokenRefreshed,
    /// Refresh rejected.
    TokenRefreshFailed,
    /// Session ended.
    LogoutSuccess,
    /// Logout hit an error after the session was removed locally.
    LogoutError,
}

impl AuditEvent {
    /// Stable name used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::LoginError => "LOGIN_ERROR",
            Self::LoginBlockedGeo => "LOGIN_BLOCKED_GEO",
            Self::LoginAccountLocked => "LOGIN_ACCOUNT_LOCKED",
            Self::LoginCaptchaFailed => "LOGIN_CAPTCHA_FAILED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::Login2faRequired => "LOGIN_2FA_REQUIRED",
            Self::Login2faSuccess => "LOGIN_2FA_SUCCESS",
            Self::Login2faFailed => "LOGIN_2FA_FAILED",
            Self::SecondFactorBypassed => "SECOND_FACTOR_BYPASSED",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            Self::LogoutSuccess => "LOGOUT_SUCCESS",
            Self::LogoutError => "LOGOUT_ERROR",
        }
    }
}

/// One structured audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened.
    pub kind: AuditEvent,
    /// User involved, when known.
    pub user_id: Option<UserId>,
    /// Masked caller IP.
    pub ip: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Extra detail.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl AuditEntry {
    /// Create an entry with no subject.
    #[must_use]
    pub fn new(kind: AuditEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            user_id: None,
            ip: None,
            user_agent: None,
            timestamp,
            context: BTreeMap::new(),
        }
    }

    /// Attach the user.
    #[must_use]
    pub fn with_user(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    /// Attach the caller, masking the IP.
    #[must_use]
    pub fn with_caller(mut self, ip: &IpAddr, user_agent: &str) -> Self {
        self.ip = Some(mask_ip(ip));
        self.user_agent = Some(user_agent.to_string());
        self
    }

    /// Attach a masked email.
    #[must_use]
    pub fn with_email(self, email: &str) -> Self {
        self.with_context("email", mask_email(email))
    }

    /// Attach one context value.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_never_holds_raw_identifiers() {
        let ip: IpAddr = "198.51.100.23".parse().unwrap();
        let entry = AuditEntry::new(AuditEvent::LoginFailed, Utc::now())
            .with_caller(&ip, "curl/8")
            .with_email("carol@example.com");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("198.51.100.23"));
        assert!(!json.contains("carol@"));
        assert!(json.contains("LOGIN_FAILED"));
    }
}
