//! Error types for the login gate.

use thiserror::Error;

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Which rate window rejected an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Per-IP window.
    Ip,
    /// Per-email window.
    Email,
    /// Fresh codes of one second-factor challenge.
    Challenge,
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => f.write_str("ip"),
            Self::Email => f.write_str("email"),
            Self::Challenge => f.write_str("challenge"),
        }
    }
}

/// Error taxonomy for the login gate.
///
/// Admission rejections (`AccountLocked`, `CaptchaRequired`,
/// `RateLimitExceeded`, `GeoBlocked`) never reach the identity provider.
/// Infrastructure variants are mostly absorbed by the gate itself and only
/// surface from the stores and providers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    // ═══════════════════════════════════════════════════════════
    // Caller Errors
    // ═══════════════════════════════════════════════════════════

    /// A required field was missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ═══════════════════════════════════════════════════════════
    // Authentication Errors
    // ═══════════════════════════════════════════════════════════

    /// Bad credentials, unusable token, or identity provider failure.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Second-factor token is unknown, expired, consumed or exhausted.
    #[error("Invalid or expired second-factor challenge")]
    ChallengeInvalid,

    // ═══════════════════════════════════════════════════════════
    // Admission Control
    // ═══════════════════════════════════════════════════════════

    /// Too many failed attempts for this account.
    #[error("Too many failed attempts, please retry after {retry_after:?}")]
    AccountLocked {
        /// Lockout window length.
        retry_after: std::time::Duration,
    },

    /// A valid CAPTCHA solution is mandatory for this attempt.
    #[error("CAPTCHA verification required")]
    CaptchaRequired,

    /// A request window was exceeded.
    #[error("Too many requests for this {scope}, please retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Window that rejected the attempt.
        scope: RateLimitScope,
        /// Window length.
        retry_after: std::time::Duration,
    },

    /// The caller's country is on the deny-list.
    #[error("Login from your location is not allowed")]
    GeoBlocked,

    // ═══════════════════════════════════════════════════════════
    // Infrastructure Errors
    // ═══════════════════════════════════════════════════════════

    /// The shared cache could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The identity provider returned an unexpected response.
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The gate or a provider was configured incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GateError {
    /// Returns `true` for admission-control rejections.
    ///
    /// # Examples
    ///
    /// ```
    /// # use auth_gate::GateError;
    /// assert!(GateError::CaptchaRequired.is_admission_rejection());
    /// assert!(!GateError::ChallengeInvalid.is_admission_rejection());
    /// ```
    pub const fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            Self::AccountLocked { .. }
                | Self::CaptchaRequired
                | Self::RateLimitExceeded { .. }
                | Self::GeoBlocked
        )
    }

    /// Returns `true` if this error comes from a degraded dependency.
    ///
    /// # Examples
    ///
    /// ```
    /// # use auth_gate::GateError;
    /// assert!(GateError::StoreUnavailable("timeout".into()).is_infrastructure());
    /// assert!(!GateError::GeoBlocked.is_infrastructure());
    /// ```
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::IdentityProvider(_)
                | Self::Serialization(_)
                | Self::Configuration(_)
        )
    }
}

impl From<redis::RedisError> for GateError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
