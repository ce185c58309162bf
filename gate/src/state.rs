//! Gate domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Identity-provider subject of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Wrap a subject identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of one active session.
///
/// Derived from the refresh token so the raw token never reaches the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub String);

impl SessionHandle {
    /// Derive the handle of a refresh token.
    #[must_use]
    pub fn from_refresh_token(refresh_token: &str) -> Self {
        Self(crate::utils::sha256_hex(refresh_token))
    }

    /// Borrow the raw handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One-time challenge token handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeToken(pub String);

impl ChallengeToken {
    /// Generate an unguessable token.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════

/// Where a login attempt came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Caller IP address.
    pub ip: IpAddr,
    /// Caller user agent.
    pub user_agent: String,
    /// Client-supplied device fingerprint.
    pub device_fingerprint: Option<String>,
}

impl RequestContext {
    /// Create a context without a fingerprint.
    #[must_use]
    pub fn new(ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            ip,
            user_agent: user_agent.into(),
            device_fingerprint: None,
        }
    }

    /// Attach a device fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }
}

/// Password login request.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// CAPTCHA solution, when the client has one.
    pub captcha_token: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &crate::utils::mask_email(&self.email))
            .field("password", &"<redacted>")
            .field("captcha_token", &self.captcha_token.is_some())
            .finish()
    }
}

impl LoginRequest {
    /// Create a request without a CAPTCHA solution.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            captcha_token: None,
        }
    }

    /// Attach a CAPTCHA solution.
    #[must_use]
    pub fn with_captcha(mut self, token: impl Into<String>) -> Self {
        self.captcha_token = Some(token.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tokens and Users
// ═══════════════════════════════════════════════════════════════════════

/// Tokens issued by the identity provider or minted by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token.
    pub access_token: String,
    /// Refresh token; minted tokens have none.
    pub refresh_token: Option<String>,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
    /// Token type, normally `Bearer`.
    pub token_type: String,
}

/// Application role derived from identity-provider roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppRole {
    /// Field worker.
    Worker,
    /// Project manager.
    ProjectManager,
    /// Unit owner.
    UnitOwner,
    /// Administrator.
    Admin,
    /// Company administrator.
    CompanyAdmin,
    /// Read-only viewer.
    Viewer,
    /// Homeowner.
    Homeowner,
    /// Any other user.
    User,
}

impl AppRole {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "WORKER",
            Self::ProjectManager => "PROJECT_MANAGER",
            Self::UnitOwner => "UNIT_OWNER",
            Self::Admin => "ADMIN",
            Self::CompanyAdmin => "COMPANY_ADMIN",
            Self::Viewer => "VIEWER",
            Self::Homeowner => "HOMEOWNER",
            Self::User => "USER",
        }
    }
}

/// Identity-provider view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject identifier.
    pub user_id: UserId,
    /// Account email.
    pub email: String,
    /// Application role.
    pub role: AppRole,
}

/// Identity asserted by a verified federated ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    /// Subject at the federated issuer.
    pub subject: String,
    /// Asserted email.
    pub email: String,
    /// Whether the issuer verified the email.
    pub email_verified: bool,
    /// Display name, when present.
    pub name: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Risk
// ═══════════════════════════════════════════════════════════════════════

/// Risk verdict for one login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Whether any anomaly was found.
    pub suspicious: bool,
    /// Human-readable anomaly descriptions, in evaluation order.
    pub reasons: Vec<String>,
    /// Whether the presented device is trusted.
    pub device_trusted: bool,
}

impl SecurityContext {
    /// Record an anomaly.
    pub fn flag(&mut self, reason: impl Into<String>) {
        self.suspicious = true;
        self.reasons.push(reason.into());
    }

    /// Warning shown to the user when a suspicious login was not challenged.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        self.suspicious.then(|| {
            format!(
                "{}{}",
                crate::constants::SECURITY_WARNING_PREFIX,
                self.reasons.join(", ")
            )
        })
    }
}

/// Trust record for one (user, device) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Owner.
    pub user_id: UserId,
    /// SHA-256 of the fingerprint.
    pub fingerprint_hash: String,
    /// Whether a login from this device completed.
    pub trusted: bool,
    /// First time the device was seen.
    pub first_seen: DateTime<Utc>,
    /// When the device became trusted.
    pub trusted_at: Option<DateTime<Utc>>,
    /// Masked IP of the first sighting.
    pub ip: String,
    /// User agent of the first sighting.
    pub user_agent: String,
    /// Coarse device class derived from the user agent.
    #[serde(default)]
    pub device_type: String,
}

/// Last coarse location of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// ISO country code.
    pub country_code: String,
    /// When the user was seen there.
    pub observed_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Session Registry
// ═══════════════════════════════════════════════════════════════════════

/// Result of inserting a session handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddSessionOutcome {
    /// Stored in the bounded set.
    Stored {
        /// Oldest handle pushed out to make room.
        evicted: Option<SessionHandle>,
    },
    /// The atomic path failed; at most this handle was kept under the
    /// fallback key.
    Degraded,
}

/// Result of swapping one session handle for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The old handle was replaced in place.
    Replaced,
    /// The old handle was not in the set; nothing changed.
    NotFound,
}

// ═══════════════════════════════════════════════════════════════════════
// Second Factor
// ═══════════════════════════════════════════════════════════════════════

/// Result of checking a one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeVerdict {
    /// Code matched; the challenge is gone.
    Verified {
        /// User the challenge was issued for.
        user_id: UserId,
    },
    /// Code did not match.
    Mismatch {
        /// Verifications left before the challenge is deleted.
        attempts_left: u32,
    },
    /// Attempt budget used up; the challenge and its parked login are gone.
    Exhausted {
        /// Login result that was parked behind the burned challenge.
        abandoned: Option<PendingLoginHandoff>,
    },
    /// No such challenge.
    NotFound,
}

/// Result of asking for a fresh code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendVerdict {
    /// New code stored, attempts reset; the lifetime is unchanged.
    Reset {
        /// Seconds left before the challenge expires.
        expires_in: u64,
    },
    /// The challenge already had all the codes it may get.
    LimitReached {
        /// Seconds left before the challenge expires.
        expires_in: u64,
    },
    /// No such challenge.
    NotFound,
}

/// Login result parked behind a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLoginHandoff {
    /// User the login belongs to.
    pub user_id: UserId,
    /// Account email.
    pub email: String,
    /// Application role.
    pub role: AppRole,
    /// Tokens already issued by the identity provider.
    pub tokens: Option<TokenSet>,
    /// Fingerprint to trust once the challenge is passed.
    pub device_fingerprint: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Outcomes
// ═══════════════════════════════════════════════════════════════════════

/// A completed login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Authenticated user.
    pub user_id: UserId,
    /// Account email.
    pub email: String,
    /// Application role.
    pub role: AppRole,
    /// Issued tokens.
    pub tokens: TokenSet,
    /// Present when the login looked unusual but was not challenged.
    pub security_warning: Option<String>,
}

/// A login waiting on a second factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    /// Token to present with the code.
    pub challenge_token: ChallengeToken,
    /// Why the challenge was issued.
    pub reasons: Vec<String>,
    /// Seconds until the challenge expires.
    pub expires_in: u64,
}

/// Result of a login attempt that passed admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Tokens issued.
    Authenticated(LoginSuccess),
    /// Second factor required.
    ChallengeIssued(PendingChallenge),
}

/// Login state machine stages, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Request accepted for processing.
    Received,
    /// Rate limit, geo-block, lockout and CAPTCHA checks.
    AdmissionCheck,
    /// Rejected by admission control.
    Blocked,
    /// Rejected pending a CAPTCHA solution.
    CaptchaRequired,
    /// Device, location and velocity checks.
    RiskCheck,
    /// Parked behind a second factor.
    Challenge2fa,
    /// Tokens issued.
    Complete,
    /// Rejected.
    Failed,
}

impl std::fmt::Display for LoginStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::AdmissionCheck => "ADMISSION_CHECK",
            Self::Blocked => "BLOCKED",
            Self::CaptchaRequired => "CAPTCHA_REQUIRED",
            Self::RiskCheck => "RISK_CHECK",
            Self::Challenge2fa => "CHALLENGE_2FA",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
