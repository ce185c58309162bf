//! Token payload handling and access-token minting.
//!
//! Identity-provider tokens are already validated by the provider that issued
//! them; the gate only reads their payload for the subject, email, expiry and
//! realm roles. Signature checks for federated tokens live in
//! [`crate::providers::federated`].

use crate::error::{GateError, Result};
use crate::state::{AppRole, TokenSet, UserId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

/// Claims the gate reads from an access token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenClaims {
    /// Subject.
    pub sub: String,
    /// Email, when present.
    pub email: Option<String>,
    /// Expiry as a Unix timestamp, when present.
    pub exp: Option<i64>,
    /// Realm roles, in token order.
    pub roles: Vec<String>,
}

impl TokenClaims {
    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| exp <= now.timestamp())
    }

    /// Application role carried by the token.
    #[must_use]
    pub fn role(&self) -> AppRole {
        role_from_realm_roles(&self.roles)
    }
}

#[derive(Deserialize)]
struct RawPayload {
    sub: Option<String>,
    email: Option<String>,
    exp: Option<i64>,
    #[serde(default)]
    realm_access: Option<RealmAccess>,
}

#[derive(Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

/// Decode the payload segment of a compact JWT.
///
/// # Errors
///
/// Returns `GateError::AuthenticationFailed` when the token is not three
/// segments, the payload is not base64url JSON, or the subject is missing.
pub fn decode_payload(token: &str) -> Result<TokenClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(GateError::AuthenticationFailed("malformed token".into()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| GateError::AuthenticationFailed(format!("token payload is not base64url: {e}")))?;

    let raw: RawPayload = serde_json::from_slice(&bytes)
        .map_err(|e| GateError::AuthenticationFailed(format!("token payload is not JSON: {e}")))?;

    let sub = raw
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GateError::AuthenticationFailed("token has no subject".into()))?;

    Ok(TokenClaims {
        sub,
        email: raw.email,
        exp: raw.exp,
        roles: raw.realm_access.map(|r| r.roles).unwrap_or_default(),
    })
}

/// Decode a token and reject it if expired.
///
/// # Errors
///
/// Returns `GateError::AuthenticationFailed` for malformed or expired tokens.
pub fn decode_unexpired(token: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
    let claims = decode_payload(token)?;
    if claims.is_expired(now) {
        return Err(GateError::AuthenticationFailed("token expired".into()));
    }
    Ok(claims)
}

/// Map one identity-provider role name to an application role.
///
/// # Examples
///
/// ```
/// use auth_gate::token::map_role;
/// use auth_gate::AppRole;
///
/// assert_eq!(map_role("MANAGER"), Some(AppRole::ProjectManager));
/// assert_eq!(map_role("OWNER"), Some(AppRole::UnitOwner));
/// assert_eq!(map_role("offline_access"), None);
/// ```
#[must_use]
pub fn map_role(name: &str) -> Option<AppRole> {
    match name {
        "WORKER" => Some(AppRole::Worker),
        "MANAGER" => Some(AppRole::ProjectManager),
        "OWNER" => Some(AppRole::UnitOwner),
        "ADMIN" => Some(AppRole::Admin),
        "COMPANY_ADMIN" => Some(AppRole::CompanyAdmin),
        "VIEWER" => Some(AppRole::Viewer),
        "HOMEOWNER" => Some(AppRole::Homeowner),
        "USER" => Some(AppRole::User),
        _ => None,
    }
}

/// First recognised realm role, or `User`.
#[must_use]
pub fn role_from_realm_roles<S: AsRef<str>>(roles: &[S]) -> AppRole {
    roles
        .iter()
        .find_map(|r| map_role(r.as_ref()))
        .unwrap_or(AppRole::User)
}

#[derive(Serialize)]
struct MintedClaims<'a> {
    sub: &'a str,
    email: &'a str,
    iat: i64,
    exp: i64,
}

/// Mint an HS512 access token for a user.
///
/// Used when a challenge is passed but no identity-provider tokens were
/// parked behind it.
///
/// # Errors
///
/// Returns `GateError::Configuration` when no signing secret is configured,
/// or when encoding fails.
pub fn mint_access_token(
    user_id: &UserId,
    email: &str,
    secret: &[u8],
    now: DateTime<Utc>,
    ttl_secs: i64,
) -> Result<TokenSet> {
    if secret.is_empty() {
        return Err(GateError::Configuration(
            "token signing secret is not configured".into(),
        ));
    }

    let claims = MintedClaims {
        sub: user_id.as_str(),
        email,
        iat: now.timestamp(),
        exp: now.timestamp() + ttl_secs,
    };

    let access_token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| GateError::Configuration(format!("failed to sign access token: {e}")))?;

    Ok(TokenSet {
        access_token,
        refresh_token: None,
        expires_in: u64::try_from(ttl_secs).unwrap_or(0),
        token_type: "Bearer".to_string(),
    })
}
