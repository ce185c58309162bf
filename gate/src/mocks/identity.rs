//! Mock identity provider and federated token verifier for testing.

use crate::clock::Clock;
use crate::error::{GateError, Result};
use crate::mocks::{FixedClock, lock};
use crate::providers::{FederatedTokenVerifier, IdentityProvider, IdpError, IdpResult};
use crate::state::{AppRole, FederatedIdentity, TokenSet, UserId, UserProfile};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ACCESS_TOKEN_TTL_SECS: i64 = 300;

#[derive(Debug, Default)]
struct Directory {
    passwords: HashMap<String, String>,
    profiles: HashMap<UserId, UserProfile>,
    refresh_tokens: HashMap<String, UserId>,
    codes: HashMap<String, UserId>,
    revoked: Vec<String>,
    issued: u64,
}

/// In-memory user directory issuing unsigned tokens.
///
/// Access tokens carry a real base64url JSON payload (`sub`, `email`,
/// `exp`, `realm_access.roles`) so the gate's payload handling is exercised.
/// Refresh tokens rotate on every refresh.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    directory: Arc<Mutex<Directory>>,
    clock: FixedClock,
    down: Arc<AtomicBool>,
    authenticate_calls: Arc<AtomicUsize>,
}

impl MockIdentityProvider {
    /// Create an empty directory on its own clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty directory reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: FixedClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    /// Register a password user and return its id.
    pub fn add_user(&self, email: &str, password: &str, role: AppRole) -> UserId {
        let user_id = UserId::new(format!("user-{}", email.to_lowercase()));
        if let Ok(mut dir) = lock(&self.directory) {
            dir.passwords.insert(email.to_lowercase(), password.to_string());
            dir.profiles.insert(
                user_id.clone(),
                UserProfile {
                    user_id: user_id.clone(),
                    email: email.to_string(),
                    role,
                },
            );
        }
        user_id
    }

    /// Make `code` redeemable for a session of `user_id`.
    pub fn add_authorization_code(&self, code: &str, user_id: &UserId) {
        if let Ok(mut dir) = lock(&self.directory) {
            dir.codes.insert(code.to_string(), user_id.clone());
        }
    }

    /// Simulate an outage.
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    /// Password checks requested so far.
    #[must_use]
    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens revoked so far.
    #[must_use]
    pub fn revoked(&self) -> Vec<String> {
        lock(&self.directory).map(|d| d.revoked.clone()).unwrap_or_default()
    }

    fn check_up(&self) -> IdpResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(IdpError::Unavailable("identity provider offline".into()))
        } else {
            Ok(())
        }
    }

    fn directory(&self) -> IdpResult<std::sync::MutexGuard<'_, Directory>> {
        self.directory
            .lock()
            .map_err(|_| IdpError::Unavailable("Mutex lock failed".into()))
    }

    fn issue(&self, dir: &mut Directory, profile: &UserProfile) -> TokenSet {
        dir.issued += 1;
        let payload = serde_json::json!({
            "sub": profile.user_id.as_str(),
            "email": profile.email,
            "exp": self.clock.now().timestamp() + ACCESS_TOKEN_TTL_SECS,
            "realm_access": { "roles": [profile.role.as_str()] },
        });
        let access_token = format!(
            "eyJhbGciOiJSUzI1NiJ9.{}.mock-signature",
            URL_SAFE_NO_PAD.encode(payload.to_string())
        );
        let refresh_token = format!("refresh-{}-{}", profile.user_id, dir.issued);
        dir.refresh_tokens.insert(refresh_token.clone(), profile.user_id.clone());

        TokenSet {
            access_token,
            refresh_token: Some(refresh_token),
            expires_in: u64::try_from(ACCESS_TOKEN_TTL_SECS).unwrap_or(0),
            token_type: "Bearer".to_string(),
        }
    }

    fn profile(dir: &Directory, user_id: &UserId) -> IdpResult<UserProfile> {
        dir.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| IdpError::Rejected(format!("unknown user {user_id}")))
    }
}

impl IdentityProvider for MockIdentityProvider {
    async fn authenticate(&self, email: &str, password: &str) -> IdpResult<TokenSet> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        let mut dir = self.directory()?;

        let email = email.to_lowercase();
        if dir.passwords.get(&email).map(String::as_str) != Some(password) {
            return Err(IdpError::InvalidCredentials);
        }
        let profile = dir
            .profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(&email))
            .cloned()
            .ok_or(IdpError::InvalidCredentials)?;

        Ok(self.issue(&mut dir, &profile))
    }

    async fn refresh(&self, refresh_token: &str) -> IdpResult<TokenSet> {
        self.check_up()?;
        let mut dir = self.directory()?;
        let user_id = dir
            .refresh_tokens
            .remove(refresh_token)
            .ok_or(IdpError::InvalidCredentials)?;
        let profile = Self::profile(&dir, &user_id)?;
        Ok(self.issue(&mut dir, &profile))
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> IdpResult<TokenSet> {
        self.check_up()?;
        let mut dir = self.directory()?;
        let user_id = dir
            .codes
            .remove(code)
            .ok_or_else(|| IdpError::Rejected("invalid_grant".into()))?;
        let profile = Self::profile(&dir, &user_id)?;
        Ok(self.issue(&mut dir, &profile))
    }

    async fn resolve_federated_user(&self, identity: &FederatedIdentity) -> IdpResult<UserProfile> {
        self.check_up()?;
        let mut dir = self.directory()?;
        if let Some(profile) = dir
            .profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(&identity.email))
        {
            return Ok(profile.clone());
        }

        let profile = UserProfile {
            user_id: UserId::new(format!("user-{}", identity.email.to_lowercase())),
            email: identity.email.clone(),
            role: AppRole::User,
        };
        dir.profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(profile)
    }

    async fn exchange_federated(&self, user_id: &UserId, _subject_token: &str) -> IdpResult<TokenSet> {
        self.check_up()?;
        let mut dir = self.directory()?;
        let profile = Self::profile(&dir, user_id)?;
        Ok(self.issue(&mut dir, &profile))
    }

    async fn user_profile(&self, user_id: &UserId) -> IdpResult<UserProfile> {
        self.check_up()?;
        let dir = self.directory()?;
        Self::profile(&dir, user_id)
    }

    async fn revoke(&self, refresh_token: &str) -> IdpResult<()> {
        self.check_up()?;
        let mut dir = self.directory()?;
        dir.refresh_tokens.remove(refresh_token);
        dir.revoked.push(refresh_token.to_string());
        Ok(())
    }
}

/// Federated verifier backed by a table of known ID tokens.
#[derive(Debug, Clone, Default)]
pub struct MockFederatedVerifier {
    tokens: Arc<Mutex<HashMap<String, FederatedIdentity>>>,
}

impl MockFederatedVerifier {
    /// Create a verifier that rejects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `id_token` as asserting `identity`.
    pub fn add_token(&self, id_token: &str, identity: FederatedIdentity) {
        if let Ok(mut tokens) = lock(&self.tokens) {
            tokens.insert(id_token.to_string(), identity);
        }
    }
}

impl FederatedTokenVerifier for MockFederatedVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        lock(&self.tokens)?
            .get(id_token)
            .cloned()
            .ok_or_else(|| GateError::AuthenticationFailed("invalid ID token".into()))
    }
}
