//! Gate orchestrator.
//!
//! Sequences admission control, the identity provider, risk evaluation, the
//! second-factor handoff and the session registry into the login state
//! machine:
//!
//! ```text
//! RECEIVED → ADMISSION_CHECK ─┬─▶ BLOCKED / CAPTCHA_REQUIRED
//!                             └─▶ RISK_CHECK ─┬─▶ COMPLETE
//!                                             └─▶ CHALLENGE_2FA ─ verify ─┬─▶ COMPLETE
//!                                                                          └─▶ FAILED
//! ```
//!
//! COMPLETE registers the session, clears lockout and CAPTCHA state, trusts
//! the device, writes the audit entry and publishes the domain event. None
//! of those side effects can turn a successful login into a failure.

use crate::admission::{AdmissionControl, identifier_for};
use crate::audit::{AuditEntry, AuditEvent};
use crate::clock::Clock;
use crate::config::{GateConfig, SecondFactorPolicy};
use crate::constants::{limits, login_methods};
use crate::environment::GateEnvironment;
use crate::error::{GateError, Result};
use crate::events::GateEvent;
use crate::handoff::SecondFactorHandoff;
use crate::providers::{
    AuditSink, CaptchaVerifier, ChallengeStore, CodeNotifier, CounterStore, DeviceTracker,
    EventPublisher, FederatedTokenVerifier, GeoLocator, IdentityProvider, IdpError, IdpResult,
    LocationTracker, SessionRegistry,
};
use crate::risk::RiskEvaluator;
use crate::state::{
    AddSessionOutcome, AppRole, ChallengeVerdict, LoginOutcome, LoginRequest, LoginStage,
    LoginSuccess, PendingLoginHandoff, ReplaceOutcome, RequestContext, SecurityContext,
    SessionHandle, TokenSet, UserId,
};
use crate::token::{decode_payload, decode_unexpired, mint_access_token};
use crate::utils::{mask_email, mask_ip, require, within};
use std::sync::Arc;

/// Everything COMPLETE needs to finish a login.
struct Completion<'a> {
    user_id: &'a UserId,
    email: &'a str,
    role: AppRole,
    tokens: TokenSet,
    fingerprint: Option<&'a str>,
    method: &'static str,
    security_warning: Option<String>,
}

/// Adaptive login gate.
///
/// # Example
///
/// ```ignore
/// use auth_gate::{AuthGate, GateConfig, GateEnvironment, LoginRequest, RequestContext};
///
/// let gate = AuthGate::new(env, GateConfig::new(secret));
/// let ctx = RequestContext::new(ip, user_agent).with_fingerprint(fingerprint);
///
/// match gate.login(LoginRequest::new(email, password), &ctx).await? {
///     LoginOutcome::Authenticated(success) => { /* hand out tokens */ }
///     LoginOutcome::ChallengeIssued(pending) => { /* ask for the code */ }
/// }
/// ```
#[derive(Clone)]
pub struct AuthGate<C, D, L, G, V, S, H, N, I, F, E, A>
where
    C: CounterStore + Clone,
    D: DeviceTracker + Clone,
    L: LocationTracker + Clone,
    G: GeoLocator + Clone,
    V: CaptchaVerifier + Clone,
    S: SessionRegistry + Clone,
    H: ChallengeStore + Clone,
    N: CodeNotifier + Clone,
    I: IdentityProvider + Clone,
    F: FederatedTokenVerifier + Clone,
    E: EventPublisher + Clone,
    A: AuditSink + Clone,
{
    config: Arc<GateConfig>,
    admission: AdmissionControl<C, G, V>,
    risk: RiskEvaluator<C, D, L>,
    handoff: SecondFactorHandoff<H, N>,
    sessions: S,
    identity: I,
    federated: F,
    events: E,
    audit: A,
    clock: Arc<dyn Clock>,
}

impl<C, D, L, G, V, S, H, N, I, F, E, A> AuthGate<C, D, L, G, V, S, H, N, I, F, E, A>
where
    C: CounterStore + Clone,
    D: DeviceTracker + Clone,
    L: LocationTracker + Clone,
    G: GeoLocator + Clone,
    V: CaptchaVerifier + Clone,
    S: SessionRegistry + Clone,
    H: ChallengeStore + Clone,
    N: CodeNotifier + Clone,
    I: IdentityProvider + Clone,
    F: FederatedTokenVerifier + Clone,
    E: EventPublisher + Clone,
    A: AuditSink + Clone,
{
    /// Assemble the gate.
    #[must_use]
    pub fn new(env: GateEnvironment<C, D, L, G, V, S, H, N, I, F, E, A>, config: GateConfig) -> Self {
        let config = Arc::new(config);
        Self {
            admission: AdmissionControl::new(
                env.counters.clone(),
                env.geo,
                env.captcha,
                Arc::clone(&config),
            ),
            risk: RiskEvaluator::new(env.counters, env.devices, env.locations, Arc::clone(&config)),
            handoff: SecondFactorHandoff::new(env.challenges, env.notifier, config.store_timeout),
            sessions: env.sessions,
            identity: env.identity,
            federated: env.federated,
            events: env.events,
            audit: env.audit,
            clock: env.clock,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Password Login
    // ═══════════════════════════════════════════════════════════════════

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// - Admission rejections: `InvalidInput`, `RateLimitExceeded`,
    ///   `GeoBlocked`, `AccountLocked`, `CaptchaRequired`
    /// - `AuthenticationFailed` - wrong credentials, or the identity provider
    ///   failed or returned an unusable token
    /// - `StoreUnavailable` - a challenge was needed but could not be stored
    pub async fn login(&self, request: LoginRequest, ctx: &RequestContext) -> Result<LoginOutcome> {
        tracing::info!(stage = %LoginStage::Received, ip = %mask_ip(&ctx.ip), "Login attempt");

        tracing::debug!(stage = %LoginStage::AdmissionCheck, "Running admission checks");
        let admission = match self
            .admission
            .admit_password(
                &request.email,
                &request.password,
                request.captcha_token.as_deref(),
                &ctx.ip,
            )
            .await
        {
            Ok(admission) => admission,
            Err(e) => {
                self.audit_rejection(&e, ctx).await;
                return Err(e);
            }
        };

        let identifier = identifier_for(&request.email);
        let tokens = match self
            .idp_call(self.identity.authenticate(request.email.trim(), &request.password))
            .await
        {
            Ok(tokens) => tokens,
            Err(IdpError::InvalidCredentials) => {
                return Err(self.credential_failure(&identifier, ctx).await);
            }
            Err(e) => {
                tracing::error!(stage = %LoginStage::Failed, error = %e, "Identity provider error during login");
                self.record(
                    AuditEntry::new(AuditEvent::LoginError, self.clock.now())
                        .with_caller(&ctx.ip, &ctx.user_agent)
                        .with_email(&identifier)
                        .with_context("error", e.to_string()),
                )
                .await;
                return Err(GateError::AuthenticationFailed(
                    "Authentication service unavailable".into(),
                ));
            }
        };

        let claims = self.claims_of(&tokens, ctx).await?;
        let user_id = UserId::new(claims.sub.clone());
        let email = claims.email.clone().unwrap_or_else(|| request.email.trim().to_string());
        let role = claims.role();

        tracing::debug!(stage = %LoginStage::RiskCheck, user_id = %user_id, "Evaluating risk");
        let now = self.clock.now();
        let security = self
            .risk
            .evaluate(&user_id, ctx, admission.country.as_deref(), now)
            .await;

        if self.requires_challenge(&security, true, &user_id, ctx).await {
            let parked = PendingLoginHandoff {
                user_id: user_id.clone(),
                email: email.clone(),
                role,
                tokens: Some(tokens),
                device_fingerprint: ctx.device_fingerprint.clone(),
            };
            return self
                .challenge(&user_id, &email, Some(&parked), security, ctx)
                .await;
        }

        let success = self
            .complete(
                Completion {
                    user_id: &user_id,
                    email: &email,
                    role,
                    tokens,
                    fingerprint: ctx.device_fingerprint.as_deref(),
                    method: login_methods::PASSWORD,
                    security_warning: security.warning(),
                },
                ctx,
            )
            .await;
        Ok(LoginOutcome::Authenticated(success))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Second Factor
    // ═══════════════════════════════════════════════════════════════════

    /// Pass a second-factor challenge and finish the parked login.
    ///
    /// Parked tokens are handed out as they are. A parked marker without
    /// tokens (the federated path), or nothing parked at all after a parking
    /// failure, gets a freshly minted access token. When the last attempt
    /// burns the challenge, the refresh token parked behind it is revoked.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - token or code missing
    /// - `ChallengeInvalid` - unknown, expired, exhausted, already used, or
    ///   wrong code
    /// - `AuthenticationFailed` - no parked result and the user could not be
    ///   looked up
    /// - `StoreUnavailable` - the challenge store did not answer
    /// - `Configuration` - a token had to be minted but no secret is set
    pub async fn verify_second_factor(
        &self,
        challenge_token: &str,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<LoginSuccess> {
        let owner = self.handoff.owner(challenge_token).await.ok().flatten();

        let verified = match self.handoff.verify(challenge_token, code).await {
            Ok(ChallengeVerdict::Verified { user_id }) => Ok(user_id),
            Ok(ChallengeVerdict::Exhausted { abandoned }) => {
                if let Some(parked) = abandoned {
                    self.revoke_abandoned(parked).await;
                }
                Err(GateError::ChallengeInvalid)
            }
            Ok(ChallengeVerdict::Mismatch { .. } | ChallengeVerdict::NotFound) => {
                Err(GateError::ChallengeInvalid)
            }
            Err(e) => Err(e),
        };
        let user_id = match verified {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::warn!(stage = %LoginStage::Failed, error = %e, "Second factor rejected");
                let mut entry = AuditEntry::new(AuditEvent::Login2faFailed, self.clock.now())
                    .with_caller(&ctx.ip, &ctx.user_agent);
                if let Some(owner) = owner.as_ref() {
                    entry = entry.with_user(owner);
                }
                self.record(entry).await;
                return Err(e);
            }
        };

        let now = self.clock.now();
        let (email, role, tokens, fingerprint) = match self.handoff.resume(challenge_token).await {
            Some(parked) if parked.user_id == user_id => {
                let tokens = match parked.tokens {
                    Some(tokens) => tokens,
                    None => self.mint(&user_id, &parked.email, now)?,
                };
                let fingerprint = parked
                    .device_fingerprint
                    .or_else(|| ctx.device_fingerprint.clone());
                (parked.email, parked.role, tokens, fingerprint)
            }
            _ => {
                let profile = self
                    .idp_call(self.identity.user_profile(&user_id))
                    .await
                    .map_err(|e| {
                        tracing::error!(user_id = %user_id, error = %e, "User lookup after second factor failed");
                        GateError::AuthenticationFailed("Second-factor login could not be completed".into())
                    })?;
                let tokens = self.mint(&user_id, &profile.email, now)?;
                (profile.email, profile.role, tokens, ctx.device_fingerprint.clone())
            }
        };

        self.record(
            AuditEntry::new(AuditEvent::Login2faSuccess, now)
                .with_user(&user_id)
                .with_caller(&ctx.ip, &ctx.user_agent),
        )
        .await;

        Ok(self
            .complete(
                Completion {
                    user_id: &user_id,
                    email: &email,
                    role,
                    tokens,
                    fingerprint: fingerprint.as_deref(),
                    method: login_methods::SECOND_FACTOR,
                    security_warning: None,
                },
                ctx,
            )
            .await)
    }

    /// Send a fresh code for a live challenge.
    ///
    /// Counts against the caller's IP window and the challenge owner's resend
    /// window. Returns the seconds until the challenge expires; a resend
    /// never extends that.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - token missing
    /// - `ChallengeInvalid` - no such live challenge
    /// - `RateLimitExceeded` - a request window overflowed, or the challenge
    ///   had all its resends
    /// - `StoreUnavailable` - the challenge store did not answer
    pub async fn resend_second_factor(&self, challenge_token: &str, ctx: &RequestContext) -> Result<u64> {
        require("challenge token", challenge_token)?;
        let user_id = self
            .handoff
            .owner(challenge_token)
            .await?
            .ok_or(GateError::ChallengeInvalid)?;

        let identifier = format!("{}:{user_id}", login_methods::SECOND_FACTOR_RESEND);
        if let Err(e) = self.admission.check_rate_limits(&identifier, &ctx.ip).await {
            self.audit_rejection(&e, ctx).await;
            return Err(e);
        }

        let email = match self.idp_call(self.identity.user_profile(&user_id)).await {
            Ok(profile) => Some(profile.email),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Could not look up recipient for resend");
                None
            }
        };

        match self
            .handoff
            .resend(challenge_token, &user_id, email.as_deref())
            .await
        {
            Ok(expires_in) => Ok(expires_in),
            Err(e) => {
                self.audit_rejection(&e, ctx).await;
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Federated and Authorization-Code Logins
    // ═══════════════════════════════════════════════════════════════════

    /// Log in with a federated ID token.
    ///
    /// Suspicious logins are challenged before any token is exchanged; only
    /// a marker carrying the device fingerprint is parked, and passing the
    /// challenge mints a fresh access token.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - token missing
    /// - `RateLimitExceeded`, `GeoBlocked` - admission rejections
    /// - `AuthenticationFailed` - the ID token or the identity provider
    ///   rejected the login
    /// - `StoreUnavailable` - a challenge was needed but could not be stored
    pub async fn federated_login(&self, id_token: &str, ctx: &RequestContext) -> Result<LoginOutcome> {
        require("ID token", id_token)?;
        tracing::info!(stage = %LoginStage::Received, method = login_methods::FEDERATED, ip = %mask_ip(&ctx.ip), "Login attempt");

        let admission = match self
            .admission
            .admit_identifier(login_methods::FEDERATED, &ctx.ip)
            .await
        {
            Ok(admission) => admission,
            Err(e) => {
                self.audit_rejection(&e, ctx).await;
                return Err(e);
            }
        };

        let identity = match within(self.config.store_timeout, self.federated.verify(id_token)).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(stage = %LoginStage::Failed, error = %e, "Federated token rejected");
                self.record(
                    AuditEntry::new(AuditEvent::LoginFailed, self.clock.now())
                        .with_caller(&ctx.ip, &ctx.user_agent)
                        .with_context("method", login_methods::FEDERATED)
                        .with_context("reason", e.to_string()),
                )
                .await;
                return Err(GateError::AuthenticationFailed("Invalid federated token".into()));
            }
        };

        let profile = self
            .idp_call(self.identity.resolve_federated_user(&identity))
            .await
            .map_err(|e| {
                tracing::error!(email = %mask_email(&identity.email), error = %e, "Federated user resolution failed");
                GateError::AuthenticationFailed("Federated login failed".into())
            })?;

        let now = self.clock.now();
        let security = self
            .risk
            .evaluate(&profile.user_id, ctx, admission.country.as_deref(), now)
            .await;

        if self
            .requires_challenge(&security, false, &profile.user_id, ctx)
            .await
        {
            let marker = PendingLoginHandoff {
                user_id: profile.user_id.clone(),
                email: profile.email.clone(),
                role: profile.role,
                tokens: None,
                device_fingerprint: ctx.device_fingerprint.clone(),
            };
            return self
                .challenge(&profile.user_id, &profile.email, Some(&marker), security, ctx)
                .await;
        }

        let tokens = self
            .idp_call(self.identity.exchange_federated(&profile.user_id, id_token))
            .await
            .map_err(|e| {
                tracing::error!(user_id = %profile.user_id, error = %e, "Federated token exchange failed");
                GateError::AuthenticationFailed("Federated login failed".into())
            })?;

        let success = self
            .complete(
                Completion {
                    user_id: &profile.user_id,
                    email: &profile.email,
                    role: profile.role,
                    tokens,
                    fingerprint: ctx.device_fingerprint.as_deref(),
                    method: login_methods::FEDERATED,
                    security_warning: security.warning(),
                },
                ctx,
            )
            .await;
        Ok(LoginOutcome::Authenticated(success))
    }

    /// Log in by redeeming an authorization code.
    ///
    /// Uses the configured default redirect URI when none is given.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - code missing
    /// - `RateLimitExceeded`, `GeoBlocked` - admission rejections
    /// - `AuthenticationFailed` - the code was rejected or the identity
    ///   provider failed
    /// - `StoreUnavailable` - a challenge was needed but could not be stored
    pub async fn login_with_authorization_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome> {
        require("authorization code", code)?;
        tracing::info!(stage = %LoginStage::Received, method = login_methods::AUTHORIZATION_CODE, ip = %mask_ip(&ctx.ip), "Login attempt");

        let admission = match self
            .admission
            .admit_identifier(login_methods::AUTHORIZATION_CODE, &ctx.ip)
            .await
        {
            Ok(admission) => admission,
            Err(e) => {
                self.audit_rejection(&e, ctx).await;
                return Err(e);
            }
        };

        let redirect_uri = redirect_uri
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or(self.config.default_redirect_uri.as_str());

        let tokens = match self.idp_call(self.identity.exchange_code(code, redirect_uri)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(stage = %LoginStage::Failed, error = %e, "Authorization code rejected");
                self.record(
                    AuditEntry::new(AuditEvent::LoginFailed, self.clock.now())
                        .with_caller(&ctx.ip, &ctx.user_agent)
                        .with_context("method", login_methods::AUTHORIZATION_CODE)
                        .with_context("reason", e.to_string()),
                )
                .await;
                return Err(GateError::AuthenticationFailed("Authorization code login failed".into()));
            }
        };

        let claims = self.claims_of(&tokens, ctx).await?;
        let user_id = UserId::new(claims.sub.clone());
        let email = claims.email.clone().unwrap_or_default();
        let role = claims.role();

        let now = self.clock.now();
        let security = self
            .risk
            .evaluate(&user_id, ctx, admission.country.as_deref(), now)
            .await;

        if self.requires_challenge(&security, false, &user_id, ctx).await {
            let parked = PendingLoginHandoff {
                user_id: user_id.clone(),
                email: email.clone(),
                role,
                tokens: Some(tokens),
                device_fingerprint: ctx.device_fingerprint.clone(),
            };
            return self
                .challenge(&user_id, &email, Some(&parked), security, ctx)
                .await;
        }

        let success = self
            .complete(
                Completion {
                    user_id: &user_id,
                    email: &email,
                    role,
                    tokens,
                    fingerprint: ctx.device_fingerprint.as_deref(),
                    method: login_methods::AUTHORIZATION_CODE,
                    security_warning: security.warning(),
                },
                ctx,
            )
            .await;
        Ok(LoginOutcome::Authenticated(success))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Refresh and Logout
    // ═══════════════════════════════════════════════════════════════════

    /// Exchange a refresh token for a new token set.
    ///
    /// The session handle of the old refresh token is swapped for the new
    /// one; a handle that is no longer registered is left alone.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` - refresh token missing
    /// - `AuthenticationFailed` - refresh rejected or the identity provider
    ///   failed
    pub async fn refresh(&self, refresh_token: &str, ctx: &RequestContext) -> Result<LoginSuccess> {
        require("refresh token", refresh_token)?;
        let previous_owner = decode_payload(refresh_token).ok().map(|c| UserId::new(c.sub));

        let tokens = match self.idp_call(self.identity.refresh(refresh_token)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected");
                let mut entry = AuditEntry::new(AuditEvent::TokenRefreshFailed, self.clock.now())
                    .with_caller(&ctx.ip, &ctx.user_agent);
                if let Some(owner) = previous_owner.as_ref() {
                    entry = entry.with_user(owner);
                }
                self.record(entry).await;
                return Err(GateError::AuthenticationFailed(match e {
                    IdpError::Unavailable(_) => "Authentication service unavailable".into(),
                    _ => "Refresh token is invalid or expired".into(),
                }));
            }
        };

        let now = self.clock.now();
        let claims = match decode_unexpired(&tokens.access_token, now) {
            Ok(claims) => claims,
            Err(e) => {
                self.record(
                    AuditEntry::new(AuditEvent::TokenRefreshFailed, now)
                        .with_caller(&ctx.ip, &ctx.user_agent)
                        .with_context("error", e.to_string()),
                )
                .await;
                return Err(e);
            }
        };
        let user_id = UserId::new(claims.sub.clone());

        if let Some(new_refresh) = tokens.refresh_token.as_deref().filter(|t| *t != refresh_token) {
            let old = SessionHandle::from_refresh_token(refresh_token);
            let new = SessionHandle::from_refresh_token(new_refresh);
            match within(
                self.config.store_timeout,
                self.sessions.replace_session(&user_id, &old, &new),
            )
            .await
            {
                Ok(ReplaceOutcome::Replaced) => {
                    tracing::debug!(user_id = %user_id, "Session handle rotated");
                }
                Ok(ReplaceOutcome::NotFound) => {
                    tracing::info!(user_id = %user_id, "Refreshed session was not registered");
                }
                Err(e) => tracing::error!(user_id = %user_id, error = %e, "Session rotation failed"),
            }
        }

        self.record(
            AuditEntry::new(AuditEvent::TokenRefreshed, now)
                .with_user(&user_id)
                .with_caller(&ctx.ip, &ctx.user_agent),
        )
        .await;
        self.publish(GateEvent::TokenRefreshed {
            user_id: Some(user_id.clone()),
            timestamp: now,
        })
        .await;
        tracing::info!(user_id = %user_id, "Token refreshed");

        Ok(LoginSuccess {
            email: claims.email.clone().unwrap_or_default(),
            role: claims.role(),
            user_id,
            tokens,
            security_warning: None,
        })
    }

    /// End a session.
    ///
    /// Revocation at the identity provider is best effort; the session
    /// handle is removed either way.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the refresh token is missing.
    pub async fn logout(&self, refresh_token: &str, user_id: &UserId, ctx: &RequestContext) -> Result<()> {
        require("refresh token", refresh_token)?;
        let now = self.clock.now();
        let mut failed = false;

        if let Err(e) = self.idp_call(self.identity.revoke(refresh_token)).await {
            tracing::warn!(user_id = %user_id, error = %e, "Token revocation failed, removing session anyway");
            failed = true;
        }

        let handle = SessionHandle::from_refresh_token(refresh_token);
        match within(self.config.store_timeout, self.sessions.remove_session(user_id, &handle)).await {
            Ok(removed) => tracing::info!(user_id = %user_id, removed, "Logged out"),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Session removal failed");
                failed = true;
            }
        }

        let kind = if failed {
            AuditEvent::LogoutError
        } else {
            AuditEvent::LogoutSuccess
        };
        self.record(
            AuditEntry::new(kind, now)
                .with_user(user_id)
                .with_caller(&ctx.ip, &ctx.user_agent),
        )
        .await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════

    /// Decide whether this login must pass a second factor.
    async fn requires_challenge(
        &self,
        security: &SecurityContext,
        password_login: bool,
        user_id: &UserId,
        ctx: &RequestContext,
    ) -> bool {
        match self.config.second_factor {
            SecondFactorPolicy::Always => password_login || security.suspicious,
            SecondFactorPolicy::RiskBased => security.suspicious,
            SecondFactorPolicy::Disabled => {
                if security.suspicious {
                    tracing::warn!(user_id = %user_id, reasons = ?security.reasons, "Second factor bypassed by configuration");
                    self.record(
                        AuditEntry::new(AuditEvent::SecondFactorBypassed, self.clock.now())
                            .with_user(user_id)
                            .with_caller(&ctx.ip, &ctx.user_agent)
                            .with_context("reasons", security.reasons.clone()),
                    )
                    .await;
                }
                false
            }
        }
    }

    async fn challenge(
        &self,
        user_id: &UserId,
        email: &str,
        parked: Option<&PendingLoginHandoff>,
        security: SecurityContext,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome> {
        tracing::info!(stage = %LoginStage::Challenge2fa, user_id = %user_id, "Second factor required");
        let recipient = Some(email).filter(|e| !e.is_empty());
        let pending = self
            .handoff
            .issue(user_id, recipient, parked, security.reasons)
            .await?;

        self.record(
            AuditEntry::new(AuditEvent::Login2faRequired, self.clock.now())
                .with_user(user_id)
                .with_caller(&ctx.ip, &ctx.user_agent)
                .with_context("reasons", pending.reasons.clone()),
        )
        .await;
        Ok(LoginOutcome::ChallengeIssued(pending))
    }

    /// COMPLETE: every side effect here is best effort.
    async fn complete(&self, completion: Completion<'_>, ctx: &RequestContext) -> LoginSuccess {
        let Completion {
            user_id,
            email,
            role,
            tokens,
            fingerprint,
            method,
            security_warning,
        } = completion;
        let now = self.clock.now();

        match tokens.refresh_token.as_deref() {
            Some(refresh_token) => self.register_session(user_id, refresh_token).await,
            None => tracing::debug!(user_id = %user_id, "No refresh token, no session to register"),
        }

        if !email.is_empty() {
            self.admission.record_success(&identifier_for(email)).await;
        }

        let device_trusted = match fingerprint.filter(|f| !f.is_empty()) {
            Some(fingerprint) => {
                self.risk.trust_device(user_id, fingerprint, now).await;
                true
            }
            None => false,
        };

        self.record(
            AuditEntry::new(AuditEvent::LoginSuccess, now)
                .with_user(user_id)
                .with_caller(&ctx.ip, &ctx.user_agent)
                .with_context("method", method)
                .with_context("device_trusted", device_trusted),
        )
        .await;

        self.publish(GateEvent::LoginSucceeded {
            user_id: user_id.clone(),
            email: mask_email(email),
            role,
            ip: mask_ip(&ctx.ip),
            method: method.to_string(),
            timestamp: now,
        })
        .await;

        tracing::info!(stage = %LoginStage::Complete, user_id = %user_id, method, "Login completed");
        LoginSuccess {
            user_id: user_id.clone(),
            email: email.to_string(),
            role,
            tokens,
            security_warning,
        }
    }

    async fn register_session(&self, user_id: &UserId, refresh_token: &str) {
        let handle = SessionHandle::from_refresh_token(refresh_token);
        match within(
            self.config.store_timeout,
            self.sessions
                .add_session(user_id, &handle, self.config.max_sessions),
        )
        .await
        {
            Ok(AddSessionOutcome::Stored { evicted: Some(_) }) => {
                tracing::info!(user_id = %user_id, "Oldest session evicted");
            }
            Ok(AddSessionOutcome::Stored { evicted: None }) => {}
            Ok(AddSessionOutcome::Degraded) => {
                tracing::warn!(user_id = %user_id, "Session registry degraded, only newest session kept");
            }
            Err(e) => tracing::error!(user_id = %user_id, error = %e, "Session registration failed"),
        }
    }

    /// Count a credential failure and build the caller-facing error.
    async fn credential_failure(&self, identifier: &str, ctx: &RequestContext) -> GateError {
        let failures = self.admission.record_failure(identifier, &ctx.ip).await;
        let now = self.clock.now();

        let mut entry = AuditEntry::new(AuditEvent::LoginFailed, now)
            .with_caller(&ctx.ip, &ctx.user_agent)
            .with_email(identifier);
        if let Some(failures) = failures {
            entry = entry.with_context("attempts", failures);
        }
        self.record(entry).await;

        self.publish(GateEvent::LoginFailed {
            email: mask_email(identifier),
            ip: mask_ip(&ctx.ip),
            reason: "invalid credentials".to_string(),
            timestamp: now,
        })
        .await;

        tracing::warn!(stage = %LoginStage::Failed, email = %mask_email(identifier), "Invalid credentials");
        GateError::AuthenticationFailed("Invalid email or password".into())
    }

    /// Decode the access token the identity provider just issued.
    async fn claims_of(&self, tokens: &TokenSet, ctx: &RequestContext) -> Result<crate::token::TokenClaims> {
        match decode_unexpired(&tokens.access_token, self.clock.now()) {
            Ok(claims) => Ok(claims),
            Err(e) => {
                tracing::error!(error = %e, "Identity provider issued an unusable token");
                self.record(
                    AuditEntry::new(AuditEvent::LoginError, self.clock.now())
                        .with_caller(&ctx.ip, &ctx.user_agent)
                        .with_context("error", e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    fn mint(&self, user_id: &UserId, email: &str, now: chrono::DateTime<chrono::Utc>) -> Result<TokenSet> {
        mint_access_token(
            user_id,
            email,
            &self.config.token_signing_secret,
            now,
            limits::MINTED_TOKEN_TTL_SECS,
        )
    }

    /// Revoke the refresh token of a login whose challenge was burned.
    async fn revoke_abandoned(&self, parked: PendingLoginHandoff) {
        let Some(refresh_token) = parked.tokens.and_then(|t| t.refresh_token) else {
            return;
        };
        match self.idp_call(self.identity.revoke(&refresh_token)).await {
            Ok(()) => tracing::info!(user_id = %parked.user_id, "Revoked tokens of abandoned login"),
            Err(e) => {
                tracing::warn!(user_id = %parked.user_id, error = %e, "Failed to revoke tokens of abandoned login");
            }
        }
    }

    async fn audit_rejection(&self, error: &GateError, ctx: &RequestContext) {
        let kind = match error {
            GateError::RateLimitExceeded { .. } => AuditEvent::RateLimitExceeded,
            GateError::GeoBlocked => AuditEvent::LoginBlockedGeo,
            GateError::AccountLocked { .. } => AuditEvent::LoginAccountLocked,
            GateError::CaptchaRequired => AuditEvent::LoginCaptchaFailed,
            _ => return,
        };
        tracing::warn!(stage = %LoginStage::Blocked, reason = %error, ip = %mask_ip(&ctx.ip), "Login rejected by admission control");

        let mut entry = AuditEntry::new(kind, self.clock.now()).with_caller(&ctx.ip, &ctx.user_agent);
        if let GateError::RateLimitExceeded { scope, .. } = error {
            entry = entry.with_context("scope", scope.to_string());
        }
        self.record(entry).await;
    }

    async fn record(&self, entry: AuditEntry) {
        self.audit.record(entry).await;
    }

    async fn publish(&self, event: GateEvent) {
        let topic = event.topic();
        if let Err(e) = within(self.config.store_timeout, self.events.publish(event)).await {
            tracing::error!(topic, error = %e, "Event publishing failed");
        }
    }

    /// Identity-provider call under the store timeout.
    async fn idp_call<T>(&self, call: impl std::future::Future<Output = IdpResult<T>> + Send) -> IdpResult<T> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .unwrap_or_else(|_| Err(IdpError::Unavailable("identity provider timed out".into())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{
        MockAuditSink, MockCaptchaVerifier, MockChallengeStore, MockCodeNotifier,
        MockCounterStore, MockDeviceTracker, MockEventPublisher, MockFederatedVerifier,
        MockGeoLocator, MockIdentityProvider, MockLocationTracker, MockSessionRegistry,
    };
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    type TestGate = AuthGate<
        MockCounterStore,
        MockDeviceTracker,
        MockLocationTracker,
        MockGeoLocator,
        MockCaptchaVerifier,
        MockSessionRegistry,
        MockChallengeStore,
        MockCodeNotifier,
        MockIdentityProvider,
        MockFederatedVerifier,
        MockEventPublisher,
        MockAuditSink,
    >;

    fn gate(config: GateConfig) -> (TestGate, MockAuditSink) {
        let audit = MockAuditSink::new();
        let env = GateEnvironment::new(
            MockCounterStore::new(),
            MockDeviceTracker::new(),
            MockLocationTracker::new(),
            MockGeoLocator::default(),
            MockCaptchaVerifier::new(),
            MockSessionRegistry::new(),
            MockChallengeStore::new(),
            MockCodeNotifier::new(),
            MockIdentityProvider::new(),
            MockFederatedVerifier::new(),
            MockEventPublisher::new(),
            audit.clone(),
        );
        (AuthGate::new(env, config), audit)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)), "curl/8.0")
    }

    #[tokio::test]
    async fn test_slow_identity_provider_is_unavailable() {
        let (gate, _) = gate(GateConfig::default().with_store_timeout(Duration::from_millis(10)));

        let result: IdpResult<()> = gate.idp_call(std::future::pending()).await;

        assert!(matches!(result, Err(IdpError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_policy_decisions() {
        let mut suspicious = SecurityContext::default();
        suspicious.flag("New device detected");
        let calm = SecurityContext::default();
        let user = UserId::new("u1");

        let (risk_based, _) = gate(GateConfig::default());
        assert!(risk_based.requires_challenge(&suspicious, true, &user, &ctx()).await);
        assert!(!risk_based.requires_challenge(&calm, true, &user, &ctx()).await);

        let (always, _) = gate(GateConfig::default().with_second_factor(SecondFactorPolicy::Always));
        assert!(always.requires_challenge(&calm, true, &user, &ctx()).await);
        assert!(!always.requires_challenge(&calm, false, &user, &ctx()).await);

        let (disabled, audit) =
            gate(GateConfig::default().with_second_factor(SecondFactorPolicy::Disabled));
        assert!(!disabled.requires_challenge(&calm, true, &user, &ctx()).await);
        assert!(audit.kinds().is_empty());
        assert!(!disabled.requires_challenge(&suspicious, true, &user, &ctx()).await);
        assert_eq!(audit.kinds(), vec![AuditEvent::SecondFactorBypassed]);
    }

    #[tokio::test]
    async fn test_mint_without_secret_is_configuration_error() {
        let (gate, _) = gate(GateConfig::default());

        let result = gate.mint(&UserId::new("u1"), "u1@example.com", chrono::Utc::now());

        assert!(matches!(result, Err(GateError::Configuration(_))));
    }
}
