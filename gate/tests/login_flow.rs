//! Login flow integration tests.
//!
//! Drive the full gate over in-memory providers:
//!
//! - Admission control (rate limits, geo-block, lockout, CAPTCHA)
//! - Failure handling of every collaborator
//! - Refresh, logout and the non-password login paths

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use auth_gate::mocks::MockCaptchaVerifier;
use auth_gate::providers::SessionRegistry;
use auth_gate::state::FederatedIdentity;
use auth_gate::{
    AppRole, AuditEvent, GateConfig, GateError, GateEvent, LoginOutcome, LoginRequest,
    LoginSuccess, RateLimitScope, SecondFactorPolicy, SessionHandle,
};
use common::{Harness, PASSWORD, SECRET, caller, device_caller, ip};

const EMAIL: &str = "ana@example.com";

fn authenticated(outcome: LoginOutcome) -> LoginSuccess {
    match outcome {
        LoginOutcome::Authenticated(success) => success,
        LoginOutcome::ChallengeIssued(pending) => {
            panic!("expected tokens, got a challenge: {:?}", pending.reasons)
        }
    }
}

fn wrong(email: &str) -> LoginRequest {
    LoginRequest::new(email, "wrong password")
}

// ═══════════════════════════════════════════════════════════════════════
// Password Login
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_password_login_authenticates() {
    let h = Harness::new();
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::Admin);

    let outcome = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap();
    let success = authenticated(outcome);

    assert_eq!(success.user_id, user);
    assert_eq!(success.role, AppRole::Admin);
    assert_eq!(success.security_warning, None);
    assert_eq!(h.sessions.list_sessions(&user).await.unwrap().len(), 1);
    assert!(h.audit.kinds().contains(&AuditEvent::LoginSuccess));
    assert_eq!(h.events.topics(), vec!["user-logged-in-events"]);
}

#[tokio::test]
async fn test_login_event_carries_masked_values() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::Viewer);

    h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap();

    match h.events.events().first() {
        Some(GateEvent::LoginSucceeded { email, ip, method, .. }) => {
            assert_ne!(email, EMAIL);
            assert!(email.ends_with("@example.com"));
            assert_ne!(ip, "203.0.113.1");
            assert_eq!(method, "password");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_fields_rejected_before_counters() {
    let h = Harness::new();

    let result = h.gate.login(LoginRequest::new("", PASSWORD), &caller(1)).await;
    assert!(matches!(result, Err(GateError::InvalidInput(_))));

    let result = h.gate.login(LoginRequest::new("not-an-email", PASSWORD), &caller(1)).await;
    assert!(matches!(result, Err(GateError::InvalidInput(_))));

    assert!(h.counters.keys().is_empty());
    assert_eq!(h.identity.authenticate_calls(), 0);
}

#[tokio::test]
async fn test_email_is_case_insensitive_for_counters() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for email in ["Ana@Example.com", " ana@example.com ", "ANA@EXAMPLE.COM"] {
        let _ = h.gate.login(wrong(email), &caller(1)).await;
    }

    let result = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(2)).await;
    assert_eq!(result, Err(GateError::CaptchaRequired));
}

// ═══════════════════════════════════════════════════════════════════════
// Lockout and CAPTCHA
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_lockout_after_five_failures() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for attempt in 1..=5 {
        let mut request = wrong(EMAIL);
        if attempt > 3 {
            request = request.with_captcha(MockCaptchaVerifier::VALID_TOKEN);
        }
        let result = h.gate.login(request, &caller(1)).await;
        assert!(
            matches!(result, Err(GateError::AuthenticationFailed(_))),
            "attempt {attempt}: {result:?}"
        );
    }

    let correct = LoginRequest::new(EMAIL, PASSWORD).with_captcha(MockCaptchaVerifier::VALID_TOKEN);
    let result = h.gate.login(correct, &caller(1)).await;

    assert!(matches!(result, Err(GateError::AccountLocked { .. })));
    assert_eq!(h.identity.authenticate_calls(), 5);
    assert!(h.audit.kinds().contains(&AuditEvent::LoginAccountLocked));
}

#[tokio::test]
async fn test_lockout_expires_with_window() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for _ in 0..5 {
        let request = wrong(EMAIL).with_captcha(MockCaptchaVerifier::VALID_TOKEN);
        let _ = h.gate.login(request, &caller(1)).await;
    }

    h.clock.advance(chrono::Duration::minutes(16));
    let correct = LoginRequest::new(EMAIL, PASSWORD).with_captcha(MockCaptchaVerifier::VALID_TOKEN);
    assert!(h.gate.login(correct, &caller(1)).await.is_ok());
}

#[tokio::test]
async fn test_captcha_required_after_three_failures() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for _ in 0..3 {
        let _ = h.gate.login(wrong(EMAIL), &caller(1)).await;
    }

    let bare = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await;
    assert_eq!(bare, Err(GateError::CaptchaRequired));

    let bad = LoginRequest::new(EMAIL, PASSWORD).with_captcha("forged");
    assert_eq!(h.gate.login(bad, &caller(1)).await, Err(GateError::CaptchaRequired));

    let good = LoginRequest::new(EMAIL, PASSWORD).with_captcha(MockCaptchaVerifier::VALID_TOKEN);
    authenticated(h.gate.login(good, &caller(1)).await.unwrap());

    assert_eq!(h.identity.authenticate_calls(), 4);
    assert!(h.audit.kinds().contains(&AuditEvent::LoginCaptchaFailed));
}

#[tokio::test]
async fn test_success_clears_email_escalation() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for _ in 0..3 {
        let _ = h.gate.login(wrong(EMAIL), &caller(1)).await;
    }
    let good = LoginRequest::new(EMAIL, PASSWORD).with_captcha(MockCaptchaVerifier::VALID_TOKEN);
    authenticated(h.gate.login(good, &caller(1)).await.unwrap());

    // A different IP carries no flag of its own.
    let again = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(2)).await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_captcha_outage_fails_closed() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    for _ in 0..3 {
        let _ = h.gate.login(wrong(EMAIL), &caller(1)).await;
    }

    h.captcha.set_available(false);
    let good = LoginRequest::new(EMAIL, PASSWORD).with_captcha(MockCaptchaVerifier::VALID_TOKEN);
    assert_eq!(h.gate.login(good, &caller(1)).await, Err(GateError::CaptchaRequired));
}

#[tokio::test]
async fn test_captcha_disabled_never_escalates() {
    let h = Harness::with_config(GateConfig::new(SECRET).with_captcha_enabled(false));
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    for _ in 0..3 {
        let _ = h.gate.login(wrong(EMAIL), &caller(1)).await;
    }

    assert!(h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.is_ok());
    assert_eq!(h.captcha.call_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Rate Limits and Geo-Block
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_ip_rate_limit_flags_ip() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for _ in 0..10 {
        assert!(h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(7)).await.is_ok());
    }
    let result = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(7)).await;

    assert!(matches!(
        result,
        Err(GateError::RateLimitExceeded { scope: RateLimitScope::Ip, .. })
    ));
    assert!(h.audit.kinds().contains(&AuditEvent::RateLimitExceeded));

    // The flag outlives the window and marks later logins from the IP.
    h.clock.advance(chrono::Duration::minutes(2));
    let flagged = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(7)).await.unwrap();
    match flagged {
        LoginOutcome::ChallengeIssued(pending) => {
            assert_eq!(pending.reasons, vec!["Suspicious IP address".to_string()]);
        }
        LoginOutcome::Authenticated(_) => panic!("flagged IP was not challenged"),
    }
}

#[tokio::test]
async fn test_email_rate_limit_across_ips() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    for n in 0..15 {
        assert!(h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(n)).await.is_ok());
    }
    let result = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(99)).await;

    assert!(matches!(
        result,
        Err(GateError::RateLimitExceeded { scope: RateLimitScope::Email, .. })
    ));
}

#[tokio::test]
async fn test_blocked_country_never_reaches_identity_provider() {
    let h = Harness::with_config(GateConfig::new(SECRET).with_blocked_countries(["KP", "IR"]));
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    h.geo.set_country(ip(9), "kp");

    let result = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(9)).await;

    assert_eq!(result, Err(GateError::GeoBlocked));
    assert_eq!(h.identity.authenticate_calls(), 0);
    assert!(h.audit.kinds().contains(&AuditEvent::LoginBlockedGeo));
}

#[tokio::test]
async fn test_geo_outage_admits() {
    let h = Harness::with_config(GateConfig::new(SECRET).with_blocked_countries(["US"]));
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    h.geo.set_available(false);

    assert!(h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.is_ok());
}

// ═══════════════════════════════════════════════════════════════════════
// Degraded Collaborators
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_counter_outage_still_logs_in() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    h.counters.set_available(false);

    let outcome = tokio_test::assert_ok!(h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await);
    authenticated(outcome);
}

#[tokio::test]
async fn test_tracking_and_session_outage_still_logs_in() {
    let h = Harness::new();
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    h.devices.set_available(false);
    h.locations.set_available(false);
    h.sessions.set_available(false);
    h.events.set_available(false);

    let outcome = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap();
    assert_eq!(authenticated(outcome).user_id, user);
}

#[tokio::test]
async fn test_identity_provider_outage_does_not_lock_account() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    h.identity.set_available(false);

    for _ in 0..5 {
        let result = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await;
        assert!(matches!(result, Err(GateError::AuthenticationFailed(_))));
    }
    assert!(h.audit.kinds().contains(&AuditEvent::LoginError));

    h.identity.set_available(true);
    assert!(h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.is_ok());
}

#[tokio::test]
async fn test_failed_login_publishes_event() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    let _ = h.gate.login(wrong(EMAIL), &caller(1)).await;

    assert_eq!(h.events.topics(), vec!["user-login-failed-events"]);
    assert_eq!(h.audit.kinds(), vec![AuditEvent::LoginFailed]);
}

// ═══════════════════════════════════════════════════════════════════════
// Second-Factor Policy
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_disabled_policy_audits_bypass() {
    let config = GateConfig::new(SECRET).with_second_factor(SecondFactorPolicy::Disabled);
    let h = Harness::with_config(config);
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    let outcome = h
        .gate
        .login(LoginRequest::new(EMAIL, PASSWORD), &device_caller(1, "laptop"))
        .await
        .unwrap();
    let success = authenticated(outcome);

    assert!(success.security_warning.unwrap().contains("New device detected"));
    assert!(h.audit.kinds().contains(&AuditEvent::SecondFactorBypassed));
}

#[tokio::test]
async fn test_always_policy_challenges_password_logins() {
    let config = GateConfig::new(SECRET).with_second_factor(SecondFactorPolicy::Always);
    let h = Harness::with_config(config);
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::User);

    let outcome = h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap();

    assert!(matches!(outcome, LoginOutcome::ChallengeIssued(_)));
    assert!(h.notifier.last_code_for(&user).is_some());
    assert!(!h.sessions.has_set(&user));
}

// ═══════════════════════════════════════════════════════════════════════
// Refresh and Logout
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_refresh_rotates_session_handle() {
    let h = Harness::new();
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::Viewer);
    let login = authenticated(
        h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap(),
    );
    let old = login.tokens.refresh_token.unwrap();

    let refreshed = h.gate.refresh(&old, &caller(1)).await.unwrap();
    let new = refreshed.tokens.refresh_token.clone().unwrap();

    assert_eq!(refreshed.user_id, user);
    assert_eq!(refreshed.role, AppRole::Viewer);
    assert_eq!(refreshed.email, EMAIL);
    assert_eq!(
        h.sessions.list_sessions(&user).await.unwrap(),
        vec![SessionHandle::from_refresh_token(&new)]
    );
    assert!(h.audit.kinds().contains(&AuditEvent::TokenRefreshed));
    assert!(h.events.topics().contains(&"token-refreshed-events"));
}

#[tokio::test]
async fn test_refresh_with_spent_token_fails() {
    let h = Harness::new();
    h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    let login = authenticated(
        h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap(),
    );
    let old = login.tokens.refresh_token.unwrap();
    h.gate.refresh(&old, &caller(1)).await.unwrap();

    let result = h.gate.refresh(&old, &caller(1)).await;

    assert!(matches!(result, Err(GateError::AuthenticationFailed(_))));
    assert!(h.audit.kinds().contains(&AuditEvent::TokenRefreshFailed));
    assert!(matches!(
        h.gate.refresh("  ", &caller(1)).await,
        Err(GateError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_logout_of_last_session_deletes_set() {
    let h = Harness::new();
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    let login = authenticated(
        h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap(),
    );
    let refresh = login.tokens.refresh_token.unwrap();
    assert!(h.sessions.has_set(&user));

    h.gate.logout(&refresh, &user, &caller(1)).await.unwrap();

    assert!(!h.sessions.has_set(&user));
    assert_eq!(h.identity.revoked(), vec![refresh]);
    assert!(h.audit.kinds().contains(&AuditEvent::LogoutSuccess));
}

#[tokio::test]
async fn test_logout_with_identity_provider_down_removes_session() {
    let h = Harness::new();
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::User);
    let login = authenticated(
        h.gate.login(LoginRequest::new(EMAIL, PASSWORD), &caller(1)).await.unwrap(),
    );
    let refresh = login.tokens.refresh_token.unwrap();

    h.identity.set_available(false);
    h.gate.logout(&refresh, &user, &caller(1)).await.unwrap();

    assert!(!h.sessions.has_set(&user));
    assert!(h.audit.kinds().contains(&AuditEvent::LogoutError));
}

// ═══════════════════════════════════════════════════════════════════════
// Authorization Code and Federated Logins
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_authorization_code_is_single_use() {
    let h = Harness::new();
    let user = h.identity.add_user(EMAIL, PASSWORD, AppRole::Admin);
    h.identity.add_authorization_code("code-123", &user);

    let outcome = h
        .gate
        .login_with_authorization_code("code-123", None, &caller(1))
        .await
        .unwrap();
    let success = authenticated(outcome);
    assert_eq!(success.user_id, user);
    assert_eq!(success.role, AppRole::Admin);
    assert!(h.sessions.has_set(&user));

    let replay = h
        .gate
        .login_with_authorization_code("code-123", Some("https://app.example.com/cb"), &caller(1))
        .await;
    assert!(matches!(replay, Err(GateError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_federated_login_provisions_user() {
    let h = Harness::new();
    h.federated.add_token(
        "google-id-token",
        FederatedIdentity {
            subject: "1098".into(),
            email: "new.user@gmail.com".into(),
            email_verified: true,
            name: Some("New User".into()),
        },
    );

    let outcome = h.gate.federated_login("google-id-token", &caller(1)).await.unwrap();
    let success = authenticated(outcome);

    assert_eq!(success.email, "new.user@gmail.com");
    assert_eq!(success.role, AppRole::User);
    assert!(h.sessions.has_set(&success.user_id));
}

#[tokio::test]
async fn test_federated_login_rejects_unknown_token() {
    let h = Harness::new();

    let error = tokio_test::assert_err!(h.gate.federated_login("forged", &caller(1)).await);

    assert!(matches!(error, GateError::AuthenticationFailed(_)));
    assert_eq!(h.audit.kinds(), vec![AuditEvent::LoginFailed]);
}
