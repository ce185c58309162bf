//! # Auth Gate
//!
//! Adaptive login risk gate and bounded session registry, sitting in front
//! of an `OpenID Connect` identity provider and backed by a shared cache.
//!
//! ## Features
//!
//! - **Admission control**: per-IP and per-email rate limits, country
//!   blocking, account lockout, CAPTCHA escalation
//! - **Risk evaluation**: new device, new location, suspicious IP,
//!   impossible travel
//! - **Second factor**: one-time codes behind an unguessable challenge token,
//!   with the login result parked until the code is verified
//! - **Bounded sessions**: at most N refresh-token handles per user, oldest
//!   evicted, maintained atomically in `Redis`
//! - **Testable**: every collaborator is a trait with an in-memory mock
//!
//! ## Architecture
//!
//! ```text
//! LoginRequest → AdmissionControl → IdentityProvider → RiskEvaluator
//!                                                      │
//!                          ┌───────────────────────────┴──────────┐
//!                          ▼                                      ▼
//!                 SecondFactorHandoff ── verify ──▶ COMPLETE (sessions, audit, events)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use auth_gate::*;
//!
//! let env = GateEnvironment::new(
//!     counters, devices, locations, geo, captcha, sessions,
//!     challenges, notifier, identity, federated, events, audit,
//! );
//! let gate = AuthGate::new(env, GateConfig::new(secret));
//!
//! let ctx = RequestContext::new(ip, "Mozilla/5.0").with_fingerprint("fp-123");
//! match gate.login(LoginRequest::new("ana@example.com", "pw"), &ctx).await? {
//!     LoginOutcome::Authenticated(success) => println!("{}", success.user_id),
//!     LoginOutcome::ChallengeIssued(pending) => println!("{}", pending.challenge_token),
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod admission;
pub mod audit;
pub mod clock;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod events;
pub mod gate;
pub mod geo;
pub mod handoff;
pub mod providers;
pub mod risk;
pub mod state;
pub mod stores;
pub mod token;
pub mod utils;

// In-memory providers (testing only)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditEvent};
pub use clock::{Clock, SystemClock};
pub use config::{GateConfig, OidcConfig, RecaptchaConfig, SecondFactorPolicy};
pub use environment::GateEnvironment;
pub use error::{GateError, RateLimitScope, Result};
pub use events::GateEvent;
pub use gate::AuthGate;
pub use state::{
    AppRole, ChallengeToken, LoginOutcome, LoginRequest, LoginSuccess, PendingChallenge,
    RequestContext, SecurityContext, SessionHandle, TokenSet, UserId,
};
