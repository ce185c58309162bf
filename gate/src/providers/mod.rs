//! Gate providers.
//!
//! Traits for every external collaborator of the gate, plus the HTTP and
//! in-process implementations that ship with the crate. The orchestrator
//! depends only on the traits, so tests run against the in-memory versions
//! in [`crate::mocks`] and production wires in [`crate::stores`].
//!
//! ```text
//!                       ┌──────────────────┐
//!   login / refresh ───▶│ AuthGate         │
//!                       └────────┬─────────┘
//!        ┌───────────────┬───────┴───────┬────────────────┐
//!        ▼               ▼               ▼                ▼
//!  CounterStore   DeviceTracker   SessionRegistry   IdentityProvider
//!  GeoLocator     LocationTracker ChallengeStore    EventPublisher
//!  CaptchaVerifier                CodeNotifier      AuditSink
//! ```
//!
//! All cache-backed traits are expected to be individually atomic per call.

pub mod audit;
pub mod captcha;
pub mod challenge_store;
pub mod console_notifier;
pub mod counter_store;
pub mod device;
pub mod events;
pub mod federated;
pub mod geo;
pub mod identity;
pub mod ip_api;
pub mod key_cache;
pub mod location;
pub mod notifier;
pub mod oidc;
pub mod recaptcha;
pub mod session_registry;

pub use audit::{AuditSink, TracingAuditSink};
pub use captcha::CaptchaVerifier;
pub use challenge_store::ChallengeStore;
pub use console_notifier::ConsoleCodeNotifier;
pub use counter_store::CounterStore;
pub use device::DeviceTracker;
pub use events::{BroadcastEventPublisher, EventPublisher};
pub use federated::{FederatedTokenVerifier, GoogleIdTokenVerifier};
pub use geo::GeoLocator;
pub use identity::{IdentityProvider, IdpError, IdpResult};
pub use ip_api::IpApiLocator;
pub use key_cache::KeyCache;
pub use location::LocationTracker;
pub use notifier::CodeNotifier;
pub use oidc::OidcIdentityProvider;
pub use recaptcha::RecaptchaVerifier;
pub use session_registry::SessionRegistry;
