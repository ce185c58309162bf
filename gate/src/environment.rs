//! Gate environment.
//!
//! Bundles every collaborator of the gate for dependency injection.

use crate::clock::{Clock, SystemClock};
use crate::providers::{
    AuditSink, CaptchaVerifier, ChallengeStore, CodeNotifier, CounterStore, DeviceTracker,
    EventPublisher, FederatedTokenVerifier, GeoLocator, IdentityProvider, LocationTracker,
    SessionRegistry,
};
use std::sync::Arc;

/// Gate environment.
///
/// # Type Parameters
///
/// - `C`: Counter store
/// - `D`: Device tracker
/// - `L`: Location tracker
/// - `G`: Geolocation
/// - `V`: CAPTCHA verifier
/// - `S`: Session registry
/// - `H`: Challenge store
/// - `N`: Code notifier
/// - `I`: Identity provider
/// - `F`: Federated token verifier
/// - `E`: Event publisher
/// - `A`: Audit sink
#[derive(Clone)]
pub struct GateEnvironment<C, D, L, G, V, S, H, N, I, F, E, A>
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
    /// Counters and flags (`Redis`).
    pub counters: C,

    /// Device trust records (`Redis`).
    pub devices: D,

    /// Last-location records (`Redis`).
    pub locations: L,

    /// IP to country lookup.
    pub geo: G,

    /// CAPTCHA verification.
    pub captcha: V,

    /// Bounded session sets (`Redis` - Lua scripts).
    pub sessions: S,

    /// Second-factor challenges and parked logins (`Redis`).
    pub challenges: H,

    /// One-time code delivery.
    pub notifier: N,

    /// Identity provider (`OpenID Connect`).
    pub identity: I,

    /// Federated ID-token verification.
    pub federated: F,

    /// Domain event bus.
    pub events: E,

    /// Security audit sink.
    pub audit: A,

    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl<C, D, L, G, V, S, H, N, I, F, E, A> GateEnvironment<C, D, L, G, V, S, H, N, I, F, E, A>
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
    /// Create an environment on the system clock.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        counters: C,
        devices: D,
        locations: L,
        geo: G,
        captcha: V,
        sessions: S,
        challenges: H,
        notifier: N,
        identity: I,
        federated: F,
        events: E,
        audit: A,
    ) -> Self {
        Self {
            counters,
            devices,
            locations,
            geo,
            captcha,
            sessions,
            challenges,
            notifier,
            identity,
            federated,
            events,
            audit,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
