//! Shared wiring for gate integration tests.

#![allow(dead_code)]

use auth_gate::mocks::{
    FixedClock, MockAuditSink, MockCaptchaVerifier, MockChallengeStore, MockCodeNotifier,
    MockCounterStore, MockDeviceTracker, MockEventPublisher, MockFederatedVerifier,
    MockGeoLocator, MockIdentityProvider, MockLocationTracker, MockSessionRegistry,
};
use auth_gate::{AuthGate, GateConfig, GateEnvironment, RequestContext};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

pub const SECRET: &[u8] = b"integration-test-signing-secret";
pub const PASSWORD: &str = "correct horse battery staple";

pub type TestGate = AuthGate<
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

/// A gate plus handles on every mock behind it.
pub struct Harness {
    pub gate: TestGate,
    pub clock: FixedClock,
    pub counters: MockCounterStore,
    pub devices: MockDeviceTracker,
    pub locations: MockLocationTracker,
    pub geo: MockGeoLocator,
    pub captcha: MockCaptchaVerifier,
    pub sessions: MockSessionRegistry,
    pub challenges: MockChallengeStore,
    pub notifier: MockCodeNotifier,
    pub identity: MockIdentityProvider,
    pub federated: MockFederatedVerifier,
    pub events: MockEventPublisher,
    pub audit: MockAuditSink,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GateConfig::new(SECRET))
    }

    pub fn with_config(config: GateConfig) -> Self {
        init_tracing();
        let clock = FixedClock::default();
        let counters = MockCounterStore::with_clock(clock.clone());
        let devices = MockDeviceTracker::new();
        let locations = MockLocationTracker::new();
        let geo = MockGeoLocator::default();
        let captcha = MockCaptchaVerifier::new();
        let sessions = MockSessionRegistry::new();
        let challenges = MockChallengeStore::with_clock(clock.clone());
        let notifier = MockCodeNotifier::new();
        let identity = MockIdentityProvider::with_clock(clock.clone());
        let federated = MockFederatedVerifier::new();
        let events = MockEventPublisher::new();
        let audit = MockAuditSink::new();

        let env = GateEnvironment::new(
            counters.clone(),
            devices.clone(),
            locations.clone(),
            geo.clone(),
            captcha.clone(),
            sessions.clone(),
            challenges.clone(),
            notifier.clone(),
            identity.clone(),
            federated.clone(),
            events.clone(),
            audit.clone(),
        )
        .with_clock(Arc::new(clock.clone()));

        Self {
            gate: AuthGate::new(env, config),
            clock,
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
        }
    }
}

/// Route gate logs to the test writer; `RUST_LOG=auth_gate=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
}

/// Caller without a device fingerprint.
pub fn caller(last: u8) -> RequestContext {
    RequestContext::new(ip(last), "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0")
}

/// Caller presenting a device fingerprint.
pub fn device_caller(last: u8, fingerprint: &str) -> RequestContext {
    caller(last).with_fingerprint(fingerprint)
}
