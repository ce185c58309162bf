//! In-memory provider implementations for testing.
//!
//! Every cache-backed mock reads time from a [`FixedClock`], so expiry can be
//! tested by advancing the clock instead of sleeping, and can be switched
//! off with `set_available(false)` to exercise the fail-open paths.
//!
//! **WARNING**: Do NOT use in production. These keep everything in process
//! memory and never shrink.

pub mod captcha;
pub mod challenge;
pub mod clock;
pub mod counter;
pub mod device;
pub mod geo;
pub mod identity;
pub mod location;
pub mod session;
pub mod sinks;

pub use captcha::MockCaptchaVerifier;
pub use challenge::MockChallengeStore;
pub use clock::FixedClock;
pub use counter::MockCounterStore;
pub use device::MockDeviceTracker;
pub use geo::MockGeoLocator;
pub use identity::{MockFederatedVerifier, MockIdentityProvider};
pub use location::MockLocationTracker;
pub use session::MockSessionRegistry;
pub use sinks::{MockAuditSink, MockCodeNotifier, MockEventPublisher, SentCode};

use crate::error::{GateError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared on/off switch for a mock backend.
#[derive(Debug, Clone)]
pub(crate) struct Availability(Arc<AtomicBool>);

impl Default for Availability {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl Availability {
    pub(crate) fn set(&self, available: bool) {
        self.0.store(available, Ordering::SeqCst);
    }

    pub(crate) fn check(&self, what: &str) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GateError::StoreUnavailable(format!("{what} is offline")))
        }
    }
}

/// Lock a mock's state, mapping poisoning to a store error.
pub(crate) fn lock<T>(state: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    state
        .lock()
        .map_err(|_| GateError::StoreUnavailable("Mutex lock failed".into()))
}
