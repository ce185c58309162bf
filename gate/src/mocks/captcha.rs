//! Mock CAPTCHA verifier for testing.

use crate::error::Result;
use crate::mocks::{Availability, lock};
use crate::providers::CaptchaVerifier;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Accepts exactly one solution token.
#[derive(Debug, Clone)]
pub struct MockCaptchaVerifier {
    accepted: String,
    calls: Arc<Mutex<Vec<(String, IpAddr)>>>,
    available: Availability,
}

impl MockCaptchaVerifier {
    /// Solution accepted by [`MockCaptchaVerifier::new`].
    pub const VALID_TOKEN: &'static str = "valid-captcha";

    /// Create a verifier accepting [`Self::VALID_TOKEN`].
    #[must_use]
    pub fn new() -> Self {
        Self::accepting(Self::VALID_TOKEN)
    }

    /// Create a verifier accepting `token`.
    #[must_use]
    pub fn accepting(token: impl Into<String>) -> Self {
        Self {
            accepted: token.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            available: Availability::default(),
        }
    }

    /// Simulate an outage of the verification service.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Number of verifications requested.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).map_or(0, |c| c.len())
    }
}

impl Default for MockCaptchaVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptchaVerifier for MockCaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: &IpAddr) -> Result<bool> {
        lock(&self.calls)?.push((token.to_string(), *remote_ip));
        self.available.check("captcha verifier")?;
        Ok(token == self.accepted)
    }
}
