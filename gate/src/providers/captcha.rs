//! CAPTCHA verifier trait.

use crate::error::Result;
use std::net::IpAddr;

/// Checks a client-supplied CAPTCHA solution.
pub trait CaptchaVerifier: Send + Sync {
    /// Whether `token` is a valid solution.
    ///
    /// # Errors
    ///
    /// Returns error if the verification service cannot be reached. The
    /// gate treats that the same as an invalid solution.
    fn verify(
        &self,
        token: &str,
        remote_ip: &IpAddr,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
