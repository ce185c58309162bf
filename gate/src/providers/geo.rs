//! Geolocation trait.

use crate::error::Result;
use std::net::IpAddr;

/// Resolves an IP address to a country.
pub trait GeoLocator: Send + Sync {
    /// Upper-case ISO country code for `ip`.
    ///
    /// Implementations return [`crate::constants::UNKNOWN_COUNTRY`] when the
    /// lookup succeeds but has no answer (private ranges, reserved blocks).
    ///
    /// # Errors
    ///
    /// Returns error if the lookup service cannot be reached.
    fn country_code(&self, ip: &IpAddr) -> impl std::future::Future<Output = Result<String>> + Send;
}
