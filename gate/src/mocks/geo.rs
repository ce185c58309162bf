//! Mock geolocation for testing.

use crate::error::Result;
use crate::mocks::{Availability, lock};
use crate::providers::GeoLocator;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Fixed IP-to-country table with a fallback country.
#[derive(Debug, Clone)]
pub struct MockGeoLocator {
    countries: Arc<Mutex<HashMap<IpAddr, String>>>,
    fallback: String,
    available: Availability,
}

impl MockGeoLocator {
    /// Resolve every unlisted address to `fallback`.
    #[must_use]
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            countries: Arc::new(Mutex::new(HashMap::new())),
            fallback: fallback.into(),
            available: Availability::default(),
        }
    }

    /// Pin an address to a country.
    pub fn set_country(&self, ip: IpAddr, country_code: impl Into<String>) {
        if let Ok(mut countries) = lock(&self.countries) {
            countries.insert(ip, country_code.into());
        }
    }

    /// Simulate an outage of the lookup service.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }
}

impl Default for MockGeoLocator {
    fn default() -> Self {
        Self::new("US")
    }
}

impl GeoLocator for MockGeoLocator {
    async fn country_code(&self, ip: &IpAddr) -> Result<String> {
        self.available.check("geolocation")?;
        Ok(lock(&self.countries)?
            .get(ip)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
