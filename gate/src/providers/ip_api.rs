//! ip-api.com geolocation.

use crate::constants::UNKNOWN_COUNTRY;
use crate::error::{GateError, Result};
use crate::providers::GeoLocator;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;

/// Geolocation through the ip-api.com JSON endpoint.
///
/// # Example
///
/// ```no_run
/// use auth_gate::providers::IpApiLocator;
///
/// let locator = IpApiLocator::new();
/// ```
#[derive(Clone, Debug)]
pub struct IpApiLocator {
    http_client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    country_code: Option<String>,
}

impl IpApiLocator {
    /// Create a locator against the public endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
            base_url: "http://ip-api.com/json".to_string(),
        }
    }

    /// Point the locator at another endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for IpApiLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoLocator for IpApiLocator {
    async fn country_code(&self, ip: &IpAddr) -> Result<String> {
        let response = self
            .http_client
            .get(format!("{}/{ip}?fields=status,countryCode", self.base_url))
            .send()
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("geolocation lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GateError::StoreUnavailable(format!(
                "geolocation lookup returned {}",
                response.status()
            )));
        }

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| GateError::Serialization(e.to_string()))?;

        let code = match (body.status.as_deref(), body.country_code) {
            (Some("success"), Some(code)) if !code.is_empty() => code.to_ascii_uppercase(),
            _ => UNKNOWN_COUNTRY.to_string(),
        };

        Ok(code)
    }
}
