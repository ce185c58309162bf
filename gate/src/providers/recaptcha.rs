//! Google reCAPTCHA verification.

use crate::config::RecaptchaConfig;
use crate::error::{GateError, Result};
use crate::providers::CaptchaVerifier;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;

/// reCAPTCHA `siteverify` client.
///
/// Version 2 responses carry no score and pass on `success` alone; version 3
/// responses must also reach the configured minimum score.
#[derive(Clone, Debug)]
pub struct RecaptchaVerifier {
    config: RecaptchaConfig,
    http_client: Client,
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    score: Option<f64>,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

impl RecaptchaVerifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(config: RecaptchaConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
        }
    }

    fn accepts(&self, response: &SiteVerifyResponse) -> bool {
        response.success && response.score.unwrap_or(1.0) >= self.config.min_score
    }
}

impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: &IpAddr) -> Result<bool> {
        if token.is_empty() {
            return Ok(false);
        }

        let ip = remote_ip.to_string();
        let form = [
            ("secret", self.config.secret.as_str()),
            ("response", token),
            ("remoteip", ip.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.config.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GateError::StoreUnavailable(format!("CAPTCHA verification failed: {e}")))?;

        let body: SiteVerifyResponse = response
            .json()
            .await
            .map_err(|e| GateError::Serialization(e.to_string()))?;

        if !body.success {
            tracing::debug!(errors = ?body.error_codes, "CAPTCHA rejected");
        }

        Ok(self.accepts(&body))
    }
}
