//! Federated ID-token verification.

use crate::constants::limits;
use crate::error::{GateError, Result};
use crate::providers::KeyCache;
use crate::state::FederatedIdentity;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

/// Verifies ID tokens minted by a third-party issuer.
pub trait FederatedTokenVerifier: Send + Sync {
    /// Check signature, issuer, audience and expiry, and return the
    /// asserted identity.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` for an invalid token; `IdentityProvider` when
    /// the issuer's signing keys cannot be fetched.
    fn verify(
        &self,
        id_token: &str,
    ) -> impl std::future::Future<Output = Result<FederatedIdentity>> + Send;
}

#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

/// Google ID-token verifier.
///
/// Signing keys are fetched from Google's JWKS endpoint and cached for 24
/// hours. A token signed with a key id the cache does not know triggers one
/// early refetch, which picks up rotated keys.
#[derive(Clone, Debug)]
pub struct GoogleIdTokenVerifier {
    client_id: String,
    jwks_url: String,
    http_client: Client,
    keys: Arc<KeyCache<JwkSet>>,
}

impl GoogleIdTokenVerifier {
    /// Issuers Google uses in the `iss` claim.
    pub const ISSUERS: [&'static str; 2] = ["accounts.google.com", "https://accounts.google.com"];

    /// Create a verifier for tokens issued to `client_id`.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            jwks_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            http_client: Client::new(),
            keys: Arc::new(KeyCache::new(limits::SIGNING_KEY_CACHE_TTL)),
        }
    }

    /// Fetch keys from another endpoint.
    #[must_use]
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| GateError::IdentityProvider(format!("signing key fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GateError::IdentityProvider(format!(
                "signing key fetch returned {}",
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| GateError::IdentityProvider(format!("malformed key set: {e}")))?;

        tracing::info!(keys = keys.keys.len(), "Federated signing keys refreshed");
        Ok(keys)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        let keys = self.keys.get_or_refresh(|| self.fetch_keys()).await?;
        let keys = if keys.find(kid).is_some() {
            keys
        } else {
            self.keys.invalidate().await;
            self.keys.get_or_refresh(|| self.fetch_keys()).await?
        };

        let jwk = keys
            .find(kid)
            .ok_or_else(|| GateError::AuthenticationFailed("unknown signing key".into()))?;

        DecodingKey::from_jwk(jwk)
            .map_err(|e| GateError::AuthenticationFailed(format!("unusable signing key: {e}")))
    }
}

impl FederatedTokenVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        let header = decode_header(id_token)
            .map_err(|e| GateError::AuthenticationFailed(format!("malformed ID token: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| GateError::AuthenticationFailed("ID token has no key id".into()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&Self::ISSUERS);

        let data = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| GateError::AuthenticationFailed(format!("invalid ID token: {e}")))?;

        let claims = data.claims;
        let email = claims
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| GateError::AuthenticationFailed("ID token has no email".into()))?;

        Ok(FederatedIdentity {
            subject: claims.sub,
            email,
            email_verified: claims.email_verified,
            name: claims.name,
        })
    }
}
