//! OpenID Connect identity provider (Keycloak-style realm).

use crate::config::OidcConfig;
use crate::error::GateError;
use crate::providers::identity::{IdpError, IdpResult};
use crate::providers::{IdentityProvider, KeyCache};
use crate::state::{FederatedIdentity, TokenSet, UserId, UserProfile};
use crate::token::role_from_realm_roles;
use crate::utils::mask_email;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Service-account tokens are reused for this long.
const ADMIN_TOKEN_TTL: Duration = Duration::from_secs(50);

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Identity provider speaking the OIDC token endpoint and realm admin API.
///
/// # Example
///
/// ```no_run
/// use auth_gate::config::OidcConfig;
/// use auth_gate::providers::OidcIdentityProvider;
///
/// let idp = OidcIdentityProvider::new(OidcConfig::new(
///     "https://idp.example.com/realms/main",
///     "https://idp.example.com/admin/realms/main",
///     "gate",
///     "client-secret",
/// ));
/// ```
#[derive(Clone, Debug)]
pub struct OidcIdentityProvider {
    config: OidcConfig,
    http_client: Client,
    admin_token: Arc<KeyCache<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
}

impl From<TokenResponse> for TokenSet {
    fn from(r: TokenResponse) -> Self {
        Self {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            expires_in: r.expires_in.unwrap_or(300),
            token_type: r.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminUser {
    id: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct RoleRepresentation {
    name: String,
}

impl OidcIdentityProvider {
    /// Create a provider for a realm.
    #[must_use]
    pub fn new(config: OidcConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
            admin_token: Arc::new(KeyCache::new(ADMIN_TOKEN_TTL)),
        }
    }

    /// Map a non-success response to an `IdpError`.
    async fn error_from(response: Response) -> IdpError {
        let status = response.status();
        if status.is_server_error() {
            return IdpError::Unavailable(format!("identity provider returned {status}"));
        }

        let body: Option<OAuthErrorBody> = response.json().await.ok();
        let (error, description) = body
            .map(|b| (b.error.unwrap_or_default(), b.error_description.unwrap_or_default()))
            .unwrap_or_default();

        match (status, error.as_str()) {
            (StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED, "invalid_grant") => {
                IdpError::InvalidCredentials
            }
            (StatusCode::UNAUTHORIZED, _) => IdpError::InvalidCredentials,
            _ => IdpError::Rejected(if description.is_empty() {
                format!("{status} {error}")
            } else {
                description
            }),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> IdpResult<TokenSet> {
        let response = self
            .http_client
            .post(self.config.token_endpoint())
            .form(form)
            .send()
            .await
            .map_err(|e| IdpError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdpError::Unavailable(format!("malformed token response: {e}")))?;

        Ok(body.into())
    }

    /// Service-account token for admin calls.
    async fn admin_token(&self) -> IdpResult<String> {
        self.admin_token
            .get_or_refresh(|| async {
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", self.config.client_id.as_str()),
                    ("client_secret", self.config.client_secret.as_str()),
                ];
                self.token_request(&form)
                    .await
                    .map(|t| t.access_token)
                    .map_err(|e| GateError::IdentityProvider(e.to_string()))
            })
            .await
            .map_err(|e| IdpError::Unavailable(e.to_string()))
    }

    async fn admin_get<T: serde::de::DeserializeOwned>(&self, path: &str) -> IdpResult<T> {
        let token = self.admin_token().await?;
        let response = self
            .http_client
            .get(format!("{}{path}", self.config.admin_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdpError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| IdpError::Unavailable(format!("malformed admin response: {e}")))
    }

    async fn find_by_email(&self, email: &str) -> IdpResult<Option<AdminUser>> {
        let token = self.admin_token().await?;
        let response = self
            .http_client
            .get(format!("{}/users", self.config.admin_url))
            .query(&[("email", email), ("exact", "true")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdpError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let users: Vec<AdminUser> = response
            .json()
            .await
            .map_err(|e| IdpError::Unavailable(format!("malformed user search: {e}")))?;

        Ok(users.into_iter().next())
    }

    async fn create_federated_user(&self, identity: &FederatedIdentity) -> IdpResult<Option<String>> {
        let token = self.admin_token().await?;
        let (first_name, last_name) = split_name(identity.name.as_deref());
        let body = serde_json::json!({
            "enabled": true,
            "username": identity.email,
            "email": identity.email,
            "emailVerified": identity.email_verified,
            "firstName": first_name,
            "lastName": last_name,
            "attributes": { "provider": ["google"], "google_id": [identity.subject] },
        });

        let response = self
            .http_client
            .post(format!("{}/users", self.config.admin_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| IdpError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::CREATED => Ok(response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| loc.rsplit("/users/").next())
                .map(str::to_string)),
            // Lost a race with a concurrent login for the same email.
            StatusCode::CONFLICT => Ok(None),
            _ => Err(Self::error_from(response).await),
        }
    }
}

/// Split a display name into first and last name.
fn split_name(name: Option<&str>) -> (String, String) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return ("Google".to_string(), "User".to_string());
    };
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

impl IdentityProvider for OidcIdentityProvider {
    async fn authenticate(&self, email: &str, password: &str) -> IdpResult<TokenSet> {
        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", email),
            ("password", password),
            ("scope", self.config.scope.as_str()),
        ];
        self.token_request(&form).await
    }

    async fn refresh(&self, refresh_token: &str) -> IdpResult<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form).await
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> IdpResult<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.token_request(&form).await
    }

    async fn resolve_federated_user(&self, identity: &FederatedIdentity) -> IdpResult<UserProfile> {
        let user_id = match self.find_by_email(&identity.email).await? {
            Some(existing) => existing.id,
            None => match self.create_federated_user(identity).await? {
                Some(id) => {
                    tracing::info!(email = %mask_email(&identity.email), user_id = %id, "Federated user created");
                    id
                }
                None => self
                    .find_by_email(&identity.email)
                    .await?
                    .map(|u| u.id)
                    .ok_or_else(|| IdpError::Rejected("user exists but cannot be retrieved".into()))?,
            },
        };

        self.user_profile(&UserId::new(user_id)).await
    }

    async fn exchange_federated(&self, user_id: &UserId, subject_token: &str) -> IdpResult<TokenSet> {
        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("subject_token", subject_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("subject_issuer", "google"),
            ("requested_subject", user_id.as_str()),
        ];
        self.token_request(&form).await
    }

    async fn user_profile(&self, user_id: &UserId) -> IdpResult<UserProfile> {
        let user: AdminUser = self.admin_get(&format!("/users/{}", user_id.as_str())).await?;
        let roles: Vec<RoleRepresentation> = self
            .admin_get(&format!("/users/{}/role-mappings/realm", user_id.as_str()))
            .await?;
        let role_names: Vec<String> = roles.into_iter().map(|r| r.name).collect();

        Ok(UserProfile {
            user_id: UserId::new(user.id),
            email: user.email.unwrap_or_default(),
            role: role_from_realm_roles(&role_names),
        })
    }

    async fn revoke(&self, refresh_token: &str) -> IdpResult<()> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http_client
            .post(self.config.logout_endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| IdpError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}
