//! Identity provider trait.

use crate::state::{FederatedIdentity, TokenSet, UserId, UserProfile};
use thiserror::Error;

/// Identity provider failure.
///
/// Only `InvalidCredentials` counts against the lockout counter; the other
/// variants describe the provider, not the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdpError {
    /// The credentials, code or token were wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The provider refused the request for another reason.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached, timed out or failed internally.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for identity-provider calls.
pub type IdpResult<T> = std::result::Result<T, IdpError>;

/// Issues and validates credentials and tokens.
///
/// The gate never sees password hashes or signing keys; everything
/// credential-related is delegated here.
pub trait IdentityProvider: Send + Sync {
    /// Password grant.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for a wrong email/password pair.
    fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = IdpResult<TokenSet>> + Send;

    /// Refresh-token grant.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown, expired or revoked refresh token.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl std::future::Future<Output = IdpResult<TokenSet>> + Send;

    /// Authorization-code grant.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown or reused code.
    fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> impl std::future::Future<Output = IdpResult<TokenSet>> + Send;

    /// Find the local user for a federated identity, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the user can be neither found nor created.
    fn resolve_federated_user(
        &self,
        identity: &FederatedIdentity,
    ) -> impl std::future::Future<Output = IdpResult<UserProfile>> + Send;

    /// Issue tokens for a user already vouched for by a federated issuer.
    ///
    /// # Errors
    ///
    /// `Rejected` when token exchange is not permitted for the client.
    fn exchange_federated(
        &self,
        user_id: &UserId,
        subject_token: &str,
    ) -> impl std::future::Future<Output = IdpResult<TokenSet>> + Send;

    /// Profile of a user.
    ///
    /// # Errors
    ///
    /// `Rejected` when the user does not exist.
    fn user_profile(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = IdpResult<UserProfile>> + Send;

    /// Revoke a refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the logout.
    fn revoke(&self, refresh_token: &str) -> impl std::future::Future<Output = IdpResult<()>> + Send;
}
