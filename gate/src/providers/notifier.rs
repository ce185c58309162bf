//! One-time code delivery trait.

use crate::error::Result;
use crate::state::UserId;

/// Delivers second-factor codes to users.
///
/// Delivery failures are logged by the caller and never fail issuance; the
/// user can ask for a resend.
pub trait CodeNotifier: Send + Sync {
    /// Send `code` to the user.
    ///
    /// # Errors
    ///
    /// Returns error if the delivery channel rejects the message.
    fn send_code(
        &self,
        user_id: &UserId,
        email: Option<&str>,
        code: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
