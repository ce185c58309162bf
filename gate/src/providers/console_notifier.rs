//! Console code notifier for development and testing.

use crate::error::Result;
use crate::providers::CodeNotifier;
use crate::state::UserId;
use crate::utils::mask_email;
use tracing::info;

/// Console code notifier.
///
/// Prints the one-time code to stdout instead of delivering it. Logs carry
/// only the masked recipient; the code itself is never logged.
///
/// # Examples
///
/// ```ignore
/// use auth_gate::providers::ConsoleCodeNotifier;
///
/// let notifier = ConsoleCodeNotifier::new();
/// notifier.send_code(&UserId::new("u1"), Some("user@example.com"), "042137").await?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct ConsoleCodeNotifier;

impl ConsoleCodeNotifier {
    /// Create a new console notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeNotifier for ConsoleCodeNotifier {
    async fn send_code(&self, user_id: &UserId, email: Option<&str>, code: &str) -> Result<()> {
        let to = email.map_or_else(|| user_id.to_string(), mask_email);

        info!(user_id = %user_id, to = %to, "Second-factor code issued (development mode)");
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                  VERIFICATION CODE                           ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ To: {to:<57}║");
        println!("║ Code: {code:<55}║");
        println!("║ This code expires in 10 minutes.{:<29}║", "");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        Ok(())
    }
}
