//! Masking, validation and timeout helpers.

use crate::error::{GateError, Result};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

/// Mask an email for logs.
///
/// Keeps the first and last character of the local part; local parts of two
/// characters or fewer are fully hidden.
///
/// # Examples
///
/// ```
/// use auth_gate::utils::mask_email;
///
/// assert_eq!(mask_email("alice@example.com"), "a***e@example.com");
/// assert_eq!(mask_email("al@example.com"), "**@example.com");
/// assert_eq!(mask_email("not-an-email"), "***");
/// ```
#[must_use]
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "***".to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    match chars.as_slice() {
        [first, .., last] if chars.len() > 2 => format!("{first}***{last}@{domain}"),
        _ => format!("**@{domain}"),
    }
}

/// Mask an IP address for logs.
///
/// # Examples
///
/// ```
/// use auth_gate::utils::mask_ip;
///
/// assert_eq!(mask_ip(&"203.0.113.7".parse().unwrap()), "203.0.***.***");
/// assert_eq!(mask_ip(&"2001:db8::1".parse().unwrap()), "2001:db8:***:***");
/// ```
#[must_use]
pub fn mask_ip(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, _, _] = v4.octets();
            format!("{a}.{b}.***.***")
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            format!("{:x}:{:x}:***:***", segments[0], segments[1])
        }
    }
}

/// Hex-encoded SHA-256 digest.
///
/// Device fingerprints and refresh tokens are only ever stored hashed.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Key namespace for logs, without the email, IP or user it names.
///
/// # Examples
///
/// ```
/// use auth_gate::utils::key_prefix;
///
/// assert_eq!(key_prefix("login_attempts:ana@example.com"), "login_attempts");
/// assert_eq!(key_prefix("rate_limit:ip:2001:db8::1"), "rate_limit:ip");
/// ```
#[must_use]
pub fn key_prefix(key: &str) -> &str {
    let skip = if key.starts_with("rate_limit:") { "rate_limit:".len() } else { 0 };
    key[skip..].find(':').map_or(key, |end| &key[..skip + end])
}

/// Parse device type from user agent string.
///
/// Returns one of: "mobile", "tablet", "desktop"
///
/// # Examples
///
/// ```
/// use auth_gate::utils::parse_device_type;
///
/// assert_eq!(parse_device_type("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"), "mobile");
/// assert_eq!(parse_device_type("Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)"), "tablet");
/// assert_eq!(parse_device_type("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"), "desktop");
/// ```
#[must_use]
pub fn parse_device_type(user_agent: &str) -> &'static str {
    let ua = user_agent.to_lowercase();

    if ua.contains("ipad") || ua.contains("tablet") {
        return "tablet";
    }
    if ua.contains("iphone") || ua.contains("android") {
        return "mobile";
    }
    "desktop"
}

/// Validate email address format.
///
/// Requires exactly one `@`, non-empty local and domain parts, a dotted
/// domain without empty labels, and a length between 3 and 255.
///
/// # Examples
///
/// ```
/// use auth_gate::utils::is_valid_email;
///
/// assert!(is_valid_email("user+tag@sub.example.com"));
/// assert!(!is_valid_email("user@"));
/// assert!(!is_valid_email("user@example..com"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');

    local.chars().all(valid_local)
        && domain.chars().all(valid_domain)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Require a non-blank field.
///
/// # Errors
///
/// Returns `GateError::InvalidInput` naming the field when it is blank.
pub fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GateError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

/// Run a cache or provider call under a timeout.
///
/// # Errors
///
/// Returns the call's own error, or `GateError::StoreUnavailable` when the
/// timeout elapses first.
pub async fn within<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| GateError::StoreUnavailable(format!("call timed out after {timeout:?}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_email_short_local_part() {
        assert_eq!(mask_email("a@example.com"), "**@example.com");
        assert_eq!(mask_email("bob@example.com"), "b***b@example.com");
    }

    #[test]
    fn test_mask_ip_hides_host_octets() {
        let ip: IpAddr = "192.168.10.20".parse().unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let masked = mask_ip(&ip);
        assert_eq!(masked, "192.168.***.***");
        assert!(!masked.contains("20"));
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_key_prefix_drops_identifier() {
        let key = crate::constants::keys::rate_limit_ip("203.0.113.7");
        assert_eq!(key_prefix(&key), "rate_limit:ip");
        assert!(!key_prefix(&crate::constants::keys::captcha_required("ana@example.com")).contains('@'));
        assert_eq!(key_prefix("opaque"), "opaque");
    }

    #[test]
    fn test_device_type_of_android_tablet() {
        assert_eq!(parse_device_type("Mozilla/5.0 (Linux; Android 14; SM-X710) Tablet"), "tablet");
        assert_eq!(parse_device_type("Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile"), "mobile");
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("email", "  ").is_err());
        assert!(require("email", "a@b.co").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn test_within_maps_timeout_to_store_unavailable() {
        let result: Result<()> = within(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(GateError::StoreUnavailable(_))));
    }
}
