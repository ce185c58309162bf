//! Device trust tracker trait.

use crate::error::Result;
use crate::state::{DeviceRecord, UserId};
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Per-(user, device) trust records.
///
/// Fingerprints are hashed before they are used as keys. Records live for
/// 30 days from their last write.
pub trait DeviceTracker: Send + Sync {
    /// Create an untrusted record if none exists.
    ///
    /// # Returns
    ///
    /// `true` if a record was created, `false` if one already existed.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn register_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        ip: &IpAddr,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Whether the device is trusted.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn is_trusted(
        &self,
        user_id: &UserId,
        fingerprint: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Mark a registered device as trusted.
    ///
    /// Called only after a login has completed fully.
    ///
    /// # Returns
    ///
    /// `false` if no record exists for the device.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn trust(
        &self,
        user_id: &UserId,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Load a device record.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached or the record is corrupt.
    fn get_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
    ) -> impl std::future::Future<Output = Result<Option<DeviceRecord>>> + Send;
}
