//! Location tracker trait.

use crate::error::Result;
use crate::state::{LocationRecord, UserId};
use chrono::{DateTime, Utc};

/// Last coarse location per user.
pub trait LocationTracker: Send + Sync {
    /// Upsert the user's location.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached.
    fn record_location(
        &self,
        user_id: &UserId,
        country_code: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Last recorded location, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be reached or the record is corrupt.
    fn last_location(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<LocationRecord>>> + Send;
}
