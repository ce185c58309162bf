//! Mock location tracker for testing.

use crate::error::Result;
use crate::mocks::{Availability, lock};
use crate::providers::LocationTracker;
use crate::state::{LocationRecord, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory last-location records.
#[derive(Debug, Clone, Default)]
pub struct MockLocationTracker {
    locations: Arc<Mutex<HashMap<UserId, LocationRecord>>>,
    available: Availability,
}

impl MockLocationTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }
}

impl LocationTracker for MockLocationTracker {
    async fn record_location(&self, user_id: &UserId, country_code: &str, now: DateTime<Utc>) -> Result<()> {
        self.available.check("location tracker")?;
        lock(&self.locations)?.insert(
            user_id.clone(),
            LocationRecord {
                country_code: country_code.to_string(),
                observed_at: now,
            },
        );
        Ok(())
    }

    async fn last_location(&self, user_id: &UserId) -> Result<Option<LocationRecord>> {
        self.available.check("location tracker")?;
        Ok(lock(&self.locations)?.get(user_id).cloned())
    }
}
