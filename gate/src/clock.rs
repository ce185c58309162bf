//! Time source.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Velocity checks and mocked TTLs read time through this trait so tests
/// can move time forward without sleeping.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
