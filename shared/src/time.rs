//! Time utilities for workmesh components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp with nanosecond accuracy, carried on the wire as plain
/// nanoseconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp {
    nanos_since_epoch: u64,
}

impl Timestamp {
    /// Get current timestamp
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            nanos_since_epoch: now.as_nanos() as u64,
        }
    }

    /// Create timestamp from nanoseconds since epoch
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            nanos_since_epoch: nanos,
        }
    }

    /// Create timestamp from seconds since epoch
    pub fn from_secs(secs: u64) -> Self {
        Self {
            nanos_since_epoch: secs * 1_000_000_000,
        }
    }

    /// Get nanoseconds since epoch
    pub fn as_nanos(&self) -> u64 {
        self.nanos_since_epoch
    }

    /// Get seconds since epoch
    pub fn as_secs(&self) -> u64 {
        self.nanos_since_epoch / 1_000_000_000
    }

    /// Duration elapsed since this timestamp, zero if it lies in the future
    pub fn elapsed(&self) -> Duration {
        let now = Self::now();
        Duration::from_nanos(now.nanos_since_epoch.saturating_sub(self.nanos_since_epoch))
    }

    /// Add duration to timestamp
    pub fn add(&self, duration: Duration) -> Self {
        Self {
            nanos_since_epoch: self.nanos_since_epoch + duration.as_nanos() as u64,
        }
    }

    /// Subtract duration from timestamp, saturating at the epoch
    pub fn sub(&self, duration: Duration) -> Self {
        Self {
            nanos_since_epoch: self
                .nanos_since_epoch
                .saturating_sub(duration.as_nanos() as u64),
        }
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        let secs = self.as_secs() as i64;
        let nanos = (self.nanos_since_epoch % 1_000_000_000) as u32;

        DateTime::<Utc>::from_timestamp(secs, nanos)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
            .to_rfc3339()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(system_time: SystemTime) -> Self {
        let duration = system_time.duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            nanos_since_epoch: duration.as_nanos() as u64,
        }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(timestamp: Timestamp) -> Self {
        UNIX_EPOCH + Duration::from_nanos(timestamp.nanos_since_epoch)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timestamp_creation() {
        let ts1 = Timestamp::now();
        thread::sleep(Duration::from_millis(10));
        let ts2 = Timestamp::now();

        assert!(ts2 > ts1);
        assert!(ts1.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::from_secs(1000);
        let future = ts.add(Duration::from_secs(100));
        let past = ts.sub(Duration::from_secs(100));

        assert_eq!(future.as_secs(), 1100);
        assert_eq!(past.as_secs(), 900);
    }

    #[test]
    fn test_future_timestamp_elapsed_is_zero() {
        let future = Timestamp::now().add(Duration::from_secs(3600));
        assert_eq!(future.elapsed(), Duration::ZERO);
    }
}
