//! Telemetry value types.
//!
//! - `position`: latest pose of an asset (`PositionRecord`).
//! - `state`: latest operational state (`StateRecord`) and health rules.
//! - `event`: change announcements carried on the bus.
//!
//! Records are immutable values. A write replaces the previous value
//! wholesale and timestamps travel as epoch milliseconds on the wire.

pub mod event;
pub mod position;
pub mod state;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub use event::*;
pub use position::*;
pub use state::*;

use crate::error::ValidationError;

/// Default age after which a position or state is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(5000);

/// `(now - timestamp) > max_age`. A record exactly `max_age` old is fresh.
pub fn is_stale_at(
    timestamp: DateTime<Utc>,
    max_age: Duration,
    now: DateTime<Utc>,
) -> bool {
    let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(timestamp) > max_age
}

pub fn epoch_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Drops sub-millisecond precision so a record equals its stored form.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

pub fn from_epoch_millis(ms: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp_millis(ms).ok_or(ValidationError::NotFinite { field: "timestamp" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_boundary_is_strict() {
        let now = DateTime::from_timestamp_millis(10_000).unwrap();
        let max = Duration::from_millis(5000);
        let at_threshold = DateTime::from_timestamp_millis(5_000).unwrap();
        let past_threshold = DateTime::from_timestamp_millis(4_999).unwrap();

        assert!(!is_stale_at(at_threshold, max, now));
        assert!(is_stale_at(past_threshold, max, now));
        assert!(!is_stale_at(now, max, now));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = DateTime::from_timestamp_millis(0).unwrap();
        let later = DateTime::from_timestamp_millis(60_000).unwrap();
        assert!(!is_stale_at(later, DEFAULT_MAX_AGE, now));
    }

    #[test]
    fn test_truncate_to_millis() {
        let ts = DateTime::from_timestamp(1_700_000_000, 554_438_230).unwrap();
        let truncated = truncate_to_millis(ts);
        assert_eq!(truncated, DateTime::from_timestamp(1_700_000_000, 554_000_000).unwrap());
        assert_eq!(truncate_to_millis(truncated), truncated);
    }

    #[test]
    fn test_epoch_millis_out_of_range() {
        assert!(from_epoch_millis(i64::MAX).is_err());
        let ts = from_epoch_millis(1_700_000_000_123).unwrap();
        assert_eq!(epoch_millis(ts), 1_700_000_000_123);
    }
}
