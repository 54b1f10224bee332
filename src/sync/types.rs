use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::SyncSettings,
    telemetry::{PositionRecord, StateRecord, DEFAULT_MAX_AGE},
};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_SYNC_CONCURRENCY: usize = 16;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between periodic ticks.
    pub interval: Duration,
    /// Age past which a record is reported as stale.
    pub stale_after: Duration,
    /// Upper bound on concurrent per-asset reads inside one tick.
    pub max_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            stale_after: DEFAULT_MAX_AGE,
            max_concurrency: DEFAULT_SYNC_CONCURRENCY,
        }
    }
}

impl From<&SyncSettings> for SyncConfig {
    fn from(s: &SyncSettings) -> Self {
        Self {
            interval: s.interval(),
            stale_after: s.stale_after(),
            max_concurrency: s.max_concurrency.max(1),
        }
    }
}

/// Current telemetry of one asset as read from the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSnapshot {
    pub position: Option<PositionRecord>,
    pub state: Option<StateRecord>,
}

impl AssetSnapshot {
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.state.is_none()
    }
}

/// Outcome of checking one asset's telemetry for freshness and health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Result of one completed tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Sequence number of the tick, starting at 1.
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Size of the active set at the start of the tick.
    pub active: usize,
    pub snapshots: Arc<HashMap<String, AssetSnapshot>>,
}

impl TickReport {
    pub fn synced(&self) -> usize {
        self.snapshots.len()
    }
}

/// What happened to a tick request.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(TickReport),
    /// A previous tick was still in flight.
    Skipped,
    /// The active set could not be listed.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}
