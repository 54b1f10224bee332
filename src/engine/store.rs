use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use super::{InMemoryStore, KeySchema, KvBackend};
use crate::{
    error::{ErrorExt, StoreError, StoreResult},
    telemetry::{epoch_millis, PositionRecord, StateRecord},
};

/// Latest-value cache of asset telemetry plus the active-asset set.
///
/// The only component that mutates the cache. Every write refreshes the
/// asset's last-update marker and marks the asset live. Reads of corrupt
/// payloads yield `None`, are logged and counted; an unreachable backend is
/// an error.
#[derive(Clone)]
pub struct TelemetryStore {
    backend: Arc<dyn KvBackend>,
    corrupt_reads: Arc<AtomicU64>,
}

impl TelemetryStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            corrupt_reads: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn set_position(
        &self,
        asset_id: &str,
        position: &PositionRecord,
    ) -> StoreResult<()> {
        self.write(asset_id, KeySchema::position(asset_id), position)
            .await
    }

    pub async fn get_position(
        &self,
        asset_id: &str,
    ) -> StoreResult<Option<PositionRecord>> {
        self.read(KeySchema::position(asset_id)).await
    }

    /// Batched read in one backend round trip. Absent and corrupt entries are
    /// left out of the map.
    pub async fn get_positions(
        &self,
        asset_ids: &[String],
    ) -> StoreResult<HashMap<String, PositionRecord>> {
        self.read_many(asset_ids, KeySchema::position).await
    }

    pub async fn set_state(
        &self,
        asset_id: &str,
        state: &StateRecord,
    ) -> StoreResult<()> {
        self.write(asset_id, KeySchema::state(asset_id), state).await
    }

    pub async fn get_state(
        &self,
        asset_id: &str,
    ) -> StoreResult<Option<StateRecord>> {
        self.read(KeySchema::state(asset_id)).await
    }

    pub async fn get_states(
        &self,
        asset_ids: &[String],
    ) -> StoreResult<HashMap<String, StateRecord>> {
        self.read_many(asset_ids, KeySchema::state).await
    }

    /// Ids of every live asset, sorted.
    pub async fn list_active(&self) -> StoreResult<Vec<String>> {
        let mut ids = self.backend.smembers(KeySchema::ACTIVE_ASSETS).await?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Evicts an asset: drops its records, its marker and its active-set
    /// membership. Returns `false` if the asset was unknown.
    pub async fn remove(
        &self,
        asset_id: &str,
    ) -> StoreResult<bool> {
        let deleted = self.backend.del(&KeySchema::asset_keys(asset_id)).await?;
        let was_active = self
            .backend
            .srem(KeySchema::ACTIVE_ASSETS, asset_id)
            .await?;
        debug!(asset_id, deleted, "Asset evicted");
        Ok(was_active || deleted > 0)
    }

    /// Instant of the last write for an asset, if any.
    pub async fn last_update(
        &self,
        asset_id: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let key = KeySchema::last_update(asset_id);
        let raw = self.backend.get(&key).await?;
        Ok(raw.and_then(|v| {
            let parsed = v
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis);
            if parsed.is_none() {
                warn!(key = %key, value = %v, "Corrupted last-update marker");
            }
            parsed
        }))
    }

    pub async fn all_active_positions(&self) -> StoreResult<HashMap<String, PositionRecord>> {
        let ids = self.list_active().await?;
        self.get_positions(&ids).await
    }

    pub async fn all_active_states(&self) -> StoreResult<HashMap<String, StateRecord>> {
        let ids = self.list_active().await?;
        self.get_states(&ids).await
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.backend.ping().await
    }

    /// Stored payloads discarded as unreadable since startup.
    pub fn corrupt_reads(&self) -> u64 {
        self.corrupt_reads.load(Ordering::Relaxed)
    }

    async fn write<T: Serialize>(
        &self,
        asset_id: &str,
        key: String,
        record: &T,
    ) -> StoreResult<()> {
        let json = serde_json::to_string(record).map_err(|e| StoreError::Serialization {
            type_name: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        })?;
        let marker = epoch_millis(Utc::now()).to_string();
        self.backend
            .mset(vec![(key, json), (KeySchema::last_update(asset_id), marker)])
            .await?;
        self.backend
            .sadd(KeySchema::ACTIVE_ASSETS, asset_id)
            .await?;
        Ok(())
    }

    async fn read<T: DeserializeOwned>(
        &self,
        key: String,
    ) -> StoreResult<Option<T>> {
        let raw = self.backend.get(&key).await?;
        Ok(raw.and_then(|json| self.decode(&key, &json)))
    }

    async fn read_many<T: DeserializeOwned>(
        &self,
        asset_ids: &[String],
        key_of: fn(&str) -> String,
    ) -> StoreResult<HashMap<String, T>> {
        if asset_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = asset_ids.iter().map(|id| key_of(id)).collect();
        let values = self.backend.mget(&keys).await?;

        let found = asset_ids
            .iter()
            .zip(keys.iter().zip(values))
            .filter_map(|(id, (key, raw))| {
                let record = self.decode(key, raw.as_deref()?)?;
                Some((id.clone(), record))
            })
            .collect();
        Ok(found)
    }

    /// Corrupt payloads read as absent. Records are validated before they
    /// are written, so this only fires on outside tampering.
    fn decode<T: DeserializeOwned>(
        &self,
        key: &str,
        json: &str,
    ) -> Option<T> {
        match serde_json::from_str(json) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = StoreError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                let total = self.corrupt_reads.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    status = %err.status_code(),
                    error = %err,
                    corrupt_reads = total,
                    "Discarding unreadable telemetry payload"
                );
                None
            }
        }
    }
}
