use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{AssetSnapshot, SyncConfig, SyncStats, TickOutcome, TickReport, ValidationReport};
use crate::{engine::TelemetryStore, error::StoreResult};

const TICK_CHANNEL_CAPACITY: usize = 16;

struct SyncInner {
    store: TelemetryStore,
    config: SyncConfig,
    /// Set while a tick is running; the only reentrancy guard.
    in_flight: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    ticks_tx: broadcast::Sender<TickReport>,
    tick_seq: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Pulls the active set from the cache, in batches and on a timer.
///
/// One asset's read failure never fails the batch. Periodic ticks never
/// overlap: a tick that fires while the previous one is still running is
/// skipped, not queued.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<SyncInner>,
}

/// Clears the in-flight flag when the tick ends, even on panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    pub fn new(
        store: TelemetryStore,
        config: SyncConfig,
    ) -> Self {
        let (ticks_tx, _) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SyncInner {
                store,
                config,
                in_flight: AtomicBool::new(false),
                timer: Mutex::new(None),
                ticks_tx,
                tick_seq: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.inner.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Reads position and state of one asset concurrently. Stale records are
    /// logged and still returned.
    pub async fn sync_one(
        &self,
        asset_id: &str,
    ) -> StoreResult<AssetSnapshot> {
        let store = &self.inner.store;
        let (position, state) =
            tokio::try_join!(store.get_position(asset_id), store.get_state(asset_id))?;

        let max_age = self.inner.config.stale_after;
        if position.as_ref().is_some_and(|p| p.is_stale_after(max_age)) {
            warn!(asset_id, "Position data is stale");
        }
        if state.as_ref().is_some_and(|s| s.is_stale_after(max_age)) {
            warn!(asset_id, "State data is stale");
        }

        Ok(AssetSnapshot { position, state })
    }

    /// Syncs every active asset with bounded concurrency.
    ///
    /// Assets whose reads fail are logged and left out of the map. Fails only
    /// when the active set itself cannot be listed.
    pub async fn sync_all(&self) -> StoreResult<HashMap<String, AssetSnapshot>> {
        self.sync_batch().await.map(|(_, synced)| synced)
    }

    /// `sync_all` plus the size of the active set it started from.
    async fn sync_batch(&self) -> StoreResult<(usize, HashMap<String, AssetSnapshot>)> {
        let ids = self.inner.store.list_active().await?;
        let total = ids.len();

        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move {
                let res = self.sync_one(&id).await;
                (id, res)
            })
            .buffer_unordered(self.inner.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut synced = HashMap::with_capacity(results.len());
        for (id, res) in results {
            match res {
                Ok(snapshot) => {
                    synced.insert(id, snapshot);
                }
                Err(e) => error!(asset_id = %id, error = %e, "Failed to sync asset"),
            }
        }

        info!("Synced {} out of {} active assets", synced.len(), total);
        Ok((total, synced))
    }

    /// Runs one tick unless another is already running.
    pub async fn tick_once(&self) -> TickOutcome {
        let inner = &self.inner;
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            inner.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous sync tick still in flight, skipping");
            return TickOutcome::Skipped;
        }
        let _guard = InFlightGuard(&inner.in_flight);

        let tick = inner.tick_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Utc::now();
        let start = Instant::now();

        match self.sync_batch().await {
            Ok((active, snapshots)) => {
                let report = TickReport {
                    tick,
                    started_at,
                    duration: start.elapsed(),
                    active,
                    snapshots: Arc::new(snapshots),
                };
                inner.completed.fetch_add(1, Ordering::Relaxed);
                // нет подписчиков: не ошибка
                let _ = inner.ticks_tx.send(report.clone());
                TickOutcome::Completed(report)
            }
            Err(e) => {
                inner.failed.fetch_add(1, Ordering::Relaxed);
                error!(tick, error = %e, "Periodic sync failed");
                TickOutcome::Failed
            }
        }
    }

    /// Starts the fixed-delay timer. Returns `false` if it is already running.
    pub fn start_periodic(
        &self,
        interval: Duration,
    ) -> bool {
        let mut timer = self.inner.timer.lock();
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Periodic sync is already running");
            return false;
        }

        let weak: Weak<SyncInner> = Arc::downgrade(&self.inner);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // первый tick интервала срабатывает сразу
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let coordinator = SyncCoordinator { inner };
                // the batch runs detached so stopping the timer lets it finish
                tokio::spawn(async move {
                    coordinator.tick_once().await;
                });
            }
        }));

        info!(interval_ms = interval.as_millis() as u64, "Starting periodic sync");
        true
    }

    /// Starts the timer with the configured interval.
    pub fn start(&self) -> bool {
        self.start_periodic(self.inner.config.interval)
    }

    /// Stops the timer. A tick already in flight runs to completion.
    pub fn stop_periodic(&self) -> bool {
        match self.inner.timer.lock().take() {
            Some(handle) => {
                handle.abort();
                info!("Periodic sync stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_periodic_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn is_tick_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Reports of completed ticks, from now on.
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<TickReport> {
        self.inner.ticks_tx.subscribe()
    }

    /// Checks presence, freshness and health of one asset's telemetry.
    pub async fn validate_asset(
        &self,
        asset_id: &str,
    ) -> ValidationReport {
        let store = &self.inner.store;
        let max_age = self.inner.config.stale_after;

        let (position, state) =
            match tokio::try_join!(store.get_position(asset_id), store.get_state(asset_id)) {
                Ok(pair) => pair,
                Err(e) => {
                    error!(asset_id, error = %e, "Failed to validate asset data");
                    return ValidationReport::from_errors(vec![
                        "Validation failed due to error".to_string()
                    ]);
                }
            };

        let mut errors = Vec::new();
        match position {
            None => errors.push("Position data not found".to_string()),
            Some(p) if p.is_stale_after(max_age) => {
                errors.push("Position data is stale".to_string())
            }
            Some(_) => {}
        }
        match state {
            None => errors.push("State data not found".to_string()),
            Some(s) => {
                if s.is_stale_after(max_age) {
                    errors.push("State data is stale".to_string());
                }
                if !s.is_healthy() {
                    errors.push("Vehicle is not healthy".to_string());
                }
            }
        }
        ValidationReport::from_errors(errors)
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            completed: self.inner.completed.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta};

    use super::*;
    use crate::telemetry::{PositionRecord, StateRecord};

    fn fresh_position() -> PositionRecord {
        PositionRecord::new(1.0, 1.0, 0.0, 10.0, Utc::now()).unwrap()
    }

    fn coordinator() -> SyncCoordinator {
        SyncCoordinator::new(TelemetryStore::in_memory(), SyncConfig::default())
    }

    /// Тест проверяет, что sync_one возвращает обе записи, даже устаревшие.
    #[tokio::test]
    async fn test_sync_one_returns_stale_records() {
        let sync = coordinator();
        let old = DateTime::from_timestamp_millis(1_000).unwrap();
        let p = PositionRecord::new(0.0, 0.0, 0.0, 0.0, old).unwrap();
        sync.store().set_position("veh-1", &p).await.unwrap();

        let snap = sync.sync_one("veh-1").await.unwrap();
        assert_eq!(snap.position, Some(p));
        assert!(snap.state.is_none());
        assert!(sync.sync_one("ghost").await.unwrap().is_empty());
    }

    /// Тест проверяет отчёт валидации для отсутствующего актива.
    #[tokio::test]
    async fn test_validate_missing_asset() {
        let report = coordinator().validate_asset("ghost").await;
        assert!(!report.is_valid);
        assert_eq!(
            report.errors,
            vec!["Position data not found", "State data not found"]
        );
    }

    /// Тест проверяет отчёт валидации для устаревших и нездоровых данных.
    #[tokio::test]
    async fn test_validate_stale_and_unhealthy() {
        let sync = coordinator();
        let old = Utc::now() - TimeDelta::seconds(30);
        sync.store()
            .set_position("veh-1", &PositionRecord::new(0.0, 0.0, 0.0, 0.0, old).unwrap())
            .await
            .unwrap();
        sync.store()
            .set_state("veh-1", &StateRecord::new(0.0, 10.0, Utc::now()).unwrap())
            .await
            .unwrap();

        let report = sync.validate_asset("veh-1").await;
        assert_eq!(
            report.errors,
            vec!["Position data is stale", "Vehicle is not healthy"]
        );
    }

    #[tokio::test]
    async fn test_validate_healthy_asset() {
        let sync = coordinator();
        sync.store().set_position("veh-1", &fresh_position()).await.unwrap();
        sync.store()
            .set_state("veh-1", &StateRecord::new(1.0, 80.0, Utc::now()).unwrap())
            .await
            .unwrap();
        let report = sync.validate_asset("veh-1").await;
        assert!(report.is_valid, "{:?}", report.errors);
    }

    /// Тест проверяет, что завершённый tick рассылается подписчикам.
    #[tokio::test]
    async fn test_tick_report_is_broadcast() {
        let sync = coordinator();
        sync.store().set_position("a", &fresh_position()).await.unwrap();
        let mut ticks = sync.subscribe_ticks();

        assert!(matches!(sync.tick_once().await, TickOutcome::Completed(_)));
        let report = ticks.recv().await.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.synced(), 1);
        assert_eq!(sync.stats().completed, 1);
        assert!(!sync.is_tick_in_flight());
    }

    /// Тест проверяет запуск и остановку периодической синхронизации.
    #[tokio::test(start_paused = true)]
    async fn test_periodic_start_stop() {
        let sync = coordinator();
        let mut ticks = sync.subscribe_ticks();

        assert!(sync.start_periodic(Duration::from_millis(1000)));
        assert!(!sync.start_periodic(Duration::from_millis(1000)));
        assert!(sync.is_periodic_running());

        let report = time::timeout(Duration::from_millis(1500), ticks.recv())
            .await
            .expect("no tick")
            .unwrap();
        assert_eq!(report.tick, 1);

        assert!(sync.stop_periodic());
        assert!(!sync.is_periodic_running());
        assert!(!sync.stop_periodic());
    }
}
