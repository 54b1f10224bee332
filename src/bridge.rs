//! Связка шины изменений и синхронизации с шлюзом рассылки.
//!
//! `Bridge` подписывается на глобальный поток изменений и является
//! единственной границей проверки данных от производителей: конверт без
//! `assetId` или с некорректной полезной нагрузкой логируется и
//! отбрасывается, до зрителей доходят только проверенные события.
//!
//! Порядок событий одного актива сохраняется, так как поток читает одна
//! задача. Снимки синхронизации и события шины могут приходить вперемешку;
//! зритель всегда видит последнее пришедшее значение.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{BusError, ErrorExt, StoreResult},
    gateway::BroadcastGateway,
    pubsub::{BusSubscriber, ChangeStream},
    sync::{AssetSnapshot, SyncCoordinator, TickReport},
    telemetry::{ChangeEvent, ChangePayload},
};

/// Текст события `vehicleError`.
pub const VEHICLE_ERROR_MESSAGE: &str = "Vehicle has errors";

#[derive(Default)]
struct BridgeCounters {
    routed: AtomicU64,
    rejected: AtomicU64,
    refreshed: AtomicU64,
}

/// Снимок счётчиков моста.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Событий шины, переданных шлюзу.
    pub routed: u64,
    /// Событий, не прошедших проверку.
    pub rejected: u64,
    /// Снимков, отправленных из синхронизации.
    pub refreshed: u64,
}

pub struct Bridge {
    gateway: BroadcastGateway,
    sync: SyncCoordinator,
    counters: Arc<BridgeCounters>,
    shutdown_tx: watch::Sender<bool>,
    events_task: Mutex<Option<JoinHandle<()>>>,
    ticks_task: Mutex<Option<JoinHandle<()>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Bridge {
    /// Подписывается на глобальный поток и запускает две задачи: разбор
    /// событий шины и пересылку отчётов периодической синхронизации.
    ///
    /// Должен вызываться внутри runtime Tokio.
    pub fn start(
        subscriber: &BusSubscriber,
        gateway: BroadcastGateway,
        sync: SyncCoordinator,
    ) -> Result<Self, BusError> {
        let stream = subscriber.subscribe_global()?;
        let ticks = sync.subscribe_ticks();
        let counters = Arc::new(BridgeCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let events_task = tokio::spawn(run_events(
            stream,
            gateway.clone(),
            counters.clone(),
            shutdown_rx.clone(),
        ));
        let ticks_task = tokio::spawn(run_ticks(ticks, gateway.clone(), counters.clone(), shutdown_rx));

        info!("Bridge started");
        Ok(Self {
            gateway,
            sync,
            counters,
            shutdown_tx,
            events_task: Mutex::new(Some(events_task)),
            ticks_task: Mutex::new(Some(ticks_task)),
        })
    }

    /// Читает актуальный снимок актива и отправляет его зрителям.
    pub async fn refresh_one(
        &self,
        asset_id: &str,
    ) -> StoreResult<AssetSnapshot> {
        let snapshot = self.sync.sync_one(asset_id).await?;
        push_snapshot(&self.gateway, &self.counters, asset_id, &snapshot);
        Ok(snapshot)
    }

    /// Синхронизирует все активные активы и отправляет их снимки.
    ///
    /// Возвращает число отправленных активов.
    pub async fn refresh_all(&self) -> StoreResult<usize> {
        let snapshots = self.sync.sync_all().await?;
        for (asset_id, snapshot) in &snapshots {
            push_snapshot(&self.gateway, &self.counters, asset_id, snapshot);
        }
        debug!(assets = snapshots.len(), "Refreshed all active assets");
        Ok(snapshots.len())
    }

    pub fn is_running(&self) -> bool {
        self.events_task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            routed: self.counters.routed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            refreshed: self.counters.refreshed.load(Ordering::Relaxed),
        }
    }

    /// Отписывается от шины и останавливает задачи моста.
    ///
    /// Сначала задача событий отписывается от потока и завершается, затем
    /// останавливается пересылка отчётов. Повторный вызов ничего не делает.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let events = self.events_task.lock().take();
        if let Some(task) = events {
            if let Err(e) = task.await {
                warn!(error = %e, "Bridge event task ended abnormally");
            }
        }
        let ticks = self.ticks_task.lock().take();
        if let Some(task) = ticks {
            task.abort();
            let _ = task.await;
        }
        info!("Bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        for slot in [&self.events_task, &self.ticks_task] {
            if let Some(task) = slot.lock().take() {
                task.abort();
            }
        }
    }
}

/// Передаёт проверенное событие шлюзу. Возвращает число доставок.
pub fn route_event(
    gateway: &BroadcastGateway,
    event: &ChangeEvent,
) -> usize {
    match &event.payload {
        ChangePayload::Position(position) => gateway.broadcast_position(&event.asset_id, position),
        ChangePayload::State(state) => {
            let mut delivered = gateway.broadcast_state(&event.asset_id, state);
            if state.has_errors() {
                delivered +=
                    gateway.broadcast_error(&event.asset_id, state.error_codes(), VEHICLE_ERROR_MESSAGE);
            }
            delivered
        }
    }
}

fn push_snapshot(
    gateway: &BroadcastGateway,
    counters: &BridgeCounters,
    asset_id: &str,
    snapshot: &AssetSnapshot,
) {
    if let Some(position) = &snapshot.position {
        gateway.broadcast_position(asset_id, position);
    }
    if let Some(state) = &snapshot.state {
        gateway.broadcast_state(asset_id, state);
    }
    if !snapshot.is_empty() {
        counters.refreshed.fetch_add(1, Ordering::Relaxed);
    }
}

async fn run_events(
    mut stream: ChangeStream,
    gateway: BroadcastGateway,
    counters: Arc<BridgeCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    let delivered = route_event(&gateway, &event);
                    counters.routed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        asset_id = %event.asset_id,
                        kind = ?event.kind(),
                        delivered,
                        "Routed change event"
                    );
                }
                Some(Err(e)) => {
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, status = %e.status_code(), "Dropping invalid change event");
                }
                None => {
                    warn!("Change stream closed");
                    break;
                }
            },
        }
    }
    stream.unsubscribe();
}

async fn run_ticks(
    mut ticks: broadcast::Receiver<TickReport>,
    gateway: BroadcastGateway,
    counters: Arc<BridgeCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            report = ticks.recv() => match report {
                Ok(report) => {
                    for (asset_id, snapshot) in report.snapshots.iter() {
                        push_snapshot(&gateway, &counters, asset_id, snapshot);
                    }
                    debug!(tick = report.tick, assets = report.synced(), "Forwarded sync tick");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Bridge fell behind sync ticks");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use tokio::{sync::mpsc, time::timeout};

    use super::*;
    use crate::{
        engine::TelemetryStore,
        gateway::OutboundFrame,
        pubsub::ChangeBus,
        sync::SyncConfig,
        telemetry::{PositionRecord, StateRecord, POSITION_CHANNEL},
    };

    fn setup() -> (ChangeBus, TelemetryStore, BroadcastGateway, SyncCoordinator) {
        let store = TelemetryStore::in_memory();
        let sync = SyncCoordinator::new(store.clone(), SyncConfig::default());
        (ChangeBus::new(64), store, BroadcastGateway::new(16), sync)
    }

    async fn recv(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("queue closed");
        serde_json::from_str(&frame).unwrap()
    }

    /// Тест проверяет, что состояние с кодами ошибок порождает
    /// `stateChange` и `vehicleError`.
    #[tokio::test]
    async fn test_state_with_errors_emits_vehicle_error() {
        let (bus, _store, gw, sync) = setup();
        let bridge = Bridge::start(&bus.subscriber(), gw.clone(), sync).unwrap();
        let (id, mut rx) = gw.connect();
        gw.subscribe_vehicle(id, "veh-3").unwrap();

        let state = StateRecord::new(0.0, 50.0, Utc::now())
            .unwrap()
            .with_error_codes(["E01"]);
        bus.publisher().publish_state("veh-3", &state);

        let first = recv(&mut rx).await;
        let second = recv(&mut rx).await;
        assert_eq!(first["type"], "stateChange");
        assert_eq!(second["type"], "vehicleError");
        assert_eq!(second["errorCodes"][0], "E01");
        assert_eq!(second["message"], VEHICLE_ERROR_MESSAGE);

        bridge.shutdown().await;
    }

    /// Тест проверяет, что некорректный конверт отбрасывается, а следующее
    /// корректное событие доходит до зрителя.
    #[tokio::test]
    async fn test_invalid_envelope_is_dropped() {
        let (bus, _store, gw, sync) = setup();
        let bridge = Bridge::start(&bus.subscriber(), gw.clone(), sync).unwrap();
        let (id, mut rx) = gw.connect();
        gw.subscribe_all(id).unwrap();

        let publisher = bus.publisher();
        publisher.publish_raw(POSITION_CHANNEL, r#"{"assetId":"","position":{}}"#);
        publisher.publish_raw(POSITION_CHANNEL, "not json");
        let position =
            PositionRecord::new(1.0, 1.0, 0.0, 10.0, DateTime::from_timestamp_millis(1).unwrap())
                .unwrap();
        publisher.publish_position("veh-1", &position);

        let frame = recv(&mut rx).await;
        assert_eq!(frame["assetId"], "veh-1");
        assert_eq!(bridge.stats().rejected, 1);
        assert!(rx.try_recv().is_err());

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_one_pushes_snapshot() {
        let (bus, store, gw, sync) = setup();
        let bridge = Bridge::start(&bus.subscriber(), gw.clone(), sync).unwrap();
        let (id, mut rx) = gw.connect();
        gw.subscribe_vehicle(id, "veh-1").unwrap();

        let now = Utc::now();
        let position = PositionRecord::new(2.0, 3.0, 0.0, 90.0, now).unwrap();
        store.set_position("veh-1", &position).await.unwrap();

        let snapshot = bridge.refresh_one("veh-1").await.unwrap();
        assert_eq!(snapshot.position.as_ref(), Some(&position));
        assert!(snapshot.state.is_none());
        assert_eq!(recv(&mut rx).await["type"], "positionUpdate");
        assert_eq!(bridge.stats().refreshed, 1);

        bridge.shutdown().await;
    }

    /// Тест проверяет, что после остановки мост отписан от шины.
    #[tokio::test]
    async fn test_shutdown_unsubscribes() {
        let (bus, _store, gw, sync) = setup();
        let bridge = Bridge::start(&bus.subscriber(), gw, sync).unwrap();
        assert!(bridge.is_running());

        bridge.shutdown().await;
        assert!(!bridge.is_running());
        assert_eq!(bus.publisher().publish_raw(POSITION_CHANNEL, "{}"), 0);

        bridge.shutdown().await;
    }
}
