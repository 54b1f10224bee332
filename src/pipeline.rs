use std::sync::Arc;

use tracing::info;

use crate::{
    bridge::Bridge,
    config::Settings,
    engine::TelemetryStore,
    error::{BusError, StoreResult},
    gateway::BroadcastGateway,
    pubsub::{BusPublisher, ChangeBus},
    sync::{SyncConfig, SyncCoordinator},
    telemetry::{PositionRecord, StateRecord},
};

/// Write side used by telemetry producers: cache first, then announce.
#[derive(Clone)]
pub struct TelemetryProducer {
    store: TelemetryStore,
    publisher: BusPublisher,
}

impl TelemetryProducer {
    pub fn new(
        store: TelemetryStore,
        publisher: BusPublisher,
    ) -> Self {
        Self { store, publisher }
    }

    /// Stores the position and announces it. Nothing is published when the
    /// write fails.
    pub async fn record_position(
        &self,
        asset_id: &str,
        position: &PositionRecord,
    ) -> StoreResult<()> {
        self.store.set_position(asset_id, position).await?;
        self.publisher.publish_position(asset_id, position);
        Ok(())
    }

    pub async fn record_state(
        &self,
        asset_id: &str,
        state: &StateRecord,
    ) -> StoreResult<()> {
        self.store.set_state(asset_id, state).await?;
        self.publisher.publish_state(asset_id, state);
        Ok(())
    }
}

/// Sizes of the in-process queues.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub bus_capacity: usize,
    pub client_queue_size: usize,
    pub sync: SyncConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            client_queue_size: crate::gateway::DEFAULT_CLIENT_QUEUE,
            sync: SyncConfig::default(),
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(s: &Settings) -> Self {
        Self {
            bus_capacity: s.bus.capacity,
            client_queue_size: s.gateway.client_queue_size,
            sync: SyncConfig::from(&s.sync),
        }
    }
}

/// All pipeline components wired together. Cheap to share behind an `Arc`.
pub struct Pipeline {
    pub store: TelemetryStore,
    pub bus: ChangeBus,
    pub sync: SyncCoordinator,
    pub gateway: BroadcastGateway,
    pub bridge: Bridge,
}

impl Pipeline {
    /// Builds the components and starts the bridge. Periodic sync is left
    /// to the caller.
    pub fn start(
        store: TelemetryStore,
        options: PipelineOptions,
    ) -> Result<Arc<Self>, BusError> {
        let bus = ChangeBus::new(options.bus_capacity);
        let sync = SyncCoordinator::new(store.clone(), options.sync);
        let gateway = BroadcastGateway::new(options.client_queue_size);
        let bridge = Bridge::start(&bus.subscriber(), gateway.clone(), sync.clone())?;
        info!(backend = store.backend_name(), "Pipeline started");
        Ok(Arc::new(Self {
            store,
            bus,
            sync,
            gateway,
            bridge,
        }))
    }

    pub fn producer(&self) -> TelemetryProducer {
        TelemetryProducer::new(self.store.clone(), self.bus.publisher())
    }

    /// Stops the sync timer, then the bridge. An in-flight sync batch is
    /// allowed to finish on its own.
    pub async fn shutdown(&self) {
        self.sync.stop_periodic();
        self.bridge.shutdown().await;
        info!("Pipeline stopped");
    }
}
