/// Connects the change bus and sync coordinator to the broadcast gateway.
pub mod bridge;
/// Settings loading: defaults, TOML file, environment.
pub mod config;
/// Telemetry cache: key schema, backends (in-memory, Redis), TelemetryStore.
pub mod engine;
/// Common error types: storage, bus, validation, client commands.
pub mod error;
/// Viewer connections, rooms and fan-out.
pub mod gateway;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// HTTP/WebSocket server and health endpoints.
pub mod network;
/// Component wiring and the producer write path.
pub mod pipeline;
/// Pub/Sub: Broker, Subscription, Message, ChangeBus.
pub mod pubsub;
/// Periodic reconciliation and health checks.
pub mod sync;
/// Position and state records, change events.
pub mod telemetry;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use bridge::{Bridge, BridgeStats};
pub use crate::config::{Settings, StorageConfig, StorageType};
pub use engine::{InMemoryStore, KvBackend, RedisStore, StorageEngine, TelemetryStore};
pub use error::{
    BusError, CommandError, ErrorExt, StatusCode, StoreError, StoreResult, ValidationError,
};
pub use gateway::{BroadcastGateway, ClientCommand, ClientId, Room, ServerMessage};
pub use pipeline::{Pipeline, PipelineOptions, TelemetryProducer};
pub use pubsub::{BusPublisher, BusSubscriber, ChangeBus, ChangeStream};
pub use sync::{AssetSnapshot, SyncConfig, SyncCoordinator, ValidationReport};
pub use telemetry::{ChangeEvent, ChangePayload, PositionRecord, StateRecord};
