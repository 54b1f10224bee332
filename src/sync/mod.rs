//! Periodic reconciliation of the telemetry cache.
//!
//! - `types`: snapshots, validation reports, tick reports and configuration.
//! - `coordinator`: `SyncCoordinator`, the batched reader and its scheduler.

pub mod coordinator;
pub mod types;

pub use coordinator::*;
pub use types::*;
