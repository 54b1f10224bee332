//! Telemetry storage.
//!
//! - `storage`: the async `KvBackend` trait.
//! - `memory`: in-process backend on `DashMap`.
//! - `redis_store`: Redis backend over a reconnecting `ConnectionManager`.
//! - `engine`: backend selection from configuration.
//! - `keys`: cache key layout.
//! - `store`: `TelemetryStore`, the typed latest-value cache.

pub mod engine;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod storage;
pub mod store;

pub use engine::*;
pub use keys::*;
pub use memory::*;
pub use redis_store::*;
pub use storage::*;
pub use store::*;
