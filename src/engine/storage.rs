use async_trait::async_trait;

use crate::error::StoreResult;

/// Minimal key-value surface the telemetry cache needs from a backend.
///
/// Values are opaque strings (JSON text). Every call is a single backend
/// operation and is atomic per key; no multi-key transactions are assumed.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>>;

    /// Batched read in one round trip; the result is aligned with `keys`.
    async fn mget(
        &self,
        keys: &[String],
    ) -> StoreResult<Vec<Option<String>>>;

    async fn set(
        &self,
        key: &str,
        value: String,
    ) -> StoreResult<()>;

    async fn mset(
        &self,
        entries: Vec<(String, String)>,
    ) -> StoreResult<()>;

    /// Deletes the keys and returns how many existed.
    async fn del(
        &self,
        keys: &[String],
    ) -> StoreResult<u64>;

    /// Adds `member` to the set at `key`; `true` if it was not there yet.
    async fn sadd(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool>;

    /// Removes `member` from the set at `key`; `true` if it was present.
    async fn srem(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool>;

    async fn smembers(
        &self,
        key: &str,
    ) -> StoreResult<Vec<String>>;

    async fn ping(&self) -> StoreResult<()>;
}
