use async_trait::async_trait;

use super::{InMemoryStore, KvBackend, RedisStore};
use crate::{
    config::{StorageConfig, StorageType},
    error::{StoreError, StoreResult},
};

/// Backend selected by configuration.
#[derive(Debug, Clone)]
pub enum StorageEngine {
    InMemory(InMemoryStore),
    Redis(RedisStore),
}

impl StorageEngine {
    /// Initialize storage engine based on the passed configuration.
    pub async fn initialize(config: &StorageConfig) -> StoreResult<Self> {
        match &config.storage_type {
            StorageType::Memory => Ok(Self::InMemory(InMemoryStore::new())),
            StorageType::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    StoreError::unavailable("redis", "storage.redis_url is not set")
                })?;
                Ok(Self::Redis(RedisStore::connect(url).await?))
            }
        }
    }

    /// Gets a reference to the concrete backend via the common trait.
    pub fn get_store(&self) -> &dyn KvBackend {
        match self {
            Self::InMemory(store) => store,
            Self::Redis(store) => store,
        }
    }
}

#[async_trait]
impl KvBackend for StorageEngine {
    fn name(&self) -> &'static str {
        self.get_store().name()
    }

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>> {
        self.get_store().get(key).await
    }

    async fn mget(
        &self,
        keys: &[String],
    ) -> StoreResult<Vec<Option<String>>> {
        self.get_store().mget(keys).await
    }

    async fn set(
        &self,
        key: &str,
        value: String,
    ) -> StoreResult<()> {
        self.get_store().set(key, value).await
    }

    async fn mset(
        &self,
        entries: Vec<(String, String)>,
    ) -> StoreResult<()> {
        self.get_store().mset(entries).await
    }

    async fn del(
        &self,
        keys: &[String],
    ) -> StoreResult<u64> {
        self.get_store().del(keys).await
    }

    async fn sadd(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        self.get_store().sadd(key, member).await
    }

    async fn srem(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        self.get_store().srem(key, member).await
    }

    async fn smembers(
        &self,
        key: &str,
    ) -> StoreResult<Vec<String>> {
        self.get_store().smembers(key).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.get_store().ping().await
    }
}
