use std::fmt;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::{debug, info};

use super::storage::KvBackend;
use crate::error::{StoreError, StoreResult};

const BACKEND: &str = "redis";

/// Redis-backed telemetry cache.
///
/// `ConnectionManager` reconnects on its own; a command issued while the
/// server is unreachable fails with `StoreError::Unavailable`.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

fn unavailable(e: redis::RedisError) -> StoreError {
    StoreError::unavailable(BACKEND, e)
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        info!(url, "Connecting to Redis");
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvBackend for RedisStore {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn mget(
        &self,
        keys: &[String],
    ) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = keys.len(), "MGET");
        let mut conn = self.conn.clone();
        redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<String>>>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn set(
        &self,
        key: &str,
        value: String,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(unavailable)
    }

    async fn mset(
        &self,
        entries: Vec<(String, String)>,
    ) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.mset::<_, _, ()>(entries.as_slice()).await.map_err(unavailable)
    }

    async fn del(
        &self,
        keys: &[String],
    ) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(unavailable)
    }

    async fn sadd(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: u64 = conn.sadd(key, member).await.map_err(unavailable)?;
        Ok(added > 0)
    }

    async fn srem(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.srem(key, member).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn smembers(
        &self,
        key: &str,
    ) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(unavailable)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}
