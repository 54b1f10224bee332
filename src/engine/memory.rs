use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use super::storage::KvBackend;
use crate::error::{StoreError, StoreResult};

/// Value kinds the in-memory backend can hold under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Set(HashSet<String>),
}

/// Process-local backend on a sharded concurrent map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<DashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_str(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>> {
        match self.data.get(key).as_deref() {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::Set(_)) => Err(wrong_type(key, "string")),
        }
    }
}

fn wrong_type(
    key: &str,
    expected: &str,
) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected: expected.to_string(),
    }
}

#[async_trait]
impl KvBackend for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>> {
        self.read_str(key)
    }

    async fn mget(
        &self,
        keys: &[String],
    ) -> StoreResult<Vec<Option<String>>> {
        keys.iter().map(|k| self.read_str(k)).collect()
    }

    async fn set(
        &self,
        key: &str,
        value: String,
    ) -> StoreResult<()> {
        self.data.insert(key.to_string(), Value::Str(value));
        Ok(())
    }

    async fn mset(
        &self,
        entries: Vec<(String, String)>,
    ) -> StoreResult<()> {
        for (key, value) in entries {
            self.data.insert(key, Value::Str(value));
        }
        Ok(())
    }

    async fn del(
        &self,
        keys: &[String],
    ) -> StoreResult<u64> {
        let removed = keys
            .iter()
            .filter(|k| self.data.remove(k.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn sadd(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut e) => match e.get_mut() {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                Value::Str(_) => Err(wrong_type(key, "set")),
            },
            Entry::Vacant(e) => {
                e.insert(Value::Set(HashSet::from([member.to_string()])));
                Ok(true)
            }
        }
    }

    async fn srem(
        &self,
        key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        let Some(mut entry) = self.data.get_mut(key) else {
            return Ok(false);
        };
        let removed = match entry.value_mut() {
            Value::Set(set) => set.remove(member),
            Value::Str(_) => return Err(wrong_type(key, "set")),
        };
        let now_empty = matches!(entry.value(), Value::Set(s) if s.is_empty());
        drop(entry);
        // empty sets disappear, as in Redis
        if now_empty {
            self.data
                .remove_if(key, |_, v| matches!(v, Value::Set(s) if s.is_empty()));
        }
        Ok(removed)
    }

    async fn smembers(
        &self,
        key: &str,
    ) -> StoreResult<Vec<String>> {
        match self.data.get(key).as_deref() {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(Value::Str(_)) => Err(wrong_type(key, "set")),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Basic test to verify that a value can be set and then retrieved.
    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        store.set("hello", "world".into()).await.unwrap();
        assert_eq!(store.get("hello").await.unwrap(), Some("world".into()));
    }

    /// Ensures that setting a value twice for the same key overwrites the old one.
    #[tokio::test]
    async fn test_overwrite_value() {
        let store = InMemoryStore::new();
        store.set("k", "one".into()).await.unwrap();
        store.set("k", "two".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("two".into()));
    }

    /// Tests bulk set and bulk get, including a missing key.
    #[tokio::test]
    async fn test_mset_and_mget() {
        let store = InMemoryStore::new();
        store
            .mset(vec![("k1".into(), "1".into()), ("k2".into(), "2".into())])
            .await
            .unwrap();
        let got = store
            .mget(&["k1".into(), "missing".into(), "k2".into()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some("1".into()), None, Some("2".into())]);
    }

    #[tokio::test]
    async fn test_del_counts_existing_keys() {
        let store = InMemoryStore::new();
        store.set("a", "x".into()).await.unwrap();
        let n = store.del(&["a".into(), "nope".into()]).await.unwrap();
        assert_eq!(n, 1);
        assert!(store.data.is_empty());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = InMemoryStore::new();
        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert!(store.sadd("s", "b").await.unwrap());

        let mut members = store.smembers("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        assert!(store.srem("s", "a").await.unwrap());
        assert!(!store.srem("s", "a").await.unwrap());
        assert!(store.srem("s", "b").await.unwrap());
        // пустое множество удаляется целиком
        assert!(store.data.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = InMemoryStore::new();
        store.set("k", "v".into()).await.unwrap();
        assert!(matches!(
            store.sadd("k", "m").await,
            Err(StoreError::WrongType { .. })
        ));
        store.sadd("s", "m").await.unwrap();
        assert!(matches!(
            store.get("s").await,
            Err(StoreError::WrongType { .. })
        ));
    }
}
