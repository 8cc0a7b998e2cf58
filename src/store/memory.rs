//! In-memory store backend.
//!
//! Backs tests and embedded use. All state sits behind one `RwLock`, so
//! every primitive is atomic with respect to the others; `list_pop_front`
//! and `set_cas` hold the write guard for their whole critical section.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, SettlerError};

use super::Store;

#[derive(Default)]
struct Inner {
    kv: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
}

/// Process-local store. Cheap to create per test.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.kv.contains_key(key) {
            return Ok(false);
        }
        inner.kv.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn set_cas(&self, key: &str, expected: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.kv.get(key) {
            Some(current) if current == expected => {
                inner.kv.insert(key.to_string(), value.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.kv.remove(key).is_some())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        let mut inner = self.inner.write().await;
        let current = match inner.kv.get(key) {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| SettlerError::Internal(format!("counter {key} is not an integer")))?,
            None => 0,
        };
        let next = current + by;
        inner.kv.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len() as u64)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.write().await;
        Ok(inner.lists.get_mut(key).and_then(|list| list.pop_front()))
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.lists.get(key).map_or(0, |list| list.len() as u64))
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .sets
            .get_mut(key)
            .map_or(false, |set| set.remove(member)))
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.sets.get(key).map_or(false, |set| set.contains(member)))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut removed = 0u64;
        inner.kv.retain(|key, _| {
            if key.starts_with(prefix) {
                removed += 1;
                false
            } else {
                true
            }
        });
        inner.lists.retain(|key, list| {
            if key.starts_with(prefix) {
                removed += list.len() as u64;
                false
            } else {
                true
            }
        });
        inner.sets.retain(|key, set| {
            if key.starts_with(prefix) {
                removed += set.len() as u64;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}
