use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use super::{is_count, KeyValueStore, StoreError, StoreResult};

/// In process store with the same semantics as the redis one.
///
/// Clones share the same data. [`MemoryStore::disconnect`] makes every
/// command fail with [`StoreError::Connection`] until
/// [`MemoryStore::reconnect`], without touching the stored values.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<DashMap<String, String>>,
    disconnected: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    /// Reads a value bypassing the connection state.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn check(&self) -> StoreResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("memory store is disconnected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.check()?;
        match self.values.entry(key.to_owned()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(e) => {
                e.insert(value.to_owned());
                Ok(true)
            }
        }
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check()?;
        let mut entry = self.values.entry(key.to_owned()).or_insert_with(|| "0".into());
        let next = Some(entry.value().as_str())
            .filter(|v| is_count(v))
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| StoreError::Corrupt {
                key: key.to_owned(),
                value: entry.value().clone(),
            })?;
        *entry = next.to_string();
        Ok(next)
    }
}
