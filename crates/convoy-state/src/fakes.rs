//! In-memory fake for the storage trait (testing only).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{StateStore, StorageResult};

/// In-memory state store backed by a `HashMap` plus a lock set.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, serde_json::Value>>,
    locks: Mutex<HashSet<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls observed, for persistence-cadence assertions.
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(key.to_string(), value);
        Ok(())
    }

    async fn acquire_lock(&self, key: &str) -> StorageResult<bool> {
        let mut locks = self.locks.lock().unwrap();
        Ok(locks.insert(key.to_string()))
    }

    async fn release_lock(&self, key: &str) -> StorageResult<bool> {
        let mut locks = self.locks.lock().unwrap();
        Ok(locks.remove(key))
    }
}
