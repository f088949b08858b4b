//! In-memory [`SnapshotStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Nothing survives the
//! process; clone the `Arc` to share one store between engine instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::SnapshotStore;

/// In-memory snapshot store.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    values: RwLock<HashMap<String, Value>>,
    saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current value under `key`, read synchronously.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .read()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        values.insert(key.to_string(), value.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
