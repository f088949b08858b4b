//! Snapshot storage abstraction for Shared KB.
//!
//! The [`SnapshotStore`] trait is a flat key-value contract: each key holds
//! one whole collection serialized as JSON. There are no partial or delta
//! updates; every save replaces the previous value (last writer wins).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Key holding the document collection.
pub const DOCUMENTS_KEY: &str = "documents";
/// Key holding the index collection.
pub const INDEXES_KEY: &str = "indexes";
/// Key holding the user's bearer token.
pub const API_KEY_KEY: &str = "user-api-key";

/// Durable key-value persistence for full-collection snapshots.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load`](SnapshotStore::load) | Read the value under a key, `None` if never written |
/// | [`save`](SnapshotStore::save) | Replace the value under a key |
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value stored under `key`.
    async fn save(&self, key: &str, value: &Value) -> Result<()>;
}

/// Load a collection, defaulting to empty when the key was never written.
pub async fn load_collection<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<Vec<T>> {
    match store.load(key).await? {
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("Failed to decode snapshot '{}'", key)),
        None => Ok(Vec::new()),
    }
}

/// Serialize and save a whole collection.
pub async fn save_collection<T: Serialize>(
    store: &dyn SnapshotStore,
    key: &str,
    items: &[T],
) -> Result<()> {
    let value = serde_json::to_value(items)
        .with_context(|| format!("Failed to encode snapshot '{}'", key))?;
    store.save(key, &value).await
}
