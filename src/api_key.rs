//! API key material.
//!
//! A single bearer token persisted in the snapshot store under
//! `"user-api-key"`. It is generated on first read and can be regenerated
//! at any time; the previous value is discarded. The token has no link to
//! the document or index lifecycles.
//!
//! # Usage
//!
//! ```bash
//! kb api-key show
//! kb api-key regenerate
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use shared_kb_core::store::{SnapshotStore, API_KEY_KEY};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteSnapshotStore;

/// Prefix of every generated key.
pub const KEY_PREFIX: &str = "sk-";

/// A fresh key: `sk-` followed by a hyphenless UUID v4.
pub fn generate_key() -> String {
    format!("{}{}", KEY_PREFIX, uuid::Uuid::new_v4().simple())
}

/// Reads and rotates the stored API key.
pub struct ApiKeyManager {
    store: Arc<dyn SnapshotStore>,
}

impl ApiKeyManager {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// The stored key, generating and saving one if none exists yet.
    pub async fn current(&self) -> Result<String> {
        let stored = self.store.load(API_KEY_KEY).await?;
        match stored {
            Some(Value::String(key)) if !key.is_empty() => Ok(key),
            _ => self.regenerate().await,
        }
    }

    /// Replace the stored key with a new one.
    pub async fn regenerate(&self) -> Result<String> {
        let key = generate_key();
        self.store
            .save(API_KEY_KEY, &Value::String(key.clone()))
            .await
            .context("Failed to save API key")?;
        Ok(key)
    }
}

async fn open_manager(config: &Config) -> Result<ApiKeyManager> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    Ok(ApiKeyManager::new(Arc::new(SqliteSnapshotStore::new(pool))))
}

/// CLI entry point for `kb api-key show`.
pub async fn run_show(config: &Config) -> Result<()> {
    let key = open_manager(config).await?.current().await?;
    println!("{}", key);
    Ok(())
}

/// CLI entry point for `kb api-key regenerate`.
pub async fn run_regenerate(config: &Config) -> Result<()> {
    let key = open_manager(config).await?.regenerate().await?;
    eprintln!("Regenerated API key. The previous key no longer works.");
    println!("{}", key);
    Ok(())
}
