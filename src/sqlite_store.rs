//! SQLite-backed [`SnapshotStore`] implementation.
//!
//! Each snapshot key maps to one row of the `snapshots` table. Saves are
//! upserts, so the table never holds more than one value per key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use shared_kb_core::store::SnapshotStore;

/// SQLite implementation of the [`SnapshotStore`] trait.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Keys currently present, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM snapshots ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM snapshots WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let text: String = row.get("value");
                let value = serde_json::from_str(&text)
                    .with_context(|| format!("Corrupt snapshot under key '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO snapshots (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&text)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
