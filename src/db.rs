//! SQLite database connection management.
//!
//! The snapshot database is a single file holding one row per snapshot
//! key. The file and its parent directories are created on first use and
//! WAL journaling is enabled.
//!
//! Only one engine may write a database at a time: each engine loads the
//! collections once and overwrites them on every save. [`lock_writer`]
//! claims the database for the lifetime of the process, so a second `kb`
//! command fails fast while `kb wait` (or any other command) is running.

use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::Config;

/// Exclusive claim on a snapshot database. Released when dropped.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    _file: File,
}

impl WriterLock {
    /// The lock file next to the database.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open a connection pool to the configured snapshot database.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the
/// database cannot be opened.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;
    create_parent_dir(db_path)?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Claim the configured database for this process.
///
/// Takes an exclusive lock on `<db path>.lock` without blocking.
///
/// # Errors
///
/// Returns an error if another process (or another engine in this
/// process) already holds the lock.
pub fn lock_writer(config: &Config) -> Result<WriterLock> {
    let db_path = &config.db.path;
    create_parent_dir(db_path)?;

    let path = lock_path(db_path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
    fs2::FileExt::try_lock_exclusive(&file).map_err(|_| {
        anyhow!(
            "database at '{}' is already in use by another kb process",
            db_path.display()
        )
    })?;

    Ok(WriterLock { path, _file: file })
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}
