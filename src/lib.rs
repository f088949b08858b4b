//! # Shared KB
//!
//! **Lifecycle engine for a document ingestion and retrieval knowledge base.**
//!
//! Shared KB tracks uploaded documents through a processing lifecycle,
//! groups completed documents into named indexes, syncs those indexes, and
//! gates free-text queries to indexes that finished syncing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌───────────────┐
//! │   CLI    │──▶│      KnowledgeBase       │──▶│ SnapshotStore │
//! │   (kb)   │   │ documents │ indexes │ ⏲  │   │ SQLite / mem  │
//! └──────────┘   └────┬─────────────┬───────┘   └───────────────┘
//!                     │             │
//!                     ▼             ▼
//!             ┌──────────────┐ ┌───────────────┐
//!             │   Observer   │ │ QueryProvider │
//!             │ stderr/json  │ │  (simulated)  │
//!             └──────────────┘ └───────────────┘
//! ```
//!
//! ## Lifecycles
//!
//! | Entity | States | Driven by |
//! |--------|--------|-----------|
//! | Document | `Pending → Processing → Completed` | one deferred task per document |
//! | Index | `Created → Syncing → Completed` | `sync_index`, then one deferred task |
//!
//! Deleting an entity aborts its deferred task; every deferred step also
//! re-checks that its target exists, so a deleted entity is never revived.
//!
//! ## Quick Start
//!
//! ```bash
//! kb init
//! kb doc upload a.pdf --wait
//! kb index create --name Idx1 <doc-id>
//! kb index sync <index-id> --wait
//! kb query --index <index-id> "what is X"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`engine`] | `KnowledgeBase`: state, persistence, resume, idle tracking |
//! | [`documents`] | Document operations and their deferred processing task |
//! | [`indexes`] | Index operations and the deferred sync task |
//! | [`query`] | Query gate, `QueryProvider` trait, simulated provider |
//! | [`scheduler`] | Per-entity deferred task handles |
//! | [`observer`] | Lifecycle events and their stderr/JSON reporters |
//! | [`api_key`] | Bearer token generation and rotation |
//! | [`sqlite_store`] | SQLite-backed `SnapshotStore` |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Schema migrations (idempotent) |

pub mod api_key;
pub mod config;
pub mod db;
pub mod documents;
pub mod engine;
pub mod indexes;
pub mod migrate;
pub mod observer;
pub mod query;
pub mod scheduler;
pub mod sqlite_store;

pub use engine::{KnowledgeBase, KnowledgeBaseBuilder};
pub use observer::{LifecycleEvent, LifecycleObserver, ObserverMode};
pub use query::{QueryProvider, SimulatedProvider};
pub use shared_kb_core::store;
pub use shared_kb_core::{
    Document, DocumentStatus, Index, IndexStatus, KbError, ValidationError,
};
