//! # Shared KB Core
//!
//! Runtime-free logic for Shared KB: the document and index models with
//! their status transition tables, input validation, and the snapshot
//! store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or timers. The
//! lifecycle engine that schedules deferred transitions lives in the
//! `shared-kb` crate and builds on the types defined here.

pub mod error;
pub mod models;
pub mod store;
pub mod validate;

pub use error::{KbError, ValidationError};
pub use models::{Document, DocumentStatus, Index, IndexStatus};
