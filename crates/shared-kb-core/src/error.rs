//! Error types surfaced by knowledge base operations.
//!
//! Only three things can go wrong: the caller supplied invalid input
//! ([`ValidationError`]), the snapshot store failed, or the query provider
//! failed. Stale identifiers are never errors.

use thiserror::Error;

/// A rejected request. No state was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Index name cannot be empty.")]
    EmptyIndexName,
    #[error("Please select at least one document.")]
    EmptySelection,
    #[error("Please select an index.")]
    NoIndexSelected,
    #[error("Query cannot be empty.")]
    BlankQuery,
    #[error("Index is not ready for querying.")]
    IndexNotQueryable,
}

impl ValidationError {
    /// Human-readable rejection reason.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Error returned by knowledge base operations.
#[derive(Debug, Error)]
pub enum KbError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The in-memory mutation was applied but could not be persisted.
    #[error("snapshot store failure: {0:#}")]
    Persistence(anyhow::Error),

    #[error("query provider failure: {0:#}")]
    Provider(anyhow::Error),
}

impl KbError {
    pub fn is_validation(&self) -> bool {
        matches!(self, KbError::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            KbError::Validation(e) => Some(e),
            _ => None,
        }
    }
}
