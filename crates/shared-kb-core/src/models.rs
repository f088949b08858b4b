//! Entity models tracked by the knowledge base.
//!
//! Both entity kinds carry a closed status enum with a single legal
//! successor per state. Statuses only ever move forward through
//! [`DocumentStatus::next`] / [`IndexStatus::next`]; any other write is
//! rejected by [`DocumentStatus::can_advance_to`] / [`IndexStatus::can_advance_to`].
//!
//! ```text
//! Document:  Pending ──▶ Processing ──▶ Completed
//! Index:     Created ──▶ Syncing    ──▶ Completed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
}

impl DocumentStatus {
    /// The only status this one may advance to, or `None` when terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            DocumentStatus::Pending => Some(DocumentStatus::Processing),
            DocumentStatus::Processing => Some(DocumentStatus::Completed),
            DocumentStatus::Completed => None,
        }
    }

    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "Pending",
            DocumentStatus::Processing => "Processing",
            DocumentStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync status of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexStatus {
    Created,
    Syncing,
    Completed,
}

impl IndexStatus {
    /// The only status this one may advance to, or `None` when terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            IndexStatus::Created => Some(IndexStatus::Syncing),
            IndexStatus::Syncing => Some(IndexStatus::Completed),
            IndexStatus::Completed => None,
        }
    }

    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexStatus::Created => "Created",
            IndexStatus::Syncing => "Syncing",
            IndexStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document moving through the processing lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub status: DocumentStatus,
    pub content: String,
}

impl Document {
    /// Allocate a new `Pending` document with a fresh UUID and simulated content.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let content = simulated_content(&name);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            status: DocumentStatus::Pending,
            content,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }
}

/// Placeholder body for a document; text extraction is not performed.
fn simulated_content(name: &str) -> String {
    format!(
        "Simulated text extracted from \"{}\". Real extraction is not performed.",
        name
    )
}

/// A named, fixed snapshot of completed documents with its own sync status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub id: String,
    pub name: String,
    pub documents: Vec<Document>,
    pub status: IndexStatus,
}

impl Index {
    /// Create a `Created` index over copies of `documents`.
    pub fn new(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            documents,
            status: IndexStatus::Created,
        }
    }

    /// Only fully synced indexes may be targeted by a query.
    pub fn is_queryable(&self) -> bool {
        self.status == IndexStatus::Completed
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.documents.iter().any(|d| d.id == document_id)
    }

    /// Drop a deleted document from the snapshot. Returns `true` if it was present.
    pub fn prune_document(&mut self, document_id: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != document_id);
        self.documents.len() != before
    }
}
