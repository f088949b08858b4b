//! Query gate and answer providers.
//!
//! The engine does not produce answers itself. It checks that a query
//! names a `Completed` index and carries non-blank text, then hands the
//! `(index id, query)` pair unmodified to a [`QueryProvider`]. Rejected
//! queries never reach the provider.
//!
//! # Usage
//!
//! ```bash
//! kb query --index <index-id> "what is X"
//! ```

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use shared_kb_core::validate::validate_query;
use shared_kb_core::{Index, KbError, ValidationError};

use crate::config::QueryConfig;
use crate::engine::KnowledgeBase;

/// Produces an answer for a query against an index.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    async fn answer(&self, index_id: &str, query: &str) -> Result<String>;
}

/// Stand-in for vector search: waits, then returns a canned answer that
/// quotes the query.
pub struct SimulatedProvider {
    latency: Duration,
}

impl SimulatedProvider {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(Duration::from_millis(config.latency_ms))
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

#[async_trait]
impl QueryProvider for SimulatedProvider {
    async fn answer(&self, _index_id: &str, query: &str) -> Result<String> {
        tokio::time::sleep(self.latency).await;
        Ok(format!(
            "This is a simulated vector search answer for your query: \"{}\". \
             The result is based on documents within the selected index. In a real \
             application, this would contain contextually relevant information extracted \
             from the indexed PDFs, providing precise and accurate answers to user questions.",
            query
        ))
    }
}

impl KnowledgeBase {
    /// Indexes that may be targeted by a query.
    pub async fn eligible_indexes(&self) -> Vec<Index> {
        let state = self.shared.state.lock().await;
        state
            .indexes
            .iter()
            .filter(|i| i.is_queryable())
            .cloned()
            .collect()
    }

    pub async fn is_queryable(&self, index_id: &str) -> bool {
        let state = self.shared.state.lock().await;
        state
            .indexes
            .iter()
            .any(|i| i.id == index_id && i.is_queryable())
    }

    /// Answer `text` against the selected index.
    ///
    /// Rejected without contacting the provider when no index is selected,
    /// the text is blank, or the index is missing or not `Completed`. The
    /// engine lock is not held while the provider runs.
    pub async fn query(&self, index_id: Option<&str>, text: &str) -> Result<String, KbError> {
        let index_id = validate_query(index_id, text)?;
        if !self.is_queryable(index_id).await {
            return Err(ValidationError::IndexNotQueryable.into());
        }
        self.shared
            .provider
            .answer(index_id, text)
            .await
            .map_err(KbError::Provider)
    }
}

/// CLI entry point for `kb query`.
pub async fn run_query(kb: &KnowledgeBase, index_id: Option<&str>, text: &str) -> Result<()> {
    match kb.query(index_id, text).await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(KbError::Validation(e)) => {
            eprintln!("Error: {}", e.reason());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
