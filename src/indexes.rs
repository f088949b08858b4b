//! Index lifecycle: creation over completed documents, sync, deletion.
//!
//! An index is `Created` with a copy of the selected documents. `sync`
//! moves it to `Syncing` at once and spawns a single deferred task that
//! completes it. Sync is accepted only from `Created`, so repeated calls
//! never stack timers or transitions.
//!
//! # Usage
//!
//! ```bash
//! kb index create --name Idx1 <doc-id> <doc-id>
//! kb index sync <index-id> --wait
//! kb index list --ready
//! ```

use anyhow::Result;
use tracing::{debug, warn};

use shared_kb_core::validate::{select_completed, validate_index_request};
use shared_kb_core::{Index, IndexStatus, KbError};

use crate::engine::{KnowledgeBase, State};
use crate::observer::LifecycleEvent;

impl KnowledgeBase {
    /// Create an index over the selected documents.
    ///
    /// The name must be non-blank and the selection non-empty. The
    /// selection is re-checked against the current collection: only
    /// documents that still exist and are `Completed` are copied in, and
    /// the request is rejected if none remain.
    pub async fn add_index(&self, name: &str, selected: &[String]) -> Result<Index, KbError> {
        validate_index_request(name, selected)?;

        let mut state = self.shared.state.lock().await;
        let snapshot = select_completed(&state.documents, selected)?;
        if snapshot.len() < selected.len() {
            debug!(
                requested = selected.len(),
                kept = snapshot.len(),
                "dropped unfinished or unknown documents from index selection"
            );
        }

        let index = Index::new(name, snapshot);
        state.indexes.push(index.clone());
        self.emit(LifecycleEvent::IndexCreated {
            id: index.id.clone(),
            name: index.name.clone(),
            documents: index.documents.len(),
        });
        self.persist_indexes(&state).await?;
        Ok(index)
    }

    /// Delete an index and cancel its pending sync. Unknown ids are a no-op.
    pub async fn delete_index(&self, id: &str) -> Result<bool, KbError> {
        let mut state = self.shared.state.lock().await;
        let Some(pos) = state.indexes.iter().position(|i| i.id == id) else {
            return Ok(false);
        };
        state.indexes.remove(pos);
        state.index_timers.cancel(id);
        self.notify_if_idle(&state);
        self.emit(LifecycleEvent::IndexDeleted { id: id.to_string() });
        self.persist_indexes(&state).await?;
        Ok(true)
    }

    /// Start syncing a `Created` index.
    ///
    /// Returns `false` without doing anything when the index is unknown,
    /// already syncing, or already completed.
    pub async fn sync_index(&self, id: &str) -> Result<bool, KbError> {
        let mut state = self.shared.state.lock().await;
        if !self.apply_index_status(&mut state, id, IndexStatus::Syncing) {
            return Ok(false);
        }
        self.schedule_index_sync(&mut state, id);
        self.persist_indexes(&state).await?;
        Ok(true)
    }

    pub async fn indexes(&self) -> Vec<Index> {
        self.shared.state.lock().await.indexes.clone()
    }

    pub async fn index(&self, id: &str) -> Option<Index> {
        let state = self.shared.state.lock().await;
        state.indexes.iter().find(|i| i.id == id).cloned()
    }

    fn apply_index_status(&self, state: &mut State, id: &str, target: IndexStatus) -> bool {
        let Some(index) = state.indexes.iter_mut().find(|i| i.id == id) else {
            debug!(id, %target, "ignoring transition for unknown index");
            return false;
        };
        if !index.status.can_advance_to(target) {
            debug!(id, from = %index.status, to = %target, "ignoring illegal index transition");
            return false;
        }
        index.status = target;
        let event = LifecycleEvent::IndexAdvanced {
            id: index.id.clone(),
            name: index.name.clone(),
            status: target,
        };
        self.emit(event);
        true
    }

    /// Spawn the deferred `Syncing → Completed` task for an index.
    pub(crate) fn schedule_index_sync(&self, state: &mut State, id: &str) {
        let weak = self.downgrade();
        let delay = self.shared.timing.sync_delay();
        let task_id = id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(kb) = KnowledgeBase::upgrade(&weak) {
                kb.deferred_index_step(&task_id).await;
            }
        });
        state.index_timers.insert(id.to_string(), handle);
    }

    async fn deferred_index_step(&self, id: &str) {
        let mut state = self.shared.state.lock().await;
        let applied = self.apply_index_status(&mut state, id, IndexStatus::Completed);
        state.index_timers.finish(id);
        self.notify_if_idle(&state);
        if applied {
            if let Err(e) = self.persist_indexes(&state).await {
                warn!(id, error = %e, "failed to persist index transition");
            }
        }
    }
}

/// CLI entry point for `kb index create`.
pub async fn run_create(kb: &KnowledgeBase, name: &str, documents: &[String]) -> Result<()> {
    match kb.add_index(name, documents).await {
        Ok(index) => {
            println!(
                "{}  {}  {} document(s)",
                index.id,
                index.name,
                index.documents.len()
            );
            Ok(())
        }
        Err(KbError::Validation(e)) => {
            eprintln!("Error: {}", e.reason());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// CLI entry point for `kb index list`.
pub async fn run_list(kb: &KnowledgeBase, ready_only: bool) -> Result<()> {
    let indexes = if ready_only {
        kb.eligible_indexes().await
    } else {
        kb.indexes().await
    };
    if indexes.is_empty() {
        println!("No indexes. Run `kb index create` to build one from completed documents.");
        return Ok(());
    }
    for index in indexes {
        println!(
            "{}  {:<9}  {:>3} docs  {}",
            index.id,
            index.status.as_str(),
            index.documents.len(),
            index.name
        );
    }
    Ok(())
}

/// CLI entry point for `kb index sync <id>`.
pub async fn run_sync(kb: &KnowledgeBase, id: &str, wait: bool) -> Result<()> {
    if !kb.sync_index(id).await? {
        match kb.index(id).await {
            Some(index) => println!("Index {} is already {}", index.name, index.status),
            None => println!("No index with id {}", id),
        }
        return Ok(());
    }

    if wait {
        kb.resume().await;
        kb.wait_idle().await;
    }
    if let Some(index) = kb.index(id).await {
        println!("{}  {}  {}", index.id, index.status, index.name);
    }
    Ok(())
}

/// CLI entry point for `kb index delete <id>`.
pub async fn run_delete(kb: &KnowledgeBase, id: &str) -> Result<()> {
    if kb.delete_index(id).await? {
        println!("Deleted index {}", id);
    } else {
        println!("No index with id {}", id);
    }
    Ok(())
}
