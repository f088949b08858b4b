//! Document lifecycle: upload, deferred processing, deletion.
//!
//! A document is created `Pending` and advanced by a single deferred task:
//! it sleeps for the delay of the current status, advances one step under
//! the engine lock, and repeats until `Completed`. Chaining both steps in
//! one task is what guarantees `Processing` is always observed before
//! `Completed`.
//!
//! # Usage
//!
//! ```bash
//! kb doc upload reports/a.pdf reports/b.pdf --wait
//! kb doc list
//! kb doc delete 550e8400-e29b-41d4-a716-446655440000
//! ```

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, warn};

use shared_kb_core::{Document, DocumentStatus, KbError};

use crate::config::UploadConfig;
use crate::engine::{KnowledgeBase, State};
use crate::observer::LifecycleEvent;

impl KnowledgeBase {
    /// Add a `Pending` document and schedule its processing.
    ///
    /// Returns immediately. On a persistence failure the document stays in
    /// memory and keeps progressing; the error is still returned.
    pub async fn add_document(&self, file_name: &str) -> Result<Document, KbError> {
        let doc = Document::new(file_name);
        let mut state = self.shared.state.lock().await;
        state.documents.push(doc.clone());
        self.emit(LifecycleEvent::DocumentAdded {
            id: doc.id.clone(),
            name: doc.name.clone(),
        });
        self.schedule_document(&mut state, &doc.id, doc.status);
        self.persist_documents(&state).await?;
        Ok(doc)
    }

    /// Delete a document and prune it from every index snapshot.
    ///
    /// Cancels its outstanding deferred transition. Unknown ids are a
    /// no-op. Returns `true` if anything changed. Both collections are
    /// saved even if the first save fails; the first error is returned.
    pub async fn delete_document(&self, id: &str) -> Result<bool, KbError> {
        let mut state = self.shared.state.lock().await;

        let removed = match state.documents.iter().position(|d| d.id == id) {
            Some(pos) => {
                state.documents.remove(pos);
                true
            }
            None => false,
        };
        if removed {
            state.document_timers.cancel(id);
            self.emit(LifecycleEvent::DocumentDeleted { id: id.to_string() });
        }

        let pruned = self.prune_document(&mut state, id);
        self.notify_if_idle(&state);

        let documents_saved = if removed {
            self.persist_documents(&state).await
        } else {
            Ok(())
        };
        let indexes_saved = if pruned {
            self.persist_indexes(&state).await
        } else {
            Ok(())
        };
        documents_saved.and(indexes_saved)?;
        Ok(removed || pruned)
    }

    /// Apply `target` to a document if it still exists and the transition
    /// is the next step in its lifecycle. Anything else is a no-op.
    pub async fn advance_document(
        &self,
        id: &str,
        target: DocumentStatus,
    ) -> Result<bool, KbError> {
        let mut state = self.shared.state.lock().await;
        if !self.apply_document_status(&mut state, id, target) {
            return Ok(false);
        }
        if target.is_terminal() && state.document_timers.cancel(id) {
            self.notify_if_idle(&state);
        }
        self.persist_documents(&state).await?;
        Ok(true)
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.shared.state.lock().await.documents.clone()
    }

    pub async fn document(&self, id: &str) -> Option<Document> {
        let state = self.shared.state.lock().await;
        state.documents.iter().find(|d| d.id == id).cloned()
    }

    /// Documents that may be selected for a new index.
    pub async fn completed_documents(&self) -> Vec<Document> {
        let state = self.shared.state.lock().await;
        state
            .documents
            .iter()
            .filter(|d| d.is_completed())
            .cloned()
            .collect()
    }

    fn apply_document_status(&self, state: &mut State, id: &str, target: DocumentStatus) -> bool {
        let Some(doc) = state.documents.iter_mut().find(|d| d.id == id) else {
            debug!(id, %target, "ignoring transition for unknown document");
            return false;
        };
        if !doc.status.can_advance_to(target) {
            debug!(id, from = %doc.status, to = %target, "ignoring illegal document transition");
            return false;
        }
        doc.status = target;
        let event = LifecycleEvent::DocumentAdvanced {
            id: doc.id.clone(),
            name: doc.name.clone(),
            status: target,
        };
        self.emit(event);
        true
    }

    /// Spawn the deferred task that walks a document from `from` to
    /// `Completed`.
    pub(crate) fn schedule_document(&self, state: &mut State, id: &str, from: DocumentStatus) {
        if from.is_terminal() {
            return;
        }
        let weak = self.downgrade();
        let timing = self.shared.timing.clone();
        let task_id = id.to_string();

        let handle = tokio::spawn(async move {
            let mut current = from;
            while let Some(delay) = timing.document_delay(current) {
                tokio::time::sleep(delay).await;
                let Some(kb) = KnowledgeBase::upgrade(&weak) else {
                    return;
                };
                match kb.deferred_document_step(&task_id).await {
                    Some(next) => current = next,
                    None => return,
                }
            }
        });
        state.document_timers.insert(id.to_string(), handle);
    }

    /// One deferred step: advance the document by exactly one status.
    ///
    /// Returns the new status while more steps remain, `None` once the
    /// document is gone or has reached `Completed`.
    async fn deferred_document_step(&self, id: &str) -> Option<DocumentStatus> {
        let mut state = self.shared.state.lock().await;

        let next = state
            .documents
            .iter()
            .find(|d| d.id == id)
            .and_then(|d| d.status.next());
        let applied = match next {
            Some(target) => self.apply_document_status(&mut state, id, target),
            None => false,
        };

        let remaining = next.filter(|s| applied && !s.is_terminal());
        if remaining.is_none() {
            state.document_timers.finish(id);
            self.notify_if_idle(&state);
        }
        if applied {
            if let Err(e) = self.persist_documents(&state).await {
                warn!(id, error = %e, "failed to persist document transition");
            }
        }
        remaining
    }

    /// Remove a document id from every index snapshot. Status and name
    /// are left untouched; an index may end up with no documents.
    fn prune_document(&self, state: &mut State, document_id: &str) -> bool {
        let mut pruned = false;
        for index in state.indexes.iter_mut() {
            if index.prune_document(document_id) {
                pruned = true;
                self.emit(LifecycleEvent::IndexPruned {
                    id: index.id.clone(),
                    document_id: document_id.to_string(),
                    remaining: index.documents.len(),
                });
            }
        }
        pruned
    }
}

/// CLI entry point for `kb doc upload`.
///
/// Files whose extension is not accepted are skipped with a warning. With
/// `wait`, blocks until every deferred transition has fired.
pub async fn run_upload(
    kb: &KnowledgeBase,
    upload: &UploadConfig,
    files: &[PathBuf],
    wait: bool,
) -> Result<()> {
    let mut added = Vec::new();
    for path in files {
        if !upload.accepts(path) {
            warn!(path = %path.display(), "skipping file with unsupported extension");
            eprintln!("Skipping {}: unsupported file type", path.display());
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let doc = kb.add_document(&name).await?;
        println!("{}  {}", doc.id, doc.name);
        added.push(doc.id);
    }

    if wait && !added.is_empty() {
        kb.resume().await;
        kb.wait_idle().await;
        for id in &added {
            if let Some(doc) = kb.document(id).await {
                println!("{}  {}  {}", doc.id, doc.status, doc.name);
            }
        }
    }
    Ok(())
}

/// CLI entry point for `kb doc list`.
pub async fn run_list(kb: &KnowledgeBase) -> Result<()> {
    let documents = kb.documents().await;
    if documents.is_empty() {
        println!("No documents uploaded. Run `kb doc upload <file>` to get started.");
        return Ok(());
    }
    for doc in documents {
        println!("{}  {:<10}  {}", doc.id, doc.status.as_str(), doc.name);
    }
    Ok(())
}

/// CLI entry point for `kb doc delete <id>`.
pub async fn run_delete(kb: &KnowledgeBase, id: &str) -> Result<()> {
    if kb.delete_document(id).await? {
        println!("Deleted document {}", id);
    } else {
        println!("No document with id {}", id);
    }
    Ok(())
}
