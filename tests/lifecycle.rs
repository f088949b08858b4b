//! Lifecycle engine tests.
//!
//! Every test runs on a paused tokio clock, so sleeping in the test
//! advances virtual time deterministically and deferred transitions fire
//! exactly at their configured delays (3 s, 3 s, 5 s).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared_kb::store::memory::InMemorySnapshotStore;
use shared_kb::store::{SnapshotStore, DOCUMENTS_KEY, INDEXES_KEY};
use shared_kb::{
    DocumentStatus, IndexStatus, KbError, KnowledgeBase, LifecycleEvent, LifecycleObserver,
    QueryProvider, ValidationError,
};

// ─── Test collaborators ─────────────────────────────────────────────

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    fn document_statuses(&self, id: &str) -> Vec<DocumentStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::DocumentAdvanced {
                    id: doc_id, status, ..
                } if doc_id == id => Some(status),
                _ => None,
            })
            .collect()
    }

    fn index_statuses(&self, id: &str) -> Vec<IndexStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::IndexAdvanced {
                    id: index_id,
                    status,
                    ..
                } if index_id == id => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn notify(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
    last: Mutex<Option<(String, String)>>,
}

#[async_trait]
impl QueryProvider for CountingProvider {
    async fn answer(&self, index_id: &str, query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((index_id.to_string(), query.to_string()));
        Ok(format!("answer to {}", query))
    }
}

/// Snapshot store that can be switched into a failing state, for every
/// key or for a single one.
#[derive(Default)]
struct FlakyStore {
    inner: InMemorySnapshotStore,
    failing: AtomicBool,
    failing_key: Mutex<Option<&'static str>>,
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let key_failing = *self.failing_key.lock().unwrap() == Some(key);
        if key_failing || self.failing.load(Ordering::SeqCst) {
            bail!("disk unavailable");
        }
        self.inner.save(key, value).await
    }
}

struct Harness {
    kb: KnowledgeBase,
    observer: Arc<RecordingObserver>,
    provider: Arc<CountingProvider>,
    store: Arc<InMemorySnapshotStore>,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemorySnapshotStore::new());
    harness_over(store).await
}

async fn harness_over(store: Arc<InMemorySnapshotStore>) -> Harness {
    let observer = Arc::new(RecordingObserver::default());
    let provider = Arc::new(CountingProvider::default());
    let kb = KnowledgeBase::builder(store.clone())
        .observer(observer.clone())
        .provider(provider.clone())
        .open()
        .await
        .unwrap();
    Harness {
        kb,
        observer,
        provider,
        store,
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

async fn completed_document(kb: &KnowledgeBase, name: &str) -> String {
    let doc = kb.add_document(name).await.unwrap();
    tokio::time::sleep(ms(6001)).await;
    assert_eq!(
        kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Completed
    );
    doc.id
}

// ─── Document lifecycle ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn document_walks_through_processing_to_completed() {
    let h = harness().await;
    let doc = h.kb.add_document("a.pdf").await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);
    assert_eq!(h.kb.pending_transitions().await, 1);

    tokio::time::sleep(ms(2999)).await;
    assert_eq!(
        h.kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Pending
    );

    tokio::time::sleep(ms(2)).await;
    assert_eq!(
        h.kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Processing
    );

    tokio::time::sleep(ms(3000)).await;
    assert_eq!(
        h.kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Completed
    );

    assert_eq!(
        h.observer.document_statuses(&doc.id),
        vec![DocumentStatus::Processing, DocumentStatus::Completed]
    );
    assert_eq!(h.kb.pending_transitions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn every_document_takes_exactly_two_steps() {
    let h = harness().await;
    let mut ids = Vec::new();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        ids.push(h.kb.add_document(name).await.unwrap().id);
        tokio::time::sleep(ms(1000)).await;
    }

    h.kb.wait_idle().await;

    for id in &ids {
        assert_eq!(
            h.kb.document(id).await.unwrap().status,
            DocumentStatus::Completed
        );
        assert_eq!(
            h.observer.document_statuses(id),
            vec![DocumentStatus::Processing, DocumentStatus::Completed]
        );
    }
    assert_eq!(h.kb.completed_documents().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_pending_document_voids_its_transitions() {
    let h = harness().await;
    let doc = h.kb.add_document("a.pdf").await.unwrap();

    tokio::time::sleep(ms(1000)).await;
    assert!(h.kb.delete_document(&doc.id).await.unwrap());
    assert_eq!(h.kb.pending_transitions().await, 0);

    tokio::time::sleep(ms(10_000)).await;
    assert!(h.kb.document(&doc.id).await.is_none());
    assert!(h.kb.documents().await.is_empty());
    assert!(h.observer.document_statuses(&doc.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn deleting_a_processing_document_stops_completion() {
    let h = harness().await;
    let doc = h.kb.add_document("a.pdf").await.unwrap();

    tokio::time::sleep(ms(4000)).await;
    assert_eq!(
        h.kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Processing
    );
    assert!(h.kb.delete_document(&doc.id).await.unwrap());

    tokio::time::sleep(ms(10_000)).await;
    assert!(h.kb.document(&doc.id).await.is_none());
    assert_eq!(
        h.observer.document_statuses(&doc.id),
        vec![DocumentStatus::Processing]
    );
    let persisted = h.store.get(DOCUMENTS_KEY).unwrap();
    assert_eq!(persisted, serde_json::json!([]));
}

#[tokio::test(start_paused = true)]
async fn stale_ids_are_no_ops() {
    let h = harness().await;
    assert!(!h.kb.delete_document("missing").await.unwrap());
    assert!(!h.kb.delete_index("missing").await.unwrap());
    assert!(!h.kb.sync_index("missing").await.unwrap());
    assert!(!h
        .kb
        .advance_document("missing", DocumentStatus::Processing)
        .await
        .unwrap());
    assert!(h.observer.events().is_empty());
    assert_eq!(h.store.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn only_the_next_status_can_be_applied() {
    let h = harness().await;
    let doc = h.kb.add_document("a.pdf").await.unwrap();

    assert!(!h
        .kb
        .advance_document(&doc.id, DocumentStatus::Completed)
        .await
        .unwrap());
    assert!(!h
        .kb
        .advance_document(&doc.id, DocumentStatus::Pending)
        .await
        .unwrap());
    assert!(h
        .kb
        .advance_document(&doc.id, DocumentStatus::Processing)
        .await
        .unwrap());

    h.kb.wait_idle().await;
    assert_eq!(
        h.kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Completed
    );
    assert_eq!(
        h.observer.document_statuses(&doc.id),
        vec![DocumentStatus::Processing, DocumentStatus::Completed]
    );
}

// ─── Index lifecycle ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn index_requires_name_and_documents() {
    let h = harness().await;
    let doc_id = completed_document(&h.kb, "a.pdf").await;

    let err = h.kb.add_index("", &[doc_id.clone()]).await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::EmptyIndexName));

    let err = h.kb.add_index("  ", &[doc_id]).await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::EmptyIndexName));

    let err = h.kb.add_index("name", &[]).await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::EmptySelection));
    assert_eq!(err.to_string(), "Please select at least one document.");

    assert!(h.kb.indexes().await.is_empty());
    assert!(h.store.get(INDEXES_KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn index_selection_skips_unfinished_documents() {
    let h = harness().await;
    let done = completed_document(&h.kb, "done.pdf").await;
    let pending = h.kb.add_document("pending.pdf").await.unwrap().id;

    let err = h
        .kb
        .add_index("only-pending", &[pending.clone()])
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let index = h
        .kb
        .add_index("mixed", &[pending, done.clone(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(index.status, IndexStatus::Created);
    assert_eq!(index.documents.len(), 1);
    assert_eq!(index.documents[0].id, done);
}

#[tokio::test(start_paused = true)]
async fn double_sync_completes_once() {
    let h = harness().await;
    let doc_id = completed_document(&h.kb, "a.pdf").await;
    let index = h.kb.add_index("Idx1", &[doc_id]).await.unwrap();

    assert!(h.kb.sync_index(&index.id).await.unwrap());
    assert!(!h.kb.sync_index(&index.id).await.unwrap());
    assert_eq!(
        h.kb.index(&index.id).await.unwrap().status,
        IndexStatus::Syncing
    );
    assert_eq!(h.kb.pending_transitions().await, 1);

    tokio::time::sleep(ms(5001)).await;
    assert_eq!(
        h.kb.index(&index.id).await.unwrap().status,
        IndexStatus::Completed
    );
    assert!(!h.kb.sync_index(&index.id).await.unwrap());

    tokio::time::sleep(ms(20_000)).await;
    assert_eq!(
        h.observer.index_statuses(&index.id),
        vec![IndexStatus::Syncing, IndexStatus::Completed]
    );
}

#[tokio::test(start_paused = true)]
async fn deleting_a_syncing_index_cancels_completion() {
    let h = harness().await;
    let doc_id = completed_document(&h.kb, "a.pdf").await;
    let index = h.kb.add_index("Idx1", &[doc_id]).await.unwrap();
    h.kb.sync_index(&index.id).await.unwrap();

    tokio::time::sleep(ms(1000)).await;
    assert!(h.kb.delete_index(&index.id).await.unwrap());
    tokio::time::sleep(ms(10_000)).await;

    assert!(h.kb.index(&index.id).await.is_none());
    assert_eq!(
        h.observer.index_statuses(&index.id),
        vec![IndexStatus::Syncing]
    );
    assert_eq!(h.kb.pending_transitions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn document_deletion_prunes_indexes_without_touching_status() {
    let h = harness().await;
    let a = completed_document(&h.kb, "a.pdf").await;
    let b = completed_document(&h.kb, "b.pdf").await;
    let index = h.kb.add_index("Idx1", &[a.clone(), b.clone()]).await.unwrap();
    h.kb.sync_index(&index.id).await.unwrap();
    h.kb.wait_idle().await;

    assert!(h.kb.delete_document(&a).await.unwrap());
    let pruned = h.kb.index(&index.id).await.unwrap();
    assert_eq!(pruned.name, "Idx1");
    assert_eq!(pruned.status, IndexStatus::Completed);
    assert_eq!(pruned.documents.len(), 1);
    assert!(!pruned.contains_document(&a));
    assert!(pruned.contains_document(&b));

    assert!(h.kb.delete_document(&b).await.unwrap());
    let emptied = h.kb.index(&index.id).await.unwrap();
    assert!(emptied.documents.is_empty());
    assert_eq!(emptied.status, IndexStatus::Completed);
    assert_eq!(h.kb.indexes().await.len(), 1);

    let persisted = h.store.get(INDEXES_KEY).unwrap();
    assert_eq!(persisted[0]["documents"], serde_json::json!([]));
}

// ─── Query gate ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn query_is_gated_on_completed_indexes() {
    let h = harness().await;
    let doc_id = completed_document(&h.kb, "a.pdf").await;
    let index = h.kb.add_index("Idx1", &[doc_id]).await.unwrap();

    let err = h.kb.query(Some(index.id.as_str()), "what is X").await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::IndexNotQueryable));

    let err = h.kb.query(None, "what is X").await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::NoIndexSelected));

    h.kb.sync_index(&index.id).await.unwrap();
    h.kb.wait_idle().await;

    let err = h.kb.query(Some(index.id.as_str()), "   ").await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::BlankQuery));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);

    let answer = h.kb.query(Some(index.id.as_str()), "what is X").await.unwrap();
    assert_eq!(answer, "answer to what is X");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.provider.last.lock().unwrap().clone(),
        Some((index.id.clone(), "what is X".to_string()))
    );
    assert_eq!(h.kb.eligible_indexes().await.len(), 1);
}

// ─── End to end ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn upload_index_sync_and_query() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let kb = KnowledgeBase::builder(store.clone()).open().await.unwrap();

    let doc = kb.add_document("a.pdf").await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);

    tokio::time::sleep(ms(3001)).await;
    assert_eq!(
        kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Processing
    );
    tokio::time::sleep(ms(3000)).await;
    assert_eq!(
        kb.document(&doc.id).await.unwrap().status,
        DocumentStatus::Completed
    );

    let index = kb.add_index("Idx1", &[doc.id.clone()]).await.unwrap();
    assert_eq!(index.status, IndexStatus::Created);
    assert_eq!(index.documents.len(), 1);

    let premature = kb.query(Some(index.id.as_str()), "what is X").await;
    assert!(matches!(
        premature,
        Err(KbError::Validation(ValidationError::IndexNotQueryable))
    ));

    assert!(kb.sync_index(&index.id).await.unwrap());
    assert_eq!(kb.index(&index.id).await.unwrap().status, IndexStatus::Syncing);
    tokio::time::sleep(ms(5001)).await;
    assert_eq!(
        kb.index(&index.id).await.unwrap().status,
        IndexStatus::Completed
    );

    let answer = kb.query(Some(index.id.as_str()), "what is X").await.unwrap();
    assert!(!answer.is_empty());
    assert!(answer.contains("what is X"));

    let persisted = store.get(INDEXES_KEY).unwrap();
    assert_eq!(persisted[0]["status"], "Completed");
    assert_eq!(persisted[0]["name"], "Idx1");
}

// ─── Persistence ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn persistence_failure_keeps_memory_authoritative() {
    let store = Arc::new(FlakyStore::default());
    let kb = KnowledgeBase::builder(store.clone()).open().await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = kb.add_document("a.pdf").await.unwrap_err();
    assert!(matches!(err, KbError::Persistence(_)));
    assert!(err.to_string().contains("disk unavailable"));

    let docs = kb.documents().await;
    assert_eq!(docs.len(), 1);

    kb.wait_idle().await;
    assert_eq!(
        kb.document(&docs[0].id).await.unwrap().status,
        DocumentStatus::Completed
    );

    store.failing.store(false, Ordering::SeqCst);
    assert!(kb.delete_document(&docs[0].id).await.unwrap());
    assert_eq!(store.inner.get(DOCUMENTS_KEY), Some(serde_json::json!([])));
}

#[tokio::test(start_paused = true)]
async fn sync_failure_keeps_the_index_syncing_in_memory() {
    let store = Arc::new(FlakyStore::default());
    let kb = KnowledgeBase::builder(store.clone()).open().await.unwrap();
    let doc = completed_document(&kb, "a.pdf").await;
    let index = kb.add_index("Idx1", &[doc]).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = kb.sync_index(&index.id).await.unwrap_err();
    assert!(matches!(err, KbError::Persistence(_)));
    assert_eq!(
        kb.index(&index.id).await.unwrap().status,
        IndexStatus::Syncing
    );
    assert_eq!(kb.pending_transitions().await, 1);
    assert_eq!(
        store.inner.get(INDEXES_KEY).unwrap()[0]["status"],
        "Created"
    );

    kb.wait_idle().await;
    assert_eq!(
        kb.index(&index.id).await.unwrap().status,
        IndexStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn delete_failure_keeps_the_prune_in_memory() {
    let store = Arc::new(FlakyStore::default());
    let kb = KnowledgeBase::builder(store.clone()).open().await.unwrap();
    let doc = completed_document(&kb, "a.pdf").await;
    let index = kb.add_index("Idx1", &[doc.clone()]).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let err = kb.delete_document(&doc).await.unwrap_err();
    assert!(matches!(err, KbError::Persistence(_)));
    assert!(kb.document(&doc).await.is_none());
    assert!(!kb.index(&index.id).await.unwrap().contains_document(&doc));
    assert_eq!(
        store.inner.get(INDEXES_KEY).unwrap()[0]["documents"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn failed_document_save_still_saves_the_prune() {
    let store = Arc::new(FlakyStore::default());
    let kb = KnowledgeBase::builder(store.clone()).open().await.unwrap();
    let doc = completed_document(&kb, "a.pdf").await;
    kb.add_index("Idx1", &[doc.clone()]).await.unwrap();

    *store.failing_key.lock().unwrap() = Some(DOCUMENTS_KEY);
    let err = kb.delete_document(&doc).await.unwrap_err();
    assert!(matches!(err, KbError::Persistence(_)));

    assert_eq!(
        store.inner.get(INDEXES_KEY).unwrap()[0]["documents"],
        serde_json::json!([])
    );
    assert_eq!(store.inner.get(DOCUMENTS_KEY).unwrap()[0]["name"], "a.pdf");
}

#[tokio::test(start_paused = true)]
async fn reopened_engine_resumes_unfinished_lifecycles() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let (pending, processing, index_id) = {
        let first = harness_over(store.clone()).await;
        let done = completed_document(&first.kb, "done.pdf").await;
        let index = first.kb.add_index("Idx1", &[done]).await.unwrap();
        first.kb.sync_index(&index.id).await.unwrap();

        let processing = first.kb.add_document("processing.pdf").await.unwrap().id;
        tokio::time::sleep(ms(3001)).await;
        let pending = first.kb.add_document("pending.pdf").await.unwrap().id;
        (pending, processing, index.id)
    };

    let second = harness_over(store.clone()).await;
    assert_eq!(
        second.kb.document(&pending).await.unwrap().status,
        DocumentStatus::Pending
    );
    assert_eq!(
        second.kb.document(&processing).await.unwrap().status,
        DocumentStatus::Processing
    );
    assert_eq!(
        second.kb.index(&index_id).await.unwrap().status,
        IndexStatus::Syncing
    );
    assert_eq!(second.kb.pending_transitions().await, 0);

    assert_eq!(second.kb.resume().await, 3);
    assert_eq!(second.kb.resume().await, 0);
    second.kb.wait_idle().await;

    assert_eq!(
        second.observer.document_statuses(&pending),
        vec![DocumentStatus::Processing, DocumentStatus::Completed]
    );
    assert_eq!(
        second.observer.document_statuses(&processing),
        vec![DocumentStatus::Completed]
    );
    assert_eq!(
        second.kb.index(&index_id).await.unwrap().status,
        IndexStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn wait_idle_returns_immediately_when_nothing_is_scheduled() {
    let h = harness().await;
    let start = tokio::time::Instant::now();
    h.kb.wait_idle().await;
    assert_eq!(start.elapsed(), Duration::ZERO);
}
