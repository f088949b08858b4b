//! The lifecycle engine.
//!
//! [`KnowledgeBase`] owns the document and index collections, serializes
//! every mutation through one async mutex, persists the affected
//! collection after each mutation, and runs deferred transitions as tokio
//! tasks tracked per entity in a [`TimerSet`].
//!
//! ```text
//!  caller ──▶ validate ──▶ mutate (lock) ──▶ schedule ──▶ persist ──▶ observer
//!                              ▲
//!  deferred task ── sleep ─────┘  (re-checks the target still exists)
//! ```
//!
//! Operations on documents live in [`crate::documents`], on indexes in
//! [`crate::indexes`], and the query gate in [`crate::query`].

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use shared_kb_core::store::{
    load_collection, save_collection, SnapshotStore, DOCUMENTS_KEY, INDEXES_KEY,
};
use shared_kb_core::{Document, DocumentStatus, Index, IndexStatus, KbError};

use crate::config::{Config, TimingConfig};
use crate::db::{self, WriterLock};
use crate::migrate;
use crate::observer::{LifecycleEvent, LifecycleObserver, NoObserver, ObserverMode};
use crate::query::{QueryProvider, SimulatedProvider};
use crate::scheduler::TimerSet;
use crate::sqlite_store::SqliteSnapshotStore;

/// Mutable state guarded by the engine lock.
pub(crate) struct State {
    pub(crate) documents: Vec<Document>,
    pub(crate) indexes: Vec<Index>,
    pub(crate) document_timers: TimerSet,
    pub(crate) index_timers: TimerSet,
}

impl State {
    pub(crate) fn is_idle(&self) -> bool {
        self.document_timers.is_empty() && self.index_timers.is_empty()
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) snapshots: Arc<dyn SnapshotStore>,
    pub(crate) provider: Arc<dyn QueryProvider>,
    pub(crate) observer: Arc<dyn LifecycleObserver>,
    pub(crate) timing: TimingConfig,
    idle: Notify,
    _writer_lock: Option<WriterLock>,
}

/// Owner of all documents and indexes.
///
/// Cheap to clone; clones share the same state. Deferred tasks hold only a
/// weak reference, so dropping the last clone aborts every pending
/// transition.
#[derive(Clone)]
pub struct KnowledgeBase {
    pub(crate) shared: Arc<Shared>,
}

/// Builder for [`KnowledgeBase`]; see [`KnowledgeBase::builder`].
pub struct KnowledgeBaseBuilder {
    snapshots: Arc<dyn SnapshotStore>,
    provider: Arc<dyn QueryProvider>,
    observer: Arc<dyn LifecycleObserver>,
    timing: TimingConfig,
    writer_lock: Option<WriterLock>,
}

impl KnowledgeBaseBuilder {
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn QueryProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Hold `lock` until the last clone of the engine is dropped.
    pub(crate) fn writer_lock(mut self, lock: WriterLock) -> Self {
        self.writer_lock = Some(lock);
        self
    }

    /// Load both collections from the snapshot store.
    ///
    /// Unfinished lifecycles are not restarted here; call
    /// [`KnowledgeBase::resume`] for that.
    pub async fn open(self) -> Result<KnowledgeBase, KbError> {
        let documents: Vec<Document> = load_collection(self.snapshots.as_ref(), DOCUMENTS_KEY)
            .await
            .map_err(KbError::Persistence)?;
        let indexes: Vec<Index> = load_collection(self.snapshots.as_ref(), INDEXES_KEY)
            .await
            .map_err(KbError::Persistence)?;
        debug!(
            documents = documents.len(),
            indexes = indexes.len(),
            "loaded snapshot"
        );

        Ok(KnowledgeBase {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    documents,
                    indexes,
                    document_timers: TimerSet::new(),
                    index_timers: TimerSet::new(),
                }),
                snapshots: self.snapshots,
                provider: self.provider,
                observer: self.observer,
                timing: self.timing,
                idle: Notify::new(),
                _writer_lock: self.writer_lock,
            }),
        })
    }
}

impl KnowledgeBase {
    /// Start building an engine over `snapshots` with the default delays,
    /// the simulated query provider, and no observer.
    pub fn builder(snapshots: Arc<dyn SnapshotStore>) -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder {
            snapshots,
            provider: Arc::new(SimulatedProvider::default()),
            observer: Arc::new(NoObserver),
            timing: TimingConfig::default(),
            writer_lock: None,
        }
    }

    /// Reschedule deferred transitions for every unfinished entity loaded
    /// from the snapshot: `Pending`/`Processing` documents and `Syncing`
    /// indexes. `Created` indexes wait for an explicit sync.
    ///
    /// Returns the number of lifecycles resumed.
    pub async fn resume(&self) -> usize {
        let mut state = self.shared.state.lock().await;
        let documents: Vec<(String, DocumentStatus)> = state
            .documents
            .iter()
            .filter(|d| !d.status.is_terminal() && !state.document_timers.contains(&d.id))
            .map(|d| (d.id.clone(), d.status))
            .collect();
        let indexes: Vec<String> = state
            .indexes
            .iter()
            .filter(|i| i.status == IndexStatus::Syncing && !state.index_timers.contains(&i.id))
            .map(|i| i.id.clone())
            .collect();

        for (id, status) in &documents {
            self.schedule_document(&mut state, id, *status);
        }
        for id in &indexes {
            self.schedule_index_sync(&mut state, id);
        }

        let resumed = documents.len() + indexes.len();
        if resumed > 0 {
            info!(resumed, "resumed unfinished lifecycles");
        }
        resumed
    }

    /// Number of entities with a deferred transition still outstanding.
    pub async fn pending_transitions(&self) -> usize {
        let state = self.shared.state.lock().await;
        state.document_timers.len() + state.index_timers.len()
    }

    /// Resolve once no deferred transition is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.state.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        self.shared.observer.notify(event);
    }

    pub(crate) fn notify_if_idle(&self, state: &State) {
        if state.is_idle() {
            self.shared.idle.notify_waiters();
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| KnowledgeBase { shared })
    }

    pub(crate) async fn persist_documents(&self, state: &State) -> Result<(), KbError> {
        save_collection(self.shared.snapshots.as_ref(), DOCUMENTS_KEY, &state.documents)
            .await
            .map_err(KbError::Persistence)
    }

    pub(crate) async fn persist_indexes(&self, state: &State) -> Result<(), KbError> {
        save_collection(self.shared.snapshots.as_ref(), INDEXES_KEY, &state.indexes)
            .await
            .map_err(KbError::Persistence)
    }
}

/// Open the SQLite-backed engine described by `config`.
///
/// Claims the database for this process, then runs the (idempotent)
/// schema migrations so every command works on a fresh database. Fails if
/// another engine already has the database open.
pub async fn open_from_config(config: &Config, mode: ObserverMode) -> anyhow::Result<KnowledgeBase> {
    let lock = db::lock_writer(config)?;
    debug!(lock = %lock.path().display(), "claimed database");
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteSnapshotStore::new(pool));

    let kb = KnowledgeBase::builder(store)
        .timing(config.timing.clone())
        .provider(Arc::new(SimulatedProvider::from_config(&config.query)))
        .observer(mode.observer())
        .writer_lock(lock)
        .open()
        .await?;
    Ok(kb)
}
