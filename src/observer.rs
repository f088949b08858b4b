//! Lifecycle event reporting.
//!
//! Every applied mutation produces a [`LifecycleEvent`] that is handed to
//! the engine's [`LifecycleObserver`]. Front ends use this to re-render;
//! the CLI prints the events on **stderr** so stdout stays parseable.

use std::io::Write;

use serde::Serialize;

use shared_kb_core::{DocumentStatus, IndexStatus};

/// A state change applied by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    DocumentAdded {
        id: String,
        name: String,
    },
    DocumentAdvanced {
        id: String,
        name: String,
        status: DocumentStatus,
    },
    DocumentDeleted {
        id: String,
    },
    IndexCreated {
        id: String,
        name: String,
        documents: usize,
    },
    IndexAdvanced {
        id: String,
        name: String,
        status: IndexStatus,
    },
    IndexDeleted {
        id: String,
    },
    /// A deleted document was removed from an index snapshot.
    IndexPruned {
        id: String,
        document_id: String,
        remaining: usize,
    },
}

/// Receives lifecycle events. Called with the engine lock held, so
/// implementations must not block.
pub trait LifecycleObserver: Send + Sync {
    fn notify(&self, event: LifecycleEvent);
}

/// Human-friendly lines on stderr: `document a.pdf  Processing`.
pub struct StderrObserver;

impl LifecycleObserver for StderrObserver {
    fn notify(&self, event: LifecycleEvent) {
        let line = match &event {
            LifecycleEvent::DocumentAdded { id, name } => {
                format!("document {}  Pending  ({})\n", name, id)
            }
            LifecycleEvent::DocumentAdvanced { name, status, .. } => {
                format!("document {}  {}\n", name, status)
            }
            LifecycleEvent::DocumentDeleted { id } => format!("document {}  deleted\n", id),
            LifecycleEvent::IndexCreated {
                id,
                name,
                documents,
            } => format!(
                "index {}  Created  {} document(s)  ({})\n",
                name, documents, id
            ),
            LifecycleEvent::IndexAdvanced { name, status, .. } => {
                format!("index {}  {}\n", name, status)
            }
            LifecycleEvent::IndexDeleted { id } => format!("index {}  deleted\n", id),
            LifecycleEvent::IndexPruned {
                id,
                document_id,
                remaining,
            } => format!(
                "index {}  dropped document {}  ({} left)\n",
                id, document_id, remaining
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable events: one JSON object per line on stderr.
pub struct JsonObserver;

impl LifecycleObserver for JsonObserver {
    fn notify(&self, event: LifecycleEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Discards every event.
pub struct NoObserver;

impl LifecycleObserver for NoObserver {
    fn notify(&self, _event: LifecycleEvent) {}
}

/// Observer mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ObserverMode {
    Off,
    Human,
    Json,
}

impl ObserverMode {
    /// Human output when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ObserverMode::Human
        } else {
            ObserverMode::Off
        }
    }

    pub fn observer(&self) -> std::sync::Arc<dyn LifecycleObserver> {
        match self {
            ObserverMode::Off => std::sync::Arc::new(NoObserver),
            ObserverMode::Human => std::sync::Arc::new(StderrObserver),
            ObserverMode::Json => std::sync::Arc::new(JsonObserver),
        }
    }
}
