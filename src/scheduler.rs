//! Bookkeeping for deferred lifecycle transitions.
//!
//! Each entity has at most one outstanding transition task. The handle is
//! kept under the entity id so deletion can abort it; the task itself also
//! re-checks that its target still exists before applying anything.

use std::collections::HashMap;

use tokio::task::JoinHandle;

/// Outstanding transition tasks keyed by entity id.
#[derive(Default)]
pub struct TimerSet {
    handles: HashMap<String, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task for `id`, aborting any task already registered under it.
    pub fn insert(&mut self, id: String, handle: JoinHandle<()>) {
        if let Some(previous) = self.handles.insert(id, handle) {
            previous.abort();
        }
    }

    /// Abort and forget the task for `id`. Returns `true` if one was tracked.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.handles.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the task for `id` without aborting it; called by the task
    /// itself once its last transition has been applied.
    pub fn finish(&mut self, id: &str) -> bool {
        self.handles.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Abort every tracked task.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
