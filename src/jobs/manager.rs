//! Live index of in-flight jobs, queryable per app.
//!
//! The UI asks "is anything running against this app" to draw spinners and
//! disable buttons; the loader asks "is anything running at all" to gate
//! the updates-changed debounce.

use std::collections::HashMap;
use std::sync::Mutex;

use super::JobKind;

/// Index of running jobs.
#[derive(Debug, Default)]
pub struct JobManager {
    inner: Mutex<ManagerInner>,
}

#[derive(Debug, Default)]
struct ManagerInner {
    next_id: u64,
    active: HashMap<u64, JobKind>,
    by_app: HashMap<String, Vec<u64>>,
}

impl JobManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting job and return its id.
    pub fn register(&self, kind: JobKind, app_unique_ids: &[String]) -> u64 {
        let mut inner = self.guard();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.active.insert(id, kind);
        for uid in app_unique_ids {
            inner.by_app.entry(uid.clone()).or_default().push(id);
        }
        id
    }

    /// Remove a completed job from the index.
    pub fn deregister(&self, id: u64) {
        let mut inner = self.guard();
        inner.active.remove(&id);
        inner.by_app.retain(|_, jobs| {
            jobs.retain(|j| *j != id);
            !jobs.is_empty()
        });
    }

    /// Kinds of the jobs currently running against an app.
    pub fn jobs_for_app(&self, unique_id: &str) -> Vec<JobKind> {
        let inner = self.guard();
        inner
            .by_app
            .get(unique_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.active.get(id).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any job is in flight.
    pub fn any_active(&self) -> bool {
        !self.guard().active.is_empty()
    }

    /// Number of running jobs.
    pub fn active_count(&self) -> usize {
        self.guard().active.len()
    }

    /// Lock helper recovering from poisoning.
    fn guard(&self) -> std::sync::MutexGuard<'_, ManagerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
