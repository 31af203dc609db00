//! Surfaceable notices attached to jobs and to the loader-wide stream.
//!
//! Events are mostly errors that should not abort a whole job: a single
//! backend failing to refresh while the others succeed, for instance. They
//! are keyed by a derived unique id so repeats collapse to the latest
//! occurrence, and consumers dismiss them by marking them invalid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::error::Error;

bitflags! {
    /// Presentation and dismissal flags on an [`Event`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// Dismissed by the consumer; skipped by `default_event`.
        const INVALID = 1 << 0;
        /// Should be surfaced in the UI.
        const VISIBLE = 1 << 1;
        /// Warning rather than error severity.
        const WARNING = 1 << 2;
        /// Originated from a user-initiated job.
        const INTERACTIVE = 1 << 3;
    }
}

/// One surfaceable notice.
#[derive(Debug)]
pub struct Event {
    error: Error,
    plugin: Option<String>,
    app: Option<String>,
    origin: Option<String>,
    job: Option<u64>,
    flags: AtomicU32,
}

impl Event {
    /// Create an event wrapping an error.
    pub fn new(error: Error) -> Self {
        Self {
            error,
            plugin: None,
            app: None,
            origin: None,
            job: None,
            flags: AtomicU32::new(0),
        }
    }

    /// Attach the reporting plugin name.
    pub fn with_plugin(mut self, plugin: &str) -> Self {
        self.plugin = Some(plugin.to_owned());
        self
    }

    /// Attach the unique id of the app the event concerns.
    pub fn with_app(mut self, unique_id: &str) -> Self {
        self.app = Some(unique_id.to_owned());
        self
    }

    /// Attach the unique id of the origin repository involved.
    pub fn with_origin(mut self, unique_id: &str) -> Self {
        self.origin = Some(unique_id.to_owned());
        self
    }

    /// Attach the reporting job id.
    pub fn with_job(mut self, job: u64) -> Self {
        self.job = Some(job);
        self
    }

    /// Set initial flags.
    pub fn with_flags(self, flags: EventFlags) -> Self {
        self.flags.store(flags.bits(), Ordering::Release);
        self
    }

    /// The wrapped error.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Reporting plugin name.
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Unique id of the app concerned.
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// Unique id of the origin repository concerned.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Reporting job id.
    pub fn job(&self) -> Option<u64> {
        self.job
    }

    /// Current flags snapshot.
    pub fn flags(&self) -> EventFlags {
        EventFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Whether the given flags are all set.
    pub fn has_flag(&self, flags: EventFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Add flags; used by consumers to mark an event dismissed.
    pub fn add_flag(&self, flags: EventFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Deduplication key: the app or origin unique id when present, the
    /// error kind otherwise.
    pub fn unique_id(&self) -> String {
        if let Some(app) = &self.app {
            return app.clone();
        }
        if let Some(origin) = &self.origin {
            return origin.clone();
        }
        format!("{}.error", self.error.kind().as_str())
    }
}

/// Ordered map of events, latest wins per unique id.
///
/// Shared by cloning; both a job and the loader hold one.
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

#[derive(Debug, Default)]
struct BusInner {
    order: Vec<Arc<Event>>,
    by_id: HashMap<String, usize>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, replacing any previous one with the same unique
    /// id. Cancellation errors are dropped on the floor; the inserted
    /// event (or `None` for dropped ones) is returned for further fan-out.
    pub fn add(&self, event: Event) -> Option<Arc<Event>> {
        if event.error().is_cancelled() {
            tracing::debug!("dropping cancelled event {}", event.unique_id());
            return None;
        }
        let event = Arc::new(event);
        self.add_arc(event.clone());
        Some(event)
    }

    /// Insert an already-shared event, so dismissing it is visible to
    /// every bus holding it.
    pub fn add_arc(&self, event: Arc<Event>) {
        if event.error().is_cancelled() {
            return;
        }
        let key = event.unique_id();
        let mut guard = self.guard();
        let inner = &mut *guard;
        match inner.by_id.get(&key) {
            Some(&slot) => inner.order[slot] = event,
            None => {
                let slot = inner.order.len();
                inner.order.push(event);
                inner.by_id.insert(key, slot);
            }
        }
    }

    /// Snapshot of all events in insertion order.
    pub fn events(&self) -> Vec<Arc<Event>> {
        self.guard().order.clone()
    }

    /// The first event not yet dismissed.
    pub fn default_event(&self) -> Option<Arc<Event>> {
        self.guard()
            .order
            .iter()
            .find(|e| !e.has_flag(EventFlags::INVALID))
            .cloned()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.guard().order.len()
    }

    /// Whether the bus holds no events.
    pub fn is_empty(&self) -> bool {
        self.guard().order.is_empty()
    }

    /// Drop all events.
    pub fn clear(&self) {
        let mut inner = self.guard();
        inner.order.clear();
        inner.by_id.clear();
    }

    /// Lock helper recovering from poisoning.
    fn guard(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
