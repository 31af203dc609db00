//! Ordered, indexed collections of apps.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use rand::RngExt;

use super::{App, AppState, DedupeFlags};

/// Per-process seed so [`AppList::randomize`] is stable for one run.
static RANDOM_SEED: OnceLock<u64> = OnceLock::new();

/// Fetch (or initialize) the per-process randomize seed.
fn process_seed() -> u64 {
    *RANDOM_SEED.get_or_init(|| rand::rng().random::<u64>())
}

/// Ordered sequence of apps with a `unique_id` index for dedupe.
///
/// `add` keeps insertion order and drops duplicates; dedupe across plugins
/// with merge semantics happens in [`AppList::filter_duplicates`].
#[derive(Clone, Default)]
pub struct AppList {
    items: Vec<Arc<App>>,
    by_unique_id: HashMap<String, usize>,
    truncated: bool,
    size_peak: usize,
}

impl std::fmt::Debug for AppList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppList")
            .field("len", &self.items.len())
            .field("truncated", &self.truncated)
            .finish()
    }
}

impl AppList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of apps in the list.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// App at `index`, when in bounds.
    pub fn index(&self, index: usize) -> Option<Arc<App>> {
        self.items.get(index).cloned()
    }

    /// Iterate the apps in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<App>> {
        self.items.iter()
    }

    /// Look up an app by unique id.
    pub fn lookup(&self, unique_id: &str) -> Option<Arc<App>> {
        self.by_unique_id
            .get(unique_id)
            .and_then(|&i| self.items.get(i))
            .cloned()
    }

    /// Append an app, deduplicating by unique id when it has one and by
    /// pointer identity otherwise.
    pub fn add(&mut self, app: Arc<App>) {
        if let Some(uid) = app.unique_id() {
            if self.by_unique_id.contains_key(&uid) {
                return;
            }
            self.by_unique_id.insert(uid, self.items.len());
        } else if self.items.iter().any(|a| Arc::ptr_eq(a, &app)) {
            return;
        }
        self.items.push(app);
        self.size_peak = self.size_peak.max(self.items.len());
    }

    /// Remove an app by pointer identity or matching unique id. Returns
    /// whether anything was removed.
    pub fn remove(&mut self, app: &Arc<App>) -> bool {
        let uid = app.unique_id();
        let before = self.items.len();
        self.items.retain(|a| {
            if Arc::ptr_eq(a, app) {
                return false;
            }
            match (&uid, a.unique_id()) {
                (Some(u), Some(other)) => *u != other,
                _ => true,
            }
        });
        let removed = self.items.len() != before;
        if removed {
            self.rebuild_index();
        }
        removed
    }

    /// Keep only apps matching the predicate.
    pub fn filter(&mut self, mut predicate: impl FnMut(&App) -> bool) {
        self.items.retain(|a| predicate(a));
        self.rebuild_index();
    }

    /// Stable sort with a caller comparator.
    pub fn sort(&mut self, mut cmp: impl FnMut(&App, &App) -> std::cmp::Ordering) {
        self.items.sort_by(|a, b| cmp(a, b));
        self.rebuild_index();
    }

    /// Deterministically shuffle using the per-process seed; calling twice
    /// in one process yields the same order.
    pub fn randomize(&mut self) {
        let seed = process_seed();
        self.items.sort_by_cached_key(|a| {
            let mut h = DefaultHasher::new();
            seed.hash(&mut h);
            match a.unique_id() {
                Some(uid) => uid.hash(&mut h),
                None => (Arc::as_ptr(a) as usize).hash(&mut h),
            }
            h.finish()
        });
        self.rebuild_index();
    }

    /// Truncate to at most `max` entries, recording the peak length so the
    /// UI can show how much was cut.
    pub fn truncate(&mut self, max: usize) {
        if self.items.len() > max {
            self.size_peak = self.size_peak.max(self.items.len());
            self.items.truncate(max);
            self.truncated = true;
            self.rebuild_index();
        }
    }

    /// Whether [`AppList::truncate`] dropped entries.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Largest length the list reached before truncation.
    pub fn size_peak(&self) -> usize {
        self.size_peak.max(self.items.len())
    }

    /// Collapse duplicate entries according to `flags`, merging the loser's
    /// data into the winner.
    ///
    /// The key is the unique id, the bare component id with
    /// [`DedupeFlags::KEY_ID_ONLY`], optionally extended with the first
    /// source name. Entries without a key are kept as-is.
    pub fn filter_duplicates(&mut self, flags: DedupeFlags) {
        let mut kept: Vec<Arc<App>> = Vec::with_capacity(self.items.len());
        let mut winners: HashMap<String, usize> = HashMap::new();

        for app in self.items.drain(..) {
            let Some(key) = dedupe_key(&app, flags) else {
                kept.push(app);
                continue;
            };
            match winners.get(&key) {
                None => {
                    winners.insert(key, kept.len());
                    kept.push(app);
                }
                Some(&slot) => {
                    let current = kept[slot].clone();
                    if duplicate_wins(&app, &current, flags) {
                        app.absorb(&current);
                        kept[slot] = app;
                    } else {
                        current.absorb(&app);
                    }
                }
            }
        }

        self.items = kept;
        self.rebuild_index();
    }

    /// Recompute the unique-id index after structural changes.
    fn rebuild_index(&mut self) {
        self.by_unique_id.clear();
        for (i, app) in self.items.iter().enumerate() {
            if let Some(uid) = app.unique_id() {
                self.by_unique_id.entry(uid).or_insert(i);
            }
        }
    }
}

/// Dedupe key for an app under the given flags, `None` when the app cannot
/// be keyed.
fn dedupe_key(app: &App, flags: DedupeFlags) -> Option<String> {
    let mut key = if flags.contains(DedupeFlags::KEY_ID_ONLY) {
        app.id()?
    } else {
        app.unique_id()?
    };
    if flags.contains(DedupeFlags::KEY_SOURCE_NAME) {
        let source = app.sources().into_iter().next().unwrap_or_default();
        key.push('\n');
        key.push_str(&source);
    }
    Some(key)
}

/// Whether `challenger` should replace `incumbent` for the same key.
fn duplicate_wins(challenger: &App, incumbent: &App, flags: DedupeFlags) -> bool {
    if flags.contains(DedupeFlags::MATCH_INSTALLED) {
        let ci = challenger.state().is_installed();
        let ii = incumbent.state().is_installed();
        if ci != ii {
            return ci;
        }
    }
    if flags.contains(DedupeFlags::PRIORITY) && challenger.priority() != incumbent.priority() {
        return challenger.priority() > incumbent.priority();
    }
    challenger.newer_than(incumbent)
}

/// Sort helper: installed first, then by name, matching the common UI
/// default for installed-apps pages.
pub(crate) fn cmp_installed_then_name(a: &App, b: &App) -> std::cmp::Ordering {
    let rank = |app: &App| u8::from(!matches!(app.state(), AppState::Installed));
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.name().unwrap_or_default().cmp(&b.name().unwrap_or_default()))
}
