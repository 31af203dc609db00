//! Per-plugin application cache.
//!
//! Each plugin owns one cache keyed by unique id (or a custom key). The
//! cache holds the strong references; lists and callers share the same
//! `Arc<App>` so refined data is visible everywhere at once. Reads take a
//! short lock, writes replace entries atomically under the same lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::app::{App, AppState};

/// String-keyed cache of shared apps.
#[derive(Debug, Default)]
pub struct PluginCache {
    inner: Mutex<HashMap<String, Arc<App>>>,
}

impl PluginCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an app by key.
    pub fn lookup(&self, key: &str) -> Option<Arc<App>> {
        self.guard().get(key).cloned()
    }

    /// Insert an app; `key` defaults to the app's unique id. Apps without
    /// a resolvable key are ignored with a debug log.
    pub fn add(&self, key: Option<&str>, app: Arc<App>) {
        let key = match key {
            Some(k) => k.to_owned(),
            None => match app.unique_id() {
                Some(uid) => uid,
                None => {
                    tracing::debug!("not caching app without unique id");
                    return;
                }
            },
        };
        self.guard().insert(key, app);
    }

    /// Remove an entry by key. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.guard().remove(key).is_some()
    }

    /// All cached apps currently in `state`.
    pub fn lookup_by_state(&self, state: AppState) -> Vec<Arc<App>> {
        self.guard()
            .values()
            .filter(|app| app.state() == state)
            .cloned()
            .collect()
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        self.guard().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Lock helper recovering from poisoning.
    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<App>>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppKind;

    #[test]
    fn add_and_lookup_by_unique_id() {
        let cache = PluginCache::new();
        let app = App::new(None);
        app.set_from_unique_id("system/package/fedora/org.ex.A/*", AppKind::DesktopApp);
        cache.add(None, app.clone());
        let hit = cache.lookup("system/package/fedora/org.ex.A/*").expect("cached");
        assert!(Arc::ptr_eq(&hit, &app));
    }

    #[test]
    fn apps_without_key_are_skipped() {
        let cache = PluginCache::new();
        cache.add(None, App::new(None));
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_by_state_filters() {
        let cache = PluginCache::new();
        let a = App::new(Some("org.ex.A"));
        a.set_state(crate::app::AppState::Available);
        let b = App::new(Some("org.ex.B"));
        cache.add(Some("a"), a);
        cache.add(Some("b"), b);
        assert_eq!(cache.lookup_by_state(AppState::Available).len(), 1);
    }
}
