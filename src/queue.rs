//! Persistent queue of apps waiting for favorable network conditions.
//!
//! One entry per line, `<unique_id>\t<kind>`. The file disappears when the
//! queue drains so a fresh profile carries no state. Loading produces
//! wildcard placeholders; a refine pass during loader setup materializes
//! them into live apps.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::app::{App, AppKind, AppState, PendingAction, Quirks};
use crate::error::Result;

/// Default queue file under the XDG data directory.
pub fn default_queue_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| Path::new(&h).join(".local").join("share"))
        })
        .unwrap_or_else(|| PathBuf::from("."))
        .join("appshelf")
        .join("install-queue")
}

/// The pending-install queue.
#[derive(Debug)]
pub struct PendingQueue {
    path: PathBuf,
    inner: Mutex<Vec<Arc<App>>>,
}

impl PendingQueue {
    /// Create a queue persisting at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            inner: Mutex::new(Vec::new()),
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the queue file into wildcard placeholder apps and adopt them
    /// as the in-memory queue. A missing file is an empty queue.
    pub fn load(&self) -> Result<Vec<Arc<App>>> {
        let mut loaded = Vec::new();
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                tracing::debug!("loading install queue from {}", self.path.display());
                for line in contents.lines() {
                    let Some((unique_id, kind)) = line.split_once('\t') else {
                        continue;
                    };
                    if unique_id.is_empty() {
                        continue;
                    }
                    let app = App::new(None);
                    app.set_from_unique_id(unique_id, AppKind::from_str(kind));
                    app.add_quirk(Quirks::IS_WILDCARD);
                    app.set_state(AppState::QueuedForInstall);
                    app.set_pending_action(Some(PendingAction::Install));
                    loaded.push(app);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        {
            let mut inner = self.guard();
            for app in &loaded {
                push_unique(&mut inner, app.clone());
            }
        }
        Ok(loaded)
    }

    /// Persist the queue; queue drained means the file is removed.
    pub fn save(&self) {
        let mut contents = String::new();
        {
            let inner = self.guard();
            for app in inner.iter() {
                if app.state() != AppState::QueuedForInstall {
                    continue;
                }
                let Some(unique_id) = app.unique_id() else {
                    continue;
                };
                contents.push_str(&unique_id);
                contents.push('\t');
                contents.push_str(app.kind().as_str());
                contents.push('\n');
            }
        }

        if contents.is_empty() {
            if let Err(err) = std::fs::remove_file(&self.path)
                && err.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!("failed to unlink '{}': {err}", self.path.display());
            }
            return;
        }
        if let Some(parent) = self.path.parent()
            && let Err(err) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("failed to create dir for {}: {err}", self.path.display());
            return;
        }
        tracing::debug!("saving install queue to {}", self.path.display());
        if let Err(err) = std::fs::write(&self.path, contents) {
            tracing::warn!("failed to save install queue: {err}");
        }
    }

    /// Queue an app (and, recursively, its to-be-installed addons) and
    /// persist.
    pub fn add(&self, app: &Arc<App>) {
        {
            let mut inner = self.guard();
            push_unique(&mut inner, app.clone());
        }
        app.set_state(AppState::QueuedForInstall);
        app.set_pending_action(Some(PendingAction::Install));
        self.save();

        for addon in app.dup_addons().iter() {
            if addon.to_be_installed() {
                self.add(addon);
            }
        }
    }

    /// Remove an app from the queue; a still-queued state falls back to
    /// unknown. Returns whether the app was present.
    pub fn remove(&self, app: &Arc<App>) -> bool {
        let removed = {
            let mut inner = self.guard();
            let before = inner.len();
            let uid = app.unique_id();
            inner.retain(|queued| {
                !(Arc::ptr_eq(queued, app)
                    || (uid.is_some() && queued.unique_id() == uid))
            });
            inner.len() != before
        };
        if removed {
            if app.state() == AppState::QueuedForInstall {
                app.set_state(AppState::Unknown);
                app.set_pending_action(None);
            }
            self.save();
        }
        removed
    }

    /// Replace the in-memory queue wholesale (setup merge) and persist.
    pub fn replace(&self, apps: Vec<Arc<App>>) {
        {
            let mut inner = self.guard();
            inner.clear();
            for app in apps {
                push_unique(&mut inner, app);
            }
        }
        self.save();
    }

    /// Snapshot of the queued apps.
    pub fn snapshot(&self) -> Vec<Arc<App>> {
        self.guard().clone()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Number of queued apps.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Lock helper recovering from poisoning.
    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<Arc<App>>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Push unless an entry with the same identity exists.
fn push_unique(queue: &mut Vec<Arc<App>>, app: Arc<App>) {
    let uid = app.unique_id();
    let duplicate = queue.iter().any(|queued| {
        Arc::ptr_eq(queued, &app) || (uid.is_some() && queued.unique_id() == uid)
    });
    if !duplicate {
        queue.push(app);
    }
}
