//! The `App` entity: the unit everything else in the catalog operates on.
//!
//! An [`App`] represents a user-installable or installed item (application,
//! addon, font, repository, firmware). Apps are shared as `Arc<App>`; the
//! owning plugin mutates them while a job holds them, observers read
//! snapshots. State and progress use atomics so the UI can poll them
//! without taking the inner lock.

mod flags;
mod list;
mod state;
mod types;

pub use flags::{DedupeFlags, Kudos, Permissions, Quirks, RefineFlags};
pub use list::AppList;
pub(crate) use list::cmp_installed_then_name;
pub use state::{AppState, Quality, transition_allowed};
pub use types::{
    AppKind, AppSizes, BundleKind, Category, ContentRating, Icon, IconKind, LaunchableKind,
    PendingAction, ProvidedItem, ProvidedKind, RatingValue, Relation, RelationItem, RelationKind,
    Release, Scope, Screenshot, ScreenshotImage, ScreenshotVideo, SizeKind, SizeValue,
    SpecialKind, UrgencyKind,
};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use tokio_util::sync::CancellationToken;

use crate::util::vercmp;

/// Mutable interior of an [`App`], guarded by one lock.
#[derive(Default)]
struct AppInner {
    id: Option<String>,
    kind: AppKind,
    special_kind: SpecialKind,
    scope: Scope,
    bundle_kind: BundleKind,
    quirks: Quirks,
    kudos: Kudos,
    name: Option<(Quality, String)>,
    summary: Option<(Quality, String)>,
    description: Option<(Quality, String)>,
    icons: Vec<Icon>,
    screenshots: Vec<Screenshot>,
    version: Option<String>,
    release_date: Option<u64>,
    version_history: Vec<Release>,
    update_version: Option<String>,
    update_details_markup: Option<String>,
    update_urgency: UrgencyKind,
    license: Option<(Quality, String)>,
    project_group: Option<String>,
    developer_name: Option<String>,
    origin: Option<String>,
    origin_appstream: Option<String>,
    origin_ui: Option<String>,
    origin_hostname: Option<String>,
    branch: Option<String>,
    sources: Vec<String>,
    addons: AppList,
    related: AppList,
    relations: Vec<Relation>,
    content_rating: Option<ContentRating>,
    provided: Vec<ProvidedItem>,
    sizes: AppSizes,
    categories: BTreeSet<String>,
    permissions: Permissions,
    metadata: HashMap<String, String>,
    management_plugin: Option<String>,
    pending_action: Option<PendingAction>,
    launchables: BTreeMap<&'static str, String>,
    urls: BTreeMap<String, String>,
    has_translations: bool,
    to_be_installed: bool,
}

/// A catalog entity. See the module documentation for the sharing model.
pub struct App {
    state: AtomicU32,
    recover_state: AtomicU32,
    progress: AtomicI32,
    allow_cancel: AtomicBool,
    priority: AtomicU32,
    match_value: AtomicU32,
    unique_id: OnceLock<String>,
    cancellable: Mutex<CancellationToken>,
    inner: RwLock<AppInner>,
}

impl Default for App {
    fn default() -> Self {
        Self {
            state: AtomicU32::new(AppState::Unknown as u32),
            recover_state: AtomicU32::new(AppState::Unknown as u32),
            progress: AtomicI32::new(-1),
            allow_cancel: AtomicBool::new(true),
            priority: AtomicU32::new(0),
            match_value: AtomicU32::new(0),
            unique_id: OnceLock::new(),
            cancellable: Mutex::new(CancellationToken::new()),
            inner: RwLock::new(AppInner::default()),
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Read guard helper; a poisoned lock only happens after a panic in a
/// writer, in which case the data is still the latest consistent snapshot.
fn read(inner: &RwLock<AppInner>) -> std::sync::RwLockReadGuard<'_, AppInner> {
    inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Write guard helper, poisoning handled like [`read`].
fn write(inner: &RwLock<AppInner>) -> std::sync::RwLockWriteGuard<'_, AppInner> {
    inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl App {
    /// Create a blank-state app, optionally with a component id.
    pub fn new(id: Option<&str>) -> Arc<Self> {
        let app = Arc::new(Self::default());
        if let Some(id) = id {
            app.set_id(id);
        }
        app
    }

    /// Component id, when known.
    pub fn id(&self) -> Option<String> {
        read(&self.inner).id.clone()
    }

    /// Set the component id; later calls overwrite only while the unique id
    /// is still unset.
    pub fn set_id(&self, id: &str) {
        if self.unique_id.get().is_some() {
            return;
        }
        write(&self.inner).id = Some(id.to_owned());
    }

    /// Composite `scope/bundle/origin/id/branch` key, computed from the
    /// current fields on first use and immutable afterwards.
    pub fn unique_id(&self) -> Option<String> {
        if let Some(uid) = self.unique_id.get() {
            return Some(uid.clone());
        }
        let computed = {
            let inner = read(&self.inner);
            let id = inner.id.as_deref()?;
            format!(
                "{}/{}/{}/{}/{}",
                inner.scope.as_unique_segment(),
                inner.bundle_kind.as_unique_segment(),
                inner
                    .origin
                    .as_deref()
                    .or(inner.origin_appstream.as_deref())
                    .unwrap_or("*"),
                id,
                inner.branch.as_deref().unwrap_or("*"),
            )
        };
        Some(self.unique_id.get_or_init(|| computed).clone())
    }

    /// Parse a stored `scope/bundle/origin/id/branch` key back into the
    /// structured fields and freeze the unique id. No-op when the unique id
    /// was already set.
    pub fn set_from_unique_id(&self, unique_id: &str, kind: AppKind) {
        if self.unique_id.get().is_some() {
            return;
        }
        let parts: Vec<&str> = unique_id.split('/').collect();
        if parts.len() != 5 {
            tracing::warn!("malformed unique id '{unique_id}'");
            return;
        }
        {
            let mut inner = write(&self.inner);
            if parts[0] != "*" {
                inner.scope = Scope::from_str(parts[0]);
            }
            if parts[1] != "*" {
                inner.bundle_kind = BundleKind::from_str(parts[1]);
            }
            if parts[2] != "*" {
                inner.origin = Some(parts[2].to_owned());
            }
            if parts[3] != "*" {
                inner.id = Some(parts[3].to_owned());
            }
            if parts[4] != "*" {
                inner.branch = Some(parts[4].to_owned());
            }
            inner.kind = kind;
        }
        let _ = self.unique_id.set(unique_id.to_owned());
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AppState {
        AppState::from_u32(self.state.load(Ordering::Acquire))
    }

    /// Transition to `state`, enforcing the lifecycle table. Illegal
    /// transitions are logged and ignored. Entering a transient state
    /// records the previous stable state for [`App::state_recover`].
    pub fn set_state(&self, state: AppState) {
        let from = self.state();
        if from == state {
            return;
        }
        if !transition_allowed(from, state) {
            tracing::warn!(
                "ignoring illegal state change {} -> {} for {:?}",
                from,
                state,
                self.id()
            );
            return;
        }
        if state.is_transient() && !from.is_transient() {
            self.recover_state.store(from as u32, Ordering::Release);
        }
        self.state.store(state as u32, Ordering::Release);
        if !state.is_transient() {
            self.set_progress(None);
        }
    }

    /// Return to the last stable state recorded before the current
    /// transient one. Used after cancellation and failures; bypasses the
    /// transition table.
    pub fn state_recover(&self) {
        let recover = self.recover_state.load(Ordering::Acquire);
        self.state.store(recover, Ordering::Release);
        self.set_progress(None);
    }

    /// Operation progress, 0..=100, when the state is transient.
    pub fn progress(&self) -> Option<u8> {
        let raw = self.progress.load(Ordering::Acquire);
        u8::try_from(raw).ok().filter(|p| *p <= 100)
    }

    /// Set or clear the operation progress.
    pub fn set_progress(&self, progress: Option<u8>) {
        let raw = progress.map_or(-1, |p| i32::from(p.min(100)));
        self.progress.store(raw, Ordering::Release);
    }

    /// Whether the in-flight operation may be cancelled.
    pub fn allow_cancel(&self) -> bool {
        self.allow_cancel.load(Ordering::Acquire)
    }

    /// Set whether the in-flight operation may be cancelled.
    pub fn set_allow_cancel(&self, allow: bool) {
        self.allow_cancel.store(allow, Ordering::Release);
    }

    /// Priority inherited from the owning plugin, used by dedupe.
    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Set the plugin priority.
    pub fn set_priority(&self, priority: u32) {
        self.priority.store(priority, Ordering::Release);
    }

    /// Search match value with the ID weight already stripped.
    pub fn match_value(&self) -> u16 {
        self.match_value.load(Ordering::Acquire) as u16
    }

    /// Store the search match value.
    pub fn set_match_value(&self, value: u16) {
        self.match_value.store(u32::from(value), Ordering::Release);
    }

    /// The app's long-lived cancellation handle.
    pub fn cancellable(&self) -> CancellationToken {
        self.cancellable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Replace the cancellation handle at the start of a new operation and
    /// return the fresh token.
    pub fn reset_cancellable(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        let mut guard = self
            .cancellable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = fresh.clone();
        fresh
    }

    /// Component kind.
    pub fn kind(&self) -> AppKind {
        read(&self.inner).kind
    }

    /// Set the component kind.
    pub fn set_kind(&self, kind: AppKind) {
        write(&self.inner).kind = kind;
    }

    /// Auxiliary special kind.
    pub fn special_kind(&self) -> SpecialKind {
        read(&self.inner).special_kind
    }

    /// Set the auxiliary special kind.
    pub fn set_special_kind(&self, kind: SpecialKind) {
        write(&self.inner).special_kind = kind;
    }

    /// Installation scope.
    pub fn scope(&self) -> Scope {
        read(&self.inner).scope
    }

    /// Set the installation scope.
    pub fn set_scope(&self, scope: Scope) {
        write(&self.inner).scope = scope;
    }

    /// Packaging technology.
    pub fn bundle_kind(&self) -> BundleKind {
        read(&self.inner).bundle_kind
    }

    /// Set the packaging technology.
    pub fn set_bundle_kind(&self, kind: BundleKind) {
        write(&self.inner).bundle_kind = kind;
    }

    /// Branch name (e.g. a flatpak ref branch).
    pub fn branch(&self) -> Option<String> {
        read(&self.inner).branch.clone()
    }

    /// Set the branch name.
    pub fn set_branch(&self, branch: &str) {
        write(&self.inner).branch = Some(branch.to_owned());
    }

    /// Whether the quirk is present.
    pub fn has_quirk(&self, quirk: Quirks) -> bool {
        read(&self.inner).quirks.contains(quirk)
    }

    /// Add a quirk.
    pub fn add_quirk(&self, quirk: Quirks) {
        write(&self.inner).quirks.insert(quirk);
    }

    /// Remove a quirk.
    pub fn remove_quirk(&self, quirk: Quirks) {
        write(&self.inner).quirks.remove(quirk);
    }

    /// Whether the kudo is present.
    pub fn has_kudo(&self, kudo: Kudos) -> bool {
        read(&self.inner).kudos.contains(kudo)
    }

    /// Add a kudo.
    pub fn add_kudo(&self, kudo: Kudos) {
        write(&self.inner).kudos.insert(kudo);
    }

    /// Display name.
    pub fn name(&self) -> Option<String> {
        read(&self.inner).name.as_ref().map(|(_, n)| n.clone())
    }

    /// Set the display name unless a higher-quality value is present.
    pub fn set_name(&self, quality: Quality, name: &str) {
        let mut inner = write(&self.inner);
        if inner.name.as_ref().is_none_or(|(q, _)| quality >= *q) {
            inner.name = Some((quality, name.to_owned()));
        }
    }

    /// One-line summary.
    pub fn summary(&self) -> Option<String> {
        read(&self.inner).summary.as_ref().map(|(_, s)| s.clone())
    }

    /// Set the summary unless a higher-quality value is present.
    pub fn set_summary(&self, quality: Quality, summary: &str) {
        let mut inner = write(&self.inner);
        if inner.summary.as_ref().is_none_or(|(q, _)| quality >= *q) {
            inner.summary = Some((quality, summary.to_owned()));
        }
    }

    /// Long description markup.
    pub fn description(&self) -> Option<String> {
        read(&self.inner).description.as_ref().map(|(_, d)| d.clone())
    }

    /// Set the description unless a higher-quality value is present.
    pub fn set_description(&self, quality: Quality, description: &str) {
        let mut inner = write(&self.inner);
        if inner.description.as_ref().is_none_or(|(q, _)| quality >= *q) {
            inner.description = Some((quality, description.to_owned()));
        }
    }

    /// Icon descriptors in source order.
    pub fn icons(&self) -> Vec<Icon> {
        read(&self.inner).icons.clone()
    }

    /// Whether any icon descriptor is attached.
    pub fn has_icons(&self) -> bool {
        !read(&self.inner).icons.is_empty()
    }

    /// Append an icon unless an equal one (kind, source, size) exists.
    pub fn add_icon(&self, icon: Icon) {
        let mut inner = write(&self.inner);
        let dup = inner.icons.iter().any(|i| {
            i.kind == icon.kind && i.source == icon.source && i.width == icon.width
        });
        if !dup {
            inner.icons.push(icon);
        }
    }

    /// Screenshots in source order.
    pub fn screenshots(&self) -> Vec<Screenshot> {
        read(&self.inner).screenshots.clone()
    }

    /// Append a screenshot.
    pub fn add_screenshot(&self, screenshot: Screenshot) {
        write(&self.inner).screenshots.push(screenshot);
    }

    /// Current version string.
    pub fn version(&self) -> Option<String> {
        read(&self.inner).version.clone()
    }

    /// Set the current version string.
    pub fn set_version(&self, version: &str) {
        write(&self.inner).version = Some(version.to_owned());
    }

    /// Release date in unix seconds.
    pub fn release_date(&self) -> Option<u64> {
        read(&self.inner).release_date
    }

    /// Set the release date, first write wins.
    pub fn set_release_date(&self, timestamp: u64) {
        let mut inner = write(&self.inner);
        if inner.release_date.is_none() {
            inner.release_date = Some(timestamp);
        }
    }

    /// Ordered release history, newest first as shipped.
    pub fn version_history(&self) -> Vec<Release> {
        read(&self.inner).version_history.clone()
    }

    /// Replace the release history.
    pub fn set_version_history(&self, history: Vec<Release>) {
        write(&self.inner).version_history = history;
    }

    /// Version the pending update brings, when known.
    pub fn update_version(&self) -> Option<String> {
        read(&self.inner).update_version.clone()
    }

    /// Set the pending update version, first write wins.
    pub fn set_update_version(&self, version: &str) {
        let mut inner = write(&self.inner);
        if inner.update_version.is_none() {
            inner.update_version = Some(version.to_owned());
        }
    }

    /// Markup describing the pending updates.
    pub fn update_details_markup(&self) -> Option<String> {
        read(&self.inner).update_details_markup.clone()
    }

    /// Set the pending update markup.
    pub fn set_update_details_markup(&self, markup: &str) {
        write(&self.inner).update_details_markup = Some(markup.to_owned());
    }

    /// Worst urgency across pending updates.
    pub fn update_urgency(&self) -> UrgencyKind {
        read(&self.inner).update_urgency
    }

    /// Raise the pending update urgency; lower values never overwrite.
    pub fn set_update_urgency(&self, urgency: UrgencyKind) {
        let mut inner = write(&self.inner);
        if urgency > inner.update_urgency {
            inner.update_urgency = urgency;
        }
    }

    /// Project license expression.
    pub fn license(&self) -> Option<String> {
        read(&self.inner).license.as_ref().map(|(_, l)| l.clone())
    }

    /// Set the license unless a higher-quality value is present.
    pub fn set_license(&self, quality: Quality, license: &str) {
        let mut inner = write(&self.inner);
        if inner.license.as_ref().is_none_or(|(q, _)| quality >= *q) {
            inner.license = Some((quality, license.to_owned()));
        }
    }

    /// Project group (desktop environment) name.
    pub fn project_group(&self) -> Option<String> {
        read(&self.inner).project_group.clone()
    }

    /// Set the project group.
    pub fn set_project_group(&self, group: &str) {
        write(&self.inner).project_group = Some(group.to_owned());
    }

    /// Developer or publisher name.
    pub fn developer_name(&self) -> Option<String> {
        read(&self.inner).developer_name.clone()
    }

    /// Set the developer name.
    pub fn set_developer_name(&self, name: &str) {
        write(&self.inner).developer_name = Some(name.to_owned());
    }

    /// Backend origin name, falling back to the catalog origin.
    pub fn origin(&self) -> Option<String> {
        let inner = read(&self.inner);
        inner.origin.clone().or_else(|| inner.origin_appstream.clone())
    }

    /// Set the backend origin name.
    pub fn set_origin(&self, origin: &str) {
        if self.unique_id.get().is_some() {
            return;
        }
        write(&self.inner).origin = Some(origin.to_owned());
    }

    /// Origin recorded in the catalog metadata itself.
    pub fn origin_appstream(&self) -> Option<String> {
        read(&self.inner).origin_appstream.clone()
    }

    /// Set the catalog origin, first write wins.
    pub fn set_origin_appstream(&self, origin: &str) {
        let mut inner = write(&self.inner);
        if inner.origin_appstream.is_none() {
            inner.origin_appstream = Some(origin.to_owned());
        }
    }

    /// User-visible origin label.
    pub fn origin_ui(&self) -> Option<String> {
        read(&self.inner).origin_ui.clone()
    }

    /// Set the user-visible origin label.
    pub fn set_origin_ui(&self, origin_ui: &str) {
        write(&self.inner).origin_ui = Some(origin_ui.to_owned());
    }

    /// Hostname of the origin server.
    pub fn origin_hostname(&self) -> Option<String> {
        read(&self.inner).origin_hostname.clone()
    }

    /// Set the origin hostname.
    pub fn set_origin_hostname(&self, hostname: &str) {
        write(&self.inner).origin_hostname = Some(hostname.to_owned());
    }

    /// Backend source identifiers (e.g. package names).
    pub fn sources(&self) -> Vec<String> {
        read(&self.inner).sources.clone()
    }

    /// Append a backend source identifier and mark the has-source quirk.
    pub fn add_source(&self, source: &str) {
        let mut inner = write(&self.inner);
        if !inner.sources.iter().any(|s| s == source) {
            inner.sources.push(source.to_owned());
        }
        inner.quirks.insert(Quirks::HAS_SOURCE);
    }

    /// Copy of the addons list.
    pub fn dup_addons(&self) -> AppList {
        read(&self.inner).addons.clone()
    }

    /// Merge apps into the addons list, deduplicating by unique id.
    pub fn add_addons(&self, addons: &AppList) {
        let mut inner = write(&self.inner);
        for addon in addons.iter() {
            inner.addons.add(addon.clone());
        }
    }

    /// Copy of the related-apps list.
    pub fn related(&self) -> AppList {
        read(&self.inner).related.clone()
    }

    /// Merge an app into the related list.
    pub fn add_related(&self, app: Arc<App>) {
        write(&self.inner).related.add(app);
    }

    /// Declared relations.
    pub fn relations(&self) -> Vec<Relation> {
        read(&self.inner).relations.clone()
    }

    /// Append a relation.
    pub fn add_relation(&self, relation: Relation) {
        write(&self.inner).relations.push(relation);
    }

    /// OARS content rating.
    pub fn content_rating(&self) -> Option<ContentRating> {
        read(&self.inner).content_rating.clone()
    }

    /// Set the content rating, first write wins.
    pub fn set_content_rating(&self, rating: ContentRating) {
        let mut inner = write(&self.inner);
        if inner.content_rating.is_none() {
            inner.content_rating = Some(rating);
        }
    }

    /// Provided items.
    pub fn provided_items(&self) -> Vec<ProvidedItem> {
        read(&self.inner).provided.clone()
    }

    /// Append a provided item.
    pub fn add_provided_item(&self, kind: ProvidedKind, value: &str) {
        write(&self.inner).provided.push(ProvidedItem {
            kind,
            value: value.to_owned(),
        });
    }

    /// Read one size slot.
    pub fn size(&self, kind: SizeKind) -> SizeValue {
        let sizes = read(&self.inner).sizes;
        match kind {
            SizeKind::Installed => sizes.installed,
            SizeKind::Download => sizes.download,
            SizeKind::Data => sizes.data,
            SizeKind::Cache => sizes.cache,
            SizeKind::UserData => sizes.user_data,
        }
    }

    /// Write one size slot.
    pub fn set_size(&self, kind: SizeKind, value: SizeValue) {
        let mut inner = write(&self.inner);
        let slot = match kind {
            SizeKind::Installed => &mut inner.sizes.installed,
            SizeKind::Download => &mut inner.sizes.download,
            SizeKind::Data => &mut inner.sizes.data,
            SizeKind::Cache => &mut inner.sizes.cache,
            SizeKind::UserData => &mut inner.sizes.user_data,
        };
        *slot = value;
    }

    /// Category memberships.
    pub fn categories(&self) -> Vec<String> {
        read(&self.inner).categories.iter().cloned().collect()
    }

    /// Whether the app belongs to the category.
    pub fn has_category(&self, category: &str) -> bool {
        read(&self.inner).categories.contains(category)
    }

    /// Add a category membership.
    pub fn add_category(&self, category: &str) {
        write(&self.inner).categories.insert(category.to_owned());
    }

    /// Sandbox permissions.
    pub fn permissions(&self) -> Permissions {
        read(&self.inner).permissions
    }

    /// Add sandbox permissions.
    pub fn add_permissions(&self, permissions: Permissions) {
        write(&self.inner).permissions.insert(permissions);
    }

    /// Read a metadata item.
    pub fn metadata_item(&self, key: &str) -> Option<String> {
        read(&self.inner).metadata.get(key).cloned()
    }

    /// Set a metadata item; no-op when the key is already present.
    pub fn set_metadata(&self, key: &str, value: &str) {
        let mut inner = write(&self.inner);
        if !inner.metadata.contains_key(key) {
            inner.metadata.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Remove a metadata item.
    pub fn remove_metadata(&self, key: &str) {
        write(&self.inner).metadata.remove(key);
    }

    /// Name of the plugin that owns this app.
    pub fn management_plugin(&self) -> Option<String> {
        read(&self.inner).management_plugin.clone()
    }

    /// Set the owning plugin, first write wins.
    pub fn set_management_plugin(&self, plugin: &str) {
        let mut inner = write(&self.inner);
        if inner.management_plugin.is_none() {
            inner.management_plugin = Some(plugin.to_owned());
        }
    }

    /// Job kind queued against this app.
    pub fn pending_action(&self) -> Option<PendingAction> {
        read(&self.inner).pending_action
    }

    /// Set or clear the queued job kind.
    pub fn set_pending_action(&self, action: Option<PendingAction>) {
        write(&self.inner).pending_action = action;
    }

    /// Launchable value for a kind.
    pub fn launchable(&self, kind: LaunchableKind) -> Option<String> {
        let key = match kind {
            LaunchableKind::DesktopId => "desktop-id",
            LaunchableKind::Url => "url",
        };
        read(&self.inner).launchables.get(key).cloned()
    }

    /// Set a launchable value, first write per kind wins.
    pub fn set_launchable(&self, kind: LaunchableKind, value: &str) {
        let key = match kind {
            LaunchableKind::DesktopId => "desktop-id",
            LaunchableKind::Url => "url",
        };
        let mut inner = write(&self.inner);
        if !inner.launchables.contains_key(key) {
            inner.launchables.insert(key, value.to_owned());
        }
    }

    /// Upstream URL of the given kind (`homepage`, `bugtracker`, ...).
    pub fn url(&self, kind: &str) -> Option<String> {
        read(&self.inner).urls.get(kind).cloned()
    }

    /// Set an upstream URL, first write per kind wins.
    pub fn set_url(&self, kind: &str, url: &str) {
        let mut inner = write(&self.inner);
        if !inner.urls.contains_key(kind) {
            inner.urls.insert(kind.to_owned(), url.to_owned());
        }
    }

    /// Whether the component declares any translations.
    pub fn has_translations(&self) -> bool {
        read(&self.inner).has_translations
    }

    /// Mark the component as carrying translations.
    pub fn set_has_translations(&self, value: bool) {
        write(&self.inner).has_translations = value;
    }

    /// Whether the app was marked for install alongside its parent.
    pub fn to_be_installed(&self) -> bool {
        read(&self.inner).to_be_installed
    }

    /// Mark the app for install alongside its parent.
    pub fn set_to_be_installed(&self, value: bool) {
        write(&self.inner).to_be_installed = value;
    }

    /// Whether an update can be applied right now.
    pub fn is_updatable(&self) -> bool {
        self.state().is_updatable()
    }

    /// Merge another app's data into this one after a dedupe decision.
    ///
    /// Only fills holes: metadata keys, origin fields and the version when
    /// the loser's is newer and ours is unset.
    pub fn absorb(&self, loser: &App) {
        let loser_inner = read(&loser.inner);
        let mut inner = write(&self.inner);
        for (k, v) in &loser_inner.metadata {
            inner.metadata.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if inner.origin.is_none() {
            inner.origin = loser_inner.origin.clone();
        }
        if inner.origin_appstream.is_none() {
            inner.origin_appstream = loser_inner.origin_appstream.clone();
        }
        if inner.version.is_none() {
            inner.version = loser_inner.version.clone();
        }
        inner.kudos.insert(loser_inner.kudos);
    }

    /// Whether this app should win a duplicate-priority tie against
    /// `other`, i.e. its version is strictly newer.
    pub fn newer_than(&self, other: &App) -> bool {
        match (self.version(), other.version()) {
            (Some(a), Some(b)) => vercmp(&a, &b) == std::cmp::Ordering::Greater,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_is_immutable_after_first_set() {
        let app = App::new(None);
        app.set_from_unique_id("system/flatpak/flathub/org.ex.A/stable", AppKind::DesktopApp);
        app.set_from_unique_id("user/package/fedora/org.ex.B/master", AppKind::DesktopApp);
        assert_eq!(
            app.unique_id().as_deref(),
            Some("system/flatpak/flathub/org.ex.A/stable")
        );
        assert_eq!(app.id().as_deref(), Some("org.ex.A"));
        assert_eq!(app.scope(), Scope::System);
        assert_eq!(app.bundle_kind(), BundleKind::Flatpak);
        assert_eq!(app.branch().as_deref(), Some("stable"));
    }

    #[test]
    fn unique_id_freezes_on_first_read() {
        let app = App::new(Some("org.ex.A"));
        assert_eq!(app.unique_id().as_deref(), Some("*/*/*/org.ex.A/*"));
        app.set_origin("flathub");
        // frozen on first read, the later origin does not change the key
        assert_eq!(app.unique_id().as_deref(), Some("*/*/*/org.ex.A/*"));
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let app = App::new(Some("org.ex.A"));
        app.set_state(AppState::Available);
        app.set_state(AppState::Installed);
        assert_eq!(app.state(), AppState::Available);
    }

    #[test]
    fn state_recover_returns_to_stable() {
        let app = App::new(Some("org.ex.A"));
        app.set_state(AppState::Available);
        app.set_state(AppState::Installing);
        app.set_progress(Some(40));
        app.state_recover();
        assert_eq!(app.state(), AppState::Available);
        assert_eq!(app.progress(), None);
    }

    #[test]
    fn name_quality_never_downgrades() {
        let app = App::new(Some("org.ex.A"));
        app.set_name(Quality::Highest, "Proper Name");
        app.set_name(Quality::Lowest, "guessed");
        assert_eq!(app.name().as_deref(), Some("Proper Name"));
        app.set_name(Quality::Highest, "Replacement");
        assert_eq!(app.name().as_deref(), Some("Replacement"));
    }

    #[test]
    fn metadata_is_first_write_wins() {
        let app = App::new(Some("org.ex.A"));
        app.set_metadata("appshelf::Creator", "dummy");
        app.set_metadata("appshelf::Creator", "other");
        assert_eq!(app.metadata_item("appshelf::Creator").as_deref(), Some("dummy"));
    }

    #[test]
    fn duplicate_icons_are_dropped() {
        let app = App::new(Some("org.ex.A"));
        app.add_icon(Icon::new(IconKind::Stock, "web-browser"));
        app.add_icon(Icon::new(IconKind::Stock, "web-browser"));
        assert_eq!(app.icons().len(), 1);
    }

    #[test]
    fn absorb_merges_without_overwrite() {
        let winner = App::new(Some("org.ex.A"));
        winner.set_metadata("k", "winner");
        let loser = App::new(Some("org.ex.A"));
        loser.set_metadata("k", "loser");
        loser.set_metadata("extra", "v");
        loser.set_origin("fedora");
        winner.absorb(&loser);
        assert_eq!(winner.metadata_item("k").as_deref(), Some("winner"));
        assert_eq!(winner.metadata_item("extra").as_deref(), Some("v"));
        assert_eq!(winner.origin().as_deref(), Some("fedora"));
    }
}
