//! Backend plugin abstraction.
//!
//! A backend implements some subset of the operation vtable as an async
//! trait; which slots exist is declared up front through [`JobSlots`], the
//! registration-time stand-in for symbol discovery in loadable modules.
//! The loader probes the slot set before calling, so an absent slot is a
//! no-op rather than an error.

mod cache;
pub mod loader;

pub use cache::PluginCache;
pub use loader::{LoaderSignal, PluginLoader, PluginLoaderBuilder};

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bitflags::bitflags;
use tokio::sync::mpsc;

use crate::app::{App, AppList, Category, RefineFlags};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::jobs::{AppQuery, JobContext, RepositoryAction, UpdateAppsFlags};

bitflags! {
    /// Operation slots a backend implements.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct JobSlots: u32 {
        /// `setup` participates in loader startup.
        const SETUP = 1 << 0;
        /// `shutdown` participates in loader teardown.
        const SHUTDOWN = 1 << 1;
        /// `refine` fills app fields.
        const REFINE = 1 << 2;
        /// `list_apps` contributes catalog candidates.
        const LIST_APPS = 1 << 3;
        /// `refresh_metadata` refreshes on-disk caches.
        const REFRESH_METADATA = 1 << 4;
        /// `list_distro_upgrades` knows about OS upgrades.
        const LIST_DISTRO_UPGRADES = 1 << 5;
        /// `install_repository` can add repos.
        const INSTALL_REPOSITORY = 1 << 6;
        /// `remove_repository` can delete repos.
        const REMOVE_REPOSITORY = 1 << 7;
        /// `enable_repository` can enable repos.
        const ENABLE_REPOSITORY = 1 << 8;
        /// `disable_repository` can disable repos.
        const DISABLE_REPOSITORY = 1 << 9;
        /// `refine_categories` counts category sizes.
        const REFINE_CATEGORIES = 1 << 10;
        /// `install_apps` installs.
        const INSTALL_APPS = 1 << 11;
        /// `remove_apps` uninstalls.
        const REMOVE_APPS = 1 << 12;
        /// `update_apps` applies updates.
        const UPDATE_APPS = 1 << 13;
        /// `launch` starts an installed app.
        const LAUNCH = 1 << 14;
        /// `update_cancel` aborts a running update.
        const UPDATE_CANCEL = 1 << 15;
        /// `upgrade_download` fetches a distro upgrade.
        const UPGRADE_DOWNLOAD = 1 << 16;
        /// `upgrade_trigger` schedules a fetched upgrade.
        const UPGRADE_TRIGGER = 1 << 17;
        /// `url_to_app` resolves scheme URLs.
        const URL_TO_APP = 1 << 18;
        /// `file_to_app` resolves local files.
        const FILE_TO_APP = 1 << 19;
        /// The three offline-update helpers.
        const OFFLINE_UPDATES = 1 << 20;
        /// `adopt_app` claims unowned apps.
        const ADOPT = 1 << 21;
    }
}

/// Rule sets controlling plugin ordering and conflicts.
#[derive(Clone, Debug, Default)]
pub struct PluginRules {
    /// Plugins that must run before this one.
    pub run_after: Vec<String>,
    /// Plugins that must run after this one.
    pub run_before: Vec<String>,
    /// Plugins this one outranks for dedupe priority.
    pub better_than: Vec<String>,
    /// Plugins disabled while this one is enabled.
    pub conflicts: Vec<String>,
}

/// Static facts a backend declares at registration.
#[derive(Clone, Debug)]
pub struct BackendInfo {
    /// Unique plugin name, also the metadata key prefix.
    pub name: String,
    /// AppStream id of the backend itself, when it has one.
    pub appstream_id: Option<String>,
    /// Initial run-order hint, raised by the depsolver.
    pub order: u32,
    /// Initial dedupe priority, raised by `better_than` rules.
    pub priority: u32,
    /// Whether the plugin starts enabled.
    pub enabled: bool,
    /// Ordering and conflict rules.
    pub rules: PluginRules,
}

impl BackendInfo {
    /// Info with defaults for a named backend.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            appstream_id: None,
            order: 0,
            priority: 0,
            enabled: true,
            rules: PluginRules::default(),
        }
    }
}

/// Opaque bus connections the embedding shell may hand to plugins.
#[derive(Clone, Default)]
pub struct BusHandles {
    /// Session bus connection, when the shell provides one.
    pub session: Option<Arc<dyn std::any::Any + Send + Sync>>,
    /// System bus connection, when the shell provides one.
    pub system: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

impl std::fmt::Debug for BusHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandles")
            .field("session", &self.session.is_some())
            .field("system", &self.system.is_some())
            .finish()
    }
}

/// Interactive prompts the embedding shell answers for plugins.
#[derive(Clone, Default)]
pub struct ShellCallbacks {
    /// Confirm installing from an untrusted source:
    /// `(title, message, details, accept_label)` to proceed-or-not.
    pub ask_untrusted: Option<Arc<dyn Fn(&str, &str, &str, &str) -> bool + Send + Sync>>,
    /// Ask for credentials for `(remote, realm)`; `None` cancels.
    pub basic_auth_start:
        Option<Arc<dyn Fn(&str, &str) -> Option<(String, String)> + Send + Sync>>,
}

impl std::fmt::Debug for ShellCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellCallbacks")
            .field("ask_untrusted", &self.ask_untrusted.is_some())
            .field("basic_auth_start", &self.basic_auth_start.is_some())
            .finish()
    }
}

/// Signals a plugin raises towards the loader.
#[derive(Clone, Debug)]
pub enum PluginSignal {
    /// The set of available updates changed; debounced by the loader.
    UpdatesChanged,
    /// Backend data changed wholesale; debounced, fanned out as reloads.
    Reload,
    /// Progress status for an app (or globally when `app` is `None`).
    StatusChanged {
        /// Unique id of the app concerned.
        app: Option<String>,
        /// Status keyword, e.g. `downloading`.
        status: String,
    },
    /// An event to surface on the loader-wide stream.
    ReportEvent(Arc<Event>),
    /// The backend gained or lost the ability to apply updates.
    AllowUpdates(bool),
    /// A repository app changed state.
    RepositoryChanged {
        /// Unique id of the repository app.
        app: String,
    },
}

/// A plugin's view of loader facilities during a call.
///
/// Handed to every vtable slot; wraps the per-plugin state (cache,
/// interactive counter) and the signal channel back to the loader.
pub struct Plugin {
    backend: Box<dyn Backend>,
    enabled: AtomicBool,
    order: AtomicU32,
    priority: AtomicU32,
    cache: PluginCache,
    interactive: AtomicU32,
    language: String,
    scale: u32,
    buses: BusHandles,
    callbacks: ShellCallbacks,
    network: Arc<crate::network::NetworkMonitor>,
    signals: mpsc::UnboundedSender<(String, PluginSignal)>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name())
            .field("enabled", &self.enabled())
            .field("order", &self.order())
            .field("priority", &self.priority())
            .finish_non_exhaustive()
    }
}

impl Plugin {
    /// Wrap a backend for the loader. `signals` is the loader's intake.
    pub(crate) fn new(
        backend: Box<dyn Backend>,
        language: String,
        scale: u32,
        buses: BusHandles,
        callbacks: ShellCallbacks,
        network: Arc<crate::network::NetworkMonitor>,
        signals: mpsc::UnboundedSender<(String, PluginSignal)>,
    ) -> Self {
        let info = backend.info().clone();
        Self {
            backend,
            enabled: AtomicBool::new(info.enabled),
            order: AtomicU32::new(info.order),
            priority: AtomicU32::new(info.priority),
            cache: PluginCache::new(),
            interactive: AtomicU32::new(0),
            language,
            scale,
            buses,
            callbacks,
            network,
            signals,
        }
    }

    /// The backend implementation.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Declared static info.
    pub fn info(&self) -> &BackendInfo {
        self.backend.info()
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.backend.info().name
    }

    /// Declared slot set.
    pub fn slots(&self) -> JobSlots {
        self.backend.slots()
    }

    /// Whether the plugin is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the plugin.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Current run order.
    pub fn order(&self) -> u32 {
        self.order.load(Ordering::Acquire)
    }

    /// Set the run order (depsolver only).
    pub fn set_order(&self, order: u32) {
        self.order.store(order, Ordering::Release);
    }

    /// Current dedupe priority.
    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Set the dedupe priority (depsolver only).
    pub fn set_priority(&self, priority: u32) {
        self.priority.store(priority, Ordering::Release);
    }

    /// The per-plugin app cache.
    pub fn cache(&self) -> &PluginCache {
        &self.cache
    }

    /// Enter an interactive scope: a user is watching this operation.
    pub fn interactive_inc(&self) {
        self.interactive.fetch_add(1, Ordering::AcqRel);
    }

    /// Leave an interactive scope.
    pub fn interactive_dec(&self) {
        let prev = self.interactive.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "interactive counter underflow");
    }

    /// Whether any interactive scope is open.
    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::Acquire) > 0
    }

    /// Configured UI language.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Configured UI scale factor.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Bus connections from the embedding shell.
    pub fn buses(&self) -> &BusHandles {
        &self.buses
    }

    /// The shared network monitor, for backends that gate downloads on
    /// connectivity themselves.
    pub fn network(&self) -> &crate::network::NetworkMonitor {
        &self.network
    }

    /// Raise a signal towards the loader.
    pub fn emit(&self, signal: PluginSignal) {
        let _ = self.signals.send((self.name().to_owned(), signal));
    }

    /// Ask the user to confirm an untrusted operation; refused when the
    /// shell registered no prompt.
    pub fn ask_untrusted(&self, title: &str, message: &str, details: &str, accept: &str) -> bool {
        match &self.callbacks.ask_untrusted {
            Some(cb) => cb(title, message, details, accept),
            None => false,
        }
    }

    /// Ask the user for basic-auth credentials; `None` when unavailable
    /// or cancelled.
    pub fn request_basic_auth(&self, remote: &str, realm: &str) -> Option<(String, String)> {
        self.callbacks
            .basic_auth_start
            .as_ref()
            .and_then(|cb| cb(remote, realm))
    }
}

/// Shorthand for the default "slot not implemented" error.
fn unimplemented_slot(name: &str) -> Error {
    Error::not_supported(format!("backend does not implement {name}"))
}

/// The asynchronous operation vtable of a backend.
///
/// Implement only the slots declared in [`Backend::slots`]; the defaults
/// return `not-supported` as a guard against probe mismatches. Every slot
/// must honor the job's cancellation token: finish quickly or surface
/// `cancelled`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Static registration facts.
    fn info(&self) -> &BackendInfo;

    /// Which slots this backend implements.
    fn slots(&self) -> JobSlots;

    /// One-time startup; failure disables the plugin.
    async fn setup(
        &self,
        _plugin: &Plugin,
        _token: &tokio_util::sync::CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    /// Orderly teardown at loader shutdown.
    async fn shutdown(&self, _plugin: &Plugin) -> Result<()> {
        Ok(())
    }

    /// Fill requested fields on each app of the list. Plugins may also
    /// append resolved apps next to wildcard placeholders.
    async fn refine(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _list: &mut AppList,
        _flags: RefineFlags,
    ) -> Result<()> {
        Err(unimplemented_slot("refine"))
    }

    /// Contribute catalog candidates for a query.
    async fn list_apps(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _query: &AppQuery,
    ) -> Result<AppList> {
        Err(unimplemented_slot("list_apps"))
    }

    /// Refresh caches older than `cache_age_secs`.
    async fn refresh_metadata(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _cache_age_secs: u64,
    ) -> Result<()> {
        Err(unimplemented_slot("refresh_metadata"))
    }

    /// List known distribution upgrades.
    async fn list_distro_upgrades(&self, _plugin: &Plugin, _ctx: &JobContext) -> Result<AppList> {
        Err(unimplemented_slot("list_distro_upgrades"))
    }

    /// Apply a repository action. One slot bit per action keeps the probe
    /// semantics of the original per-symbol discovery.
    async fn manage_repository(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _action: RepositoryAction,
        _repository: &Arc<App>,
    ) -> Result<()> {
        Err(unimplemented_slot("manage_repository"))
    }

    /// Count apps per category.
    async fn refine_categories(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _categories: &[Arc<Category>],
    ) -> Result<()> {
        Err(unimplemented_slot("refine_categories"))
    }

    /// Install every app in the list.
    async fn install_apps(&self, _plugin: &Plugin, _ctx: &JobContext, _apps: &AppList) -> Result<()> {
        Err(unimplemented_slot("install_apps"))
    }

    /// Remove every app in the list.
    async fn remove_apps(&self, _plugin: &Plugin, _ctx: &JobContext, _apps: &AppList) -> Result<()> {
        Err(unimplemented_slot("remove_apps"))
    }

    /// Apply updates to every app in the list.
    async fn update_apps(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _apps: &AppList,
        _flags: UpdateAppsFlags,
    ) -> Result<()> {
        Err(unimplemented_slot("update_apps"))
    }

    /// Launch an installed app.
    async fn launch(&self, _plugin: &Plugin, _ctx: &JobContext, _app: &Arc<App>) -> Result<()> {
        Err(unimplemented_slot("launch"))
    }

    /// Abort an update in flight.
    async fn update_cancel(&self, _plugin: &Plugin, _ctx: &JobContext, _app: &Arc<App>) -> Result<()> {
        Err(unimplemented_slot("update_cancel"))
    }

    /// Download a distribution upgrade.
    async fn upgrade_download(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _app: &Arc<App>,
    ) -> Result<()> {
        Err(unimplemented_slot("upgrade_download"))
    }

    /// Schedule a downloaded upgrade for the next boot.
    async fn upgrade_trigger(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _app: &Arc<App>,
    ) -> Result<()> {
        Err(unimplemented_slot("upgrade_trigger"))
    }

    /// Resolve a URL to apps.
    async fn url_to_app(&self, _plugin: &Plugin, _ctx: &JobContext, _url: &str) -> Result<AppList> {
        Err(unimplemented_slot("url_to_app"))
    }

    /// Resolve a local file to apps.
    async fn file_to_app(&self, _plugin: &Plugin, _ctx: &JobContext, _path: &Path) -> Result<AppList> {
        Err(unimplemented_slot("file_to_app"))
    }

    /// Current offline-update state keyword.
    async fn offline_update_state(&self, _plugin: &Plugin, _ctx: &JobContext) -> Result<String> {
        Err(unimplemented_slot("offline_update_state"))
    }

    /// Cancel the prepared offline update.
    async fn cancel_offline_update(&self, _plugin: &Plugin, _ctx: &JobContext) -> Result<()> {
        Err(unimplemented_slot("cancel_offline_update"))
    }

    /// Set the after-update action (`reboot`, `shutdown`, ...).
    async fn set_offline_update_action(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _action: &str,
    ) -> Result<()> {
        Err(unimplemented_slot("set_offline_update_action"))
    }

    /// Synchronous hint: claim this app by setting its management plugin.
    fn adopt_app(&self, _plugin: &Plugin, _app: &App) {}

    /// Another plugin changed backend data wholesale; drop derived caches.
    /// Fanned out once per debounced reload burst.
    fn reload(&self, _plugin: &Plugin) {}
}
