//! Plugin discovery, ordering, lifecycle and job dispatch.
//!
//! The loader owns the registered plugins, resolves their run order and
//! priorities, runs setup and shutdown, and executes [`Job`]s against the
//! enabled set. Two pools back execution: a bounded one for installs and
//! upgrade downloads (sized from system memory), and the plain tokio
//! runtime for read-mostly work.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{Semaphore, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::app::{
    App, AppKind, AppList, AppState, Icon, IconKind, PendingAction, Quirks, RefineFlags,
};
use crate::appstream::SiloSlot;
use crate::error::{Error, ErrorKind, Result};
use crate::events::{Event, EventBus};
use crate::jobs::{
    AppQuery, DeveloperVerifiedType, Job, JobContext, JobManager, JobOutput, JobPayload,
    LicenseType, RepositoryAction,
};
use crate::network::NetworkMonitor;
use crate::plugin::{Backend, BusHandles, JobSlots, Plugin, PluginSignal, ShellCallbacks};
use crate::queue::{PendingQueue, default_queue_path};
use crate::settings::Settings;

/// Debounce window for updates-changed notifications.
const UPDATES_CHANGED_DELAY: Duration = Duration::from_secs(3);
/// Debounce window for reload notifications.
const RELOAD_DELAY: Duration = Duration::from_secs(5);
/// A single plugin call slower than this gets a timing log.
const SLOW_PLUGIN_CALL: Duration = Duration::from_secs(1);
/// Relaxation passes before the depsolver gives up.
const MAX_DEPSOLVE_PASSES: u32 = 100;
/// Default hard cap for the install pool.
const DEFAULT_MAX_INSTALL_PARALLELISM: usize = 20;
/// Metadata key recording which local file produced an app.
const METADATA_LOCAL_FILENAME: &str = "appshelf::local-filename";
/// Themed icon attached when a file/url resolution produced none.
const FALLBACK_APP_ICON: &str = "application-x-executable";

/// Loader-wide notifications for the embedding shell.
#[derive(Clone, Debug)]
pub enum LoaderSignal {
    /// The set of available updates changed (debounced).
    UpdatesChanged,
    /// Backend data changed wholesale (debounced).
    Reload,
    /// Progress status from a plugin.
    StatusChanged {
        /// Reporting plugin.
        plugin: String,
        /// Unique id of the app concerned, when any.
        app: Option<String>,
        /// Status keyword.
        status: String,
    },
    /// An event was surfaced through any job or plugin.
    EventAdded(Arc<Event>),
    /// The pending-install queue changed.
    PendingAppsChanged,
    /// A backend gained or lost the ability to apply updates.
    AllowUpdates(bool),
    /// A repository app changed.
    RepositoryChanged {
        /// Unique id of the repository app.
        app: String,
    },
}

/// Coalescing state for the two debounced notifications.
#[derive(Debug, Default)]
struct Debounce {
    updates_pending: bool,
    updates_timer: bool,
    updates_last: Option<Instant>,
    reload_pending: bool,
    reload_timer: bool,
    reload_last: Option<Instant>,
}

/// Builder assembling a [`PluginLoader`].
pub struct PluginLoaderBuilder {
    backends: Vec<Box<dyn Backend>>,
    allowlist: Option<Vec<String>>,
    blocklist: Option<Vec<String>>,
    language: String,
    scale: u32,
    settings: Option<Settings>,
    network: Option<Arc<NetworkMonitor>>,
    buses: BusHandles,
    callbacks: ShellCallbacks,
    queue_path: Option<PathBuf>,
    max_install_parallelism: usize,
}

impl Default for PluginLoaderBuilder {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            allowlist: None,
            blocklist: None,
            language: "C".to_owned(),
            scale: 1,
            settings: None,
            network: None,
            buses: BusHandles::default(),
            callbacks: ShellCallbacks::default(),
            queue_path: None,
            max_install_parallelism: DEFAULT_MAX_INSTALL_PARALLELISM,
        }
    }
}

impl PluginLoaderBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend.
    pub fn register(mut self, backend: Box<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Only plugins named here stay enabled.
    pub fn allowlist(mut self, names: Vec<String>) -> Self {
        self.allowlist = Some(names);
        self
    }

    /// Plugins named here are disabled.
    pub fn blocklist(mut self, names: Vec<String>) -> Self {
        self.blocklist = Some(names);
        self
    }

    /// UI language handed to plugins.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// UI scale factor handed to plugins.
    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Use these settings instead of loading from disk.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Share a network monitor with the embedding shell.
    pub fn network(mut self, network: Arc<NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    /// Bus connections handed to plugins.
    pub fn buses(mut self, buses: BusHandles) -> Self {
        self.buses = buses;
        self
    }

    /// Interactive shell prompts.
    pub fn callbacks(mut self, callbacks: ShellCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Override the pending-queue file location (tests).
    pub fn queue_path(mut self, path: PathBuf) -> Self {
        self.queue_path = Some(path);
        self
    }

    /// Cap the bounded install pool.
    pub fn max_install_parallelism(mut self, max: usize) -> Self {
        self.max_install_parallelism = max.max(1);
        self
    }

    /// Assemble the loader. Call [`PluginLoader::setup`] before running
    /// jobs.
    pub fn build(self) -> Arc<PluginLoader> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (signals, _) = broadcast::channel(64);
        let (setup_tx, _) = watch::channel(false);
        let network = self.network.unwrap_or_default();

        let plugins: Vec<Arc<Plugin>> = self
            .backends
            .into_iter()
            .map(|backend| {
                Arc::new(Plugin::new(
                    backend,
                    self.language.clone(),
                    self.scale,
                    self.buses.clone(),
                    self.callbacks.clone(),
                    network.clone(),
                    signal_tx.clone(),
                ))
            })
            .collect();

        let install_slots = install_pool_size(self.max_install_parallelism);
        tracing::debug!("install pool size {install_slots}");

        let fail_hard = std::env::var("APPSHELF_SELF_TEST_PLUGIN_ERROR_FAIL_HARD")
            .is_ok_and(|v| !v.is_empty());

        Arc::new(PluginLoader {
            plugins: RwLock::new(plugins),
            allowlist: self.allowlist,
            blocklist: self.blocklist,
            token: CancellationToken::new(),
            setup_complete: setup_tx,
            events: EventBus::new(),
            signals,
            jobs: JobManager::new(),
            queue: PendingQueue::new(self.queue_path.unwrap_or_else(default_queue_path)),
            network,
            settings: self.settings.unwrap_or_else(Settings::load),
            silo: SiloSlot::new(),
            install_pool: Arc::new(Semaphore::new(install_slots)),
            debounce: Mutex::new(Debounce::default()),
            fail_hard,
            signal_rx: Mutex::new(Some(signal_rx)),
        })
    }
}

/// `max(1, round(total_ram_MB / 1024))`, capped.
fn install_pool_size(cap: usize) -> usize {
    let ram_mib = crate::util::total_ram_mib();
    let slots = usize::try_from((ram_mib + 512) / 1024).unwrap_or(1).max(1);
    slots.min(cap)
}

/// The plugin registry and job executor. See the module documentation.
pub struct PluginLoader {
    plugins: RwLock<Vec<Arc<Plugin>>>,
    allowlist: Option<Vec<String>>,
    blocklist: Option<Vec<String>>,
    token: CancellationToken,
    setup_complete: watch::Sender<bool>,
    events: EventBus,
    signals: broadcast::Sender<LoaderSignal>,
    jobs: JobManager,
    queue: PendingQueue,
    network: Arc<NetworkMonitor>,
    settings: Settings,
    silo: SiloSlot,
    install_pool: Arc<Semaphore>,
    debounce: Mutex<Debounce>,
    fail_hard: bool,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<(String, PluginSignal)>>>,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugins", &self.plugins().len())
            .field("ready", &*self.setup_complete.borrow())
            .finish_non_exhaustive()
    }
}

impl PluginLoader {
    /// Snapshot of the plugin list in run order.
    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Find a plugin by name.
    pub fn find_plugin(&self, name: &str) -> Option<Arc<Plugin>> {
        self.plugins().into_iter().find(|p| p.name() == name)
    }

    /// Subscribe to loader-wide signals.
    pub fn subscribe(&self) -> broadcast::Receiver<LoaderSignal> {
        self.signals.subscribe()
    }

    /// The loader-wide event map.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The live job index.
    pub fn job_manager(&self) -> &JobManager {
        &self.jobs
    }

    /// The pending-install queue.
    pub fn pending_queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// The shared network monitor.
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Loaded settings snapshot.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The shared silo slot.
    pub fn silo(&self) -> &SiloSlot {
        &self.silo
    }

    /// The loader-wide cancellation token; cancelled at shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether setup finished.
    pub fn is_ready(&self) -> bool {
        *self.setup_complete.borrow()
    }

    /// Discover order, resolve conflicts, set up plugins and load the
    /// pending queue. Jobs submitted before this completes block on the
    /// setup broadcast.
    pub async fn setup(self: &Arc<Self>) -> Result<()> {
        if let Some(rx) = self
            .signal_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            let this = self.clone();
            tokio::spawn(async move { this.pump_signals(rx).await });
            let watcher = self.clone();
            tokio::spawn(async move { watcher.watch_network().await });
        }

        let result = self.setup_inner().await;
        // unblock queued jobs even when setup failed
        let _ = self.setup_complete.send(true);
        result?;

        self.load_queue_and_refine().await?;
        self.dump_state();
        Ok(())
    }

    /// Ordering, conflicts, priorities and parallel plugin setup.
    async fn setup_inner(self: &Arc<Self>) -> Result<()> {
        let plugins = self.plugins();

        if let Some(allowlist) = &self.allowlist {
            for plugin in &plugins {
                if plugin.enabled() && !allowlist.iter().any(|n| n == plugin.name()) {
                    tracing::debug!("{} not in allowlist, disabling", plugin.name());
                    plugin.set_enabled(false);
                }
            }
        }
        if let Some(blocklist) = &self.blocklist {
            for plugin in &plugins {
                if plugin.enabled() && blocklist.iter().any(|n| n == plugin.name()) {
                    tracing::debug!("{} in blocklist, disabling", plugin.name());
                    plugin.set_enabled(false);
                }
            }
        }

        self.depsolve_order(&plugins)?;

        // conflicts disable the named plugin outright
        for plugin in &plugins {
            if !plugin.enabled() {
                continue;
            }
            for name in &plugin.info().rules.conflicts {
                if let Some(dep) = find(&plugins, name)
                    && dep.enabled()
                {
                    tracing::debug!("disabling {} as conflicts with {}", dep.name(), plugin.name());
                    dep.set_enabled(false);
                }
            }
        }

        {
            let mut guard = self
                .plugins
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.sort_by(|a, b| {
                a.order()
                    .cmp(&b.order())
                    .then_with(|| a.name().cmp(b.name()))
            });
        }

        self.depsolve_priority(&plugins)?;

        // run all setups in parallel; a failing plugin is disabled, not fatal
        let setups = self
            .plugins()
            .into_iter()
            .filter(|p| p.enabled() && p.slots().contains(JobSlots::SETUP))
            .map(|plugin| {
                let token = self.token.clone();
                async move {
                    if let Err(err) = plugin.backend().setup(&plugin, &token).await {
                        tracing::debug!("disabling {} as setup failed: {err}", plugin.name());
                        plugin.set_enabled(false);
                    }
                }
            });
        join_all(setups).await;
        Ok(())
    }

    /// Fixed-point relaxation of `run_after`/`run_before` rules.
    fn depsolve_order(&self, plugins: &[Arc<Plugin>]) -> Result<()> {
        let mut passes = 0u32;
        loop {
            let mut changed = false;
            for plugin in plugins {
                for name in &plugin.info().rules.run_after {
                    let Some(dep) = find(plugins, name) else {
                        tracing::debug!(
                            "cannot find plugin '{name}' requested by '{}'",
                            plugin.name()
                        );
                        continue;
                    };
                    if !dep.enabled() {
                        continue;
                    }
                    if plugin.order() <= dep.order() {
                        plugin.set_order(dep.order() + 1);
                        changed = true;
                    }
                }
            }
            for plugin in plugins {
                for name in &plugin.info().rules.run_before {
                    let Some(dep) = find(plugins, name) else {
                        tracing::debug!(
                            "cannot find plugin '{name}' requested by '{}'",
                            plugin.name()
                        );
                        continue;
                    };
                    if !dep.enabled() {
                        continue;
                    }
                    if plugin.order() >= dep.order() {
                        dep.set_order(plugin.order() + 1);
                        changed = true;
                    }
                }
            }
            if !changed {
                return Ok(());
            }
            passes += 1;
            if passes > MAX_DEPSOLVE_PASSES {
                return Err(Error::new(
                    ErrorKind::PluginDepsolveFailed,
                    "got stuck in dep loop",
                ));
            }
        }
    }

    /// Fixed-point relaxation of `better_than` rules into priorities.
    fn depsolve_priority(&self, plugins: &[Arc<Plugin>]) -> Result<()> {
        let mut passes = 0u32;
        loop {
            let mut changed = false;
            for plugin in plugins {
                for name in &plugin.info().rules.better_than {
                    let Some(dep) = find(plugins, name) else {
                        tracing::debug!(
                            "cannot find plugin '{name}' requested by '{}'",
                            plugin.name()
                        );
                        continue;
                    };
                    if !dep.enabled() {
                        continue;
                    }
                    if plugin.priority() <= dep.priority() {
                        plugin.set_priority(dep.priority() + 1);
                        changed = true;
                    }
                }
            }
            if !changed {
                return Ok(());
            }
            passes += 1;
            if passes > MAX_DEPSOLVE_PASSES {
                return Err(Error::new(
                    ErrorKind::PluginDepsolveFailed,
                    "got stuck in priority loop",
                ));
            }
        }
    }

    /// Log the resolved plugin table.
    fn dump_state(&self) {
        for plugin in self.plugins() {
            tracing::debug!(
                "[{}]\t{}\t->\t{}",
                if plugin.enabled() { "enabled" } else { "disabld" },
                plugin.order(),
                plugin.name()
            );
        }
    }

    /// Cancel everything and shut plugins down in order.
    pub async fn shutdown(&self) {
        self.token.cancel();
        for plugin in self.plugins() {
            if plugin.enabled()
                && plugin.slots().contains(JobSlots::SHUTDOWN)
                && let Err(err) = plugin.backend().shutdown(&plugin).await
            {
                tracing::warn!("shutdown of {} failed: {err}", plugin.name());
            }
        }
    }

    /// Execute one job to completion.
    pub async fn run(self: &Arc<Self>, job: Job) -> Result<JobOutput> {
        let (payload, token, events, interactive) = job.into_parts();

        // cancelling the loader cancels the job as well
        let linker = {
            let loader_token = self.token.clone();
            let job_token = token.clone();
            tokio::spawn(async move {
                loader_token.cancelled().await;
                job_token.cancel();
            })
        };

        let result = self.run_inner(payload, &token, events, interactive).await;
        linker.abort();
        result
    }

    /// Body of [`PluginLoader::run`], separated so the linker task always
    /// gets aborted.
    async fn run_inner(
        self: &Arc<Self>,
        payload: JobPayload,
        token: &CancellationToken,
        events: EventBus,
        interactive: bool,
    ) -> Result<JobOutput> {
        self.wait_setup(token).await?;

        let kind = payload.kind();
        let referenced = payload.referenced_apps();
        let id = self.jobs.register(kind, &referenced);
        let ctx = JobContext::new(
            id,
            kind,
            token.clone(),
            events,
            interactive,
            Some(self.events.clone()),
            Some(self.signals.clone()),
        );

        let _permit = if kind.uses_install_pool() {
            let pool = self.install_pool.clone();
            let permit = tokio::select! {
                permit = pool.acquire_owned() => permit
                    .map_err(|_| Error::failed("install pool closed"))?,
                () = token.cancelled() => {
                    self.jobs.deregister(id);
                    return Err(Error::cancelled());
                }
            };
            Some(permit)
        } else {
            None
        };

        let result = self.dispatch(&ctx, payload).await;
        self.jobs.deregister(id);
        self.flush_debounces_if_idle();
        tracing::debug!("job {id} ({kind:?}) completed: {}", match &result {
            Ok(_) => "ok".to_owned(),
            Err(err) => err.to_string(),
        });
        result
    }

    /// Block until setup completes, or the token fires.
    async fn wait_setup(&self, token: &CancellationToken) -> Result<()> {
        let mut rx = self.setup_complete.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::failed("loader dropped during setup"));
                    }
                }
                () = token.cancelled() => return Err(Error::cancelled()),
            }
        }
    }

    /// Route a payload to its per-kind executor.
    async fn dispatch(self: &Arc<Self>, ctx: &JobContext, payload: JobPayload) -> Result<JobOutput> {
        match payload {
            JobPayload::Refine {
                mut list,
                flags,
                disable_filtering,
            } => {
                self.refine_list(ctx, &mut list, flags, disable_filtering)
                    .await?;
                Ok(JobOutput::List(list))
            }
            JobPayload::ListApps { query } => self.list_apps(ctx, query).await,
            JobPayload::RefreshMetadata { cache_age_secs } => {
                self.refresh_metadata(ctx, cache_age_secs).await
            }
            JobPayload::ListDistroUpgrades => self.list_distro_upgrades(ctx).await,
            JobPayload::ManageRepository { action, repository } => {
                self.manage_repository(ctx, action, &repository).await
            }
            JobPayload::RefineCategories { categories } => {
                for plugin in self.enabled_with(JobSlots::REFINE_CATEGORIES) {
                    self.check_cancelled(ctx)?;
                    let started = self.begin_call(&plugin, ctx);
                    let result = plugin
                        .backend()
                        .refine_categories(&plugin, ctx, &categories)
                        .await;
                    self.end_call(&plugin, ctx, started, "refine-categories");
                    self.absorb_result(ctx, &plugin, result, false)?;
                }
                Ok(JobOutput::None)
            }
            JobPayload::InstallApps { apps } => self.install_apps(ctx, apps).await,
            JobPayload::RemoveApps { apps } => self.remove_apps(ctx, apps).await,
            JobPayload::UpdateApps { apps, flags } => {
                let mut implemented = 0usize;
                for plugin in self.enabled_with(JobSlots::UPDATE_APPS) {
                    self.check_cancelled(ctx)?;
                    implemented += 1;
                    let started = self.begin_call(&plugin, ctx);
                    let result = plugin.backend().update_apps(&plugin, ctx, &apps, flags).await;
                    self.end_call(&plugin, ctx, started, "update-apps");
                    self.absorb_result(ctx, &plugin, result, true)?;
                }
                require_implemented(implemented, "update")?;
                Ok(JobOutput::None)
            }
            JobPayload::UpgradeDownload { app } => {
                self.single_app_slot(ctx, JobSlots::UPGRADE_DOWNLOAD, &app, "upgrade-download")
                    .await
            }
            JobPayload::UpgradeTrigger { app } => {
                self.single_app_slot(ctx, JobSlots::UPGRADE_TRIGGER, &app, "upgrade-trigger")
                    .await
            }
            JobPayload::Launch { app } => {
                self.single_app_slot(ctx, JobSlots::LAUNCH, &app, "launch").await
            }
            JobPayload::UpdateCancel { app } => {
                self.single_app_slot(ctx, JobSlots::UPDATE_CANCEL, &app, "update-cancel")
                    .await
            }
            JobPayload::FileToApp { path, refine_flags } => {
                let list = self.file_to_app(ctx, &path, refine_flags).await?;
                Ok(JobOutput::List(list))
            }
            JobPayload::UrlToApp { url, refine_flags } => {
                let list = self.url_to_app(ctx, &url, refine_flags).await?;
                Ok(JobOutput::List(list))
            }
            JobPayload::GetOfflineUpdateState => {
                for plugin in self.enabled_with(JobSlots::OFFLINE_UPDATES) {
                    let result = plugin.backend().offline_update_state(&plugin, ctx).await;
                    if let Some(state) = self.absorb_result(ctx, &plugin, result, false)? {
                        return Ok(JobOutput::State(state));
                    }
                }
                Err(Error::not_supported("no plugin tracks offline updates"))
            }
            JobPayload::CancelOfflineUpdate => {
                let mut implemented = 0usize;
                for plugin in self.enabled_with(JobSlots::OFFLINE_UPDATES) {
                    implemented += 1;
                    let result = plugin.backend().cancel_offline_update(&plugin, ctx).await;
                    self.absorb_result(ctx, &plugin, result, false)?;
                }
                require_implemented(implemented, "cancel-offline-update")?;
                Ok(JobOutput::None)
            }
            JobPayload::SetOfflineUpdateAction { action } => {
                let mut implemented = 0usize;
                for plugin in self.enabled_with(JobSlots::OFFLINE_UPDATES) {
                    implemented += 1;
                    let result = plugin
                        .backend()
                        .set_offline_update_action(&plugin, ctx, &action)
                        .await;
                    self.absorb_result(ctx, &plugin, result, false)?;
                }
                require_implemented(implemented, "set-offline-update-action")?;
                Ok(JobOutput::None)
            }
        }
    }

    /// Enabled plugins providing a slot, in run order.
    fn enabled_with(&self, slot: JobSlots) -> Vec<Arc<Plugin>> {
        self.plugins()
            .into_iter()
            .filter(|p| p.enabled() && p.slots().contains(slot))
            .collect()
    }

    /// Error out when the job token fired between plugin calls.
    fn check_cancelled(&self, ctx: &JobContext) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::cancelled());
        }
        Ok(())
    }

    /// Enter a plugin call: interactive scope and timing.
    fn begin_call(&self, plugin: &Plugin, ctx: &JobContext) -> Instant {
        if ctx.is_interactive() {
            plugin.interactive_inc();
        }
        Instant::now()
    }

    /// Leave a plugin call, logging slow ones.
    fn end_call(&self, plugin: &Plugin, ctx: &JobContext, started: Instant, what: &str) {
        if ctx.is_interactive() {
            plugin.interactive_dec();
        }
        let elapsed = started.elapsed();
        if elapsed > SLOW_PLUGIN_CALL {
            tracing::debug!(
                "plugin {} took {:.1}s to do {what}",
                plugin.name(),
                elapsed.as_secs_f32()
            );
        }
    }

    /// Fold one plugin result into the job.
    ///
    /// Success with a fired token is rewritten to `cancelled`; absent
    /// slots pass through silently; fatal kinds and cancellation abort the
    /// job; other errors become events when `mask` is set and abort
    /// otherwise.
    fn absorb_result<T>(
        &self,
        ctx: &JobContext,
        plugin: &Plugin,
        result: Result<T>,
        mask: bool,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => {
                if ctx.is_cancelled() {
                    tracing::debug!(
                        "plugin {} did not return error with cancellable set",
                        plugin.name()
                    );
                    return Err(Error::cancelled());
                }
                Ok(Some(value))
            }
            Err(err) if err.kind() == ErrorKind::NotSupported => Ok(None),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::AuthRequired | ErrorKind::AuthInvalid
                ) || self.fail_hard =>
            {
                Err(err)
            }
            Err(err) if mask => {
                tracing::debug!("masking error from {}: {err}", plugin.name());
                ctx.emit_event(Some(plugin.name()), Event::new(err.normalized()));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Run refine slots over a list, resolve wildcards and adopt orphans.
    async fn refine_list(
        self: &Arc<Self>,
        ctx: &JobContext,
        list: &mut AppList,
        flags: RefineFlags,
        disable_filtering: bool,
    ) -> Result<()> {
        if !list.is_empty() {
            self.refine_pass(ctx, list, flags).await?;
            self.adopt_pass(list);

            // one retry so adopted wildcards get materialized
            if list.iter().any(|a| a.has_quirk(Quirks::IS_WILDCARD)) {
                self.refine_pass(ctx, list, flags).await?;
                self.adopt_pass(list);
            }
        }
        if !disable_filtering {
            list.filter(|app| !app.has_quirk(Quirks::IS_WILDCARD));
        }
        Ok(())
    }

    /// One fan-out of the refine slot across the enabled plugins.
    async fn refine_pass(
        self: &Arc<Self>,
        ctx: &JobContext,
        list: &mut AppList,
        flags: RefineFlags,
    ) -> Result<()> {
        for plugin in self.enabled_with(JobSlots::REFINE) {
            self.check_cancelled(ctx)?;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().refine(&plugin, ctx, list, flags).await;
            self.end_call(&plugin, ctx, started, "refine");
            self.absorb_result(ctx, &plugin, result, false)?;
        }
        Ok(())
    }

    /// Give unowned, non-wildcard apps to the first plugin that claims
    /// them.
    fn adopt_pass(&self, list: &AppList) {
        for app in list.iter() {
            if app.management_plugin().is_some() || app.has_quirk(Quirks::IS_WILDCARD) {
                continue;
            }
            for plugin in self.enabled_with(JobSlots::ADOPT) {
                plugin.backend().adopt_app(&plugin, app);
                if let Some(owner) = app.management_plugin() {
                    tracing::debug!("{} adopted {:?}", owner, app.id());
                    break;
                }
            }
        }
    }

    /// The list-apps pipeline: union, dedupe, filter, sort, truncate,
    /// follow-up refine.
    async fn list_apps(self: &Arc<Self>, ctx: &JobContext, query: AppQuery) -> Result<JobOutput> {
        let mask = ctx.kind.masks_plugin_errors(Some(&query));
        let mut list = AppList::new();

        let providers = self.enabled_with(JobSlots::LIST_APPS);
        if providers.is_empty() && query.is_for_updates {
            return Err(Error::not_supported("no plugin lists updates"));
        }
        for plugin in providers {
            self.check_cancelled(ctx)?;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().list_apps(&plugin, ctx, &query).await;
            self.end_call(&plugin, ctx, started, "list-apps");
            if let Some(contribution) = self.absorb_result(ctx, &plugin, result, mask)? {
                for app in contribution.iter() {
                    app.set_priority(plugin.priority());
                    list.add(app.clone());
                }
            }
        }

        if !query.dedupe_flags.is_empty() {
            list.filter_duplicates(query.dedupe_flags);
        }
        if let Some(filter) = &query.filter {
            list.filter(|app| filter(app));
        }
        if query.license_type == LicenseType::Free || self.settings.show_only_free_apps {
            list.filter(|app| app.license().as_deref().is_some_and(license_is_free));
        }
        if query.developer_verified == DeveloperVerifiedType::Only {
            list.filter(|app| app.has_quirk(Quirks::DEVELOPER_VERIFIED));
        }

        if let Some(sort) = &query.sort {
            list.sort(|a, b| sort(a, b));
        } else if query.keywords.is_some() {
            list.sort(|a, b| {
                b.match_value()
                    .cmp(&a.match_value())
                    .then_with(|| a.name().cmp(&b.name()))
            });
        } else if query.is_installed == Some(true) {
            list.sort(crate::app::cmp_installed_then_name);
        }

        if let Some(max) = query.max_results {
            list.truncate(max);
        }

        if !query.refine_flags.is_empty() {
            self.refine_list(ctx, &mut list, query.refine_flags, true).await?;
        }
        list.filter(|app| !app.has_quirk(Quirks::IS_WILDCARD));
        if query.keywords.is_some() {
            list.filter(|app| {
                !app.has_quirk(Quirks::HIDE_FROM_SEARCH)
                    && !app.has_quirk(Quirks::HIDE_EVERYWHERE)
            });
        }

        Ok(JobOutput::List(list))
    }

    /// Fan out a metadata refresh.
    async fn refresh_metadata(
        self: &Arc<Self>,
        ctx: &JobContext,
        cache_age_secs: u64,
    ) -> Result<JobOutput> {
        for plugin in self.enabled_with(JobSlots::REFRESH_METADATA) {
            self.check_cancelled(ctx)?;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin
                .backend()
                .refresh_metadata(&plugin, ctx, cache_age_secs)
                .await;
            self.end_call(&plugin, ctx, started, "refresh-metadata");
            self.absorb_result(ctx, &plugin, result, false)?;
        }
        Ok(JobOutput::None)
    }

    /// Union the known distribution upgrades.
    async fn list_distro_upgrades(self: &Arc<Self>, ctx: &JobContext) -> Result<JobOutput> {
        let mut list = AppList::new();
        for plugin in self.enabled_with(JobSlots::LIST_DISTRO_UPGRADES) {
            self.check_cancelled(ctx)?;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().list_distro_upgrades(&plugin, ctx).await;
            self.end_call(&plugin, ctx, started, "list-distro-upgrades");
            if let Some(contribution) = self.absorb_result(ctx, &plugin, result, false)? {
                for app in contribution.iter() {
                    list.add(app.clone());
                }
            }
        }
        Ok(JobOutput::List(list))
    }

    /// Route a repository action to the owning plugin.
    async fn manage_repository(
        self: &Arc<Self>,
        ctx: &JobContext,
        action: RepositoryAction,
        repository: &Arc<App>,
    ) -> Result<JobOutput> {
        let slot = match action {
            RepositoryAction::Install => JobSlots::INSTALL_REPOSITORY,
            RepositoryAction::Remove => JobSlots::REMOVE_REPOSITORY,
            RepositoryAction::Enable => JobSlots::ENABLE_REPOSITORY,
            RepositoryAction::Disable => JobSlots::DISABLE_REPOSITORY,
        };
        let candidates: Vec<Arc<Plugin>> = match repository.management_plugin() {
            Some(owner) => self
                .enabled_with(slot)
                .into_iter()
                .filter(|p| p.name() == owner)
                .collect(),
            None => self.enabled_with(slot),
        };

        let mut implemented = 0usize;
        for plugin in candidates {
            self.check_cancelled(ctx)?;
            implemented += 1;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin
                .backend()
                .manage_repository(&plugin, ctx, action, repository)
                .await;
            self.end_call(&plugin, ctx, started, "manage-repository");
            if self.absorb_result(ctx, &plugin, result, false)?.is_some() {
                if let Some(uid) = repository.unique_id() {
                    let _ = self.signals.send(LoaderSignal::RepositoryChanged { app: uid });
                }
                return Ok(JobOutput::None);
            }
        }
        require_implemented(implemented, "manage-repository")?;
        Ok(JobOutput::None)
    }

    /// Install apps, or queue them while the network blocks installs.
    ///
    /// Local-file installs need no network and are never queued.
    async fn install_apps(self: &Arc<Self>, ctx: &JobContext, apps: AppList) -> Result<JobOutput> {
        let blocked = !self.network.state().allows_install();
        let mut to_install = AppList::new();
        let mut queued_any = false;
        for app in apps.iter() {
            if blocked && app.state() != AppState::AvailableLocal {
                tracing::debug!("network blocks install, queueing {:?}", app.id());
                self.queue.add(app);
                queued_any = true;
            } else {
                to_install.add(app.clone());
            }
        }
        if queued_any {
            let _ = self.signals.send(LoaderSignal::PendingAppsChanged);
        }
        if to_install.is_empty() {
            return Ok(JobOutput::None);
        }
        let apps = to_install;

        let mut implemented = 0usize;
        for plugin in self.enabled_with(JobSlots::INSTALL_APPS) {
            self.check_cancelled(ctx)?;
            implemented += 1;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().install_apps(&plugin, ctx, &apps).await;
            self.end_call(&plugin, ctx, started, "install-apps");
            self.absorb_result(ctx, &plugin, result, false)?;
        }
        require_implemented(implemented, "install")?;

        // a plugin may have decided to queue after all (e.g. metered data
        // detected mid-flight); respect that, and drop finished installs
        let mut queue_changed = false;
        for app in apps.iter() {
            match app.state() {
                AppState::QueuedForInstall => {
                    self.queue.add(app);
                    queue_changed = true;
                }
                state if state.is_installed() => {
                    queue_changed |= self.queue.remove(app);
                }
                _ => {}
            }
        }
        if queue_changed {
            let _ = self.signals.send(LoaderSignal::PendingAppsChanged);
        }
        Ok(JobOutput::None)
    }

    /// Remove apps.
    async fn remove_apps(self: &Arc<Self>, ctx: &JobContext, apps: AppList) -> Result<JobOutput> {
        let mut implemented = 0usize;
        for plugin in self.enabled_with(JobSlots::REMOVE_APPS) {
            self.check_cancelled(ctx)?;
            implemented += 1;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().remove_apps(&plugin, ctx, &apps).await;
            self.end_call(&plugin, ctx, started, "remove-apps");
            self.absorb_result(ctx, &plugin, result, false)?;
        }
        require_implemented(implemented, "remove")?;

        // removing a queued app drops it from the pending queue
        let mut queue_changed = false;
        for app in apps.iter() {
            queue_changed |= self.queue.remove(app);
        }
        if queue_changed {
            let _ = self.signals.send(LoaderSignal::PendingAppsChanged);
        }
        Ok(JobOutput::None)
    }

    /// One single-app mutation slot (launch, upgrade, update-cancel).
    async fn single_app_slot(
        self: &Arc<Self>,
        ctx: &JobContext,
        slot: JobSlots,
        app: &Arc<App>,
        what: &str,
    ) -> Result<JobOutput> {
        let owner = app.management_plugin();
        let mut implemented = 0usize;
        for plugin in self.enabled_with(slot) {
            if let Some(owner) = &owner
                && plugin.name() != owner.as_str()
            {
                continue;
            }
            self.check_cancelled(ctx)?;
            implemented += 1;
            let started = self.begin_call(&plugin, ctx);
            let result = if slot == JobSlots::UPGRADE_DOWNLOAD {
                plugin.backend().upgrade_download(&plugin, ctx, app).await
            } else if slot == JobSlots::UPGRADE_TRIGGER {
                plugin.backend().upgrade_trigger(&plugin, ctx, app).await
            } else if slot == JobSlots::LAUNCH {
                plugin.backend().launch(&plugin, ctx, app).await
            } else {
                plugin.backend().update_cancel(&plugin, ctx, app).await
            };
            self.end_call(&plugin, ctx, started, what);
            self.absorb_result(ctx, &plugin, result, false)?;
        }
        require_implemented(implemented, what)?;
        Ok(JobOutput::None)
    }

    /// Resolve a local file to exactly one app.
    async fn file_to_app(
        self: &Arc<Self>,
        ctx: &JobContext,
        path: &Path,
        refine_flags: RefineFlags,
    ) -> Result<AppList> {
        let mut list = AppList::new();
        for plugin in self.enabled_with(JobSlots::FILE_TO_APP) {
            self.check_cancelled(ctx)?;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().file_to_app(&plugin, ctx, path).await;
            self.end_call(&plugin, ctx, started, "file-to-app");
            if let Some(contribution) = self.absorb_result(ctx, &plugin, result, false)? {
                for app in contribution.iter() {
                    list.add(app.clone());
                }
            }
        }
        for app in list.iter() {
            app.set_metadata(METADATA_LOCAL_FILENAME, &path.to_string_lossy());
        }
        self.finish_local_resolution(ctx, list, refine_flags).await
    }

    /// Resolve a URL to exactly one app.
    async fn url_to_app(
        self: &Arc<Self>,
        ctx: &JobContext,
        url: &str,
        refine_flags: RefineFlags,
    ) -> Result<AppList> {
        let mut list = AppList::new();

        // the appstream: scheme is answered from the silo directly
        crate::appstream::queries::url_to_app(None, None, &self.silo.current(), url, &mut list)?;

        for plugin in self.enabled_with(JobSlots::URL_TO_APP) {
            self.check_cancelled(ctx)?;
            let started = self.begin_call(&plugin, ctx);
            let result = plugin.backend().url_to_app(&plugin, ctx, url).await;
            self.end_call(&plugin, ctx, started, "url-to-app");
            if let Some(contribution) = self.absorb_result(ctx, &plugin, result, false)? {
                for app in contribution.iter() {
                    list.add(app.clone());
                }
            }
        }

        // a file:// nobody claimed is retried as a local-file resolution
        if list.is_empty()
            && crate::util::url_scheme(url).as_deref() == Some("file")
            && let Some(path) = crate::util::url_path(url)
        {
            let local = PathBuf::from(format!("/{path}"));
            return self.file_to_app(ctx, &local, refine_flags).await;
        }

        self.finish_local_resolution(ctx, list, refine_flags).await
    }

    /// Shared tail of file/url resolution: fallback icons, icon refine,
    /// and the exactly-one contract.
    async fn finish_local_resolution(
        self: &Arc<Self>,
        ctx: &JobContext,
        mut list: AppList,
        refine_flags: RefineFlags,
    ) -> Result<AppList> {
        if list.is_empty() {
            return Err(Error::not_supported("no plugin could handle this resource"));
        }
        if !refine_flags.is_empty() {
            self.refine_list(ctx, &mut list, refine_flags, true).await?;
        }
        for app in list.iter() {
            if !app.has_icons() {
                app.add_icon(Icon::new(IconKind::Themed, FALLBACK_APP_ICON));
            }
        }
        self.refine_list(ctx, &mut list, RefineFlags::REQUIRE_ICON, true)
            .await?;
        if list.len() != 1 {
            return Err(Error::not_supported(format!(
                "expected exactly one result, got {}",
                list.len()
            )));
        }
        Ok(list)
    }

    /// Load the persisted queue and materialize its entries.
    async fn load_queue_and_refine(self: &Arc<Self>) -> Result<()> {
        let loaded = self.queue.load()?;
        if loaded.is_empty() {
            return Ok(());
        }

        let mut list = AppList::new();
        for app in &loaded {
            list.add(app.clone());
        }
        let job = Job::refine(list, RefineFlags::REQUIRE_ID | RefineFlags::REQUIRE_ORIGIN)
            .disable_filtering();
        let refined = self.run(job).await?;

        let expected: std::collections::HashSet<String> =
            loaded.iter().filter_map(|a| a.unique_id()).collect();
        let mut merged: Vec<Arc<App>> = Vec::new();
        if let JobOutput::List(refined) = refined {
            for app in refined.iter() {
                if app.state() == AppState::Available
                    && app
                        .unique_id()
                        .is_some_and(|uid| expected.contains(&uid))
                {
                    app.set_state(AppState::QueuedForInstall);
                    app.set_pending_action(Some(PendingAction::Install));
                    merged.push(app.clone());
                }
            }
        }
        let has_pending = !merged.is_empty();
        self.queue.replace(merged);
        let _ = self.signals.send(LoaderSignal::PendingAppsChanged);

        if has_pending {
            let this = self.clone();
            tokio::spawn(async move { this.flush_pending_queue().await });
        }
        Ok(())
    }

    /// Install every queued app now that the network allows it.
    ///
    /// Entries run sequentially so they respect the bounded install pool;
    /// a failing entry recovers its state and leaves the queue.
    pub async fn flush_pending_queue(self: &Arc<Self>) {
        if !self.network.state().allows_install() {
            return;
        }
        let snapshot = self.queue.snapshot();
        if snapshot.is_empty() {
            return;
        }
        tracing::debug!("flushing {} pending installs", snapshot.len());

        for app in snapshot {
            if app.state() == AppState::QueuedForInstall {
                app.set_state(AppState::Available);
            }
            let job = if app.kind() == AppKind::Repository {
                Job::manage_repository(RepositoryAction::Install, app.clone())
            } else {
                let mut apps = AppList::new();
                apps.add(app.clone());
                Job::install_apps(apps)
            };
            match self.run(job).await {
                Ok(_) => {
                    if app.state() != AppState::QueuedForInstall {
                        app.set_pending_action(None);
                        self.queue.remove(&app);
                    }
                }
                Err(err) => {
                    tracing::warn!("queued install of {:?} failed: {err}", app.id());
                    app.state_recover();
                    self.queue.remove(&app);
                    let mut event = Event::new(err.normalized());
                    if let Some(uid) = app.unique_id() {
                        event = event.with_app(&uid);
                    }
                    if let Some(event) = self.events.add(event) {
                        let _ = self.signals.send(LoaderSignal::EventAdded(event));
                    }
                }
            }
        }
        let _ = self.signals.send(LoaderSignal::PendingAppsChanged);
    }

    /// Process plugin signals for the lifetime of the loader.
    async fn pump_signals(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<(String, PluginSignal)>,
    ) {
        while let Some((name, signal)) = rx.recv().await {
            match signal {
                PluginSignal::UpdatesChanged => self.on_updates_changed(),
                PluginSignal::Reload => self.on_reload(),
                PluginSignal::StatusChanged { app, status } => {
                    let _ = self.signals.send(LoaderSignal::StatusChanged {
                        plugin: name,
                        app,
                        status,
                    });
                }
                PluginSignal::ReportEvent(event) => {
                    self.events.add_arc(event.clone());
                    let _ = self.signals.send(LoaderSignal::EventAdded(event));
                }
                PluginSignal::AllowUpdates(allow) => {
                    let _ = self.signals.send(LoaderSignal::AllowUpdates(allow));
                }
                PluginSignal::RepositoryChanged { app } => {
                    let _ = self.signals.send(LoaderSignal::RepositoryChanged { app });
                }
            }
        }
    }

    /// React to network changes by flushing the pending queue.
    async fn watch_network(self: Arc<Self>) {
        let mut rx = self.network.subscribe();
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if rx.borrow_and_update().allows_install() {
                        self.flush_pending_queue().await;
                    }
                }
                () = self.token.cancelled() => return,
            }
        }
    }

    /// Debounced updates-changed: immediate when idle and off cooldown,
    /// coalesced otherwise, suppressed entirely while jobs run.
    fn on_updates_changed(self: &Arc<Self>) {
        let mut debounce = self.debounce_guard();
        if self.jobs.any_active() {
            debounce.updates_pending = true;
            return;
        }
        let now = Instant::now();
        if let Some(last) = debounce.updates_last
            && now.duration_since(last) < UPDATES_CHANGED_DELAY
        {
            if !debounce.updates_timer {
                debounce.updates_timer = true;
                let wait = UPDATES_CHANGED_DELAY - now.duration_since(last);
                let this = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    this.emit_updates_changed();
                });
            }
            return;
        }
        debounce.updates_last = Some(now);
        drop(debounce);
        let _ = self.signals.send(LoaderSignal::UpdatesChanged);
    }

    /// Timer-driven emission of a coalesced updates-changed.
    fn emit_updates_changed(self: &Arc<Self>) {
        {
            let mut debounce = self.debounce_guard();
            debounce.updates_timer = false;
            if self.jobs.any_active() {
                debounce.updates_pending = true;
                return;
            }
            debounce.updates_pending = false;
            debounce.updates_last = Some(Instant::now());
        }
        let _ = self.signals.send(LoaderSignal::UpdatesChanged);
    }

    /// Debounced reload: like updates-changed with a longer window, plus a
    /// fan-out to every plugin's reload hook per burst.
    fn on_reload(self: &Arc<Self>) {
        let mut debounce = self.debounce_guard();
        if self.jobs.any_active() {
            debounce.reload_pending = true;
            return;
        }
        let now = Instant::now();
        if let Some(last) = debounce.reload_last
            && now.duration_since(last) < RELOAD_DELAY
        {
            if !debounce.reload_timer {
                debounce.reload_timer = true;
                let wait = RELOAD_DELAY - now.duration_since(last);
                let this = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    this.emit_reload();
                });
            }
            return;
        }
        debounce.reload_last = Some(now);
        drop(debounce);
        self.fan_out_reload();
    }

    /// Timer-driven emission of a coalesced reload.
    fn emit_reload(self: &Arc<Self>) {
        {
            let mut debounce = self.debounce_guard();
            debounce.reload_timer = false;
            if self.jobs.any_active() {
                debounce.reload_pending = true;
                return;
            }
            debounce.reload_pending = false;
            debounce.reload_last = Some(Instant::now());
        }
        self.fan_out_reload();
    }

    /// Broadcast the reload and poke every plugin's reload hook.
    fn fan_out_reload(&self) {
        let _ = self.signals.send(LoaderSignal::Reload);
        for plugin in self.plugins() {
            if plugin.enabled() {
                plugin.backend().reload(&plugin);
            }
        }
    }

    /// Emit notifications deferred while jobs were running.
    fn flush_debounces_if_idle(self: &Arc<Self>) {
        if self.jobs.any_active() {
            return;
        }
        let (updates, reload) = {
            let mut debounce = self.debounce_guard();
            let updates = std::mem::take(&mut debounce.updates_pending);
            let reload = std::mem::take(&mut debounce.reload_pending);
            if updates {
                debounce.updates_last = Some(Instant::now());
            }
            if reload {
                debounce.reload_last = Some(Instant::now());
            }
            (updates, reload)
        };
        if updates {
            let _ = self.signals.send(LoaderSignal::UpdatesChanged);
        }
        if reload {
            self.fan_out_reload();
        }
    }

    /// Lock helper recovering from poisoning.
    fn debounce_guard(&self) -> std::sync::MutexGuard<'_, Debounce> {
        self.debounce
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Find a plugin by name in a slice.
fn find<'a>(plugins: &'a [Arc<Plugin>], name: &str) -> Option<&'a Arc<Plugin>> {
    plugins.iter().find(|p| p.name() == name)
}

/// Mutation jobs with nobody implementing the slot are an error, not a
/// silent no-op.
fn require_implemented(count: usize, what: &str) -> Result<()> {
    if count == 0 {
        return Err(Error::not_supported(format!(
            "no plugin implements {what}"
        )));
    }
    Ok(())
}

/// Naive free-software check over an SPDX expression.
fn license_is_free(license: &str) -> bool {
    let lower = license.to_lowercase();
    !lower.contains("proprietary") && !lower.is_empty()
}
