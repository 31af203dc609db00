//! Typed units of work dispatched across the plugin set.
//!
//! A [`Job`] bundles a payload (what to do), a cancellation token and an
//! event bus. Callers clone the token and the bus before handing the job
//! to [`crate::plugin::PluginLoader::run`]; the loader resolves it into a
//! single [`JobOutput`] or error while partial failures accumulate on the
//! bus.

pub mod manager;

pub use manager::JobManager;

use std::path::PathBuf;
use std::sync::Arc;

use bitflags::bitflags;
use tokio_util::sync::CancellationToken;

use crate::app::{App, AppList, Category, DedupeFlags, RefineFlags};
use crate::events::{Event, EventBus};

/// Kind discriminator used for scheduling and the job manager index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Fill fields on a list of apps.
    Refine,
    /// Query the catalog for apps.
    ListApps,
    /// Refresh backend caches.
    RefreshMetadata,
    /// List distribution upgrades.
    ListDistroUpgrades,
    /// Install, remove, enable or disable a repository.
    ManageRepository,
    /// Count apps per category.
    RefineCategories,
    /// Install apps.
    InstallApps,
    /// Remove apps.
    RemoveApps,
    /// Apply updates.
    UpdateApps,
    /// Download a distribution upgrade.
    UpgradeDownload,
    /// Schedule a downloaded distribution upgrade.
    UpgradeTrigger,
    /// Launch an installed app.
    Launch,
    /// Abort an in-flight update.
    UpdateCancel,
    /// Resolve a local file to an app.
    FileToApp,
    /// Resolve a URL to an app.
    UrlToApp,
    /// Read the offline-update state keyword.
    GetOfflineUpdateState,
    /// Cancel the prepared offline update.
    CancelOfflineUpdate,
    /// Choose the after-update action.
    SetOfflineUpdateAction,
}

impl JobKind {
    /// Whether the job competes for the bounded install pool.
    pub fn uses_install_pool(self) -> bool {
        matches!(self, JobKind::InstallApps | JobKind::UpgradeDownload)
    }

    /// Whether per-plugin errors become events instead of failing the job.
    pub(crate) fn masks_plugin_errors(self, query: Option<&AppQuery>) -> bool {
        match self {
            JobKind::UpdateApps => true,
            JobKind::ListApps => query.is_some_and(|q| {
                q.is_for_updates || q.is_sources || q.langpacks_locale.is_some()
            }),
            _ => false,
        }
    }
}

bitflags! {
    /// Behavior tweaks for update jobs.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct UpdateAppsFlags: u32 {
        /// Apply already-downloaded payloads only.
        const NO_DOWNLOAD = 1 << 0;
        /// Download payloads but do not apply them.
        const NO_APPLY = 1 << 1;
    }
}

/// Action of a [`JobKind::ManageRepository`] job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryAction {
    /// Add the repository.
    Install,
    /// Delete the repository.
    Remove,
    /// Enable the repository.
    Enable,
    /// Disable the repository.
    Disable,
}

/// License filtering for list queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LicenseType {
    /// No filtering.
    #[default]
    Any,
    /// Free-software licenses only.
    Free,
}

/// Developer-verification filtering for list queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeveloperVerifiedType {
    /// No filtering.
    #[default]
    Any,
    /// Verified developers only.
    Only,
}

/// Caller-supplied predicate over apps.
pub type AppFilter = Arc<dyn Fn(&App) -> bool + Send + Sync>;
/// Caller-supplied comparator over apps.
pub type AppSort = Arc<dyn Fn(&App, &App) -> std::cmp::Ordering + Send + Sync>;

/// What a [`JobKind::ListApps`] job should return.
///
/// Every field is optional; plugins contribute candidates for the parts
/// they understand and ignore the rest.
#[derive(Clone, Default)]
pub struct AppQuery {
    /// Free-text search tokens.
    pub keywords: Option<Vec<String>>,
    /// Restrict to one category.
    pub category: Option<Arc<Category>>,
    /// Restrict to installed (or not installed) apps.
    pub is_installed: Option<bool>,
    /// Restrict to distro-curated apps.
    pub is_curated: Option<bool>,
    /// Restrict to featured apps.
    pub is_featured: Option<bool>,
    /// Restrict to apps featured for the given deployments.
    pub deployment_featured: Option<Vec<String>>,
    /// Restrict to apps released within this many seconds.
    pub released_since_secs: Option<u64>,
    /// Find alternates of this app.
    pub alternate_of: Option<Arc<App>>,
    /// Restrict to apps by these developers.
    pub developers: Option<Vec<String>>,
    /// This query feeds the updates page; failures are maskable.
    pub is_for_updates: bool,
    /// This query lists repositories; failures are maskable.
    pub is_sources: bool,
    /// Language-pack lookup for a locale; failures are maskable.
    pub langpacks_locale: Option<String>,
    /// The update-history page wants full release descriptions.
    pub is_for_update_history: bool,
    /// Truncate the result to this many entries.
    pub max_results: Option<usize>,
    /// How to collapse duplicates across plugins.
    pub dedupe_flags: DedupeFlags,
    /// Fields the follow-up refine must populate.
    pub refine_flags: RefineFlags,
    /// License filter.
    pub license_type: LicenseType,
    /// Developer verification filter.
    pub developer_verified: DeveloperVerifiedType,
    /// Custom predicate applied after the plugin union.
    pub filter: Option<AppFilter>,
    /// Custom sort applied before truncation.
    pub sort: Option<AppSort>,
}

impl std::fmt::Debug for AppQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppQuery")
            .field("keywords", &self.keywords)
            .field("category", &self.category.as_ref().map(|c| c.id.clone()))
            .field("is_installed", &self.is_installed)
            .field("is_curated", &self.is_curated)
            .field("is_featured", &self.is_featured)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

/// The work a [`Job`] describes.
#[derive(Debug)]
pub enum JobPayload {
    /// Fill requested fields, resolving wildcards.
    Refine {
        /// Apps to refine.
        list: AppList,
        /// Fields to populate.
        flags: RefineFlags,
        /// Keep wildcard and hidden entries in the result.
        disable_filtering: bool,
    },
    /// Query the catalog.
    ListApps {
        /// The query.
        query: AppQuery,
    },
    /// Refresh backend caches older than the given age.
    RefreshMetadata {
        /// Maximum acceptable cache age in seconds.
        cache_age_secs: u64,
    },
    /// List known distribution upgrades.
    ListDistroUpgrades,
    /// Apply an action to a repository app.
    ManageRepository {
        /// The action.
        action: RepositoryAction,
        /// The repository app.
        repository: Arc<App>,
    },
    /// Fill category sizes.
    RefineCategories {
        /// Categories to count apps into.
        categories: Vec<Arc<Category>>,
    },
    /// Install the given apps.
    InstallApps {
        /// Apps to install.
        apps: AppList,
    },
    /// Remove the given apps.
    RemoveApps {
        /// Apps to remove.
        apps: AppList,
    },
    /// Apply updates to the given apps.
    UpdateApps {
        /// Apps to update.
        apps: AppList,
        /// Behavior tweaks.
        flags: UpdateAppsFlags,
    },
    /// Download a distribution upgrade.
    UpgradeDownload {
        /// The upgrade app.
        app: Arc<App>,
    },
    /// Schedule a downloaded distribution upgrade.
    UpgradeTrigger {
        /// The upgrade app.
        app: Arc<App>,
    },
    /// Launch an installed app.
    Launch {
        /// The app to launch.
        app: Arc<App>,
    },
    /// Abort an in-flight update.
    UpdateCancel {
        /// The app whose update to abort.
        app: Arc<App>,
    },
    /// Resolve a local file.
    FileToApp {
        /// Path to the file.
        path: PathBuf,
        /// Fields the result should carry.
        refine_flags: RefineFlags,
    },
    /// Resolve a URL.
    UrlToApp {
        /// The URL.
        url: String,
        /// Fields the result should carry.
        refine_flags: RefineFlags,
    },
    /// Read the offline-update state keyword.
    GetOfflineUpdateState,
    /// Cancel the prepared offline update.
    CancelOfflineUpdate,
    /// Choose the after-update action.
    SetOfflineUpdateAction {
        /// Action keyword (`reboot`, `shutdown`, ...).
        action: String,
    },
}

impl JobPayload {
    /// Kind discriminator.
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Refine { .. } => JobKind::Refine,
            JobPayload::ListApps { .. } => JobKind::ListApps,
            JobPayload::RefreshMetadata { .. } => JobKind::RefreshMetadata,
            JobPayload::ListDistroUpgrades => JobKind::ListDistroUpgrades,
            JobPayload::ManageRepository { .. } => JobKind::ManageRepository,
            JobPayload::RefineCategories { .. } => JobKind::RefineCategories,
            JobPayload::InstallApps { .. } => JobKind::InstallApps,
            JobPayload::RemoveApps { .. } => JobKind::RemoveApps,
            JobPayload::UpdateApps { .. } => JobKind::UpdateApps,
            JobPayload::UpgradeDownload { .. } => JobKind::UpgradeDownload,
            JobPayload::UpgradeTrigger { .. } => JobKind::UpgradeTrigger,
            JobPayload::Launch { .. } => JobKind::Launch,
            JobPayload::UpdateCancel { .. } => JobKind::UpdateCancel,
            JobPayload::FileToApp { .. } => JobKind::FileToApp,
            JobPayload::UrlToApp { .. } => JobKind::UrlToApp,
            JobPayload::GetOfflineUpdateState => JobKind::GetOfflineUpdateState,
            JobPayload::CancelOfflineUpdate => JobKind::CancelOfflineUpdate,
            JobPayload::SetOfflineUpdateAction { .. } => JobKind::SetOfflineUpdateAction,
        }
    }

    /// Unique ids of the apps this payload references, for the job index.
    pub fn referenced_apps(&self) -> Vec<String> {
        let from_list = |list: &AppList| -> Vec<String> {
            list.iter().filter_map(|a| a.unique_id()).collect()
        };
        match self {
            JobPayload::Refine { list, .. } => from_list(list),
            JobPayload::InstallApps { apps } | JobPayload::RemoveApps { apps } => from_list(apps),
            JobPayload::UpdateApps { apps, .. } => from_list(apps),
            JobPayload::ManageRepository { repository, .. } => {
                repository.unique_id().into_iter().collect()
            }
            JobPayload::UpgradeDownload { app }
            | JobPayload::UpgradeTrigger { app }
            | JobPayload::Launch { app }
            | JobPayload::UpdateCancel { app } => app.unique_id().into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// A cancellable, observable unit of work.
#[derive(Debug)]
pub struct Job {
    payload: JobPayload,
    token: CancellationToken,
    events: EventBus,
    interactive: bool,
}

impl Job {
    /// Wrap a payload into a job with a fresh token and bus.
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            token: CancellationToken::new(),
            events: EventBus::new(),
            interactive: false,
        }
    }

    /// Refine job over a list.
    pub fn refine(list: AppList, flags: RefineFlags) -> Self {
        Self::new(JobPayload::Refine {
            list,
            flags,
            disable_filtering: false,
        })
    }

    /// List-apps job for a query.
    pub fn list_apps(query: AppQuery) -> Self {
        Self::new(JobPayload::ListApps { query })
    }

    /// Metadata refresh job.
    pub fn refresh_metadata(cache_age_secs: u64) -> Self {
        Self::new(JobPayload::RefreshMetadata { cache_age_secs })
    }

    /// Install job for a list of apps.
    pub fn install_apps(apps: AppList) -> Self {
        Self::new(JobPayload::InstallApps { apps })
    }

    /// Remove job for a list of apps.
    pub fn remove_apps(apps: AppList) -> Self {
        Self::new(JobPayload::RemoveApps { apps })
    }

    /// Update job for a list of apps.
    pub fn update_apps(apps: AppList, flags: UpdateAppsFlags) -> Self {
        Self::new(JobPayload::UpdateApps { apps, flags })
    }

    /// Repository management job.
    pub fn manage_repository(action: RepositoryAction, repository: Arc<App>) -> Self {
        Self::new(JobPayload::ManageRepository { action, repository })
    }

    /// Category size counting job.
    pub fn refine_categories(categories: Vec<Arc<Category>>) -> Self {
        Self::new(JobPayload::RefineCategories { categories })
    }

    /// File resolution job.
    pub fn file_to_app(path: PathBuf, refine_flags: RefineFlags) -> Self {
        Self::new(JobPayload::FileToApp { path, refine_flags })
    }

    /// URL resolution job.
    pub fn url_to_app(url: impl Into<String>, refine_flags: RefineFlags) -> Self {
        Self::new(JobPayload::UrlToApp {
            url: url.into(),
            refine_flags,
        })
    }

    /// Launch job.
    pub fn launch(app: Arc<App>) -> Self {
        Self::new(JobPayload::Launch { app })
    }

    /// Mark the job user-initiated; plugins see the interactive flag.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Keep wildcard entries in a refine result (internal callers).
    pub fn disable_filtering(mut self) -> Self {
        if let JobPayload::Refine {
            disable_filtering, ..
        } = &mut self.payload
        {
            *disable_filtering = true;
        }
        self
    }

    /// Chain the caller's token so cancellation propagates inwards.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.token = parent.child_token();
        self
    }

    /// The payload.
    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Kind discriminator.
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// Handle for cancelling this job from any thread.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Handle for observing this job's events after completion.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Whether the job is user-initiated.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Split the job into the pieces the loader dispatches.
    pub(crate) fn into_parts(self) -> (JobPayload, CancellationToken, EventBus, bool) {
        (self.payload, self.token, self.events, self.interactive)
    }
}

/// What the loader hands each plugin call: identity, cancellation and the
/// event funnel of the running job.
#[derive(Clone, Debug)]
pub struct JobContext {
    /// Loader-assigned job id.
    pub id: u64,
    /// Kind of the running job.
    pub kind: JobKind,
    token: CancellationToken,
    events: EventBus,
    interactive: bool,
    loader_events: Option<EventBus>,
    event_added: Option<tokio::sync::broadcast::Sender<crate::plugin::LoaderSignal>>,
}

impl JobContext {
    /// Build a context; the loader wires the loader-wide event fan-out.
    pub(crate) fn new(
        id: u64,
        kind: JobKind,
        token: CancellationToken,
        events: EventBus,
        interactive: bool,
        loader_events: Option<EventBus>,
        event_added: Option<tokio::sync::broadcast::Sender<crate::plugin::LoaderSignal>>,
    ) -> Self {
        Self {
            id,
            kind,
            token,
            events,
            interactive,
            loader_events,
            event_added,
        }
    }

    /// Bare context for unit tests.
    pub fn for_tests() -> Self {
        Self::new(
            0,
            JobKind::Refine,
            CancellationToken::new(),
            EventBus::new(),
            false,
            None,
            None,
        )
    }

    /// The job's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the job is user-initiated.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// The job's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Surface an event on the job and on the loader-wide stream.
    ///
    /// Cancellation errors are dropped; everything else is observable by
    /// the caller without failing the job.
    pub fn emit_event(&self, plugin: Option<&str>, event: Event) {
        let mut event = event.with_job(self.id);
        if let Some(plugin) = plugin {
            event = event.with_plugin(plugin);
        }
        if self.interactive {
            event = event.with_flags(
                crate::events::EventFlags::INTERACTIVE | crate::events::EventFlags::VISIBLE,
            );
        }
        let Some(event) = self.events.add(event) else {
            return;
        };
        // the loader map shares the Arc so dismissal is global
        if let Some(loader_events) = &self.loader_events {
            loader_events.add_arc(event.clone());
        }
        if let Some(sender) = &self.event_added {
            let _ = sender.send(crate::plugin::LoaderSignal::EventAdded(event));
        }
    }
}

/// Result of a completed job.
#[derive(Debug)]
pub enum JobOutput {
    /// Nothing beyond success.
    None,
    /// An app list (list-producing jobs).
    List(AppList),
    /// A state keyword (offline-update queries).
    State(String),
}

impl JobOutput {
    /// The list result, when this output carries one.
    pub fn into_list(self) -> Option<AppList> {
        match self {
            JobOutput::List(list) => Some(list),
            _ => None,
        }
    }
}
