//! Shared test backend for loader tests.

#![cfg(test)]
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use appshelf::app::{App, AppList, AppState, Quirks, RefineFlags};
use appshelf::error::{Error, ErrorKind, Result};
use appshelf::jobs::{AppQuery, JobContext, UpdateAppsFlags};
use appshelf::plugin::{Backend, BackendInfo, JobSlots, Plugin};

/// Configurable in-process backend driving the loader in tests.
pub struct TestBackend {
    info: BackendInfo,
    slots: JobSlots,
    fail_setup: bool,
    fail_update: Option<ErrorKind>,
    install_blocks: bool,
    list_result: Mutex<Vec<Arc<App>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl TestBackend {
    /// Backend with a name and slot set; everything else defaults off.
    pub fn new(name: &str, slots: JobSlots) -> Self {
        Self {
            info: BackendInfo::new(name),
            slots,
            fail_setup: false,
            fail_update: None,
            install_blocks: false,
            list_result: Mutex::new(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adjust the registration info (rules, order, priority).
    pub fn with_info(mut self, tweak: impl FnOnce(&mut BackendInfo)) -> Self {
        tweak(&mut self.info);
        self
    }

    /// Make `setup` fail so the loader disables the plugin.
    pub fn failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    /// Make `update_apps` fail with the given kind.
    pub fn failing_update(mut self, kind: ErrorKind) -> Self {
        self.fail_update = Some(kind);
        self
    }

    /// Make installs park on the cancellation token instead of finishing.
    pub fn blocking_install(mut self) -> Self {
        self.install_blocks = true;
        self
    }

    /// Apps served from `list_apps` and `file_to_app`.
    pub fn serving(self, apps: Vec<Arc<App>>) -> Self {
        *self.list_result.lock().expect("lock") = apps;
        self
    }

    /// Shared call log handle.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }

    fn log(&self, what: &str) {
        self.calls.lock().expect("lock").push(what.to_owned());
    }

    fn served(&self) -> AppList {
        let mut list = AppList::new();
        for app in self.list_result.lock().expect("lock").iter() {
            list.add(app.clone());
        }
        list
    }
}

#[async_trait]
impl Backend for TestBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn slots(&self) -> JobSlots {
        self.slots
    }

    async fn setup(
        &self,
        _plugin: &Plugin,
        _token: &tokio_util::sync::CancellationToken,
    ) -> Result<()> {
        self.log("setup");
        if self.fail_setup {
            return Err(Error::failed("setup failure requested"));
        }
        Ok(())
    }

    async fn refine(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        list: &mut AppList,
        _flags: RefineFlags,
    ) -> Result<()> {
        self.log("refine");
        // materialize wildcards the way a catalog-backed plugin would
        for app in list.iter() {
            if app.has_quirk(Quirks::IS_WILDCARD) {
                app.remove_quirk(Quirks::IS_WILDCARD);
                if app.state() == AppState::QueuedForInstall {
                    app.set_state(AppState::Available);
                } else if app.state() == AppState::Unknown {
                    app.set_state(AppState::Available);
                }
            }
        }
        Ok(())
    }

    async fn list_apps(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _query: &AppQuery,
    ) -> Result<AppList> {
        self.log("list_apps");
        Ok(self.served())
    }

    async fn install_apps(
        &self,
        _plugin: &Plugin,
        ctx: &JobContext,
        apps: &AppList,
    ) -> Result<()> {
        self.log("install_apps");
        for app in apps.iter() {
            app.set_state(AppState::Installing);
            if self.install_blocks {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(30)) => {}
                    () = ctx.token().cancelled() => {
                        app.state_recover();
                        return Err(Error::cancelled());
                    }
                }
            }
            app.set_state(AppState::Installed);
        }
        Ok(())
    }

    async fn remove_apps(&self, _plugin: &Plugin, _ctx: &JobContext, apps: &AppList) -> Result<()> {
        self.log("remove_apps");
        for app in apps.iter() {
            app.set_state(AppState::Removing);
            app.set_state(AppState::Unknown);
        }
        Ok(())
    }

    async fn update_apps(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        _apps: &AppList,
        _flags: UpdateAppsFlags,
    ) -> Result<()> {
        self.log("update_apps");
        match self.fail_update {
            Some(kind) => Err(Error::new(kind, "update failure requested")),
            None => Ok(()),
        }
    }

    async fn file_to_app(
        &self,
        _plugin: &Plugin,
        _ctx: &JobContext,
        path: &Path,
    ) -> Result<AppList> {
        self.log(&format!("file_to_app:{}", path.display()));
        Ok(self.served())
    }

    fn adopt_app(&self, plugin: &Plugin, app: &App) {
        app.set_management_plugin(plugin.name());
    }
}

/// An available app with a fully-formed unique id.
pub fn available_app(id: &str) -> Arc<App> {
    let app = App::new(None);
    app.set_from_unique_id(
        &format!("system/package/testrepo/{id}/*"),
        appshelf::app::AppKind::DesktopApp,
    );
    app.set_state(AppState::Available);
    app
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_for(predicate: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
