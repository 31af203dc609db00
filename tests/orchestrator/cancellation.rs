//! Cancellation propagation and state recovery.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use appshelf::app::{AppList, AppState};
use appshelf::jobs::Job;
use appshelf::plugin::{JobSlots, PluginLoader, PluginLoaderBuilder};

use crate::common::{TestBackend, available_app};

/// What: Loader whose installer parks until cancelled.
///
/// Inputs: none
///
/// Output: ready loader.
async fn blocking_loader() -> Arc<PluginLoader> {
    let loader = PluginLoaderBuilder::new()
        .register(Box::new(
            TestBackend::new("installer", JobSlots::INSTALL_APPS).blocking_install(),
        ))
        .queue_path(tempfile::tempdir().expect("tempdir").keep().join("queue"))
        .build();
    loader.setup().await.expect("setup");
    loader
}

#[tokio::test]
/// What: Cancelling before the job starts yields a `cancelled` error and
/// leaves the app in its stable state.
///
/// Inputs:
/// - Install job whose token is cancelled before `run`.
///
/// Output:
/// - `Cancelled` error, app still `available`.
async fn cancel_before_run_is_cancelled() {
    let loader = blocking_loader().await;
    let app = available_app("org.ex.C");
    let mut apps = AppList::new();
    apps.add(app.clone());

    let job = Job::install_apps(apps);
    job.token().cancel();
    let err = loader.run(job).await.expect_err("cancelled");
    assert!(err.is_cancelled());
    assert_eq!(app.state(), AppState::Available);
}

#[tokio::test]
/// What: Cancelling mid-install surfaces `cancelled` and never leaks a
/// transient state.
///
/// Inputs:
/// - Blocking install job cancelled shortly after dispatch.
///
/// Output:
/// - Either `cancelled` or success (if the install won the race); in both
///   cases the app is not left `installing`/`removing`.
async fn cancel_mid_install_recovers_state() {
    let loader = blocking_loader().await;
    let app = available_app("org.ex.R");
    let mut apps = AppList::new();
    apps.add(app.clone());

    let job = Job::install_apps(apps);
    let token = job.token();
    let runner = {
        let loader = loader.clone();
        tokio::spawn(async move { loader.run(job).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let result = runner.await.expect("join");
    match result {
        Err(err) => assert!(err.is_cancelled()),
        Ok(_) => assert_eq!(app.state(), AppState::Installed),
    }
    assert!(
        !matches!(app.state(), AppState::Installing | AppState::Removing),
        "transient state leaked: {:?}",
        app.state()
    );
}

#[tokio::test]
/// What: Shutting the loader down cancels running jobs through the chained
/// token.
///
/// Inputs:
/// - Blocking install job, then `shutdown` while it runs.
///
/// Output:
/// - The job resolves with `cancelled`.
async fn shutdown_cancels_running_jobs() {
    let loader = blocking_loader().await;
    let app = available_app("org.ex.S");
    let mut apps = AppList::new();
    apps.add(app);

    let job = Job::install_apps(apps);
    let runner = {
        let loader = loader.clone();
        tokio::spawn(async move { loader.run(job).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    loader.shutdown().await;

    let result = runner.await.expect("join");
    assert!(result.is_err_and(|e| e.is_cancelled()));
}
