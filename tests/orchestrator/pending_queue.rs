//! Pending-install queue persistence and network-driven flush.

#![cfg(test)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use appshelf::app::{AppList, AppState};
use appshelf::jobs::Job;
use appshelf::network::{NetworkMonitor, NetworkState};
use appshelf::plugin::{JobSlots, PluginLoader, PluginLoaderBuilder};

use crate::common::{TestBackend, available_app, wait_for};

/// What: Loader with an install-capable backend and a controllable
/// network.
///
/// Inputs:
/// - `queue_path`: where the queue persists
/// - `network`: shared monitor
///
/// Output:
/// - Ready loader.
async fn install_loader(queue_path: PathBuf, network: Arc<NetworkMonitor>) -> Arc<PluginLoader> {
    let loader = PluginLoaderBuilder::new()
        .register(Box::new(TestBackend::new(
            "installer",
            JobSlots::INSTALL_APPS | JobSlots::REFINE,
        )))
        .network(network)
        .queue_path(queue_path)
        .build();
    loader.setup().await.expect("setup");
    loader
}

#[tokio::test]
/// What: Installing while offline queues the app and persists it; going
/// online flushes the queue, installs, and removes the file.
///
/// Inputs:
/// - Offline network; one install job; then an online transition.
///
/// Output:
/// - App first `queued-for-install` with a matching file line, then
///   `installed` with the file gone.
async fn offline_install_queues_then_flushes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue_path = dir.path().join("install-queue");
    let network = Arc::new(NetworkMonitor::new(NetworkState {
        available: false,
        metered: false,
    }));
    let loader = install_loader(queue_path.clone(), network.clone()).await;

    let app = available_app("org.ex.Queued");
    let mut apps = AppList::new();
    apps.add(app.clone());
    loader.run(Job::install_apps(apps)).await.expect("queues");

    assert_eq!(app.state(), AppState::QueuedForInstall);
    let contents = std::fs::read_to_string(&queue_path).expect("file written");
    assert_eq!(
        contents,
        "system/package/testrepo/org.ex.Queued/*\tdesktop-application\n"
    );

    network.set_state(NetworkState {
        available: true,
        metered: false,
    });
    assert!(
        wait_for(|| app.state() == AppState::Installed, Duration::from_secs(5)).await,
        "queued app was not installed after the network came back"
    );
    assert!(
        wait_for(|| !queue_path.exists(), Duration::from_secs(5)).await,
        "queue file was not removed after draining"
    );
}

#[tokio::test]
/// What: A metered connection blocks installs the same way as offline.
///
/// Inputs:
/// - Available but metered network; one install job.
///
/// Output:
/// - App queued instead of installed.
async fn metered_network_queues_installs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = Arc::new(NetworkMonitor::new(NetworkState {
        available: true,
        metered: true,
    }));
    let loader = install_loader(dir.path().join("install-queue"), network).await;

    let app = available_app("org.ex.Metered");
    let mut apps = AppList::new();
    apps.add(app.clone());
    loader.run(Job::install_apps(apps)).await.expect("queues");
    assert_eq!(app.state(), AppState::QueuedForInstall);
}

#[tokio::test]
/// What: The queue survives a loader restart and its entries are refined
/// back into queued apps.
///
/// Inputs:
/// - First loader queues one app while offline; second loader starts on
///   the same file, still offline.
///
/// Output:
/// - Second loader holds one queued app with the same unique id.
async fn queue_round_trips_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue_path = dir.path().join("install-queue");
    let offline = || {
        Arc::new(NetworkMonitor::new(NetworkState {
            available: false,
            metered: false,
        }))
    };

    let first = install_loader(queue_path.clone(), offline()).await;
    let app = available_app("org.ex.Restart");
    let mut apps = AppList::new();
    apps.add(app);
    first.run(Job::install_apps(apps)).await.expect("queues");
    drop(first);

    let second = install_loader(queue_path, offline()).await;
    assert!(
        wait_for(|| second.pending_queue().len() == 1, Duration::from_secs(5)).await,
        "restarted loader did not reload the queue"
    );
    let restored = &second.pending_queue().snapshot()[0];
    assert_eq!(
        restored.unique_id().as_deref(),
        Some("system/package/testrepo/org.ex.Restart/*")
    );
    assert_eq!(restored.state(), AppState::QueuedForInstall);
}
