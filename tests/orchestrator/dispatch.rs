//! Job dispatch tests: masking, not-supported contracts, file/url
//! resolution post-processing and the adopt pass.

#![cfg(test)]

use std::sync::Arc;

use appshelf::app::{AppList, IconKind, RefineFlags};
use appshelf::appstream::silo::{SiloBuilder, SourceInfo};
use appshelf::jobs::{AppQuery, Job, JobOutput, UpdateAppsFlags};
use appshelf::plugin::{JobSlots, PluginLoader, PluginLoaderBuilder};

use crate::common::{TestBackend, available_app};

/// What: Build and set up a loader over the given backends.
///
/// Inputs:
/// - `backends`: boxed backends
///
/// Output:
/// - Ready loader with an isolated queue file.
async fn ready_loader(backends: Vec<Box<TestBackend>>) -> Arc<PluginLoader> {
    let mut builder = PluginLoaderBuilder::new();
    for backend in backends {
        builder = builder.register(backend);
    }
    let loader = builder
        .queue_path(tempfile::tempdir().expect("tempdir").keep().join("queue"))
        .build();
    loader.setup().await.expect("setup");
    loader
}

#[tokio::test]
/// What: Per-plugin update errors become job events instead of failures.
///
/// Inputs:
/// - One failing and one succeeding update backend; an update job.
///
/// Output:
/// - Job resolves Ok; exactly one event with the failing error kind.
async fn update_errors_are_masked_into_events() {
    let loader = ready_loader(vec![
        Box::new(
            TestBackend::new("bad", JobSlots::UPDATE_APPS)
                .failing_update(appshelf::ErrorKind::DownloadFailed),
        ),
        Box::new(TestBackend::new("good", JobSlots::UPDATE_APPS)),
    ])
    .await;

    let mut apps = AppList::new();
    apps.add(available_app("org.ex.U"));
    let job = Job::update_apps(apps, UpdateAppsFlags::empty());
    let events = job.events();
    loader.run(job).await.expect("masked");

    let surfaced = events.events();
    assert_eq!(surfaced.len(), 1);
    assert_eq!(
        surfaced[0].error().kind(),
        appshelf::ErrorKind::DownloadFailed
    );
    assert_eq!(surfaced[0].plugin(), Some("bad"));
    // the loader-wide stream saw it too
    assert_eq!(loader.events().len(), 1);
}

#[tokio::test]
/// What: Mutation jobs with no implementing plugin fail with
/// `not-supported`.
///
/// Inputs:
/// - A loader whose only plugin implements nothing; an install job.
///
/// Output:
/// - `NotSupported` error.
async fn unimplemented_install_is_not_supported() {
    let loader = ready_loader(vec![Box::new(TestBackend::new("idle", JobSlots::empty()))]).await;
    let mut apps = AppList::new();
    apps.add(available_app("org.ex.I"));
    let err = loader
        .run(Job::install_apps(apps))
        .await
        .expect_err("nobody installs");
    assert_eq!(err.kind(), appshelf::ErrorKind::NotSupported);
}

#[tokio::test]
/// What: File resolution enforces exactly one result and attaches a
/// fallback themed icon.
///
/// Inputs:
/// - Backend serving one icon-less app for any file.
///
/// Output:
/// - One app with a themed icon; empty backends give `NotSupported`.
async fn file_resolution_post_processing() {
    let served = available_app("org.ex.F");
    let loader = ready_loader(vec![
        Box::new(TestBackend::new("files", JobSlots::FILE_TO_APP).serving(vec![served.clone()])),
    ])
    .await;

    let out = loader
        .run(Job::file_to_app("/tmp/example.flatpakref".into(), RefineFlags::empty()))
        .await
        .expect("resolves");
    let list = match out {
        JobOutput::List(list) => list,
        other => panic!("expected list, got {other:?}"),
    };
    assert_eq!(list.len(), 1);
    let app = list.index(0).expect("one");
    assert!(app.icons().iter().any(|i| i.kind == IconKind::Themed));
    assert!(
        app.metadata_item("appshelf::local-filename")
            .is_some_and(|p| p.ends_with("example.flatpakref"))
    );

    let empty_loader =
        ready_loader(vec![Box::new(TestBackend::new("files", JobSlots::FILE_TO_APP))]).await;
    let err = empty_loader
        .run(Job::file_to_app("/tmp/unknown.bin".into(), RefineFlags::empty()))
        .await
        .expect_err("nothing produced");
    assert_eq!(err.kind(), appshelf::ErrorKind::NotSupported);
}

#[tokio::test]
/// What: `file://` URLs nobody claims are retried as file resolutions.
///
/// Inputs:
/// - Backend implementing only `file_to_app`; a url-to-app job with a
///   `file://` URL.
///
/// Output:
/// - The file slot ran and produced the single result.
async fn file_urls_fall_back_to_file_resolution() {
    let backend = TestBackend::new("files", JobSlots::FILE_TO_APP)
        .serving(vec![available_app("org.ex.F")]);
    let calls = backend.call_log();
    let loader = ready_loader(vec![Box::new(backend)]).await;

    let out = loader
        .run(Job::url_to_app("file:///tmp/pkg.metainfo.xml", RefineFlags::empty()))
        .await
        .expect("resolves");
    assert!(matches!(out, JobOutput::List(ref l) if l.len() == 1));
    assert!(
        calls
            .lock()
            .expect("lock")
            .iter()
            .any(|c| c.starts_with("file_to_app:/tmp/pkg.metainfo.xml"))
    );
}

#[tokio::test]
/// What: The `appstream:` scheme is answered straight from the silo.
///
/// Inputs:
/// - Loader with a compiled silo and no url plugins.
///
/// Output:
/// - Exactly one resolved app with the requested id.
async fn appstream_urls_resolve_from_the_silo() {
    let loader = ready_loader(vec![Box::new(TestBackend::new("idle", JobSlots::empty()))]).await;
    let mut builder = SiloBuilder::new();
    builder
        .import_xml_bytes(
            br#"<components origin="repo">
                 <component type="desktop-application">
                   <id>org.ex.FromUrl</id><name>N</name><metadata_license>X</metadata_license>
                 </component>
               </components>"#,
            SourceInfo::default(),
        )
        .expect("valid xml");
    loader.silo().swap(Arc::new(builder.compile().expect("compiles")));

    let out = loader
        .run(Job::url_to_app("appstream://org.ex.FromUrl", RefineFlags::empty()))
        .await
        .expect("resolves");
    let list = match out {
        JobOutput::List(list) => list,
        other => panic!("expected list, got {other:?}"),
    };
    assert_eq!(list.len(), 1);
    assert_eq!(
        list.index(0).and_then(|a| a.id()).as_deref(),
        Some("org.ex.FromUrl")
    );
}

#[tokio::test]
/// What: Unowned apps from list results get adopted by the first willing
/// plugin during the follow-up refine.
///
/// Inputs:
/// - Backend listing one app, implementing refine and adopt; query with
///   refine flags.
///
/// Output:
/// - Result app owned by the backend.
async fn adopt_pass_assigns_management_plugin() {
    let loader = ready_loader(vec![Box::new(
        TestBackend::new(
            "owner",
            JobSlots::LIST_APPS | JobSlots::REFINE | JobSlots::ADOPT,
        )
        .serving(vec![available_app("org.ex.Adopted")]),
    )])
    .await;

    let query = AppQuery {
        refine_flags: RefineFlags::REQUIRE_ID,
        ..AppQuery::default()
    };
    let out = loader.run(Job::list_apps(query)).await.expect("lists");
    let list = match out {
        JobOutput::List(list) => list,
        other => panic!("expected list, got {other:?}"),
    };
    assert_eq!(list.len(), 1);
    assert_eq!(
        list.index(0).and_then(|a| a.management_plugin()).as_deref(),
        Some("owner")
    );
}
