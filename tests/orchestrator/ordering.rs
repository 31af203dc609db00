//! Depsolve ordering, conflict and priority tests.

#![cfg(test)]

use appshelf::plugin::{JobSlots, PluginLoaderBuilder};

use crate::common::TestBackend;

/// What: Build a loader from named backends with rule tweaks.
///
/// Inputs:
/// - `backends`: test backends to register
///
/// Output:
/// - Built (not yet set up) loader.
macro_rules! loader_with {
    ($($backend:expr),* $(,)?) => {{
        let mut builder = PluginLoaderBuilder::new();
        $(builder = builder.register(Box::new($backend));)*
        builder.queue_path(tempfile::tempdir().expect("tempdir").keep().join("queue")).build()
    }};
}

#[tokio::test]
/// What: Resolve `run_after`/`run_before` rules into the documented order.
///
/// Inputs:
/// - Plugins a (run_after=[b]), b, c (run_before=[a]).
///
/// Output:
/// - Final order `b, c, a`.
async fn rules_resolve_to_b_c_a() {
    let loader = loader_with!(
        TestBackend::new("a", JobSlots::empty())
            .with_info(|info| info.rules.run_after = vec!["b".into()]),
        TestBackend::new("b", JobSlots::empty()),
        TestBackend::new("c", JobSlots::empty())
            .with_info(|info| info.rules.run_before = vec!["a".into()]),
    );
    loader.setup().await.expect("setup");
    let names: Vec<String> = loader
        .plugins()
        .iter()
        .map(|p| p.name().to_owned())
        .collect();
    assert_eq!(names, vec!["b", "c", "a"]);
}

#[tokio::test]
/// What: A dependency cycle aborts setup with `plugin-depsolve-failed`.
///
/// Inputs:
/// - Plugins a and b that each demand to run after the other.
///
/// Output:
/// - Setup error of kind `PluginDepsolveFailed`.
async fn dependency_cycles_fail_depsolve() {
    let loader = loader_with!(
        TestBackend::new("a", JobSlots::empty())
            .with_info(|info| info.rules.run_after = vec!["b".into()]),
        TestBackend::new("b", JobSlots::empty())
            .with_info(|info| info.rules.run_after = vec!["a".into()]),
    );
    let err = loader.setup().await.expect_err("cycle");
    assert_eq!(err.kind(), appshelf::ErrorKind::PluginDepsolveFailed);
}

#[tokio::test]
/// What: Conflict rules disable the named plugin.
///
/// Inputs:
/// - Plugin a conflicting with b.
///
/// Output:
/// - b disabled after setup, a still enabled.
async fn conflicts_disable_the_loser() {
    let loader = loader_with!(
        TestBackend::new("a", JobSlots::empty())
            .with_info(|info| info.rules.conflicts = vec!["b".into()]),
        TestBackend::new("b", JobSlots::empty()),
    );
    loader.setup().await.expect("setup");
    assert!(loader.find_plugin("a").expect("a").enabled());
    assert!(!loader.find_plugin("b").expect("b").enabled());
}

#[tokio::test]
/// What: `better_than` rules raise dedupe priority past the rival.
///
/// Inputs:
/// - Plugin a better than b, both starting at priority 0.
///
/// Output:
/// - priority(a) > priority(b).
async fn better_than_raises_priority() {
    let loader = loader_with!(
        TestBackend::new("a", JobSlots::empty())
            .with_info(|info| info.rules.better_than = vec!["b".into()]),
        TestBackend::new("b", JobSlots::empty()),
    );
    loader.setup().await.expect("setup");
    let a = loader.find_plugin("a").expect("a");
    let b = loader.find_plugin("b").expect("b");
    assert!(a.priority() > b.priority());
}

#[tokio::test]
/// What: Allowlists disable everything not named; setup failures disable
/// the failing plugin without failing setup.
///
/// Inputs:
/// - Plugins a, b (failing setup), c; allowlist [a, b].
///
/// Output:
/// - c disabled by the allowlist, b disabled by its setup failure, a
///   enabled.
async fn allowlist_and_setup_failures_disable() {
    let mut builder = PluginLoaderBuilder::new();
    builder = builder
        .register(Box::new(TestBackend::new("a", JobSlots::SETUP)))
        .register(Box::new(
            TestBackend::new("b", JobSlots::SETUP).failing_setup(),
        ))
        .register(Box::new(TestBackend::new("c", JobSlots::empty())));
    let loader = builder
        .allowlist(vec!["a".into(), "b".into()])
        .queue_path(tempfile::tempdir().expect("tempdir").keep().join("queue"))
        .build();
    loader.setup().await.expect("setup");
    assert!(loader.find_plugin("a").expect("a").enabled());
    assert!(!loader.find_plugin("b").expect("b").enabled());
    assert!(!loader.find_plugin("c").expect("c").enabled());
}
