//! Engine-level tests: silo compilation, app creation, refine behavior.

#![cfg(test)]

use std::sync::Arc;

use appshelf::app::{App, AppKind, Quirks, RefineFlags, Scope};
use appshelf::appstream::silo::{Silo, SiloBuilder, SourceInfo};
use appshelf::appstream::{create_app, refine_app};
use appshelf::plugin::PluginCache;

/// What: Compile one catalog XML string into a silo.
///
/// Inputs:
/// - `xml`: AppStream catalog document
///
/// Output:
/// - Compiled `Silo`
fn compile(xml: &str) -> Silo {
    let mut builder = SiloBuilder::new();
    builder
        .import_xml_bytes(xml.as_bytes(), SourceInfo::default())
        .expect("valid xml");
    builder.compile().expect("compiles")
}

#[test]
/// What: Create an app from a minimal component and hit the cache on the
/// second call.
///
/// Inputs:
/// - One desktop-application component with id/name/summary/license.
///
/// Output:
/// - App with resolved id, kind, scope and creator stamp; second call
///   returns the same object.
fn create_app_resolves_id_and_caches() {
    let silo = compile(
        r#"<components origin="flathub">
             <component type="desktop-application">
               <id>org.ex.A</id><name>A</name><summary>s</summary>
               <metadata_license>CC0-1.0</metadata_license>
             </component>
           </components>"#,
    );
    let cache = PluginCache::new();
    let component = silo.components()[0];

    let app = create_app(
        Some(&cache),
        Some("dummy"),
        &silo,
        component,
        Some("/tmp/t.xml"),
        Scope::System,
    )
    .expect("creates");
    assert_eq!(app.id().as_deref(), Some("org.ex.A"));
    assert_eq!(app.kind(), AppKind::DesktopApp);
    assert_eq!(app.scope(), Scope::System);
    assert_eq!(
        app.metadata_item("appshelf::Creator").as_deref(),
        Some("dummy")
    );

    let again = create_app(
        Some(&cache),
        Some("dummy"),
        &silo,
        component,
        Some("/tmp/t.xml"),
        Scope::System,
    )
    .expect("creates");
    assert!(Arc::ptr_eq(&app, &again));
}

#[test]
/// What: Detect pre-AppStream override files as wildcards.
///
/// Inputs:
/// - Component with neither `<name>` nor `<metadata_license>`.
///
/// Output:
/// - App carries the wildcard quirk and never lands in the cache.
fn override_files_are_wildcards_and_uncached() {
    let silo = compile(
        r#"<components><component type="desktop-application">
             <id>org.ex.A</id>
           </component></components>"#,
    );
    let cache = PluginCache::new();
    let app = create_app(
        Some(&cache),
        Some("dummy"),
        &silo,
        silo.components()[0],
        None,
        Scope::Unknown,
    )
    .expect("creates");
    assert!(app.has_quirk(Quirks::IS_WILDCARD));
    assert!(cache.is_empty());
}

#[test]
/// What: Parse a 4-part flatpak bundle ref and reject a 3-part one.
///
/// Inputs:
/// - Components with `<bundle type="flatpak">`.
///
/// Output:
/// - Valid ref yields bundle kind, branch and unique id; short ref yields
///   `not-supported`.
fn flatpak_bundle_refs() {
    let silo = compile(
        r#"<components origin="flathub">
             <component type="desktop-application">
               <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
               <bundle type="flatpak">app/org.ex.A/x86_64/stable</bundle>
             </component>
             <component type="desktop-application">
               <id>org.ex.B</id><name>B</name><metadata_license>X</metadata_license>
               <bundle type="flatpak">org.ex.B/x86_64/stable</bundle>
             </component>
           </components>"#,
    );
    let good = create_app(
        None,
        None,
        &silo,
        silo.components()[0],
        Some("/usr/share/swcatalog/xml/flathub.xml"),
        Scope::System,
    )
    .expect("parses");
    assert_eq!(good.branch().as_deref(), Some("stable"));
    assert_eq!(
        good.unique_id().as_deref(),
        Some("system/flatpak/flathub/org.ex.A/stable")
    );

    let err = create_app(
        None,
        None,
        &silo,
        silo.components()[1],
        Some("/usr/share/swcatalog/xml/flathub.xml"),
        Scope::System,
    )
    .expect_err("three segments");
    assert_eq!(err.kind(), appshelf::ErrorKind::NotSupported);
}

#[test]
/// What: Adapt a desktop directory into the silo and query it back.
///
/// Inputs:
/// - Temp directory with one regular desktop entry and one hidden one.
///
/// Output:
/// - Only the regular entry compiles into a component annotated with its
///   filename.
fn desktop_directory_loads_into_silo() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("org.ex.browser.desktop"),
        "[Desktop Entry]\nType=Application\nName=Browser\nComment=Browse\nIcon=web\nCategories=Network;\n",
    )
    .expect("write entry");
    std::fs::write(
        dir.path().join("hidden.desktop"),
        "[Desktop Entry]\nType=Application\nName=H\nHidden=true\n",
    )
    .expect("write hidden");

    let mut builder = SiloBuilder::new();
    let (any, _watch) = builder.load_desktop_files(dir.path()).expect("loads");
    assert!(any);
    let silo = builder.compile().expect("compiles");
    assert_eq!(silo.components().len(), 1);

    let component = silo.components()[0];
    assert_eq!(silo.child_text(component, "id"), Some("org.ex.browser.desktop"));
    assert!(
        silo.source_filename(component)
            .is_some_and(|f| f.ends_with("org.ex.browser.desktop"))
    );

    let app = create_app(None, None, &silo, component, None, Scope::System).expect("creates");
    refine_app(
        None,
        None,
        &app,
        &silo,
        component,
        RefineFlags::REQUIRE_ICON | RefineFlags::REQUIRE_CATEGORIES,
        None,
        None,
        Scope::System,
    )
    .expect("refines");
    assert_eq!(app.name().as_deref(), Some("Browser"));
    assert!(app.has_icons());
    assert!(app.has_category("Network"));
}

#[test]
/// What: Verify refine stays idempotent across repeated full refines.
///
/// Inputs:
/// - One component refined twice with the same flag set.
///
/// Output:
/// - Field values identical after the second pass.
fn refine_twice_changes_nothing() {
    let silo = compile(
        r#"<components origin="repo">
             <component type="desktop-application">
               <id>org.ex.A</id><name>A</name><summary>s</summary>
               <metadata_license>X</metadata_license>
               <icon type="stock">a-icon</icon>
               <releases><release version="1.0" timestamp="100"/></releases>
             </component>
           </components>"#,
    );
    let flags = RefineFlags::REQUIRE_ID
        | RefineFlags::REQUIRE_ICON
        | RefineFlags::REQUIRE_HISTORY
        | RefineFlags::REQUIRE_VERSION;
    let app = App::new(None);
    let component = silo.components()[0];
    refine_app(None, None, &app, &silo, component, flags, None, None, Scope::Unknown)
        .expect("first refine");
    let icons = app.icons();
    let history = app.version_history();
    refine_app(None, None, &app, &silo, component, flags, None, None, Scope::Unknown)
        .expect("second refine");
    assert_eq!(app.icons(), icons);
    assert_eq!(app.version_history(), history);
    assert_eq!(app.release_date(), Some(100));
}
