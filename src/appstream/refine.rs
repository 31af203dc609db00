//! Creating apps from silo components and filling their fields.
//!
//! `refine_app` walks the immediate children of a component node once,
//! dispatching on the element name. Expensive extractions hide behind
//! [`RefineFlags`] so list pages stay cheap; detail pages ask for more.
//! The walk never touches the disk or the network, icon descriptors
//! included.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::app::{
    App, AppKind, ContentRating, Icon, IconKind, LaunchableKind, ProvidedKind, Quality, Quirks,
    Kudos, RatingValue, RefineFlags, Relation, RelationItem, RelationKind, Release, Scope,
    Screenshot, ScreenshotImage, ScreenshotVideo, UrgencyKind,
};
use crate::appstream::description::format_description;
use crate::appstream::silo::{NodeId, Silo};
use crate::error::{Error, Result};
use crate::plugin::PluginCache;
use crate::util::{locale_has_translations, now_unix, vercmp};

/// Screenshots beyond this many are dropped during refine.
const MAX_SCREENSHOTS: usize = 5;

/// How many releases back update details reach when no installed version
/// was ever detected.
const MAX_UNKNOWN_UPDATE_CHAIN: usize = 3;

/// A release younger than this counts as recent for the kudo.
const RECENT_RELEASE_SECS: u64 = 365 * 24 * 60 * 60;

/// Our own component id, checked by the metainfo compatibility gate.
pub const CORE_DESKTOP_ID: &str = "org.appshelf.Center.desktop";

/// Metadata key recording which file a component came from.
pub const METADATA_SOURCE_FILE: &str = "appshelf::source-file";

/// Metadata key stamped with the name of the plugin that created an app.
pub const METADATA_CREATOR: &str = "appshelf::Creator";

/// Kudo value marking distro-curated popular apps.
pub const KUDO_POPULAR: &str = "appshelf::popular";

/// Desktop environments accepted as a project group.
const DESKTOP_ENVIRONMENTS: &[&str] = &[
    "GNOME", "KDE", "XFCE", "MATE", "Cinnamon", "LXDE", "LXQt", "Unity", "Pantheon", "Budgie",
    "Enlightenment", "DDE", "EDE", "Endless", "Sugar",
];

/// Create a new app from a component node, or return the plugin's cached
/// instance for the same unique id.
///
/// Runs a minimal refine to obtain the id. Wildcard apps and plugin-less
/// callers bypass the cache entirely; everything else is stamped with the
/// creator plugin and inserted.
pub fn create_app(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    component: NodeId,
    source_file: Option<&str>,
    default_scope: Scope,
) -> Result<Arc<App>> {
    let app = App::new(None);
    refine_app(
        cache,
        creator,
        &app,
        silo,
        component,
        RefineFlags::REQUIRE_ID,
        None,
        source_file,
        default_scope,
    )?;

    // wildcards are placeholders and must never be cached
    if app.has_quirk(Quirks::IS_WILDCARD) {
        return Ok(app);
    }
    let (Some(cache), Some(creator)) = (cache, creator) else {
        return Ok(app);
    };
    let Some(unique_id) = app.unique_id() else {
        return Ok(app);
    };
    if let Some(existing) = cache.lookup(&unique_id) {
        return Ok(existing);
    }
    app.set_metadata(METADATA_CREATOR, creator);
    cache.add(Some(&unique_id), app.clone());
    Ok(app)
}

/// Populate `app` from `component`, extracting only what `require_flags`
/// asks for. Idempotent for the same `(app, component, flags)` triple;
/// already-set values are never clobbered and quality never downgrades.
#[allow(clippy::too_many_arguments)]
pub fn refine_app(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    app: &App,
    silo: &Silo,
    component: NodeId,
    require_flags: RefineFlags,
    installed_by_desktopid: Option<&HashMap<String, Vec<NodeId>>>,
    source_file: Option<&str>,
    default_scope: Scope,
) -> Result<()> {
    let had_icons = app.has_icons();
    let had_sources = !app.sources().is_empty();
    let primary_locale = silo.locales().first().map_or("C", String::as_str);
    let translations_expected = locale_has_translations(primary_locale);

    // the component type attribute only upgrades unknown/generic kinds
    if matches!(app.kind(), AppKind::Unknown | AppKind::Generic)
        && let Some(kind_attr) = silo.attr(component, "type")
    {
        let kind = AppKind::from_str(kind_attr);
        if kind != AppKind::Unknown {
            app.set_kind(kind);
        }
    }

    let mut name_quality = Quality::Highest;
    if app.kind() == AppKind::Repository {
        // backends usually know a better name for their own repos
        name_quality = Quality::Normal;
    }
    if app.kind().never_launchable() {
        app.add_quirk(Quirks::NOT_LAUNCHABLE);
    }

    apply_metadata_quirk_overrides(app);

    let mut has_name = false;
    let mut has_metadata_license = false;
    let mut developer_name_fallback: Option<String> = None;
    let mut launchable_desktop_id: Option<String> = None;
    let mut legacy_pkgnames: Vec<String> = Vec::new();

    for child in silo.children(component) {
        match silo.element(child) {
            "bundle" => {
                if !had_sources {
                    refine_bundle(app, silo, child)?;
                }
            }
            "categories" => {
                refine_categories(app, silo, child, require_flags);
            }
            "content_rating" => {
                refine_content_rating(app, silo, child);
            }
            "custom" => {
                for value in silo.children(child) {
                    if silo.element(value) == "value"
                        && let Some(key) = silo.attr(value, "key")
                    {
                        app.set_metadata(key, silo.text(value).unwrap_or_default());
                    }
                }
            }
            "description" => {
                // handled after the walk with locale selection
            }
            "developer" => {
                if require_flags.contains(RefineFlags::REQUIRE_DEVELOPER_NAME)
                    && app.developer_name().is_none()
                    && let Some(name) = silo.localized_child_text(child, "name")
                {
                    app.set_developer_name(name);
                }
            }
            "developer_name" => {
                if require_flags.contains(RefineFlags::REQUIRE_DEVELOPER_NAME)
                    && developer_name_fallback.is_none()
                {
                    developer_name_fallback = silo.text(child).map(str::to_owned);
                }
            }
            "icon" => {
                if require_flags.contains(RefineFlags::REQUIRE_ICON) && !had_icons {
                    match silo.attr(child, "type").and_then(IconKind::from_str) {
                        Some(kind) => app.add_icon(new_icon(silo, component, child, kind)),
                        None => {
                            tracing::debug!(
                                "unknown icon kind '{}'",
                                silo.attr(child, "type").unwrap_or_default()
                            );
                        }
                    }
                }
                if require_flags.contains(RefineFlags::REQUIRE_KUDOS)
                    && !app.has_kudo(Kudos::HI_DPI_ICON)
                    && silo.attr_u64(child, "width") == Some(128)
                {
                    app.add_kudo(Kudos::HI_DPI_ICON);
                }
            }
            "id" => {
                if app.id().is_none()
                    && let Some(id) = silo.text(child)
                {
                    app.set_id(id);
                }
            }
            "info" => {
                if app.metadata_item(METADATA_SOURCE_FILE).is_none()
                    && let Some(filename) = silo.child_text(child, "filename")
                {
                    app.set_metadata(METADATA_SOURCE_FILE, filename);
                }
            }
            "keywords" => {
                if require_flags.contains(RefineFlags::REQUIRE_KUDOS)
                    && silo.children(child).any(|k| silo.element(k) == "keyword")
                {
                    app.add_kudo(Kudos::HAS_KEYWORDS);
                }
            }
            "kudos" => {
                if require_flags.contains(RefineFlags::REQUIRE_KUDOS)
                    && silo
                        .children(child)
                        .any(|k| silo.element(k) == "kudo" && silo.text(k) == Some(KUDO_POPULAR))
                {
                    app.add_kudo(Kudos::FEATURED_RECOMMENDED);
                }
            }
            "languages" => {
                if require_flags.contains(RefineFlags::REQUIRE_KUDOS) {
                    refine_languages(app, silo, child, primary_locale, translations_expected);
                }
            }
            "launchable" => match silo.attr(child, "type") {
                Some("desktop-id") => {
                    if let Some(value) = silo.text(child) {
                        app.set_launchable(LaunchableKind::DesktopId, value);
                        launchable_desktop_id = Some(value.to_owned());
                    }
                }
                Some("url") => {
                    if let Some(value) = silo.text(child) {
                        app.set_launchable(LaunchableKind::Url, value);
                    }
                }
                _ => {}
            },
            "metadata_license" => {
                has_metadata_license = true;
            }
            "name" => {
                has_name = true;
            }
            "pkgname" => {
                if let Some(pkgname) = silo.text(child).filter(|p| !p.is_empty()) {
                    legacy_pkgnames.push(pkgname.to_owned());
                }
            }
            "project_group" => {
                if require_flags.contains(RefineFlags::REQUIRE_PROJECT_GROUP)
                    && app.project_group().is_none()
                    && let Some(group) = silo.text(child)
                    && DESKTOP_ENVIRONMENTS.contains(&group)
                {
                    app.set_project_group(group);
                }
            }
            "project_license" => {
                if require_flags.contains(RefineFlags::REQUIRE_LICENSE)
                    && app.license().is_none()
                    && let Some(license) = silo.text(child)
                {
                    app.set_license(Quality::Highest, license);
                }
            }
            "provides" => {
                refine_provides(app, silo, child);
            }
            "recommends" => {
                if require_flags.contains(RefineFlags::REQUIRE_PERMISSIONS) {
                    refine_relation(app, silo, child, RelationKind::Recommends)?;
                }
            }
            "releases" => {
                refine_releases(app, silo, child, require_flags)?;
            }
            "requires" => {
                if require_flags.contains(RefineFlags::REQUIRE_PERMISSIONS) {
                    refine_relation(app, silo, child, RelationKind::Requires)?;
                }
            }
            "screenshots" => {
                if require_flags.contains(RefineFlags::REQUIRE_SCREENSHOTS)
                    && app.screenshots().is_empty()
                {
                    refine_screenshots(app, silo, child);
                }
            }
            "summary" => {
                // handled after the walk with locale selection
            }
            "supports" => {
                if require_flags.contains(RefineFlags::REQUIRE_PERMISSIONS) {
                    refine_relation(app, silo, child, RelationKind::Supports)?;
                }
            }
            "url" => {
                if require_flags.contains(RefineFlags::REQUIRE_URL)
                    && let Some(kind) = silo.attr(child, "type")
                    && let Some(url) = silo.text(child)
                {
                    app.set_url(kind, url);
                }
            }
            _ => {}
        }
    }

    if let Some(name) = silo.localized_child_text(component, "name") {
        app.set_name(name_quality, name);
    }
    if let Some(summary) = silo.localized_child_text(component, "summary") {
        app.set_summary(name_quality, summary);
    }
    if require_flags.contains(RefineFlags::REQUIRE_DESCRIPTION)
        && let Some(description_node) = silo.localized_child(component, "description")
        && let Some(markup) = format_description(silo, Some(description_node), None)
    {
        app.set_description(Quality::Highest, &markup);
    }

    if app.developer_name().is_none()
        && let Some(fallback) = developer_name_fallback
    {
        app.set_developer_name(&fallback);
    }

    // old-style override files carry neither a name nor a metadata license
    if !has_name && !has_metadata_license {
        app.add_quirk(Quirks::IS_WILDCARD);
    }

    if app.metadata_item(METADATA_SOURCE_FILE).is_none() {
        match source_file {
            Some(file) if !file.is_empty() => app.set_metadata(METADATA_SOURCE_FILE, file),
            Some(_) => {}
            None => {
                if let Some(file) = silo.source_filename(component) {
                    app.set_metadata(METADATA_SOURCE_FILE, file);
                }
            }
        }
    }

    if app.scope() == Scope::Unknown {
        if source_file.is_some() {
            if default_scope != Scope::Unknown {
                app.set_scope(default_scope);
            }
        } else if let Some(scope) = silo.source_scope(component) {
            app.set_scope(scope);
        }
    }

    if require_flags.contains(RefineFlags::REQUIRE_ICON) && !had_icons && !app.has_icons() {
        inherit_desktop_icons(
            app,
            silo,
            launchable_desktop_id.as_deref(),
            installed_by_desktopid,
        );
    }

    if app.bundle_kind() == crate::app::BundleKind::Unknown
        && !legacy_pkgnames.is_empty()
        && app.sources().is_empty()
    {
        for pkgname in &legacy_pkgnames {
            app.add_source(pkgname);
        }
        app.set_bundle_kind(crate::app::BundleKind::Package);
    }

    refine_origin(app, silo, component);

    if require_flags.contains(RefineFlags::REQUIRE_ADDONS) {
        refine_addons(cache, creator, app, silo, source_file, default_scope)?;
    }

    if require_flags.contains(RefineFlags::REQUIRE_KUDOS) {
        if !translations_expected {
            app.add_kudo(Kudos::MY_LANGUAGE);
        }
        if silo
            .newest_release_timestamp(component)
            .is_some_and(|ts| now_unix().saturating_sub(ts) < RECENT_RELEASE_SECS)
        {
            app.add_kudo(Kudos::RECENT_RELEASE);
        }
    }

    Ok(())
}

/// Special metadata keys can force or clear quirks set by backends.
fn apply_metadata_quirk_overrides(app: &App) {
    for (key, quirk) in [
        ("appshelf::quirks::not-launchable", Quirks::NOT_LAUNCHABLE),
        ("appshelf::quirks::hide-everywhere", Quirks::HIDE_EVERYWHERE),
    ] {
        match app.metadata_item(key).as_deref() {
            Some("true") => app.add_quirk(quirk),
            Some("false") => app.remove_quirk(quirk),
            _ => {}
        }
    }
    if app.metadata_item("appshelf::developer-verified").as_deref() == Some("true") {
        app.add_quirk(Quirks::DEVELOPER_VERIFIED);
    } else {
        app.remove_quirk(Quirks::DEVELOPER_VERIFIED);
    }
}

/// `<bundle type="...">` carries the backend source id; flatpak refs also
/// contribute the branch segment of the unique id.
fn refine_bundle(app: &App, silo: &Silo, bundle: NodeId) -> Result<()> {
    let (Some(kind), Some(bundle_id)) = (silo.attr(bundle, "type"), silo.text(bundle)) else {
        return Ok(());
    };
    app.add_source(bundle_id);
    app.set_bundle_kind(crate::app::BundleKind::from_str(kind));
    if app.bundle_kind() == crate::app::BundleKind::Flatpak {
        let split: Vec<&str> = bundle_id.split('/').collect();
        if split.len() != 4 {
            return Err(Error::not_supported(format!(
                "invalid ID {bundle_id} for a flatpak ref"
            )));
        }
        app.set_branch(split[3]);
    }
    Ok(())
}

/// Category extraction plus the two category-driven flags.
fn refine_categories(app: &App, silo: &Silo, categories: NodeId, require_flags: RefineFlags) {
    let want_kudos = require_flags.contains(RefineFlags::REQUIRE_KUDOS);
    for child in silo.children(categories) {
        if silo.element(child) != "category" {
            continue;
        }
        let Some(category) = silo.text(child) else {
            continue;
        };
        if require_flags.contains(RefineFlags::REQUIRE_CATEGORIES) {
            app.add_category(category);
        }
        // legacy spelling for hiding apps from their desktop file
        if category == "Blacklisted" {
            app.add_quirk(Quirks::HIDE_EVERYWHERE);
        }
        if want_kudos && category == "Featured" {
            app.add_kudo(Kudos::FEATURED_RECOMMENDED);
        }
    }
}

/// Only OARS 1.0/1.1 ratings are understood.
fn refine_content_rating(app: &App, silo: &Silo, node: NodeId) {
    if app.content_rating().is_some() {
        return;
    }
    let kind = silo.attr(node, "type").unwrap_or_default();
    if kind != "oars-1.0" && kind != "oars-1.1" {
        return;
    }
    let mut rating = ContentRating {
        kind: kind.to_owned(),
        attributes: Vec::new(),
    };
    for attr in silo.children(node) {
        if silo.element(attr) == "content_attribute"
            && let Some(id) = silo.attr(attr, "id")
        {
            let value = RatingValue::from_str(silo.text(attr).unwrap_or_default());
            rating.attributes.push((id.to_owned(), value));
        }
    }
    app.set_content_rating(rating);
}

/// `<languages>` feeds the my-language kudo and the translation flag.
fn refine_languages(
    app: &App,
    silo: &Silo,
    languages: NodeId,
    primary_locale: &str,
    translations_expected: bool,
) {
    if !translations_expected {
        app.add_kudo(Kudos::MY_LANGUAGE);
    }
    if app.has_translations() {
        return;
    }
    let variants = crate::util::locale_variants(primary_locale);
    for lang in silo.children(languages) {
        if silo.element(lang) != "lang" {
            continue;
        }
        let Some(value) = silo.text(lang) else {
            continue;
        };
        app.set_has_translations(true);
        if app.has_kudo(Kudos::MY_LANGUAGE) {
            break;
        }
        let is_variant = variants.iter().any(|v| v == value);
        if is_variant && silo.attr_u64(lang, "percentage").unwrap_or(0) > 50 {
            app.add_kudo(Kudos::MY_LANGUAGE);
            break;
        }
    }
}

/// `<provides>` children map onto typed provided items.
fn refine_provides(app: &App, silo: &Silo, provides: NodeId) {
    for child in silo.children(provides) {
        let element = silo.element(child);
        let kind = ProvidedKind::from_simple_element(element).or_else(|| match element {
            "firmware" => match silo.attr(child, "type") {
                Some("runtime") => Some(ProvidedKind::FirmwareRuntime),
                Some("flashed") => Some(ProvidedKind::FirmwareFlashed),
                _ => None,
            },
            "dbus" => match silo.attr(child, "type") {
                Some("system") => Some(ProvidedKind::DbusSystem),
                Some("user") | Some("session") => Some(ProvidedKind::DbusUser),
                _ => None,
            },
            _ => None,
        });
        match (kind, silo.text(child)) {
            (Some(kind), Some(value)) => app.add_provided_item(kind, value),
            _ => {
                tracing::debug!(
                    "ignoring unknown or empty provided item type:'{element}' value:'{}'",
                    silo.text(child).unwrap_or_default()
                );
            }
        }
    }
}

/// Relations: `control` and `display_length` items, plus the compatibility
/// gate on our own id.
fn refine_relation(app: &App, silo: &Silo, node: NodeId, kind: RelationKind) -> Result<()> {
    for child in silo.children(node) {
        match silo.element(child) {
            "control" => {
                if let Some(value) = silo.text(child) {
                    app.add_relation(Relation {
                        kind,
                        item: RelationItem::Control(value.to_owned()),
                    });
                }
            }
            "display_length" => {
                let compare = silo.attr(child, "compare").unwrap_or("ge").to_owned();
                let side = silo.attr(child, "side").unwrap_or("shortest").to_owned();
                let px = silo
                    .text(child)
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
                app.add_relation(Relation {
                    kind,
                    item: RelationItem::DisplayLength { compare, side, px },
                });
            }
            "id" => {
                if kind == RelationKind::Requires
                    && silo.attr(child, "type") == Some("id")
                    && silo.text(child) == Some(CORE_DESKTOP_ID)
                    && let Some(required) = silo.attr(child, "version")
                    && vercmp(required, env!("CARGO_PKG_VERSION"))
                        == std::cmp::Ordering::Greater
                {
                    return Err(Error::not_supported(
                        "metainfo requires a newer software center",
                    ));
                }
                if let Some(value) = silo.text(child) {
                    app.add_relation(Relation {
                        kind,
                        item: RelationItem::Id(value.to_owned()),
                    });
                }
            }
            other => {
                tracing::debug!(
                    "relation item '{other}' not currently supported for {:?}; ignoring",
                    app.id()
                );
            }
        }
    }
    Ok(())
}

/// Release walk: release date, version history and pending-update details.
fn refine_releases(
    app: &App,
    silo: &Silo,
    releases: NodeId,
    require_flags: RefineFlags,
) -> Result<()> {
    let needs_version_history = app.version_history().is_empty();
    let needs_update_details =
        require_flags.contains(RefineFlags::REQUIRE_UPDATE_DETAILS) && app.is_updatable();

    // release date comes from the first entry regardless of flags
    if app.release_date().is_none()
        && let Some(first) = silo
            .children(releases)
            .find(|&c| silo.element(c) == "release")
        && let Some(ts) = release_timestamp(silo, first)
    {
        app.set_release_date(ts);
    }

    if !needs_version_history && !needs_update_details {
        return Ok(());
    }

    let installed: HashSet<String> = if needs_update_details {
        app.id()
            .map(|id| silo.installed_release_versions(&id).into_iter().collect())
            .unwrap_or_default()
    } else {
        HashSet::new()
    };

    let mut version_history: Vec<Release> = Vec::new();
    let mut updates_list: Vec<(String, Option<String>)> = Vec::new();
    let mut urgency_best = UrgencyKind::Unknown;

    for (index, child) in silo
        .children(releases)
        .filter(|&c| silo.element(c) == "release")
        .enumerate()
    {
        let Some(version) = silo.attr(child, "version") else {
            continue;
        };
        let description_node = silo.child_by_element(child, "description");
        let issues_node = silo.child_by_element(child, "issues");
        let description = if description_node.is_some() || issues_node.is_some() {
            format_description(silo, description_node, issues_node)
        } else {
            None
        };

        if needs_version_history {
            version_history.push(Release {
                version: version.to_owned(),
                timestamp: release_timestamp(silo, child),
                description: description.clone(),
                urgency: UrgencyKind::from_str(silo.attr(child, "urgency").unwrap_or_default()),
            });
        }

        if needs_update_details {
            if installed.contains(version) {
                continue;
            }
            // limit this to three versions backwards if there has never
            // been a detected installed version
            if installed.is_empty() && index >= MAX_UNKNOWN_UPDATE_CHAIN {
                continue;
            }
            let urgency = UrgencyKind::from_str(silo.attr(child, "urgency").unwrap_or_default());
            if urgency > urgency_best {
                urgency_best = urgency;
            }
            if description_node.is_some() || issues_node.is_some() {
                updates_list.push((version.to_owned(), description));
            }
        }
    }

    if needs_version_history && !version_history.is_empty() {
        app.set_version_history(version_history);
    }

    if needs_update_details {
        if urgency_best != UrgencyKind::Unknown {
            app.set_update_urgency(urgency_best);
        }
        match updates_list.as_slice() {
            [] => {}
            [(_, description)] => {
                if let Some(description) = description {
                    app.set_update_details_markup(description);
                }
            }
            entries => {
                let current = app.version();
                let mut markup = String::new();
                for (index, (version, description)) in entries.iter().enumerate() {
                    // keep the newest entry, skip anything at or below the
                    // installed version
                    if index != 0
                        && current
                            .as_deref()
                            .is_some_and(|cur| vercmp(cur, version) != std::cmp::Ordering::Less)
                    {
                        continue;
                    }
                    markup.push_str(&format!(
                        "Version {version}:\n{}\n\n",
                        description.as_deref().unwrap_or_default()
                    ));
                }
                while markup.ends_with('\n') {
                    markup.pop();
                }
                if !markup.is_empty() {
                    app.set_update_details_markup(&markup);
                }
            }
        }
        if let Some((version, _)) = updates_list.first() {
            app.set_update_version(version);
        }
    }

    Ok(())
}

/// Timestamp of one `<release>`, `timestamp` attribute preferred over the
/// ISO-8601 `date`.
fn release_timestamp(silo: &Silo, release: NodeId) -> Option<u64> {
    if let Some(ts) = silo.attr_u64(release, "timestamp") {
        return Some(ts);
    }
    silo.attr(release, "date")
        .and_then(crate::util::iso8601_to_unix)
        .and_then(|s| u64::try_from(s).ok())
}

/// Screenshot extraction, capped at [`MAX_SCREENSHOTS`].
fn refine_screenshots(app: &App, silo: &Silo, screenshots: NodeId) {
    let mut count = 0usize;
    for shot in silo.children(screenshots) {
        if silo.element(shot) != "screenshot" {
            continue;
        }
        if count >= MAX_SCREENSHOTS {
            break;
        }
        let mut screenshot = Screenshot {
            caption: silo.localized_child_text(shot, "caption").map(str::to_owned),
            ..Screenshot::default()
        };
        for media in silo.children(shot) {
            match silo.element(media) {
                "image" => {
                    screenshot.images.push(ScreenshotImage {
                        width: silo.attr_u64(media, "width").unwrap_or(0) as u32,
                        height: silo.attr_u64(media, "height").unwrap_or(0) as u32,
                        kind: silo.attr(media, "type").unwrap_or_default().to_owned(),
                        url: silo.text(media).unwrap_or_default().to_owned(),
                    });
                }
                "video" => {
                    screenshot.videos.push(ScreenshotVideo {
                        width: silo.attr_u64(media, "width").unwrap_or(0) as u32,
                        height: silo.attr_u64(media, "height").unwrap_or(0) as u32,
                        codec: silo.attr(media, "codec").unwrap_or_default().to_owned(),
                        container: silo.attr(media, "container").unwrap_or_default().to_owned(),
                        url: silo.text(media).unwrap_or_default().to_owned(),
                    });
                }
                _ => {}
            }
        }
        if !screenshot.images.is_empty() || !screenshot.videos.is_empty() {
            app.add_screenshot(screenshot);
            count += 1;
        }
    }
    if count > 0 {
        app.add_kudo(Kudos::HAS_SCREENSHOTS);
    }
}

/// Icon descriptor construction. Never does disk or network I/O; cached and
/// stock icons get the composed prefix for later resolution.
fn new_icon(silo: &Silo, component: NodeId, node: NodeId, kind: IconKind) -> Icon {
    let mut icon = Icon::new(kind, silo.text(node).unwrap_or_default());
    let width = silo.attr_u64(node, "width").unwrap_or(0) as u32;
    if width > 0 {
        icon.width = width;
        icon.height = width;
    }
    if let Some(scale) = silo.attr_u64(node, "scale") {
        icon.scale = scale.max(1) as u32;
    }
    if !matches!(kind, IconKind::Local | IconKind::Remote) {
        icon.prefix = build_icon_prefix(silo, component);
    }
    icon
}

/// Compose the icon directory for catalog icons: the explicit
/// `info/icon-prefix` wins, otherwise the `.../{xmls,yaml,xml}/NAME` part of
/// `info/filename` is rewritten to `.../icons/<origin>/`.
fn build_icon_prefix(silo: &Silo, component: NodeId) -> Option<String> {
    if let Some(prefix) = silo.source_icon_prefix(component) {
        return Some(prefix.to_owned());
    }
    let origin = silo.component_origin(component)?;
    let filename = silo.source_filename(component)?;
    let mut path: Vec<&str> = filename.split('/').collect();
    let n = path.len();
    if n < 3 || !matches!(path[n - 2], "xmls" | "yaml" | "xml") {
        return None;
    }
    path[n - 1] = origin;
    path[n - 2] = "icons";
    Some(path.join("/"))
}

/// When a component ships no icons, inherit them from the installed
/// desktop-application entry matching its launchable or id.
fn inherit_desktop_icons(
    app: &App,
    silo: &Silo,
    launchable_desktop_id: Option<&str>,
    installed_by_desktopid: Option<&HashMap<String, Vec<NodeId>>>,
) {
    let mut candidates: Vec<NodeId> = Vec::new();
    let mut lookup = |desktop_id: &str| match installed_by_desktopid {
        Some(map) => map.get(desktop_id).cloned().unwrap_or_default(),
        None => silo.desktop_components_by_launchable(desktop_id),
    };
    if let Some(desktop_id) = launchable_desktop_id {
        candidates.extend(lookup(desktop_id));
    }
    if let Some(id) = app.id() {
        candidates.extend(lookup(&id));
    }
    for component in candidates {
        for child in silo.children(component) {
            if silo.element(child) != "icon" {
                continue;
            }
            match silo.attr(child, "type").and_then(IconKind::from_str) {
                Some(kind) => app.add_icon(new_icon(silo, component, child, kind)),
                None => {
                    tracing::debug!(
                        "unknown icon kind '{}'",
                        silo.attr(child, "type").unwrap_or_default()
                    );
                }
            }
        }
    }
}

/// Origin inheritance from the source root's `origin` attribute.
fn refine_origin(app: &App, silo: &Silo, component: NodeId) {
    let needs_appstream_origin = app.origin_appstream().is_none();
    let needs_origin = app.origin().is_none()
        && matches!(
            app.bundle_kind(),
            crate::app::BundleKind::Flatpak | crate::app::BundleKind::Package
        );
    if !needs_appstream_origin && !needs_origin {
        return;
    }
    let Some(origin) = silo.component_origin(component) else {
        return;
    };
    if needs_appstream_origin {
        app.set_origin_appstream(origin);
    }
    if needs_origin {
        app.set_origin(origin);
    }
}

/// Attach every component extending this app's id as an addon.
fn refine_addons(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    app: &App,
    silo: &Silo,
    source_file: Option<&str>,
    default_scope: Scope,
) -> Result<()> {
    let Some(id) = app.id() else {
        return Ok(());
    };
    let extending = silo.components_extending(&id);
    if extending.is_empty() {
        return Ok(());
    }
    let mut addons = crate::app::AppList::new();
    for component in extending {
        let addon = create_app(cache, creator, silo, component, source_file, default_scope)?;
        addons.add(addon);
    }
    app.add_addons(&addons);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appstream::silo::{SiloBuilder, SourceInfo};

    fn compile(xml: &str) -> Silo {
        let mut builder = SiloBuilder::new();
        builder
            .import_xml_bytes(xml.as_bytes(), SourceInfo::default())
            .expect("valid xml");
        builder.compile().expect("compiles")
    }

    fn refine_all(silo: &Silo, flags: RefineFlags) -> Arc<App> {
        let component = silo.components()[0];
        let app = App::new(None);
        refine_app(
            None,
            None,
            &app,
            silo,
            component,
            flags,
            None,
            Some("/usr/share/swcatalog/xml/test.xml"),
            Scope::System,
        )
        .expect("refines");
        app
    }

    #[test]
    fn minimal_component_resolves_id_and_kind() {
        let silo = compile(
            r#"<components origin="flathub">
                 <component type="desktop-application">
                   <id>org.ex.A</id><name>A</name><summary>s</summary>
                   <metadata_license>CC0-1.0</metadata_license>
                 </component>
               </components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_ID);
        assert_eq!(app.id().as_deref(), Some("org.ex.A"));
        assert_eq!(app.kind(), AppKind::DesktopApp);
        assert_eq!(app.scope(), Scope::System);
        assert_eq!(app.name().as_deref(), Some("A"));
        assert!(!app.has_quirk(Quirks::IS_WILDCARD));
    }

    #[test]
    fn override_files_become_wildcards() {
        let silo = compile(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id>
               </component></components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_ID);
        assert!(app.has_quirk(Quirks::IS_WILDCARD));
    }

    #[test]
    fn flatpak_bundle_parses_branch() {
        let silo = compile(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                 <bundle type="flatpak">app/org.ex.A/x86_64/stable</bundle>
               </component></components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_ID);
        assert_eq!(app.bundle_kind(), crate::app::BundleKind::Flatpak);
        assert_eq!(app.branch().as_deref(), Some("stable"));
        assert_eq!(app.sources(), vec!["app/org.ex.A/x86_64/stable"]);
    }

    #[test]
    fn short_flatpak_ref_is_rejected() {
        let silo = compile(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                 <bundle type="flatpak">org.ex.A/x86_64/stable</bundle>
               </component></components>"#,
        );
        let component = silo.components()[0];
        let app = App::new(None);
        let err = refine_app(
            None,
            None,
            &app,
            &silo,
            component,
            RefineFlags::REQUIRE_ID,
            None,
            None,
            Scope::Unknown,
        )
        .expect_err("three segments must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::NotSupported);
    }

    #[test]
    fn create_app_caches_by_unique_id() {
        let silo = compile(
            r#"<components origin="flathub">
                 <component type="desktop-application">
                   <id>org.ex.A</id><name>A</name><summary>s</summary>
                   <metadata_license>X</metadata_license>
                 </component>
               </components>"#,
        );
        let cache = PluginCache::new();
        let component = silo.components()[0];
        let first = create_app(Some(&cache), Some("dummy"), &silo, component, None, Scope::System)
            .expect("creates");
        let second = create_app(Some(&cache), Some("dummy"), &silo, component, None, Scope::System)
            .expect("creates");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.metadata_item(METADATA_CREATOR).as_deref(), Some("dummy"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn wildcards_bypass_the_cache() {
        let silo = compile(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id>
               </component></components>"#,
        );
        let cache = PluginCache::new();
        let component = silo.components()[0];
        let app = create_app(Some(&cache), Some("dummy"), &silo, component, None, Scope::Unknown)
            .expect("creates");
        assert!(app.has_quirk(Quirks::IS_WILDCARD));
        assert!(cache.is_empty());
        assert_eq!(app.metadata_item(METADATA_CREATOR), None);
    }

    #[test]
    fn release_timestamp_attribute_beats_date() {
        let silo = compile(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                 <releases>
                   <release version="2.0" timestamp="100" date="1970-01-02"/>
                 </releases>
               </component></components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_ID);
        assert_eq!(app.release_date(), Some(100));
    }

    #[test]
    fn version_history_collects_descriptions() {
        let silo = compile(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                 <releases>
                   <release version="2.0" timestamp="200">
                     <description><p>two</p></description>
                   </release>
                   <release version="1.0" timestamp="100">
                     <description><p>one</p></description>
                   </release>
                 </releases>
               </component></components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_HISTORY);
        let history = app.version_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, "2.0");
        assert_eq!(history[0].description.as_deref(), Some("two"));
        assert_eq!(history[1].timestamp, Some(100));
    }

    #[test]
    fn update_details_skip_installed_versions() {
        let mut builder = SiloBuilder::new();
        builder
            .import_xml_bytes(
                br#"<components origin="repo"><component type="desktop-application">
                     <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                     <releases>
                       <release version="3.0" timestamp="300">
                         <description><p>three</p></description>
                       </release>
                       <release version="2.0" timestamp="200">
                         <description><p>two</p></description>
                       </release>
                       <release version="1.0" timestamp="100">
                         <description><p>one</p></description>
                       </release>
                     </releases>
                   </component></components>"#,
                SourceInfo::default(),
            )
            .expect("catalog");
        // the installed metainfo knows version 1.0 is on disk
        builder
            .import_appdata_bytes(
                br#"<component type="desktop-application">
                     <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                     <releases><release version="1.0" timestamp="100"/></releases>
                   </component>"#,
                SourceInfo::default(),
            )
            .expect("metainfo");
        let silo = builder.compile().expect("compiles");

        let catalog_component = silo.components()[0];
        let app2 = App::new(None);
        refine_app(
            None,
            None,
            &app2,
            &silo,
            catalog_component,
            RefineFlags::REQUIRE_ID,
            None,
            None,
            Scope::Unknown,
        )
        .expect("id refine");
        app2.set_state(crate::app::AppState::Installed);
        app2.set_state(crate::app::AppState::Updatable);
        refine_app(
            None,
            None,
            &app2,
            &silo,
            catalog_component,
            RefineFlags::REQUIRE_UPDATE_DETAILS,
            None,
            None,
            Scope::Unknown,
        )
        .expect("details refine");

        let markup = app2.update_details_markup().expect("markup");
        assert!(markup.contains("Version 3.0:"));
        assert!(markup.contains("Version 2.0:"));
        assert!(!markup.contains("Version 1.0:"));
        assert_eq!(app2.update_version().as_deref(), Some("3.0"));
    }

    #[test]
    fn icon_prefix_is_rewritten_from_filename() {
        let mut builder = SiloBuilder::new();
        builder
            .import_xml_bytes(
                br#"<components origin="fedora"><component type="desktop-application">
                     <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                     <icon type="cached" width="64">org.ex.A.png</icon>
                   </component></components>"#,
                SourceInfo {
                    filename: Some("/usr/share/swcatalog/xml/fedora.xml".to_owned()),
                    ..SourceInfo::default()
                },
            )
            .expect("catalog");
        let silo = builder.compile().expect("compiles");
        let app = App::new(None);
        refine_app(
            None,
            None,
            &app,
            &silo,
            silo.components()[0],
            RefineFlags::REQUIRE_ICON,
            None,
            None,
            Scope::Unknown,
        )
        .expect("refines");
        let icons = app.icons();
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].kind, IconKind::Cached);
        assert_eq!(icons[0].width, 64);
        assert_eq!(
            icons[0].prefix.as_deref(),
            Some("/usr/share/swcatalog/icons/fedora")
        );
    }

    #[test]
    fn icons_inherit_from_launchable_desktop_entry() {
        let silo = compile(
            r#"<components origin="fedora">
                 <component type="desktop-application">
                   <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                   <launchable type="desktop-id">org.ex.A.desktop</launchable>
                 </component>
                 <component type="desktop-application">
                   <id>org.ex.A.desktop</id><name>A</name><metadata_license>X</metadata_license>
                   <launchable type="desktop-id">org.ex.A.desktop</launchable>
                   <icon type="stock">ex-a</icon>
                 </component>
               </components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_ICON);
        assert!(app.has_icons());
        assert_eq!(app.icons()[0].source, "ex-a");
    }

    #[test]
    fn addons_extend_their_parent() {
        let silo = compile(
            r#"<components origin="fedora">
                 <component type="desktop-application">
                   <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                 </component>
                 <component type="addon">
                   <id>org.ex.A.plugin</id><name>Plugin</name><metadata_license>X</metadata_license>
                   <extends>org.ex.A</extends>
                 </component>
               </components>"#,
        );
        let app = refine_all(&silo, RefineFlags::REQUIRE_ADDONS);
        let addons = app.dup_addons();
        assert_eq!(addons.len(), 1);
        assert_eq!(
            addons.index(0).and_then(|a| a.id()).as_deref(),
            Some("org.ex.A.plugin")
        );
    }

    #[test]
    fn incompatible_metainfo_is_rejected() {
        let xml = format!(
            r#"<components><component type="desktop-application">
                 <id>org.ex.A</id><name>A</name><metadata_license>X</metadata_license>
                 <requires><id type="id" version="99.0">{CORE_DESKTOP_ID}</id></requires>
               </component></components>"#
        );
        let silo = compile(&xml);
        let app = App::new(None);
        let err = refine_app(
            None,
            None,
            &app,
            &silo,
            silo.components()[0],
            RefineFlags::REQUIRE_PERMISSIONS,
            None,
            None,
            Scope::Unknown,
        )
        .expect_err("requires newer core");
        assert_eq!(err.kind(), crate::error::ErrorKind::NotSupported);
    }

    #[test]
    fn refine_is_idempotent() {
        let silo = compile(
            r#"<components origin="flathub">
                 <component type="desktop-application">
                   <id>org.ex.A</id><name>A</name><summary>s</summary>
                   <metadata_license>X</metadata_license>
                   <icon type="stock">ex-a</icon>
                   <categories><category>Network</category></categories>
                 </component>
               </components>"#,
        );
        let flags = RefineFlags::REQUIRE_ID
            | RefineFlags::REQUIRE_ICON
            | RefineFlags::REQUIRE_CATEGORIES;
        let app = refine_all(&silo, flags);
        let icons_before = app.icons();
        let categories_before = app.categories();
        refine_app(
            None,
            None,
            &app,
            &silo,
            silo.components()[0],
            flags,
            None,
            Some("/usr/share/swcatalog/xml/test.xml"),
            Scope::System,
        )
        .expect("second refine");
        assert_eq!(app.icons(), icons_before);
        assert_eq!(app.categories(), categories_before);
    }
}
