//! Fixed catalog queries: categories, installed, curated, recent,
//! alternates and url resolution.
//!
//! Each helper is a silo scan plus a loop building apps through
//! `create_app`; a query with no hits is an empty list, never an error.

use std::sync::Arc;

use crate::app::{App, AppList, AppState, Category, Quirks, Scope};
use crate::appstream::refine::create_app;
use crate::appstream::silo::{NodeId, Silo};
use crate::error::Result;
use crate::plugin::PluginCache;
use crate::util::{now_unix, url_path, url_scheme};

/// Custom key marking featured tiles.
pub const CUSTOM_KEY_FEATURE_TILE: &str = "appshelf::FeatureTile";
/// Legacy spelling of the featured tile key.
pub const CUSTOM_KEY_FEATURE_TILE_CSS: &str = "appshelf::FeatureTile-css";
/// Custom key marking per-deployment featured apps.
pub const CUSTOM_KEY_DEPLOYMENT_FEATURED: &str = "appshelf::DeploymentFeatured";

/// A release this far in the future is treated as a metadata mistake.
const MAX_FUTURE_RELEASE_SECS: u64 = 3 * 24 * 60 * 60;

/// Source file and default scope for apps created from this silo.
fn source_context(silo: &Silo, component: NodeId) -> (Option<&str>, Scope) {
    (
        silo.source_filename(component),
        silo.source_scope(component).unwrap_or(Scope::Unknown),
    )
}

/// Apps belonging to a category's desktop groups.
///
/// A group `Main::Sub` requires both categories on the component, a plain
/// group just the one.
pub fn add_category_apps(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    category: &Category,
    list: &mut AppList,
) -> Result<()> {
    if category.desktop_groups.is_empty() {
        tracing::warn!("no desktop groups for category {}", category.id);
        return Ok(());
    }
    for group in &category.desktop_groups {
        let parts: Vec<&str> = group.split("::").collect();
        if parts.len() > 2 {
            continue;
        }
        for component in silo.components_with_categories(&parts) {
            let (source_file, scope) = source_context(silo, component);
            let app = create_app(cache, creator, silo, component, source_file, scope)?;
            list.add(app);
        }
    }
    Ok(())
}

/// Fill in how many apps each category (and populous child group) holds.
pub fn refine_category_sizes(silo: &Silo, categories: &[Arc<Category>]) {
    for parent in categories {
        for child in &parent.children {
            for group in &child.desktop_groups {
                let parts: Vec<&str> = group.split("::").collect();
                if parts.len() > 2 {
                    continue;
                }
                let count = silo.components_with_categories(&parts).len();
                if count > 0 {
                    parent.increment_size(count);
                    if parent.children.len() > 1 {
                        child.increment_size(count);
                    }
                }
            }
        }
    }
}

/// Apps backed by installed metainfo entries. States are forced to
/// installed unless a cached instance already knows it is updatable.
pub fn add_installed(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    list: &mut AppList,
) -> Result<()> {
    for component in silo.components_installed() {
        let app = create_app(cache, creator, silo, component, None, Scope::Unknown)?;
        if !app.state().is_updatable() {
            if app.state() == AppState::Unknown {
                app.set_state(AppState::Installed);
            } else if app.state() != AppState::Installed {
                app.set_state(AppState::Unknown);
                app.set_state(AppState::Installed);
            }
        }
        app.set_scope(Scope::System);
        list.add(app);
    }
    Ok(())
}

/// Wildcard placeholders for distro-curated popular apps.
pub fn add_popular(silo: &Silo, list: &mut AppList) -> Result<()> {
    for component in silo.components_with_kudo(crate::appstream::refine::KUDO_POPULAR) {
        add_wildcard_id(silo, component, list, false);
    }
    Ok(())
}

/// Wildcard placeholders for featured tiles, carrying the tile metadata.
pub fn add_featured(silo: &Silo, list: &mut AppList) -> Result<()> {
    let mut components = silo.components_with_custom_key(CUSTOM_KEY_FEATURE_TILE);
    for extra in silo.components_with_custom_key(CUSTOM_KEY_FEATURE_TILE_CSS) {
        if !components.contains(&extra) {
            components.push(extra);
        }
    }
    for component in components {
        add_wildcard_id(silo, component, list, true);
    }
    Ok(())
}

/// Featured apps scoped to the given deployments.
pub fn add_deployment_featured(
    silo: &Silo,
    deployments: &[String],
    list: &mut AppList,
) -> Result<()> {
    for deployment in deployments {
        if deployment.is_empty() {
            continue;
        }
        for component in
            silo.components_with_custom_value(CUSTOM_KEY_DEPLOYMENT_FEATURED, deployment)
        {
            add_wildcard_id(silo, component, list, true);
        }
    }
    Ok(())
}

/// Apps released within the last `age` seconds, with their release date
/// set. Releases more than a few days in the future are ignored.
pub fn add_recent(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    age_secs: u64,
    list: &mut AppList,
) -> Result<()> {
    let now = now_unix();
    let since = now.saturating_sub(age_secs);
    let max_future = now + MAX_FUTURE_RELEASE_SECS;
    for (component, timestamp) in silo.components_released_since(since) {
        if timestamp >= max_future {
            continue;
        }
        let (source_file, scope) = source_context(silo, component);
        let app = create_app(cache, creator, silo, component, source_file, scope)?;
        app.set_release_date(timestamp);
        list.add(app);
    }
    Ok(())
}

/// Wildcard alternates for an app: same id, provides-id in either
/// direction, or the same package name.
pub fn add_alternates(silo: &Silo, app: &App, list: &mut AppList) -> Result<()> {
    let Some(id) = app.id() else {
        // probably a package we know nothing about
        return Ok(());
    };

    let mut ids: Vec<(String, Option<String>)> = Vec::new();
    let mut push = |silo: &Silo, component: NodeId, id_text: &str| {
        let origin = silo.component_origin(component).map(str::to_owned);
        let entry = (id_text.to_owned(), origin);
        if !ids.contains(&entry) {
            ids.push(entry);
        }
    };

    for &component in silo.components_by_id(&id) {
        push(silo, component, &id);
        // new ID -> old ID
        if let Some(provides) = silo.child_by_element(component, "provides") {
            for child in silo.children(provides) {
                if silo.element(child) == "id"
                    && let Some(old_id) = silo.text(child)
                {
                    push(silo, component, old_id);
                }
            }
        }
    }
    // old ID -> new ID
    for component in silo.components_providing_id(&id) {
        if let Some(new_id) = silo.child_text(component, "id") {
            push(silo, component, new_id);
        }
    }
    // apps sharing a package name
    for source in app.sources() {
        for &component in silo.components() {
            let has_pkgname = silo
                .children(component)
                .any(|c| silo.element(c) == "pkgname" && silo.text(c) == Some(source.as_str()));
            if has_pkgname && let Some(other_id) = silo.child_text(component, "id") {
                push(silo, component, other_id);
            }
        }
    }

    for (id_text, origin) in ids {
        let alternate = App::new(Some(&id_text));
        alternate.add_quirk(Quirks::IS_WILDCARD);
        if let Some(origin) = origin.filter(|o| !o.is_empty()) {
            alternate.set_origin_appstream(&origin);
        }
        list.add(alternate);
    }
    Ok(())
}

/// Resolve an `appstream:` URL to catalog apps. Other schemes yield an
/// empty list so sibling plugins can have a go.
pub fn url_to_app(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    url: &str,
    list: &mut AppList,
) -> Result<()> {
    if url_scheme(url).as_deref() != Some("appstream") {
        return Ok(());
    }
    let Some(path) = url_path(url).filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    for &component in silo.components_by_id(&path) {
        let app = create_app(cache, creator, silo, component, None, Scope::Unknown)?;
        app.set_scope(Scope::System);
        list.add(app);
    }
    Ok(())
}

/// Append one wildcard placeholder for a component's id, optionally
/// copying its custom metadata onto the placeholder.
fn add_wildcard_id(silo: &Silo, component: NodeId, list: &mut AppList, copy_metadata: bool) {
    let Some(id) = silo.child_text(component, "id") else {
        return;
    };
    let app: Arc<App> = App::new(Some(id));
    app.add_quirk(Quirks::IS_WILDCARD);
    if copy_metadata
        && let Some(custom) = silo.child_by_element(component, "custom")
    {
        for value in silo.children(custom) {
            if silo.element(value) == "value"
                && let Some(key) = silo.attr(value, "key")
            {
                app.set_metadata(key, silo.text(value).unwrap_or_default());
            }
        }
    }
    list.add(app);
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

    const CATALOG: &str = r#"<components origin="repo">
        <component type="desktop-application">
          <id>org.ex.Paint</id><name>Paint</name><metadata_license>X</metadata_license>
          <categories><category>Graphics</category><category>2DGraphics</category></categories>
          <pkgname>paint</pkgname>
        </component>
        <component type="desktop-application">
          <id>org.ex.Mail</id><name>Mail</name><metadata_license>X</metadata_license>
          <categories><category>Network</category></categories>
          <kudos><kudo>appshelf::popular</kudo></kudos>
        </component>
        <component type="desktop-application">
          <id>org.ex.Movie</id><name>Movie</name><metadata_license>X</metadata_license>
          <custom><value key="appshelf::FeatureTile">css</value></custom>
        </component>
      </components>"#;

    #[test]
    fn category_groups_intersect() {
        let silo = compile(CATALOG);
        let category = Category::new("create", vec!["Graphics::2DGraphics".to_owned()]);
        let mut list = AppList::new();
        add_category_apps(None, None, &silo, &category, &mut list).expect("queries");
        assert_eq!(list.len(), 1);
        assert_eq!(list.index(0).and_then(|a| a.id()).as_deref(), Some("org.ex.Paint"));
    }

    #[test]
    fn category_sizes_roll_up_to_parents() {
        let silo = compile(CATALOG);
        let mut parent = Category::new("all", Vec::new());
        parent.children.push(Category::new(
            "graphics",
            vec!["Graphics".to_owned()],
        ));
        parent.children.push(Category::new(
            "network",
            vec!["Network".to_owned()],
        ));
        let categories = vec![Arc::new(parent)];
        refine_category_sizes(&silo, &categories);
        assert_eq!(categories[0].size(), 2);
        assert_eq!(categories[0].children[0].size(), 1);
        assert_eq!(categories[0].children[1].size(), 1);
    }

    #[test]
    fn popular_and_featured_become_wildcards() {
        let silo = compile(CATALOG);
        let mut popular = AppList::new();
        add_popular(&silo, &mut popular).expect("queries");
        assert_eq!(popular.len(), 1);
        assert!(popular.index(0).expect("app").has_quirk(Quirks::IS_WILDCARD));

        let mut featured = AppList::new();
        add_featured(&silo, &mut featured).expect("queries");
        assert_eq!(featured.len(), 1);
        let tile = featured.index(0).expect("app");
        assert_eq!(tile.id().as_deref(), Some("org.ex.Movie"));
        assert_eq!(
            tile.metadata_item(CUSTOM_KEY_FEATURE_TILE).as_deref(),
            Some("css")
        );
    }

    #[test]
    fn installed_components_get_installed_state() {
        let mut builder = SiloBuilder::new();
        builder
            .import_appdata_bytes(
                br#"<component type="desktop-application">
                     <id>org.ex.OnDisk</id><name>OnDisk</name><metadata_license>X</metadata_license>
                     <description><p>installed app</p></description>
                   </component>"#,
                SourceInfo::default(),
            )
            .expect("metainfo");
        let silo = builder.compile().expect("compiles");
        let mut list = AppList::new();
        add_installed(None, None, &silo, &mut list).expect("queries");
        assert_eq!(list.len(), 1);
        let app = list.index(0).expect("app");
        assert_eq!(app.state(), AppState::Installed);
        assert_eq!(app.scope(), Scope::System);
    }

    #[test]
    fn recent_uses_release_timestamps() {
        let now = now_unix();
        let fresh = now.saturating_sub(1000);
        let xml = format!(
            r#"<components origin="repo">
                 <component type="desktop-application">
                   <id>org.ex.New</id><name>New</name><metadata_license>X</metadata_license>
                   <releases><release version="1" timestamp="{fresh}"/></releases>
                 </component>
                 <component type="desktop-application">
                   <id>org.ex.Old</id><name>Old</name><metadata_license>X</metadata_license>
                   <releases><release version="1" timestamp="1000"/></releases>
                 </component>
               </components>"#
        );
        let silo = compile(&xml);
        let mut list = AppList::new();
        add_recent(None, None, &silo, 10_000, &mut list).expect("queries");
        assert_eq!(list.len(), 1);
        let app = list.index(0).expect("app");
        assert_eq!(app.id().as_deref(), Some("org.ex.New"));
        assert_eq!(app.release_date(), Some(fresh));
    }

    #[test]
    fn alternates_cover_pkgname_and_provides() {
        let silo = compile(
            r#"<components origin="repo">
                 <component type="desktop-application">
                   <id>org.ex.NewName</id><name>N</name><metadata_license>X</metadata_license>
                   <provides><id>org.ex.OldName</id></provides>
                 </component>
                 <component type="desktop-application">
                   <id>org.ex.SamePkg</id><name>S</name><metadata_license>X</metadata_license>
                   <pkgname>shared-pkg</pkgname>
                 </component>
               </components>"#,
        );
        let app = App::new(Some("org.ex.NewName"));
        app.add_source("shared-pkg");
        let mut list = AppList::new();
        add_alternates(&silo, &app, &mut list).expect("queries");
        let ids: Vec<_> = list.iter().filter_map(|a| a.id()).collect();
        assert!(ids.contains(&"org.ex.NewName".to_owned()));
        assert!(ids.contains(&"org.ex.OldName".to_owned()));
        assert!(ids.contains(&"org.ex.SamePkg".to_owned()));
        assert!(list.iter().all(|a| a.has_quirk(Quirks::IS_WILDCARD)));
    }

    #[test]
    fn url_to_app_handles_appstream_scheme_only() {
        let silo = compile(CATALOG);
        let mut list = AppList::new();
        url_to_app(None, None, &silo, "appstream://org.ex.Paint", &mut list).expect("queries");
        assert_eq!(list.len(), 1);
        assert_eq!(list.index(0).and_then(|a| a.id()).as_deref(), Some("org.ex.Paint"));

        let mut other = AppList::new();
        url_to_app(None, None, &silo, "https://org.ex.Paint", &mut other).expect("queries");
        assert!(other.is_empty());
    }
}
