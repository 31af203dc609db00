//! The compiled, immutable metadata index.
//!
//! XML sources and synthetic desktop-entry components are parsed once and
//! compiled into an owned node arena. After compilation the silo is
//! read-only, so concurrent readers need no locking; the loader swaps a new
//! `Arc<Silo>` in when sources change and old readers finish on the old
//! generation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, mpsc};

use lru::LruCache;

use crate::app::Scope;
use crate::appstream::component::ComponentBuilder;
use crate::appstream::desktop;
use crate::error::Result;
use crate::util::{casefold, tokenize};

/// Capacity of the per-silo query result cache.
const QUERY_CACHE_CAPACITY: usize = 64;

/// Identifier of a node inside one [`Silo`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One element node in the arena.
struct Node {
    element: String,
    text: Option<String>,
    tail: Option<String>,
    attrs: Vec<(String, String)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// Casefolded per-component search material, built at compile time.
pub(crate) struct SearchBlob {
    /// Component id text.
    pub id: String,
    /// Display name, raw casefolded and tokenized.
    pub name: String,
    /// Name tokens.
    pub name_tokens: Vec<String>,
    /// Summary tokens.
    pub summary_tokens: Vec<String>,
    /// Package names, raw casefolded.
    pub pkgnames: Vec<String>,
    /// Keyword entries.
    pub keywords: Vec<String>,
    /// Provided media types.
    pub media_types: Vec<String>,
    /// Launchable values.
    pub launchables: Vec<String>,
    /// Origin of the parent components root.
    pub origin: String,
    /// Developer names (current and legacy elements).
    pub developer_names: Vec<String>,
    /// Project group.
    pub project_group: String,
}

/// Compiled metadata index. See the module documentation.
pub struct Silo {
    nodes: Vec<Node>,
    components: Vec<NodeId>,
    by_id: HashMap<String, Vec<NodeId>>,
    search_blobs: HashMap<NodeId, SearchBlob>,
    locales: Vec<String>,
    query_cache: Mutex<LruCache<String, Vec<NodeId>>>,
}

impl std::fmt::Debug for Silo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Silo")
            .field("components", &self.components.len())
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Silo {
    /// An empty silo with no components.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            components: Vec::new(),
            by_id: HashMap::new(),
            search_blobs: HashMap::new(),
            locales: vec!["C".to_owned()],
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Locale preference list the silo was compiled with.
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    /// Element name of a node.
    pub fn element(&self, id: NodeId) -> &str {
        &self.nodes[id.0].element
    }

    /// Leading text content of a node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].text.as_deref()
    }

    /// Text between this node's end tag and the next sibling.
    pub fn tail(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].tail.as_deref()
    }

    /// Attribute value by name.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute parsed as an unsigned integer.
    pub fn attr_u64(&self, id: NodeId, name: &str) -> Option<u64> {
        self.attr(id, name)?.parse().ok()
    }

    /// Child nodes in document order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    /// Parent node, `None` for source roots.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// First child with the given element name.
    pub fn child_by_element(&self, id: NodeId, element: &str) -> Option<NodeId> {
        self.children(id).find(|&c| self.element(c) == element)
    }

    /// Text of the first child with the given element name.
    pub fn child_text(&self, id: NodeId, element: &str) -> Option<&str> {
        self.child_by_element(id, element).and_then(|c| self.text(c))
    }

    /// Text of the best localized child with the given element name.
    ///
    /// Children carrying an `xml:lang` matching an earlier entry of the
    /// locale preference list win over later matches; an unlocalized child
    /// is the fallback. `None` when no usable variant exists.
    pub fn localized_child_text(&self, id: NodeId, element: &str) -> Option<&str> {
        self.localized_child(id, element).and_then(|n| self.text(n))
    }

    /// Best localized child node with the given element name, ranked like
    /// [`Silo::localized_child_text`].
    pub fn localized_child(&self, id: NodeId, element: &str) -> Option<NodeId> {
        let mut best: Option<(usize, NodeId)> = None;
        for child in self.children(id) {
            if self.element(child) != element {
                continue;
            }
            let rank = match self.attr(child, "xml:lang") {
                None | Some("C") => self.locales.len(),
                Some(lang) => match self.locales.iter().position(|l| l == lang) {
                    Some(pos) => pos,
                    None => continue,
                },
            };
            if best.is_none_or(|(r, _)| rank < r) {
                best = Some((rank, child));
            }
        }
        best.map(|(_, node)| node)
    }

    /// All component nodes in document order.
    pub fn components(&self) -> &[NodeId] {
        &self.components
    }

    /// Release versions of installed (metainfo-rooted) components with the
    /// given id. Used to tell pending updates from already-applied ones.
    pub fn installed_release_versions(&self, id_text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for &component in self.components_by_id(id_text) {
            let from_metainfo = self
                .parent(component)
                .and_then(|p| self.attr(p, "appshelf-root-kind"))
                == Some("metainfo");
            if !from_metainfo {
                continue;
            }
            if let Some(releases) = self.child_by_element(component, "releases") {
                for release in self.children(releases) {
                    if let Some(version) = self.attr(release, "version") {
                        out.push(version.to_owned());
                    }
                }
            }
        }
        out
    }

    /// Component nodes whose `<id>` equals `id_text`.
    pub fn components_by_id(&self, id_text: &str) -> &[NodeId] {
        self.by_id.get(id_text).map_or(&[], Vec::as_slice)
    }

    /// Compiled search material for a component.
    pub(crate) fn search_blob(&self, component: NodeId) -> Option<&SearchBlob> {
        self.search_blobs.get(&component)
    }

    /// Component nodes whose `<extends>` equals `id_text`.
    pub fn components_extending(&self, id_text: &str) -> Vec<NodeId> {
        self.cached_scan(&format!("extends\n{id_text}"), |silo, component| {
            silo.children(component)
                .any(|c| silo.element(c) == "extends" && silo.text(c) == Some(id_text))
        })
    }

    /// Component nodes providing `id_text` as an alternate id.
    pub fn components_providing_id(&self, id_text: &str) -> Vec<NodeId> {
        self.cached_scan(&format!("provides-id\n{id_text}"), |silo, component| {
            silo.child_by_element(component, "provides").is_some_and(|provides| {
                silo.children(provides)
                    .any(|c| silo.element(c) == "id" && silo.text(c) == Some(id_text))
            })
        })
    }

    /// Component nodes carrying every category in `categories`.
    ///
    /// Merge components (`<component merge="...">`) are excluded, matching
    /// the catalog convention that merges only decorate real entries.
    pub fn components_with_categories(&self, categories: &[&str]) -> Vec<NodeId> {
        let key = format!("categories\n{}", categories.join("\n"));
        self.cached_scan(&key, |silo, component| {
            if silo.attr(component, "merge").is_some() {
                return false;
            }
            let Some(cats) = silo.child_by_element(component, "categories") else {
                return false;
            };
            categories.iter().all(|wanted| {
                silo.children(cats)
                    .any(|c| silo.element(c) == "category" && silo.text(c) == Some(*wanted))
            })
        })
    }

    /// Components from bare metainfo roots that carry a description,
    /// i.e. the installed-app convention.
    pub fn components_installed(&self) -> Vec<NodeId> {
        self.cached_scan("installed", |silo, component| {
            silo.parent(component)
                .and_then(|p| silo.attr(p, "appshelf-root-kind"))
                == Some("metainfo")
                && silo.child_by_element(component, "description").is_some()
        })
    }

    /// Components whose newest release is at or after `since` unix seconds,
    /// paired with that release timestamp.
    pub fn components_released_since(&self, since: u64) -> Vec<(NodeId, u64)> {
        let mut out = Vec::new();
        for &component in &self.components {
            if let Some(ts) = self.newest_release_timestamp(component)
                && ts >= since
            {
                out.push((component, ts));
            }
        }
        out
    }

    /// Timestamp of the first `<release>` entry, preferring the `timestamp`
    /// attribute over an ISO-8601 `date`.
    pub fn newest_release_timestamp(&self, component: NodeId) -> Option<u64> {
        let releases = self.child_by_element(component, "releases")?;
        let release = self
            .children(releases)
            .find(|&c| self.element(c) == "release")?;
        if let Some(ts) = self.attr_u64(release, "timestamp") {
            return Some(ts);
        }
        let date = self.attr(release, "date")?;
        crate::util::iso8601_to_unix(date).and_then(|s| u64::try_from(s).ok())
    }

    /// Components with a `<custom><value key="...">` entry, any value.
    pub fn components_with_custom_key(&self, key: &str) -> Vec<NodeId> {
        self.cached_scan(&format!("custom-key\n{key}"), |silo, component| {
            silo.custom_value(component, key).is_some()
        })
    }

    /// Components whose `<custom><value key="...">` equals `value`.
    pub fn components_with_custom_value(&self, key: &str, value: &str) -> Vec<NodeId> {
        self.cached_scan(&format!("custom-value\n{key}\n{value}"), |silo, component| {
            silo.custom_value(component, key) == Some(value)
        })
    }

    /// Components carrying `<kudos><kudo>value</kudo></kudos>`.
    pub fn components_with_kudo(&self, value: &str) -> Vec<NodeId> {
        self.cached_scan(&format!("kudo\n{value}"), |silo, component| {
            silo.child_by_element(component, "kudos").is_some_and(|kudos| {
                silo.children(kudos)
                    .any(|c| silo.element(c) == "kudo" && silo.text(c) == Some(value))
            })
        })
    }

    /// Desktop-application components whose desktop-id launchable equals
    /// `desktop_id`, used for icon inheritance.
    pub fn desktop_components_by_launchable(&self, desktop_id: &str) -> Vec<NodeId> {
        self.cached_scan(&format!("launchable\n{desktop_id}"), |silo, component| {
            silo.attr(component, "type") == Some("desktop-application")
                && silo.children(component).any(|c| {
                    silo.element(c) == "launchable"
                        && silo.attr(c, "type") == Some("desktop-id")
                        && silo.text(c) == Some(desktop_id)
                })
        })
    }

    /// Read a `<custom><value key>` entry.
    pub fn custom_value(&self, component: NodeId, key: &str) -> Option<&str> {
        let custom = self.child_by_element(component, "custom")?;
        self.children(custom)
            .find(|&c| self.element(c) == "value" && self.attr(c, "key") == Some(key))
            .and_then(|c| self.text(c))
    }

    /// Origin attribute of the component's source root.
    pub fn component_origin(&self, component: NodeId) -> Option<&str> {
        let parent = self.parent(component)?;
        self.attr(parent, "origin").filter(|o| !o.is_empty())
    }

    /// `info/filename` annotation of the component's source root.
    pub fn source_filename(&self, component: NodeId) -> Option<&str> {
        let parent = self.parent(component)?;
        let info = self.child_by_element(parent, "info")?;
        self.child_text(info, "filename")
    }

    /// `info/scope` annotation of the component's source root.
    pub fn source_scope(&self, component: NodeId) -> Option<Scope> {
        let parent = self.parent(component)?;
        let info = self.child_by_element(parent, "info")?;
        self.child_text(info, "scope").map(Scope::from_str)
    }

    /// Explicit `info/icon-prefix` annotation of the component's source.
    pub fn source_icon_prefix(&self, component: NodeId) -> Option<&str> {
        let parent = self.parent(component)?;
        let info = self.child_by_element(parent, "info")?;
        self.child_text(info, "icon-prefix")
    }

    /// Linear component scan memoized in the query cache.
    fn cached_scan(&self, key: &str, predicate: impl Fn(&Self, NodeId) -> bool) -> Vec<NodeId> {
        if let Ok(mut cache) = self.query_cache.lock()
            && let Some(hit) = cache.get(key)
        {
            return hit.clone();
        }
        let result: Vec<NodeId> = self
            .components
            .iter()
            .copied()
            .filter(|&c| predicate(self, c))
            .collect();
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(key.to_owned(), result.clone());
        }
        result
    }
}

/// Per-source annotations recorded next to the imported components.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Path of the file the source came from.
    pub filename: Option<String>,
    /// Default scope for apps created from this source.
    pub scope: Option<Scope>,
    /// Explicit icon directory override.
    pub icon_prefix: Option<String>,
}

/// One pending source awaiting compilation.
enum PendingSource {
    /// Raw AppStream XML (catalog or metainfo).
    Xml { data: String, info: SourceInfo },
    /// Synthetic component built by an adapter.
    Component { builder: ComponentBuilder, info: SourceInfo },
}

/// Accumulates sources and locales, then compiles a [`Silo`].
#[derive(Default)]
pub struct SiloBuilder {
    locales: Vec<String>,
    sources: Vec<PendingSource>,
}

impl SiloBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locale to the preference list, most preferred first.
    /// Variants (`de_DE.UTF-8` to `de`) are expanded automatically.
    pub fn add_locale(&mut self, locale: &str) {
        for variant in crate::util::locale_variants(locale) {
            if !self.locales.iter().any(|l| *l == variant) {
                self.locales.push(variant);
            }
        }
    }

    /// Import AppStream XML from bytes.
    pub fn import_xml_bytes(&mut self, data: &[u8], info: SourceInfo) -> Result<()> {
        let text = String::from_utf8_lossy(data).into_owned();
        // parse now so a broken source is rejected early, compile re-parses
        roxmltree::Document::parse(&text)?;
        self.sources.push(PendingSource::Xml { data: text, info });
        Ok(())
    }

    /// Import AppStream XML from a file, annotating `info/filename`.
    pub fn import_xml_file(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        let info = SourceInfo {
            filename: Some(path.to_string_lossy().into_owned()),
            ..SourceInfo::default()
        };
        self.import_xml_bytes(&data, info)
    }

    /// Import a metainfo/appdata document from bytes.
    ///
    /// Identical to [`SiloBuilder::import_xml_bytes`] except the source is
    /// flagged as metainfo so installed-app queries can find it.
    pub fn import_appdata_bytes(&mut self, data: &[u8], info: SourceInfo) -> Result<()> {
        self.import_xml_bytes(data, info)
    }

    /// Import a synthetic component, e.g. from the desktop-entry adapter.
    pub fn import_component(&mut self, builder: ComponentBuilder, info: SourceInfo) {
        self.sources.push(PendingSource::Component { builder, info });
    }

    /// Adapt a single `.desktop` file into a synthetic component.
    pub fn import_desktop_file(&mut self, path: &Path) -> Result<()> {
        let builder = desktop::adapt_desktop_file(path)?;
        let info = SourceInfo {
            filename: Some(path.to_string_lossy().into_owned()),
            ..SourceInfo::default()
        };
        self.import_component(builder, info);
        Ok(())
    }

    /// Load every `*.desktop` under `path` (except `mimeinfo.cache`).
    ///
    /// Returns whether any file was loaded and a watch handle the caller
    /// can poll to invalidate the compiled silo on changes. A missing
    /// directory loads nothing and is not an error.
    pub fn load_desktop_files(&mut self, path: &Path) -> Result<(bool, Option<DesktopWatch>)> {
        if !path.is_dir() {
            tracing::debug!("skipping desktop path '{}': does not exist", path.display());
            return Ok((false, None));
        }
        tracing::debug!("loading desktop path '{}'", path.display());

        let mut any_loaded = false;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name == "mimeinfo.cache" || !name.ends_with(".desktop") {
                continue;
            }
            match self.import_desktop_file(&entry.path()) {
                Ok(()) => any_loaded = true,
                Err(err) => {
                    tracing::debug!("ignoring {}: {err}", entry.path().display());
                }
            }
        }

        let watch = DesktopWatch::new(path)
            .map_err(|err| {
                tracing::debug!("failed to watch '{}': {err}", path.display());
                err
            })
            .ok();
        Ok((any_loaded, watch))
    }

    /// Compile all sources into an immutable silo.
    pub fn compile(self) -> Result<Silo> {
        let mut silo = Silo::empty();
        if !self.locales.is_empty() {
            silo.locales = self.locales;
        }

        let locales = silo.locales.clone();
        for source in self.sources {
            match source {
                PendingSource::Xml { data, info } => {
                    let doc = roxmltree::Document::parse(&data)?;
                    import_document(&mut silo, &doc, &info, &locales)?;
                }
                PendingSource::Component { builder, info } => {
                    let root = new_root(&mut silo, None, "desktop-entry", &info);
                    import_builder(&mut silo, &builder, root, &locales);
                }
            }
        }

        index_components(&mut silo);
        Ok(silo)
    }
}

/// Create a synthetic `<components>` wrapper for one source and return its
/// node id. `root_kind` records what the source was for later queries.
fn new_root(silo: &mut Silo, origin: Option<&str>, root_kind: &str, info: &SourceInfo) -> NodeId {
    let mut attrs = vec![("appshelf-root-kind".to_owned(), root_kind.to_owned())];
    if let Some(origin) = origin {
        attrs.push(("origin".to_owned(), origin.to_owned()));
    }
    let root = push_node(silo, None, "components".to_owned(), None, None, attrs);

    let has_info =
        info.filename.is_some() || info.scope.is_some() || info.icon_prefix.is_some();
    if has_info {
        let info_node = push_node(silo, Some(root), "info".to_owned(), None, None, Vec::new());
        if let Some(filename) = &info.filename {
            push_node(
                silo,
                Some(info_node),
                "filename".to_owned(),
                Some(filename.clone()),
                None,
                Vec::new(),
            );
        }
        if let Some(scope) = info.scope {
            push_node(
                silo,
                Some(info_node),
                "scope".to_owned(),
                Some(scope.as_unique_segment().to_owned()),
                None,
                Vec::new(),
            );
        }
        if let Some(prefix) = &info.icon_prefix {
            push_node(
                silo,
                Some(info_node),
                "icon-prefix".to_owned(),
                Some(prefix.clone()),
                None,
                Vec::new(),
            );
        }
    }
    root
}

/// Append a node to the arena, wiring the parent link.
fn push_node(
    silo: &mut Silo,
    parent: Option<NodeId>,
    element: String,
    text: Option<String>,
    tail: Option<String>,
    attrs: Vec<(String, String)>,
) -> NodeId {
    let id = NodeId(silo.nodes.len());
    silo.nodes.push(Node {
        element,
        text,
        tail,
        attrs,
        children: Vec::new(),
        parent,
    });
    if let Some(parent) = parent {
        silo.nodes[parent.0].children.push(id);
    }
    id
}

/// Whether an `xml:lang` attribute value passes the locale filter;
/// unlocalized content always does.
fn lang_allowed(lang: Option<&str>, locales: &[String]) -> bool {
    match lang {
        None | Some("C") => true,
        Some(lang) => locales.iter().any(|l| l == lang),
    }
}

/// Import one parsed XML document under a fresh source root.
fn import_document(
    silo: &mut Silo,
    doc: &roxmltree::Document<'_>,
    info: &SourceInfo,
    locales: &[String],
) -> Result<()> {
    let root_el = doc.root_element();
    let tag = root_el.tag_name().name();
    match tag {
        "components" => {
            let origin = root_el.attribute("origin");
            let root = new_root(silo, origin, "catalog", info);
            for child in root_el.children().filter(roxmltree::Node::is_element) {
                import_element(silo, child, root, locales);
            }
        }
        "component" | "application" => {
            let root = new_root(silo, None, "metainfo", info);
            import_element(silo, root_el, root, locales);
        }
        other => {
            return Err(crate::error::Error::not_supported(format!(
                "unexpected appstream root element <{other}>"
            )));
        }
    }
    Ok(())
}

/// Recursively import a roxmltree element, splitting interleaved text into
/// leading text and per-child tails. Elements localized for locales outside
/// the preference list are dropped, like the original builder's locale
/// filter.
fn import_element(
    silo: &mut Silo,
    el: roxmltree::Node<'_, '_>,
    parent: NodeId,
    locales: &[String],
) -> Option<NodeId> {
    let attrs: Vec<(String, String)> = el
        .attributes()
        .map(|a| {
            let name = if a.namespace().is_some_and(|ns| ns.ends_with("XML/1998/namespace")) {
                format!("xml:{}", a.name())
            } else {
                a.name().to_owned()
            };
            (name, a.value().to_owned())
        })
        .collect();

    let lang = attrs
        .iter()
        .find(|(n, _)| n == "xml:lang")
        .map(|(_, v)| v.as_str());
    if !lang_allowed(lang, locales) {
        return None;
    }

    let node = push_node(silo, Some(parent), el.tag_name().name().to_owned(), None, None, attrs);

    let mut leading = String::new();
    let mut last_child: Option<NodeId> = None;
    for child in el.children() {
        if child.is_element() {
            if let Some(imported) = import_element(silo, child, node, locales) {
                last_child = Some(imported);
            }
        } else if child.is_text() {
            let text = child.text().unwrap_or_default();
            match last_child {
                None => leading.push_str(text),
                Some(prev) => {
                    let tail = silo.nodes[prev.0].tail.get_or_insert_with(String::new);
                    tail.push_str(text);
                }
            }
        }
    }
    let leading = leading.trim();
    if !leading.is_empty() {
        silo.nodes[node.0].text = Some(leading.to_owned());
    }
    // normalize whitespace-only tails away
    for child in silo.nodes[node.0].children.clone() {
        if silo.nodes[child.0]
            .tail
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            silo.nodes[child.0].tail = None;
        }
    }
    Some(node)
}

/// Import a synthetic component tree.
fn import_builder(
    silo: &mut Silo,
    builder: &ComponentBuilder,
    parent: NodeId,
    locales: &[String],
) -> Option<NodeId> {
    if !lang_allowed(builder.attr("xml:lang"), locales) {
        return None;
    }
    let node = push_node(
        silo,
        Some(parent),
        builder.element().to_owned(),
        builder.text().map(str::to_owned),
        None,
        builder.attrs().to_vec(),
    );
    for child in builder.children() {
        import_builder(silo, child, node, locales);
    }
    Some(node)
}

/// Build the component list, id index and search blobs after import.
fn index_components(silo: &mut Silo) {
    let mut components = Vec::new();
    for root in 0..silo.nodes.len() {
        if silo.nodes[root].parent.is_none() {
            for child in silo.nodes[root].children.clone() {
                if silo.nodes[child.0].element == "component"
                    || silo.nodes[child.0].element == "application"
                {
                    components.push(child);
                }
            }
        }
    }
    silo.components = components.clone();

    for component in components {
        if let Some(id_text) = silo.child_text(component, "id").map(str::to_owned) {
            silo.by_id.entry(id_text).or_default().push(component);
        }
        let blob = build_search_blob(silo, component);
        silo.search_blobs.insert(component, blob);
    }
}

/// Collect the casefolded search material of one component.
fn build_search_blob(silo: &Silo, component: NodeId) -> SearchBlob {
    let texts = |parent_el: &str, child_el: &str| -> Vec<String> {
        silo.child_by_element(component, parent_el)
            .map(|parent| {
                silo.children(parent)
                    .filter(|&c| silo.element(c) == child_el)
                    .filter_map(|c| silo.text(c))
                    .map(casefold)
                    .collect()
            })
            .unwrap_or_default()
    };

    let name = silo
        .localized_child_text(component, "name")
        .map(casefold)
        .unwrap_or_default();
    let summary = silo
        .localized_child_text(component, "summary")
        .map(casefold)
        .unwrap_or_default();

    SearchBlob {
        id: silo.child_text(component, "id").map(casefold).unwrap_or_default(),
        name_tokens: tokenize(&name),
        name,
        summary_tokens: tokenize(&summary),
        pkgnames: silo
            .children(component)
            .filter(|&c| silo.element(c) == "pkgname")
            .filter_map(|c| silo.text(c))
            .map(casefold)
            .collect(),
        keywords: texts("keywords", "keyword"),
        media_types: silo
            .child_by_element(component, "provides")
            .map(|provides| {
                silo.children(provides)
                    .filter(|&c| {
                        silo.element(c) == "mediatype" || silo.element(c) == "mimetype"
                    })
                    .filter_map(|c| silo.text(c))
                    .map(casefold)
                    .collect()
            })
            .unwrap_or_default(),
        launchables: silo
            .children(component)
            .filter(|&c| silo.element(c) == "launchable")
            .filter_map(|c| silo.text(c))
            .map(casefold)
            .collect(),
        origin: silo.component_origin(component).map(casefold).unwrap_or_default(),
        developer_names: silo
            .children(component)
            .filter_map(|c| match silo.element(c) {
                "developer" => silo.child_text(c, "name"),
                "developer_name" => silo.text(c),
                _ => None,
            })
            .map(casefold)
            .collect(),
        project_group: silo
            .child_text(component, "project_group")
            .map(casefold)
            .unwrap_or_default(),
    }
}

/// Shared slot holding the current silo generation.
///
/// Readers clone the `Arc` and keep using their generation; a recompile
/// swaps the pointer and old readers drain naturally.
#[derive(Debug)]
pub struct SiloSlot {
    current: RwLock<Arc<Silo>>,
}

impl SiloSlot {
    /// Create a slot holding an empty silo.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Silo::empty())),
        }
    }

    /// Current silo generation.
    pub fn current(&self) -> Arc<Silo> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new generation, returning the previous one.
    pub fn swap(&self, silo: Arc<Silo>) -> Arc<Silo> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::replace(&mut guard, silo)
    }
}

impl Default for SiloSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory watch handle for desktop-entry sources.
///
/// Poll [`DesktopWatch::changed`] to learn whether the directory mutated
/// since the silo was compiled.
pub struct DesktopWatch {
    _watcher: notify::RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl std::fmt::Debug for DesktopWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopWatch").finish_non_exhaustive()
    }
}

impl DesktopWatch {
    /// Watch `path` non-recursively for any change.
    fn new(path: &Path) -> Result<Self> {
        use notify::Watcher as _;
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })
        .map_err(|e| crate::error::Error::failed(format!("file watch: {e}")))?;
        watcher
            .watch(path, notify::RecursiveMode::NonRecursive)
            .map_err(|e| crate::error::Error::failed(format!("file watch: {e}")))?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Whether any change arrived since the last call.
    pub fn changed(&self) -> bool {
        let mut any = false;
        while self.rx.try_recv().is_ok() {
            any = true;
        }
        any
    }
}
