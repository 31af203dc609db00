//! Adapter turning `.desktop` entries into synthetic components.
//!
//! Pre-AppStream applications only ship a desktop file; this module lifts
//! the `[Desktop Entry]` group into a `<component type="desktop-application">`
//! tree so the rest of the engine can treat both worlds the same.

use std::collections::BTreeMap;
use std::path::Path;

use crate::appstream::component::ComponentBuilder;
use crate::error::{Error, Result};

/// Parsed `[Desktop Entry]` group: plain keys plus localized variants
/// (`Name[de]`).
#[derive(Debug, Default)]
struct DesktopEntry {
    values: BTreeMap<String, String>,
    localized: BTreeMap<String, Vec<(String, String)>>,
}

impl DesktopEntry {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn localized(&self, key: &str) -> &[(String, String)] {
        self.localized.get(key).map_or(&[], Vec::as_slice)
    }

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parse the `[Desktop Entry]` group of an INI-style desktop file.
fn parse_desktop_entry(data: &str) -> DesktopEntry {
    let mut entry = DesktopEntry::default();
    let mut in_entry_group = false;
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(group) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_entry_group = group == "Desktop Entry";
            continue;
        }
        if !in_entry_group {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if let Some((base, lang)) = key
            .split_once('[')
            .and_then(|(b, l)| l.strip_suffix(']').map(|l| (b, l)))
        {
            entry
                .localized
                .entry(base.to_owned())
                .or_default()
                .push((lang.to_owned(), value.to_owned()));
        } else {
            entry.values.insert(key.to_owned(), value.to_owned());
        }
    }
    entry
}

/// Append a text child plus its localized variants.
fn push_localized(component: &mut ComponentBuilder, element: &str, entry: &DesktopEntry, key: &str) {
    if let Some(value) = entry.get(key) {
        component.insert_text(element, value);
    }
    for (lang, value) in entry.localized(key) {
        component
            .insert(element)
            .set_attr("xml:lang", lang.clone())
            .set_text(value.clone());
    }
}

/// Adapt one desktop file into a synthetic component tree.
///
/// `Hidden` entries and non-application types yield `not-supported`; the
/// directory scanner logs and skips those.
pub fn adapt_desktop_file(path: &Path) -> Result<ComponentBuilder> {
    let data = std::fs::read_to_string(path)?;
    adapt_desktop_bytes(&data, &desktop_id_for_path(path))
}

/// Desktop id for a path: the file name itself.
fn desktop_id_for_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Adapt desktop-entry bytes into a synthetic component tree.
pub fn adapt_desktop_bytes(data: &str, desktop_id: &str) -> Result<ComponentBuilder> {
    let entry = parse_desktop_entry(data);

    if entry.get_bool("Hidden") {
        return Err(Error::not_supported("desktop entry is hidden"));
    }
    if entry.get("Type").is_some_and(|t| t != "Application") {
        return Err(Error::not_supported("not an application desktop entry"));
    }
    if entry.get("Name").is_none() {
        return Err(Error::not_supported("desktop entry has no Name"));
    }

    let mut component = ComponentBuilder::new("component");
    component.set_attr("type", "desktop-application");
    component.insert_text("id", desktop_id);
    component
        .insert("launchable")
        .set_attr("type", "desktop-id")
        .set_text(desktop_id);

    push_localized(&mut component, "name", &entry, "Name");
    push_localized(&mut component, "summary", &entry, "Comment");

    if let Some(icon) = entry.get("Icon") {
        let kind = if icon.starts_with('/') { "local" } else { "stock" };
        component.insert("icon").set_attr("type", kind).set_text(icon);
    }

    for category in entry.get_list("Categories") {
        component.add_category(&category);
    }
    for keyword in entry.get_list("Keywords") {
        component.add_keyword(&keyword);
    }
    for media_type in entry.get_list("MimeType") {
        if component.child_mut("provides", None).is_none() {
            component.insert("provides");
        }
        if let Some(provides) = component.child_mut("provides", None) {
            provides.insert_text("mediatype", media_type);
        }
    }

    // NoDisplay entries stay in the catalog but are hidden everywhere,
    // the same convention the legacy Blacklisted category encodes
    if entry.get_bool("NoDisplay") {
        component.add_category("Blacklisted");
    }

    component.add_extra_info();
    Ok(component)
}
