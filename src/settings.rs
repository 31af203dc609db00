//! User settings consumed by the catalog core.
//!
//! Settings live in `settings.conf` under the XDG config directory, a plain
//! `key = value` file with `#` or `//` comments. Keys are normalized on
//! load, so `packaging-format-preference` and `packaging_format_preference`
//! both work. Missing file means defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// One entry of the packaging format preference list.
///
/// Parsed from `format[:origin]` or `:origin`, e.g. `flatpak:flathub`,
/// `package` or `:fedora`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatPreference {
    /// Bundle format name, empty when only the origin matters.
    pub format: String,
    /// Origin name, empty when only the format matters.
    pub origin: String,
}

impl FormatPreference {
    /// Parse a single preference entry; `None` for empty input.
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let (format, origin) = match raw.split_once(':') {
            Some((f, o)) => (f.trim(), o.trim()),
            None => (raw, ""),
        };
        if format.is_empty() && origin.is_empty() {
            return None;
        }
        Some(Self {
            format: format.to_lowercase(),
            origin: origin.to_lowercase(),
        })
    }
}

/// Loaded settings snapshot.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Whether update operations are permitted at all.
    pub allow_updates: bool,
    /// Ordered packaging format preference used by dedupe priority ties.
    pub packaging_format_preference: Vec<FormatPreference>,
    /// Desktop projects whose apps are considered compatible.
    pub compatible_projects: Vec<String>,
    /// Hide apps with non-free licenses from list results.
    pub show_only_free_apps: bool,
    /// Automatically download available updates.
    pub download_updates: bool,
    /// Notify when automatic update downloads complete.
    pub download_updates_notify: bool,
    /// Review server URL handed to the external review client.
    pub review_server: String,
    /// Extra AppStream files fetched by the external collaborator.
    pub external_appstream_urls: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_updates: true,
            packaging_format_preference: Vec::new(),
            compatible_projects: vec!["GNOME".into(), "KDE".into(), "XFCE".into()],
            show_only_free_apps: false,
            download_updates: true,
            download_updates_notify: false,
            review_server: String::new(),
            external_appstream_urls: Vec::new(),
        }
    }
}

/// Strip a trailing `#` or `//` comment from a value.
fn strip_inline_comment(val: &str) -> &str {
    let cut = val
        .find(" #")
        .or_else(|| val.find("\t#"))
        .or_else(|| val.find(" //"))
        .unwrap_or(val.len());
    val[..cut].trim()
}

/// Parse a boolean setting value, accepting the usual spellings.
fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Split a comma list, trimming and dropping empty entries.
fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Resolve the settings file path under HOME/XDG.
fn settings_path() -> Option<PathBuf> {
    env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var("HOME").ok().map(|h| Path::new(&h).join(".config")))
        .map(|base| base.join("appshelf").join("settings.conf"))
}

impl Settings {
    /// Load settings from the default path, falling back to defaults.
    pub fn load() -> Self {
        match settings_path() {
            Some(p) => Self::load_from(&p),
            None => Self::with_env_overrides(Self::default()),
        }
    }

    /// Load settings from an explicit file path; missing or unreadable
    /// files yield defaults. Environment overrides are applied last.
    pub fn load_from(path: &Path) -> Self {
        let mut out = Self::default();
        if let Ok(content) = fs::read_to_string(path) {
            for line in content.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
                    continue;
                }
                let Some((raw_key, raw_val)) = trimmed.split_once('=') else {
                    continue;
                };
                let key = raw_key.trim().to_lowercase().replace(['.', '-', ' '], "_");
                let val = strip_inline_comment(raw_val.trim());
                match key.as_str() {
                    "allow_updates" => {
                        if let Some(v) = parse_bool(val) {
                            out.allow_updates = v;
                        }
                    }
                    "packaging_format_preference" => {
                        out.packaging_format_preference =
                            val.split(',').filter_map(FormatPreference::parse).collect();
                    }
                    "compatible_projects" => {
                        out.compatible_projects = parse_list(val);
                    }
                    "show_only_free_apps" => {
                        if let Some(v) = parse_bool(val) {
                            out.show_only_free_apps = v;
                        }
                    }
                    "download_updates" => {
                        if let Some(v) = parse_bool(val) {
                            out.download_updates = v;
                        }
                    }
                    "download_updates_notify" => {
                        if let Some(v) = parse_bool(val) {
                            out.download_updates_notify = v;
                        }
                    }
                    "review_server" => {
                        out.review_server = val.to_owned();
                    }
                    "external_appstream_urls" => {
                        out.external_appstream_urls = parse_list(val);
                    }
                    _ => {
                        tracing::debug!("ignoring unknown settings key '{key}'");
                    }
                }
            }
        }
        Self::with_env_overrides(out)
    }

    /// Apply environment variable overrides on top of loaded values.
    fn with_env_overrides(mut out: Self) -> Self {
        if let Ok(projects) = env::var("APPSHELF_COMPATIBLE_PROJECTS")
            && !projects.is_empty()
        {
            out.compatible_projects = parse_list(&projects);
        }
        out
    }
}
