//! Weighted full-text search over the compiled silo.
//!
//! Every component is scored against a fixed ordered set of weighted
//! columns. A component matches only when *every* user token hits at least
//! one column (AND across tokens, OR across columns); the reported match
//! value is the bitwise OR of the hit weights.

use tokio_util::sync::CancellationToken;

use crate::app::{AppList, Quirks, Scope};
use crate::appstream::refine::create_app;
use crate::appstream::silo::{NodeId, SearchBlob, Silo};
use crate::error::{Error, Result};
use crate::plugin::PluginCache;

/// Provided media type matched a token.
pub const MATCH_MEDIATYPE: u16 = 1 << 1;
/// Catalog origin matched a token.
pub const MATCH_ORIGIN: u16 = 1 << 2;
/// Package name matched a token (half weight for substring hits).
pub const MATCH_PKGNAME: u16 = 1 << 3;
/// Summary matched a token.
pub const MATCH_SUMMARY: u16 = 1 << 4;
/// Keyword matched a token.
pub const MATCH_KEYWORD: u16 = 1 << 5;
/// Display name matched a token (half weight for substring hits).
pub const MATCH_NAME: u16 = 1 << 6;
/// Component id or launchable matched a token.
///
/// Stripped from the value reported on apps so opaque identifiers do not
/// dominate the ranking.
pub const MATCH_ID: u16 = 1 << 7;

/// Match value of one component for one token; 0 when the token misses
/// every column.
fn match_token(blob: &SearchBlob, token: &str) -> u16 {
    let mut value = 0u16;
    if blob.media_types.iter().any(|t| t == token) {
        value |= MATCH_MEDIATYPE;
    }
    if blob.pkgnames.iter().any(|p| p == token) {
        value |= MATCH_PKGNAME;
    }
    if blob.pkgnames.iter().any(|p| p.contains(token)) {
        value |= MATCH_PKGNAME / 2;
    }
    if blob.summary_tokens.iter().any(|t| t == token) {
        value |= MATCH_SUMMARY;
    }
    if blob.name_tokens.iter().any(|t| t == token) {
        value |= MATCH_NAME;
    }
    if blob.name.contains(token) {
        value |= MATCH_NAME / 2;
    }
    if blob.keywords.iter().any(|k| k == token) {
        value |= MATCH_KEYWORD;
    }
    if blob.id == *token {
        value |= MATCH_ID;
    }
    if blob.launchables.iter().any(|l| l == token) {
        value |= MATCH_ID;
    }
    if blob.origin == *token {
        value |= MATCH_ORIGIN;
    }
    value
}

/// All-token match value of one component, 0 when any token misses.
fn match_component(blob: &SearchBlob, tokens: &[String]) -> u16 {
    let mut sum = 0u16;
    for token in tokens {
        let value = match_token(blob, token);
        if value == 0 {
            return 0;
        }
        sum |= value;
    }
    sum
}

/// Search the silo, appending hits to `list` ranked by match value.
///
/// Addon hits also synthesize their extended parent as a wildcard to be
/// materialized by a later refine pass. Wildcard components themselves are
/// skipped.
pub fn search(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    tokens: &[String],
    list: &mut AppList,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    if tokens.is_empty() {
        return Ok(());
    }
    let started = std::time::Instant::now();

    for &component in silo.components() {
        if let Some(cancel) = cancel
            && cancel.is_cancelled()
        {
            return Err(Error::cancelled());
        }
        let Some(blob) = silo.search_blob(component) else {
            continue;
        };
        let match_value = match_component(blob, tokens);
        if match_value == 0 {
            continue;
        }

        let app = create_app(
            cache,
            creator,
            silo,
            component,
            silo.source_filename(component),
            silo.source_scope(component).unwrap_or(Scope::Unknown),
        )?;
        if app.has_quirk(Quirks::IS_WILDCARD) {
            tracing::debug!("not returning wildcard {:?}", app.unique_id());
            continue;
        }
        // drop the ID weight so opaque identifiers do not bias the order
        app.set_match_value(match_value & !MATCH_ID);
        list.add(app);

        if silo.attr(component, "type") == Some("addon") {
            add_wildcard_parents(silo, component, list);
        }
    }

    tracing::debug!("search took {:.1?}", started.elapsed());
    Ok(())
}

/// Search over developer columns instead of the user-facing ones.
pub fn search_developer_apps(
    cache: Option<&PluginCache>,
    creator: Option<&str>,
    silo: &Silo,
    tokens: &[String],
    list: &mut AppList,
    cancel: Option<&CancellationToken>,
) -> Result<()> {
    if tokens.is_empty() {
        return Ok(());
    }
    for &component in silo.components() {
        if let Some(cancel) = cancel
            && cancel.is_cancelled()
        {
            return Err(Error::cancelled());
        }
        let Some(blob) = silo.search_blob(component) else {
            continue;
        };
        let mut sum = 0u16;
        let mut all = true;
        for token in tokens {
            let mut value = 0u16;
            if blob.developer_names.iter().any(|d| d.contains(token)) {
                value |= MATCH_PKGNAME;
            }
            if blob.project_group == *token {
                value |= MATCH_SUMMARY;
            }
            if value == 0 {
                all = false;
                break;
            }
            sum |= value;
        }
        if !all || sum == 0 {
            continue;
        }
        let app = create_app(
            cache,
            creator,
            silo,
            component,
            silo.source_filename(component),
            silo.source_scope(component).unwrap_or(Scope::Unknown),
        )?;
        if app.has_quirk(Quirks::IS_WILDCARD) {
            continue;
        }
        app.set_match_value(sum & !MATCH_ID);
        list.add(app);
    }
    Ok(())
}

/// Synthesize the extended parents of an addon component as wildcards.
fn add_wildcard_parents(silo: &Silo, component: NodeId, list: &mut AppList) {
    for child in silo.children(component) {
        if silo.element(child) != "extends" {
            continue;
        }
        let Some(parent_id) = silo.text(child) else {
            continue;
        };
        let parent = crate::app::App::new(Some(parent_id));
        parent.add_quirk(Quirks::IS_WILDCARD);
        if let Some(origin) = silo.component_origin(component) {
            parent.set_origin_appstream(origin);
        }
        list.add(parent);
    }
}
