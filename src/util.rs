//! Small utility helpers for tokenization, time parsing, and host sizing.
//!
//! The functions in this module are intentionally lightweight to keep hot
//! paths fast. They are used by the metadata engine, the loader, and tests.

use chrono::DateTime;

/// Casefold and split free text into search tokens.
///
/// Tokens are split on whitespace only, so hyphenated identifiers such as
/// `foo-bar` stay intact and can still be found by substring matching.
/// Empty fragments are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Casefold a single value for comparison against tokenized input.
pub fn casefold(text: &str) -> String {
    text.to_lowercase()
}

/// Parse an ISO-8601 date or datetime into unix seconds.
///
/// Accepts full RFC 3339 timestamps as well as plain `YYYY-MM-DD` dates,
/// which are interpreted as midnight UTC. Returns `None` on any parse
/// failure.
pub fn iso8601_to_unix(text: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    let date = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

/// Current wall-clock time as unix seconds.
pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compare two dotted version strings segment by segment.
///
/// Numeric segments compare numerically, anything else falls back to string
/// ordering. Missing segments compare as zero, so `1.0` equals `1.0.0`.
pub fn vercmp(a: &str, b: &str) -> std::cmp::Ordering {
    let seg = |s: &str| -> Vec<String> { s.split(['.', '-', '_']).map(str::to_owned).collect() };
    let sa = seg(a);
    let sb = seg(b);
    let len = sa.len().max(sb.len());
    for i in 0..len {
        let pa = sa.get(i).map_or("0", String::as_str);
        let pb = sb.get(i).map_or("0", String::as_str);
        let ord = match (pa.parse::<u64>(), pb.parse::<u64>()) {
            (Ok(na), Ok(nb)) => na.cmp(&nb),
            _ => pa.cmp(pb),
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

/// Total system memory in MiB, used to size the bounded install pool.
///
/// Falls back to 4096 when the probe reports zero (containers with cgroup
/// limits hidden from sysinfo).
pub fn total_ram_mib() -> u64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let mib = sys.total_memory() / (1024 * 1024);
    if mib == 0 { 4096 } else { mib }
}

/// Extract the scheme of a URL, lowercased, without the trailing `:`.
pub fn url_scheme(url: &str) -> Option<String> {
    let idx = url.find(':')?;
    let scheme = &url[..idx];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some(scheme.to_lowercase())
}

/// Extract the path portion of a URL, i.e. everything after the scheme and
/// any `//` authority marker.
pub fn url_path(url: &str) -> Option<String> {
    let idx = url.find(':')?;
    let rest = &url[idx + 1..];
    Some(rest.trim_start_matches('/').to_owned())
}

/// Extract the host portion of a URL, or `None` when it has no authority.
pub fn url_host(url: &str) -> Option<String> {
    let idx = url.find("://")?;
    let rest = &url[idx + 3..];
    let host = rest.split(['/', '?', '#']).next()?;
    if host.is_empty() {
        return None;
    }
    Some(host.to_owned())
}

/// Whether the process locale is likely to carry translations.
///
/// `C` and plain `en` are the untranslated baselines; everything else is
/// assumed translatable.
pub fn locale_has_translations(locale: &str) -> bool {
    let base = locale.split(['_', '.', '@']).next().unwrap_or(locale);
    base != "C" && base != "en" && !base.is_empty()
}

/// Locale variants to try for a preference list, most specific first.
///
/// `de_DE.UTF-8` yields `["de_DE.UTF-8", "de_DE", "de"]`.
pub fn locale_variants(locale: &str) -> Vec<String> {
    let mut out = vec![locale.to_owned()];
    if let Some(no_codeset) = locale.split(['.', '@']).next()
        && no_codeset != locale
    {
        out.push(no_codeset.to_owned());
    }
    if let Some(base) = locale.split(['_', '.', '@']).next()
        && !out.iter().any(|v| v == base)
    {
        out.push(base.to_owned());
    }
    out
}
