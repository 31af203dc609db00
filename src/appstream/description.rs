//! Rendering of `<description>` and `<issues>` nodes into plain markup.
//!
//! Only `<p>`, `<ul>`, `<ol>` and `<li>` structure the output; nested
//! `<em>` becomes italic and `<code>` monospace, everything else is
//! dropped. The output markup uses `<i>`, `<tt>` and `<a>` tags with all
//! literal text escaped, which is what the presentation layer consumes.

use super::silo::{NodeId, Silo};

/// MITRE lookup template used when a CVE issue carries no URL.
const CVE_URL: &str = "https://cve.mitre.org/cgi-bin/cvename.cgi?name=";

/// Escape literal text for the output markup.
fn markup_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Render the inline content of a node, honoring nested `<em>`/`<code>`.
///
/// Returns `None` for empty content so self-closing elements disappear.
fn format_text(silo: &Silo, node: NodeId) -> Option<String> {
    let mut out = String::new();
    if let Some(text) = silo.text(node) {
        out.push_str(&markup_escape(text));
    }
    for child in silo.children(node) {
        let (start, end) = match silo.element(child) {
            "em" => ("<i>", "</i>"),
            "code" => ("<tt>", "</tt>"),
            _ => ("", ""),
        };
        if let Some(inner) = format_text(silo, child) {
            out.push_str(start);
            out.push_str(&inner);
            out.push_str(end);
        }
        if let Some(tail) = silo.tail(child) {
            out.push_str(&markup_escape(tail));
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Append one issue entry as a bulleted link.
fn format_issue(out: &mut String, silo: &Silo, issue: NodeId) {
    let Some(content) = silo.text(issue).filter(|t| !t.is_empty()) else {
        return;
    };
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(" \u{2022} ");
    let escaped = markup_escape(content);
    if let Some(url) = silo.attr(issue, "url") {
        out.push_str(&format!("<a href=\"{url}\" title=\"{url}\">{escaped}</a>"));
    } else if silo.attr(issue, "type") == Some("cve") {
        out.push_str(&format!(
            "<a href=\"{CVE_URL}{escaped}\" title=\"{CVE_URL}{escaped}\">{escaped}</a>"
        ));
    } else {
        out.push_str(&escaped);
    }
}

/// Render a description node and optionally an issues node into markup.
///
/// `None` when nothing renderable was found.
pub fn format_description(
    silo: &Silo,
    description: Option<NodeId>,
    issues: Option<NodeId>,
) -> Option<String> {
    let mut out = String::new();

    if let Some(description) = description {
        for child in silo.children(description) {
            match silo.element(child) {
                "p" => {
                    // a self-closing <p/> renders as nothing at all
                    if let Some(text) = format_text(silo, child) {
                        out.push_str(&text);
                        out.push_str("\n\n");
                    }
                }
                "ul" => {
                    for item in silo.children(child) {
                        if silo.element(item) == "li" {
                            out.push_str(" \u{2022} ");
                            out.push_str(&format_text(silo, item).unwrap_or_default());
                            out.push('\n');
                        }
                    }
                    out.push('\n');
                }
                "ol" => {
                    let mut n = 0u32;
                    for item in silo.children(child) {
                        if silo.element(item) == "li" {
                            n += 1;
                            out.push_str(&format!(
                                " {n}. {}\n",
                                format_text(silo, item).unwrap_or_default()
                            ));
                        }
                    }
                    out.push('\n');
                }
                _ => {}
            }
        }
    }

    while out.ends_with('\n') {
        out.pop();
    }

    if let Some(issues) = issues {
        if !out.is_empty() {
            out.push('\n');
        }
        for child in silo.children(issues) {
            if silo.element(child) == "issue" {
                format_issue(&mut out, silo, child);
            }
        }
        while out.ends_with('\n') {
            out.pop();
        }
    }

    if out.is_empty() { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appstream::silo::{SiloBuilder, SourceInfo};

    fn silo_for(description_xml: &str) -> Silo {
        let xml = format!(
            "<components><component><id>x</id>{description_xml}</component></components>"
        );
        let mut builder = SiloBuilder::new();
        builder
            .import_xml_bytes(xml.as_bytes(), SourceInfo::default())
            .expect("valid xml");
        builder.compile().expect("compiles")
    }

    fn render(description_xml: &str) -> Option<String> {
        let silo = silo_for(description_xml);
        let component = silo.components()[0];
        let description = silo.child_by_element(component, "description");
        let issues = silo.child_by_element(component, "issues");
        format_description(&silo, description, issues)
    }

    #[test]
    fn paragraph_with_nested_emphasis() {
        assert_eq!(
            render("<description><p>a<em>b</em>c</p></description>").as_deref(),
            Some("a<i>b</i>c")
        );
    }

    #[test]
    fn code_becomes_monospace() {
        assert_eq!(
            render("<description><p>run <code>ls</code> now</p></description>").as_deref(),
            Some("run <tt>ls</tt> now")
        );
    }

    #[test]
    fn unknown_tags_are_dropped() {
        assert_eq!(
            render("<description><p>keep</p><video>drop</video></description>").as_deref(),
            Some("keep")
        );
    }

    #[test]
    fn lists_render_with_bullets_and_numbers() {
        let out = render(
            "<description><ul><li>one</li><li>two</li></ul>\
             <ol><li>first</li></ol></description>",
        )
        .expect("renders");
        assert_eq!(out, " \u{2022} one\n \u{2022} two\n\n 1. first");
    }

    #[test]
    fn self_closing_paragraph_is_ignored() {
        assert_eq!(render("<description><p/></description>"), None);
    }

    #[test]
    fn literal_markup_is_escaped() {
        assert_eq!(
            render("<description><p>a &lt; b</p></description>").as_deref(),
            Some("a &lt; b")
        );
    }

    #[test]
    fn cve_issue_gets_mitre_link() {
        let out = render(
            "<description><p>fix</p></description>\
             <issues><issue type=\"cve\">CVE-2023-12345</issue></issues>",
        )
        .expect("renders");
        assert!(out.starts_with("fix\n \u{2022} <a href=\"https://cve.mitre.org/"));
        assert!(out.contains("CVE-2023-12345</a>"));
    }

    #[test]
    fn issue_with_url_links_directly() {
        let out = render(
            "<issues><issue type=\"generic\" url=\"https://bugs.example.org/1\">#1</issue></issues>",
        )
        .expect("renders");
        assert_eq!(
            out,
            " \u{2022} <a href=\"https://bugs.example.org/1\" title=\"https://bugs.example.org/1\">#1</a>"
        );
    }
}
