//! Search ranking tests over a small constructed silo.

#![cfg(test)]

use appshelf::app::AppList;
use appshelf::appstream::search::{MATCH_ID, search};
use appshelf::appstream::silo::{Silo, SiloBuilder, SourceInfo};
use appshelf::util::tokenize;

/// What: Compile the three-component ranking fixture.
///
/// Inputs: none
///
/// Output: silo with a pkgname hit, a name hit and a keyword hit for the
/// token `bar`.
fn ranking_silo() -> Silo {
    let mut builder = SiloBuilder::new();
    builder
        .import_xml_bytes(
            br#"<components origin="repo">
                 <component type="desktop-application">
                   <id>org.ex.C1</id><name>Something</name><metadata_license>X</metadata_license>
                   <pkgname>foo-bar</pkgname>
                 </component>
                 <component type="desktop-application">
                   <id>org.ex.C2</id><name>Bar Foo</name><metadata_license>X</metadata_license>
                 </component>
                 <component type="desktop-application">
                   <id>org.ex.C3</id><name>Other</name><metadata_license>X</metadata_license>
                   <keywords><keyword>bar</keyword></keywords>
                 </component>
               </components>"#,
            SourceInfo::default(),
        )
        .expect("valid xml");
    builder.compile().expect("compiles")
}

#[test]
/// What: All three columns hit for one token, with name above keyword
/// above pkgname-substring.
///
/// Inputs:
/// - Query `bar` over the ranking fixture.
///
/// Output:
/// - Three results; `weight(name) > weight(keyword) > weight(pkgname/2)`.
fn weights_satisfy_the_documented_order() {
    let silo = ranking_silo();
    let mut list = AppList::new();
    search(None, None, &silo, &tokenize("bar"), &mut list, None).expect("searches");
    assert_eq!(list.len(), 3);

    let value = |id: &str| {
        list.iter()
            .find(|a| a.id().as_deref() == Some(id))
            .map(|a| a.match_value())
            .expect("present")
    };
    assert!(value("org.ex.C2") > value("org.ex.C3"));
    assert!(value("org.ex.C3") > value("org.ex.C1"));
}

#[test]
/// What: A token that misses one column set entirely excludes the
/// component even when another token matches.
///
/// Inputs:
/// - Query `bar zzz` over the ranking fixture.
///
/// Output:
/// - Empty result set (AND across tokens).
fn and_semantics_across_tokens() {
    let silo = ranking_silo();
    let mut list = AppList::new();
    search(None, None, &silo, &tokenize("bar zzz"), &mut list, None).expect("searches");
    assert!(list.is_empty());
}

#[test]
/// What: The ID column contributes to matching but never to the reported
/// match value.
///
/// Inputs:
/// - Query equal to a component id.
///
/// Output:
/// - Component found; reported match value carries no ID bit; stripping is
///   idempotent on the ranking.
fn id_weight_never_reaches_the_ranking() {
    let mut builder = SiloBuilder::new();
    builder
        .import_xml_bytes(
            br#"<components origin="repo">
                 <component type="desktop-application">
                   <id>syncthing</id><name>Syncthing GUI</name><metadata_license>X</metadata_license>
                 </component>
               </components>"#,
            SourceInfo::default(),
        )
        .expect("valid xml");
    let silo = builder.compile().expect("compiles");

    let mut list = AppList::new();
    search(None, None, &silo, &tokenize("syncthing"), &mut list, None).expect("searches");
    assert_eq!(list.len(), 1);
    let app = list.index(0).expect("hit");
    assert_eq!(app.match_value() & MATCH_ID, 0);
    // stripping again changes nothing
    assert_eq!(app.match_value() & !MATCH_ID, app.match_value());
    assert_ne!(app.match_value(), 0);
}
