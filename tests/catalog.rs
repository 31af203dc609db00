//! Integration tests for the AppStream engine.
//!
//! Tests cover:
//! - Silo creation and id refine through the public API
//! - Wildcard detection for override files
//! - Search ranking and the ID-weight strip
//! - Desktop-entry adaptation into the silo
//! - Description formatter output

#[path = "catalog/engine.rs"]
mod engine;
#[path = "catalog/search_ranking.rs"]
mod search_ranking;
