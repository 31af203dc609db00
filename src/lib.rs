//! # Appshelf Crate Overview
//!
//! Appshelf is the core of a desktop software center: it aggregates
//! application metadata from multiple packaging backends, presents a
//! unified catalog of apps, and orchestrates install, remove, update and
//! refresh operations against those backends. There is no UI in here; the
//! crate is driven entirely through the job API and observed through
//! loader signals.
//!
//! ## Highlights
//! - AppStream engine compiling XML and desktop entries into a queryable
//!   silo ([`appstream`]).
//! - Plugin registry with dependency ordering, conflict handling and a
//!   cancellable job pipeline ([`plugin`], [`jobs`]).
//! - An [`app::App`] entity with a checked state machine, quirks, kudos
//!   and per-plugin caches.
//! - A persistent pending-install queue flushed on network changes
//!   ([`queue`]).
//!
//! ## Quick Start
//! ```no_run
//! use appshelf::jobs::{AppQuery, Job};
//! use appshelf::plugin::PluginLoaderBuilder;
//!
//! #[tokio::main]
//! async fn main() -> appshelf::Result<()> {
//!     let loader = PluginLoaderBuilder::new().build();
//!     loader.setup().await?;
//!     let query = AppQuery {
//!         keywords: Some(vec!["browser".into()]),
//!         ..AppQuery::default()
//!     };
//!     let result = loader.run(Job::list_apps(query)).await?;
//!     drop(result);
//!     loader.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! The modules listed below link to detailed documentation for each
//! subsystem.

pub mod app;
pub mod appstream;
pub mod error;
pub mod events;
pub mod jobs;
pub mod network;
pub mod plugin;
pub mod queue;
pub mod settings;
pub mod trace;
pub mod util;

pub use error::{Error, ErrorKind, Result};
