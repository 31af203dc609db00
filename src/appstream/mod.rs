//! AppStream metadata engine.
//!
//! Ingests catalog XML, installed metainfo and desktop entries, compiles
//! them into an immutable [`Silo`], and turns silo components into [`crate::app::App`]
//! objects on demand. Split by concern:
//!
//! - [`silo`]: compilation and typed queries
//! - [`refine`]: app creation and field extraction
//! - [`search`]: weighted full-text search
//! - [`queries`]: fixed catalog queries (categories, featured, recent, ...)
//! - [`desktop`]: the `.desktop` to component adapter
//! - [`component`]: pre-compilation component mutators
//! - [`description`]: description markup rendering

pub mod component;
pub mod description;
pub mod desktop;
pub mod queries;
pub mod refine;
pub mod search;
pub mod silo;

pub use component::ComponentBuilder;
pub use description::format_description;
pub use desktop::{adapt_desktop_bytes, adapt_desktop_file};
pub use refine::{create_app, refine_app, METADATA_CREATOR, METADATA_SOURCE_FILE};
pub use silo::{DesktopWatch, NodeId, Silo, SiloBuilder, SiloSlot, SourceInfo};
