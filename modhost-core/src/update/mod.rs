//! Remote repositories and the update catalog built from them
//!
//! - [`RepositoryStore`]: persisted repository records (the operator edits
//!   these; the catalog only reads them)
//! - [`ReleaseSource`]: fetches release indexes and archives
//! - [`UpdateCatalog`]: aggregates releases and applies updates

mod catalog;
mod repository;
mod source;

pub use catalog::UpdateCatalog;
pub use repository::{MemoryRepositoryStore, Repository, RepositoryStore, TomlRepositoryStore};
pub use source::{HttpReleaseSource, INDEX_FILE, Release, ReleaseSource, parse_index};
