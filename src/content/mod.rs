//! Article body resolution.
//!
//! The [`SiteCatalog`] orders extraction candidates for a URL; the
//! [`ContentExtractor`] fetches the page and walks that cascade.

pub mod catalog;
pub mod extractor;

pub use catalog::{Candidate, CatalogError, SiteCatalog, Strategy};
pub use extractor::{ContentError, ContentExtractor, ExtractorSettings, Pacing};
