//! Keyword news ingestion.
//!
//! A run for a (keyword, locale) pair fetches the keyword's news feed,
//! resolves every entry to cleaned article text through a cascade of CSS
//! selectors, and upserts one row per link into the keyword's collection.

pub mod config;
pub mod content;
pub mod feed;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod util;
