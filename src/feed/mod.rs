//! Keyword news feed retrieval.
//!
//! - [`fetcher`] builds the search URL for a (keyword, locale) pair and
//!   performs the single GET
//! - [`parser`] turns the RSS/Atom body into [`FeedEntry`] values using
//!   `feed-rs`, normalizing publication times to a fixed offset
//! - `source` recovers each item's publisher name with `quick-xml`

mod fetcher;
mod parser;
mod source;

pub use fetcher::{FeedFetchError, FeedFetcher, FeedSettings};
pub use parser::{parse_feed, FeedEntry, ParseResult};
