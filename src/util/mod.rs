//! Utility functions shared across the pipeline.
//!
//! - **Text cleaning**: whitespace normalization, boilerplate removal and
//!   hard truncation of extracted article text
//! - **URL validation**: syntactic HTTP(S) checks and host keys for the
//!   selector catalog
//! - **Terminal safety**: control-sequence stripping for CLI output

mod text;
mod url_validator;

pub use text::{
    clean_text, normalize_whitespace, strip_boilerplate, strip_control_chars, truncate_chars,
    MAX_CONTENT_LIMIT, MIN_CONTENT_LIMIT,
};
pub use url_validator::{host_key, validate_url, UrlValidationError};
