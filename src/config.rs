//! Configuration file parser for ~/.config/newsreel/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning for each one
//! since they are usually typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::content::{CatalogError, SiteCatalog};
use crate::util::{MAX_CONTENT_LIMIT, MIN_CONTENT_LIMIT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level ingestion configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search endpoint of the news feed provider.
    pub feed_base_url: String,

    /// Recency filter appended to every query, e.g. "1d".
    pub recency_window: String,

    pub feed_timeout_secs: u64,
    pub article_timeout_secs: u64,

    /// Bounds of the random delay before each article request.
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,

    /// Extracted text must be longer than this to be accepted.
    pub min_content_chars: usize,

    /// Paragraphs must be longer than this to count towards the aggregate fallback.
    pub min_paragraph_chars: usize,

    /// Stored article length cap. See [`Config::content_limit`].
    pub max_content_chars: usize,

    /// Offset (hours east of UTC) publication times are normalized to.
    pub utc_offset_hours: i32,

    /// In-flight runs allowed per (keyword, locale) job.
    pub max_concurrent_runs: usize,

    /// Period of `--mode interval`.
    pub interval_secs: u64,

    /// Six-field, seconds-first cron expression for `--mode cron`.
    pub cron: String,

    pub user_agent: String,
    pub accept_language: String,

    /// Extra selectors keyed by lowercase host, tried before the built-in ones.
    pub sites: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_base_url: "https://news.google.com/rss/search".to_string(),
            recency_window: "1d".to_string(),
            feed_timeout_secs: 10,
            article_timeout_secs: 15,
            pacing_min_ms: 1000,
            pacing_max_ms: 3000,
            min_content_chars: 100,
            min_paragraph_chars: 30,
            max_content_chars: MIN_CONTENT_LIMIT,
            utc_offset_hours: 9,
            max_concurrent_runs: 10,
            interval_secs: 600,
            cron: "0 0 * * * *".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            sites: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] = &[
        "feed_base_url",
        "recency_window",
        "feed_timeout_secs",
        "article_timeout_secs",
        "pacing_min_ms",
        "pacing_max_ms",
        "min_content_chars",
        "min_paragraph_chars",
        "max_content_chars",
        "utc_offset_hours",
        "max_concurrent_runs",
        "interval_secs",
        "cron",
        "user_agent",
        "accept_language",
        "sites",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        if config.pacing_min_ms > config.pacing_max_ms {
            tracing::warn!(
                min = config.pacing_min_ms,
                max = config.pacing_max_ms,
                "pacing_min_ms exceeds pacing_max_ms; using the minimum as a fixed delay"
            );
        }
        tracing::info!(
            path = %path.display(),
            sites = config.sites.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// `max_content_chars` clamped into the supported 1500..=3000 range.
    pub fn content_limit(&self) -> usize {
        self.max_content_chars
            .clamp(MIN_CONTENT_LIMIT, MAX_CONTENT_LIMIT)
    }

    /// Built-in catalog with the `[sites]` entries placed ahead of it.
    pub fn site_catalog(&self) -> Result<SiteCatalog, CatalogError> {
        let mut catalog = SiteCatalog::default();
        for (host, selectors) in &self.sites {
            catalog.register_first(host, selectors)?;
        }
        Ok(catalog)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use url::Url;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("newsreel_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_base_url, "https://news.google.com/rss/search");
        assert_eq!(config.recency_window, "1d");
        assert_eq!(config.content_limit(), 1500);
        assert_eq!(config.utc_offset_hours, 9);
        assert_eq!(config.max_concurrent_runs, 10);
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/newsreel_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.interval_secs, 600);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.cron, "0 0 * * * *");
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "pacing_min_ms = 0\npacing_max_ms = 0\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.pacing_min_ms, 0);
        assert_eq!(config.pacing_max_ms, 0);
        assert_eq!(config.article_timeout_secs, 15);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let path = write_config(
            "full",
            r##"
feed_base_url = "http://127.0.0.1:9000/rss/search"
recency_window = "7d"
feed_timeout_secs = 5
article_timeout_secs = 12
max_content_chars = 2000
utc_offset_hours = 0
max_concurrent_runs = 2
interval_secs = 10
cron = "*/10 * * * * *"

[sites]
"www.example.com" = [".story", "#main-story"]
"##,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.recency_window, "7d");
        assert_eq!(config.content_limit(), 2000);
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.cron, "*/10 * * * * *");
        assert_eq!(
            config.sites.get("www.example.com"),
            Some(&vec![".story".to_string(), "#main-story".to_string()])
        );
        cleanup(&path);
    }

    #[test]
    fn test_content_limit_is_clamped() {
        let mut config = Config::default();
        config.max_content_chars = 100;
        assert_eq!(config.content_limit(), 1500);
        config.max_content_chars = 100_000;
        assert_eq!(config.content_limit(), 3000);
    }

    #[test]
    fn test_configured_sites_come_first() {
        let mut config = Config::default();
        config
            .sites
            .insert("n.news.naver.com".to_string(), vec![".custom".to_string()]);
        let catalog = config.site_catalog().unwrap();
        let url = Url::parse("https://n.news.naver.com/a").unwrap();
        let first = catalog.candidates(&url)[0].selector_text.clone();
        assert_eq!(first, ".custom");
    }

    #[test]
    fn test_bad_site_selector_is_error() {
        let mut config = Config::default();
        config
            .sites
            .insert("example.com".to_string(), vec!["p[[".to_string()]);
        assert!(matches!(
            config.site_catalog(),
            Err(CatalogError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "recency_window = \"2d\"\ntotally_fake_key = 1\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.recency_window, "2d");
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "interval_secs = \"ten\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }
}
