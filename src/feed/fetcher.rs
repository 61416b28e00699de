use chrono::{FixedOffset, Offset, Utc};
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::parser::{parse_feed, FeedEntry, ParseResult};
use crate::config::Config;
use crate::storage::Locale;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that end a run before any article is resolved.
#[derive(Debug, Error)]
pub enum FeedFetchError {
    /// The configured feed endpoint is not a usable URL
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Locale query parameters (`hl`, `gl`, `ceid`) appended to the search URL.
fn locale_params(locale: Locale) -> &'static [(&'static str, &'static str)] {
    match locale {
        Locale::Ko => &[("hl", "ko"), ("gl", "KR"), ("ceid", "KR:ko")],
        Locale::En => &[("hl", "en-NG"), ("gl", "NG"), ("ceid", "NG:en")],
        Locale::ProviderDefault => &[],
    }
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub base_url: String,
    /// Recency filter such as "1d"; empty disables it.
    pub recency_window: String,
    pub timeout: Duration,
    pub offset: FixedOffset,
    pub user_agent: String,
}

impl From<&Config> for FeedSettings {
    fn from(config: &Config) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours.saturating_mul(3600))
            .unwrap_or_else(|| {
                tracing::warn!(
                    hours = config.utc_offset_hours,
                    "utc_offset_hours out of range, using UTC"
                );
                Utc.fix()
            });
        Self {
            base_url: config.feed_base_url.clone(),
            recency_window: config.recency_window.clone(),
            timeout: Duration::from_secs(config.feed_timeout_secs),
            offset,
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Fetches the current entries of a keyword's news search feed.
pub struct FeedFetcher {
    client: reqwest::Client,
    settings: FeedSettings,
}

impl FeedFetcher {
    pub fn new(settings: FeedSettings) -> Result<Self, FeedFetchError> {
        let mut headers = HeaderMap::new();
        if let Ok(user_agent) = HeaderValue::from_str(&settings.user_agent) {
            headers.insert(header::USER_AGENT, user_agent);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client, settings })
    }

    /// Offset publication times are normalized to.
    pub fn offset(&self) -> FixedOffset {
        self.settings.offset
    }

    /// Search URL for `keyword`: the query embeds the recency window, and the
    /// locale contributes its fixed parameter set.
    pub fn query_url(&self, keyword: &str, locale: Locale) -> Result<Url, FeedFetchError> {
        let keyword = keyword.trim();
        let query = if self.settings.recency_window.trim().is_empty() {
            keyword.to_string()
        } else {
            format!("{keyword} when:{}", self.settings.recency_window.trim())
        };
        let params = std::iter::once(("q", query.as_str())).chain(locale_params(locale).iter().copied());
        Ok(Url::parse_with_params(&self.settings.base_url, params)?)
    }

    /// One GET of the keyword feed. No retries: any failure ends the run.
    ///
    /// Entries keep the provider's order.
    pub async fn fetch(&self, keyword: &str, locale: Locale) -> Result<Vec<FeedEntry>, FeedFetchError> {
        let url = self.query_url(keyword, locale)?;
        let secs = self.settings.timeout.as_secs();

        let response = tokio::time::timeout(self.settings.timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| FeedFetchError::Timeout(secs))??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(keyword = %keyword, url = %url, status = status.as_u16(), "Feed request failed");
            return Err(FeedFetchError::HttpStatus(status.as_u16()));
        }

        let bytes = tokio::time::timeout(self.settings.timeout, read_limited_bytes(response, MAX_FEED_SIZE))
            .await
            .map_err(|_| FeedFetchError::Timeout(secs))??;

        let ParseResult { entries, skipped } = parse_feed(&bytes, self.settings.offset, Utc::now())
            .map_err(|e| FeedFetchError::Parse(e.to_string()))?;

        if skipped > 0 {
            tracing::warn!(keyword = %keyword, skipped = skipped, "Feed entries without a link skipped");
        }
        tracing::debug!(keyword = %keyword, locale = %locale, entries = entries.len(), "Fetched feed");
        Ok(entries)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FeedFetchError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FeedFetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedFetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
