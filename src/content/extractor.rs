use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{ElementRef, Html};
use thiserror::Error;
use url::Url;

use super::catalog::{Candidate, SiteCatalog, Strategy};
use crate::config::Config;
use crate::storage::ArticleContent;
use crate::util::{clean_text, normalize_whitespace, validate_url, MAX_CONTENT_LIMIT};

const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Elements whose text never counts as article content.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript",
];

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

/// Bounds of the random politeness delay before each article request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    /// No delay at all.
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn jitter(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub timeout: Duration,
    pub pacing: Pacing,
    /// Candidate text must be strictly longer than this to be accepted.
    pub min_content_chars: usize,
    /// Paragraphs must be strictly longer than this to join the aggregate.
    pub min_paragraph_chars: usize,
    pub max_content_chars: usize,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            pacing: Pacing {
                min: Duration::from_secs(1),
                max: Duration::from_secs(3),
            },
            min_content_chars: 100,
            min_paragraph_chars: 30,
            max_content_chars: 1500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl From<&Config> for ExtractorSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.article_timeout_secs),
            pacing: Pacing {
                min: Duration::from_millis(config.pacing_min_ms),
                max: Duration::from_millis(config.pacing_max_ms),
            },
            min_content_chars: config.min_content_chars,
            min_paragraph_chars: config.min_paragraph_chars,
            max_content_chars: config.content_limit(),
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
        }
    }
}

/// Resolves one article URL to cleaned body text.
///
/// Never fails: transport and HTTP errors become [`ArticleContent::FetchFailed`],
/// pages with nothing above the length threshold become [`ArticleContent::NoContent`].
pub struct ContentExtractor {
    client: reqwest::Client,
    catalog: Arc<SiteCatalog>,
    settings: ExtractorSettings,
}

impl ContentExtractor {
    pub fn new(catalog: Arc<SiteCatalog>, settings: ExtractorSettings) -> Result<Self, ContentError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers(&settings))
            .timeout(settings.timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            catalog,
            settings,
        })
    }

    pub async fn resolve(&self, link: &str) -> ArticleContent {
        let url = match validate_url(link) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %link, error = %e, "Rejecting article link");
                return ArticleContent::FetchFailed;
            }
        };

        let delay = self.settings.pacing.jitter();
        if !delay.is_zero() {
            tracing::trace!(delay_ms = delay.as_millis() as u64, "Pacing before article fetch");
            tokio::time::sleep(delay).await;
        }

        let html = match self.fetch_page(&url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Article fetch failed");
                return ArticleContent::FetchFailed;
            }
        };

        match self.extract(&html, &url) {
            Some(text) => ArticleContent::Resolved(text),
            None => {
                tracing::debug!(url = %url, "No candidate exceeded the content threshold");
                ArticleContent::NoContent
            }
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, ContentError> {
        let secs = self.settings.timeout.as_secs();
        let response = tokio::time::timeout(self.settings.timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| ContentError::Timeout(secs))??;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::HttpStatus(status.as_u16()));
        }

        tokio::time::timeout(self.settings.timeout, read_limited_text(response, MAX_PAGE_SIZE))
            .await
            .map_err(|_| ContentError::Timeout(secs))?
    }

    /// Runs the selector cascade over `html`, returning cleaned text from the
    /// first candidate above the threshold.
    pub fn extract(&self, html: &str, url: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        for candidate in self.catalog.candidates(url) {
            if let Some(text) = self.try_candidate(&document, candidate) {
                tracing::debug!(
                    url = %url,
                    strategy = %candidate.strategy,
                    selector = %candidate.selector_text,
                    chars = text.chars().count(),
                    "Extracted article text"
                );
                return Some(clean_text(&text, self.settings.max_content_chars.min(MAX_CONTENT_LIMIT)));
            }
        }
        None
    }

    fn try_candidate(&self, document: &Html, candidate: &Candidate) -> Option<String> {
        let visible = document
            .select(&candidate.selector)
            .filter(|el| !in_stripped_region(*el));

        match candidate.strategy {
            Strategy::DomainSpecific | Strategy::Generic => visible
                .map(visible_text)
                .find(|text| text.chars().count() > self.settings.min_content_chars),
            Strategy::ParagraphAggregate => {
                let paragraphs: Vec<String> = visible
                    .map(visible_text)
                    .filter(|p| p.chars().count() > self.settings.min_paragraph_chars)
                    .collect();
                let joined = paragraphs.join(" ");
                (joined.chars().count() > self.settings.min_content_chars).then_some(joined)
            }
        }
    }
}

fn browser_headers(settings: &ExtractorSettings) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let user_agent = HeaderValue::from_str(&settings.user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
    let accept_language = HeaderValue::from_str(&settings.accept_language)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));
    headers.insert(header::USER_AGENT, user_agent);
    headers.insert(header::ACCEPT_LANGUAGE, accept_language);
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

fn is_stripped(el: &ElementRef<'_>) -> bool {
    STRIPPED_TAGS.contains(&el.value().name())
}

fn in_stripped_region(el: ElementRef<'_>) -> bool {
    is_stripped(&el) || el.ancestors().filter_map(ElementRef::wrap).any(|a| is_stripped(&a))
}

/// Whitespace-normalized text of `root`, skipping text inside stripped elements.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .filter_map(ElementRef::wrap)
            .any(|a| is_stripped(&a));
        if !hidden {
            parts.push(&**text);
        }
    }
    normalize_whitespace(&parts.join(" ")).into_owned()
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    // Mis-declared charsets are common on news sites; keep what decodes.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings() -> ExtractorSettings {
        ExtractorSettings {
            timeout: Duration::from_secs(5),
            pacing: Pacing::none(),
            ..ExtractorSettings::default()
        }
    }

    fn extractor(catalog: SiteCatalog) -> ContentExtractor {
        ContentExtractor::new(Arc::new(catalog), test_settings()).unwrap()
    }

    fn long_sentence(word: &str) -> String {
        format!("{word} ").repeat(40).trim_end().to_string()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_generic_article_selector() {
        let body = long_sentence("market");
        let html = format!("<html><body><article><p>{body}</p></article></body></html>");
        let ex = extractor(SiteCatalog::generic_only());
        let text = ex.extract(&html, &url("https://example.com/a")).unwrap();
        assert!(text.starts_with("market market"));
        assert!(text.chars().count() > 100);
    }

    #[test]
    fn test_domain_selector_beats_generic() {
        let domain_body = long_sentence("domain");
        let generic_body = long_sentence("generic");
        let html = format!(
            "<html><body><article>{generic_body}</article><div id=\"dic_area\">{domain_body}</div></body></html>"
        );
        let ex = extractor(SiteCatalog::default());

        let text = ex
            .extract(&html, &url("https://n.news.naver.com/article/1"))
            .unwrap();
        assert!(text.starts_with("domain"));

        // Same page on an unregistered host falls through to the generic list
        let text = ex.extract(&html, &url("https://other.example/1")).unwrap();
        assert!(text.starts_with("generic"));
    }

    #[test]
    fn test_short_candidate_falls_through_to_next() {
        let body = long_sentence("content");
        let html = format!(
            "<article>too short</article><div class=\"post-content\">{body}</div>"
        );
        let ex = extractor(SiteCatalog::generic_only());
        let text = ex.extract(&html, &url("https://example.com/a")).unwrap();
        assert!(text.starts_with("content"));
    }

    #[test]
    fn test_stripped_regions_do_not_count() {
        let noise = long_sentence("noise");
        let html = format!(
            "<article><script>var x = \"{noise}\";</script><nav>{noise}</nav><p>tiny</p></article>\
             <footer><div class=\"content\">{noise}</div></footer>"
        );
        let ex = extractor(SiteCatalog::generic_only());
        assert_eq!(ex.extract(&html, &url("https://example.com/a")), None);
    }

    #[test]
    fn test_paragraph_aggregate_fallback() {
        let para = "This paragraph is long enough to be counted as body text.";
        let html = format!(
            "<div><p>{para}</p><p>short one</p><p>{para}</p><p>{para}</p></div>"
        );
        let ex = extractor(SiteCatalog::generic_only());
        let text = ex.extract(&html, &url("https://example.com/a")).unwrap();
        assert_eq!(text, format!("{para} {para} {para}"));
    }

    #[test]
    fn test_cookie_page_yields_nothing() {
        let html = "<html><body><div class=\"consent\"><p>We use cookies.</p>\
                    <button>Accept all</button></div></body></html>";
        let ex = extractor(SiteCatalog::generic_only());
        assert_eq!(ex.extract(html, &url("https://example.com/a")), None);
    }

    #[test]
    fn test_extracted_text_is_cleaned_and_truncated() {
        let body = "word ".repeat(1000);
        let html = format!("<article>{body} Advertisement</article>");
        let ex = extractor(SiteCatalog::generic_only());
        let text = ex.extract(&html, &url("https://example.com/a")).unwrap();
        assert!(text.chars().count() <= 1500);
        assert!(!text.contains("Advertisement"));
    }

    #[tokio::test]
    async fn test_resolve_success_sends_browser_headers() {
        let server = MockServer::start().await;
        let body = long_sentence("headline");
        Mock::given(method("GET"))
            .and(path("/news/1"))
            .and(header("upgrade-insecure-requests", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<article>{body}</article>")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ex = extractor(SiteCatalog::generic_only());
        let result = ex.resolve(&format!("{}/news/1", server.uri())).await;
        assert!(matches!(result, ArticleContent::Resolved(ref t) if t.starts_with("headline")));
    }

    #[tokio::test]
    async fn test_resolve_404_is_fetch_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ex = extractor(SiteCatalog::generic_only());
        let result = ex.resolve(&format!("{}/missing", server.uri())).await;
        assert_eq!(result, ArticleContent::FetchFailed);
    }

    #[tokio::test]
    async fn test_resolve_cookie_page_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>We value your privacy.</p><button>OK</button>"),
            )
            .mount(&server)
            .await;

        let ex = extractor(SiteCatalog::generic_only());
        let result = ex.resolve(&format!("{}/consent", server.uri())).await;
        assert_eq!(result, ArticleContent::NoContent);
    }

    #[tokio::test]
    async fn test_resolve_connection_refused_is_fetch_failed() {
        let ex = extractor(SiteCatalog::generic_only());
        let result = ex.resolve("http://127.0.0.1:1/unreachable").await;
        assert_eq!(result, ArticleContent::FetchFailed);
    }

    #[tokio::test]
    async fn test_resolve_invalid_url_is_fetch_failed() {
        let ex = extractor(SiteCatalog::generic_only());
        assert_eq!(ex.resolve("not-a-url").await, ArticleContent::FetchFailed);
        assert_eq!(ex.resolve("ftp://example.com/a").await, ArticleContent::FetchFailed);
    }

    #[tokio::test]
    async fn test_resolve_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<article>late</article>")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let settings = ExtractorSettings {
            timeout: Duration::from_millis(200),
            ..test_settings()
        };
        let ex = ContentExtractor::new(Arc::new(SiteCatalog::generic_only()), settings).unwrap();
        let result = ex.resolve(&format!("{}/slow", server.uri())).await;
        assert_eq!(result, ArticleContent::FetchFailed);
    }

    #[test]
    fn test_pacing_jitter_within_bounds() {
        let pacing = Pacing {
            min: Duration::from_millis(10),
            max: Duration::from_millis(20),
        };
        for _ in 0..50 {
            let d = pacing.jitter();
            assert!(d >= pacing.min && d <= pacing.max);
        }
        assert_eq!(Pacing::none().jitter(), Duration::ZERO);
    }
}
