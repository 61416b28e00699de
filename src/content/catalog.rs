use std::collections::HashMap;
use std::fmt;

use scraper::Selector;
use thiserror::Error;
use url::Url;

use crate::util::host_key;

/// Publisher pages the built-in catalog knows how to read.
///
/// Korean portals keep the article body in a single well-known container;
/// the newspaper sites share one class-name family.
const BUILTIN_SITES: &[(&str, &[&str])] = &[
    ("n.news.naver.com", &["#dic_area", "#newsct_article"]),
    ("news.naver.com", &["#dic_area", "#articleBodyContents"]),
    ("v.daum.net", &[".article_view", "#harmonyContainer"]),
    ("www.hankyung.com", NEWSPAPER_SELECTORS_DASHED),
    ("www.mk.co.kr", NEWSPAPER_SELECTORS),
    ("www.etnews.com", NEWSPAPER_SELECTORS),
    ("www.donga.com", NEWSPAPER_SELECTORS),
    ("www.chosun.com", NEWSPAPER_SELECTORS),
    ("www.joongang.co.kr", NEWSPAPER_SELECTORS),
    ("www.khan.co.kr", NEWSPAPER_SELECTORS),
    ("www.hani.co.kr", NEWSPAPER_SELECTORS),
    ("www.ohmynews.com", NEWSPAPER_SELECTORS),
    ("www.zdnet.co.kr", NEWSPAPER_SELECTORS),
    ("www.it.co.kr", NEWSPAPER_SELECTORS),
    ("www.inews24.com", NEWSPAPER_SELECTORS),
    ("www.m-economynews.com", NEWSPAPER_SELECTORS),
];

const NEWSPAPER_SELECTORS: &[&str] =
    &[".article_body", ".article-content", ".content", ".article_text"];
const NEWSPAPER_SELECTORS_DASHED: &[&str] =
    &[".article-body", ".article-content", ".content", ".article_text"];

/// Semantic containers tried on every page, in priority order.
const GENERIC_SELECTORS: &[&str] = &[
    "article",
    ".article-body",
    ".article_body",
    ".article-content",
    ".article-text",
    ".content",
    ".post-content",
    ".entry-content",
    "#article-body",
    "#content",
    "#post-content",
    "div[data-module=\"ArticleBody\"]",
    ".story-body",
    ".story-content",
    ".news-content",
    ".news-body",
    ".main-content",
    ".main-text",
    ".text-content",
    ".text-body",
];

/// Selector used by the last-resort paragraph aggregation.
const PARAGRAPH_SELECTOR: &str = "p";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid CSS selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// How a candidate's text is gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Registered for the page's exact host.
    DomainSpecific,
    /// One of the fixed semantic containers.
    Generic,
    /// Every sufficiently long paragraph, joined with single spaces.
    ParagraphAggregate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::DomainSpecific => "domain-specific",
            Strategy::Generic => "generic",
            Strategy::ParagraphAggregate => "paragraph-aggregate",
        })
    }
}

/// One step of the extraction cascade.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: Strategy,
    pub selector_text: String,
    pub selector: Selector,
}

impl Candidate {
    fn parse(strategy: Strategy, selector_text: &str) -> Result<Self, CatalogError> {
        let selector =
            Selector::parse(selector_text).map_err(|e| CatalogError::InvalidSelector {
                selector: selector_text.to_string(),
                reason: format!("{e:?}"),
            })?;
        Ok(Self {
            strategy,
            selector_text: selector_text.to_string(),
            selector,
        })
    }
}

/// Maps a host to its ordered selector list, with a generic fallback ordering.
///
/// Lookups are pure; the catalog is built once and shared by the extractor.
#[derive(Debug, Clone)]
pub struct SiteCatalog {
    sites: HashMap<String, Vec<Candidate>>,
    generic: Vec<Candidate>,
    paragraphs: Candidate,
}

impl SiteCatalog {
    /// A catalog with no domain entries, only the generic cascade.
    pub fn generic_only() -> Self {
        let generic = GENERIC_SELECTORS
            .iter()
            .filter_map(|s| Candidate::parse(Strategy::Generic, s).ok())
            .collect();
        let paragraphs = Candidate {
            strategy: Strategy::ParagraphAggregate,
            selector_text: PARAGRAPH_SELECTOR.to_string(),
            selector: Selector::parse(PARAGRAPH_SELECTOR)
                .expect("paragraph selector is a plain tag name"),
        };
        Self {
            sites: HashMap::new(),
            generic,
            paragraphs,
        }
    }

    /// Appends selectors for `host`, after any already registered for it.
    ///
    /// The host is matched exactly and case-insensitively; `www.` is not implied.
    pub fn register<S: AsRef<str>>(
        &mut self,
        host: &str,
        selectors: &[S],
    ) -> Result<(), CatalogError> {
        let parsed = selectors
            .iter()
            .map(|s| Candidate::parse(Strategy::DomainSpecific, s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.sites
            .entry(host.trim().to_ascii_lowercase())
            .or_default()
            .extend(parsed);
        Ok(())
    }

    /// Registers `selectors` for `host` ahead of whatever is already there.
    pub fn register_first<S: AsRef<str>>(
        &mut self,
        host: &str,
        selectors: &[S],
    ) -> Result<(), CatalogError> {
        let mut parsed = selectors
            .iter()
            .map(|s| Candidate::parse(Strategy::DomainSpecific, s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let entry = self
            .sites
            .entry(host.trim().to_ascii_lowercase())
            .or_default();
        parsed.append(entry);
        *entry = parsed;
        Ok(())
    }

    /// Ordered candidates for `url`: domain-specific, then generic, then paragraphs.
    pub fn candidates(&self, url: &Url) -> Vec<&Candidate> {
        let domain = host_key(url)
            .and_then(|host| self.sites.get(&host))
            .map(Vec::as_slice)
            .unwrap_or_default();
        domain
            .iter()
            .chain(self.generic.iter())
            .chain(std::iter::once(&self.paragraphs))
            .collect()
    }
}

impl Default for SiteCatalog {
    /// Generic cascade plus the built-in publisher entries.
    fn default() -> Self {
        let mut catalog = Self::generic_only();
        for (host, selectors) in BUILTIN_SITES {
            if let Err(e) = catalog.register(host, selectors) {
                tracing::warn!(host = %host, error = %e, "Skipping built-in catalog entry");
            }
        }
        catalog
    }
}
