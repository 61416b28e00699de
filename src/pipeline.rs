//! Ingestion pipeline: one run fetches a keyword's feed, resolves every
//! entry's article text in order, and upserts each entry into the keyword's
//! collection.
//!
//! Only a feed failure ends a run early. Per-article fetch failures and empty
//! pages are stored as their own content states, and a failed write skips
//! just that row.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::config::Config;
use crate::content::{ContentExtractor, ExtractorSettings};
use crate::feed::{FeedEntry, FeedFetcher, FeedSettings};
use crate::storage::{Article, ArticleContent, Database, Locale};

/// Position of a run in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetching,
    /// Resolving the article text of entry `i`.
    Resolving(usize),
    /// Entry `i` has been written (or its write failed and was logged).
    Persisted(usize),
    Done,
    /// The feed could not be fetched; no entries were processed.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Fetching => f.write_str("fetching"),
            RunState::Resolving(i) => write!(f, "resolving({i})"),
            RunState::Persisted(i) => write!(f, "persisted({i})"),
            RunState::Done => f.write_str("done"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub keyword: String,
    pub locale: Locale,
    /// Always terminal: `Done` or `Failed`.
    pub state: RunState,
    pub entries: usize,
    pub resolved: usize,
    pub fetch_failed: usize,
    pub no_content: usize,
    pub persisted: usize,
    pub persist_errors: usize,
    /// Why the run failed, when it did.
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    fn new(keyword: &str, locale: Locale) -> Self {
        Self {
            keyword: keyword.to_string(),
            locale,
            state: RunState::Fetching,
            entries: 0,
            resolved: 0,
            fetch_failed: 0,
            no_content: 0,
            persisted: 0,
            persist_errors: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, content: &ArticleContent) {
        match content {
            ArticleContent::Resolved(_) => self.resolved += 1,
            ArticleContent::FetchFailed => self.fetch_failed += 1,
            ArticleContent::NoContent => self.no_content += 1,
        }
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(keyword = %self.keyword, from = %self.state, to = %next, "Run state transition");
        self.state = next;
    }

    fn fail(&mut self, error: String) {
        tracing::warn!(keyword = %self.keyword, locale = %self.locale, error = %error, "Run failed");
        self.error = Some(error);
        self.transition(RunState::Failed);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {} entries, {} resolved, {} fetch failed, {} no content, {} stored, {} write errors ({:.1}s)",
            self.keyword,
            self.locale,
            self.state,
            self.entries,
            self.resolved,
            self.fetch_failed,
            self.no_content,
            self.persisted,
            self.persist_errors,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(error) = &self.error {
            write!(f, " - {error}")?;
        }
        Ok(())
    }
}

/// Feed fetcher, content extractor and article store wired together.
///
/// Entries are processed strictly one after another so the extractor's
/// pacing applies between every article request.
pub struct Pipeline {
    db: Database,
    fetcher: FeedFetcher,
    extractor: ContentExtractor,
}

impl Pipeline {
    /// Rows are stamped in the fetcher's offset, so `fetched_at` and
    /// `published` compare directly.
    pub fn new(db: Database, fetcher: FeedFetcher, extractor: ContentExtractor) -> Self {
        Self {
            db: db.with_utc_offset(fetcher.offset()),
            fetcher,
            extractor,
        }
    }

    pub fn from_config(db: Database, config: &Config) -> anyhow::Result<Self> {
        let catalog = config
            .site_catalog()
            .context("Invalid [sites] selector in config")?;
        let fetcher = FeedFetcher::new(FeedSettings::from(config))
            .context("Failed to build feed HTTP client")?;
        let extractor = ContentExtractor::new(Arc::new(catalog), ExtractorSettings::from(config))
            .context("Failed to build article HTTP client")?;
        Ok(Self::new(db, fetcher, extractor))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Execute one run for `(keyword, locale)`. Never fails; the report says
    /// how far the run got.
    pub async fn run(&self, keyword: &str, locale: Locale) -> RunReport {
        let started = Instant::now();
        let keyword = keyword.trim();
        let mut report = RunReport::new(keyword, locale);
        tracing::info!(keyword = %keyword, locale = %locale, "Run started");

        if let Err(e) = self.prepare(keyword, locale).await {
            report.fail(format!("{e:#}"));
            report.elapsed = started.elapsed();
            return report;
        }

        let entries = match self.fetcher.fetch(keyword, locale).await {
            Ok(entries) => entries,
            Err(e) => {
                report.fail(format!("Feed fetch failed: {e}"));
                report.elapsed = started.elapsed();
                return report;
            }
        };
        report.entries = entries.len();

        for (i, entry) in entries.into_iter().enumerate() {
            report.transition(RunState::Resolving(i));
            let article = self.resolve(entry).await;
            report.record(&article.content);

            match self.db.upsert_article(keyword, &article).await {
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    report.persist_errors += 1;
                    tracing::warn!(
                        keyword = %keyword,
                        url = %article.link,
                        error = %e,
                        "Failed to store article, continuing"
                    );
                }
            }
            report.transition(RunState::Persisted(i));
        }

        report.transition(RunState::Done);
        report.elapsed = started.elapsed();
        tracing::info!(
            keyword = %keyword,
            locale = %locale,
            entries = report.entries,
            resolved = report.resolved,
            fetch_failed = report.fetch_failed,
            no_content = report.no_content,
            persist_errors = report.persist_errors,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Run finished"
        );
        report
    }

    /// Ensure the collection and subscription exist before fetching.
    async fn prepare(&self, keyword: &str, locale: Locale) -> anyhow::Result<()> {
        self.db
            .ensure_collection(keyword)
            .await
            .with_context(|| format!("Failed to prepare collection for {keyword:?}"))?;
        if let Err(e) = self.db.register_subscription(keyword, locale).await {
            tracing::warn!(keyword = %keyword, error = %e, "Failed to register subscription");
        }
        Ok(())
    }

    async fn resolve(&self, entry: FeedEntry) -> Article {
        let content = self.extractor.resolve(&entry.link).await;
        Article {
            link: entry.link,
            title: entry.title,
            source: entry.source,
            published: entry.published,
            content,
        }
    }
}
