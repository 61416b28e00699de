use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database
    #[error("The news database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map a sqlx error, recognising SQLite lock conditions
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Locale
// ============================================================================

/// Feed locale of a keyword subscription.
///
/// Anything other than `ko` or `en` means "let the provider decide".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    Ko,
    En,
    ProviderDefault,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ko => "ko",
            Locale::En => "en",
            Locale::ProviderDefault => "default",
        }
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ko" => Locale::Ko,
            "en" => Locale::En,
            _ => Locale::ProviderDefault,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Article Content
// ============================================================================

/// Outcome of resolving an article link to body text.
///
/// The two failure states are stored distinctly so reports can tell a dead
/// link from a page that simply had nothing readable on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleContent {
    Resolved(String),
    FetchFailed,
    NoContent,
}

impl ArticleContent {
    pub(crate) const STATUS_OK: &'static str = "ok";
    pub(crate) const STATUS_FETCH_FAILED: &'static str = "fetch_failed";
    pub(crate) const STATUS_NO_CONTENT: &'static str = "no_content";

    /// Value of the `content_status` column.
    pub fn status(&self) -> &'static str {
        match self {
            ArticleContent::Resolved(_) => Self::STATUS_OK,
            ArticleContent::FetchFailed => Self::STATUS_FETCH_FAILED,
            ArticleContent::NoContent => Self::STATUS_NO_CONTENT,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ArticleContent::Resolved(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ArticleContent::Resolved(_))
    }

    /// Rebuild from stored columns. Unknown statuses read as `NoContent`.
    pub(crate) fn from_columns(status: &str, content: Option<String>) -> Self {
        match (status, content) {
            (Self::STATUS_OK, Some(text)) => ArticleContent::Resolved(text),
            (Self::STATUS_OK, None) => ArticleContent::Resolved(String::new()),
            (Self::STATUS_FETCH_FAILED, _) => ArticleContent::FetchFailed,
            _ => ArticleContent::NoContent,
        }
    }
}

impl fmt::Display for ArticleContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleContent::Resolved(text) => f.write_str(text),
            ArticleContent::FetchFailed => f.write_str("[fetch failed]"),
            ArticleContent::NoContent => f.write_str("[no content]"),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// One feed entry with its resolved body, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub link: String,
    pub title: String,
    pub source: String,
    /// Normalized to the configured offset, without zone information.
    pub published: NaiveDateTime,
    pub content: ArticleContent,
}

/// An article as read back from a keyword's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArticle {
    pub keyword: String,
    pub link: String,
    pub title: String,
    pub source: String,
    pub published: NaiveDateTime,
    pub content: ArticleContent,
    pub fetched_at: NaiveDateTime,
}

/// Internal row type for article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub keyword: String,
    pub link: String,
    pub title: String,
    pub source: String,
    pub published: NaiveDateTime,
    pub content: Option<String>,
    pub content_status: String,
    pub fetched_at: NaiveDateTime,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> StoredArticle {
        StoredArticle {
            content: ArticleContent::from_columns(&self.content_status, self.content),
            keyword: self.keyword,
            link: self.link,
            title: self.title,
            source: self.source,
            published: self.published,
            fetched_at: self.fetched_at,
        }
    }
}

/// A (keyword, locale) pair that has been ingested at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub keyword: String,
    pub locale: Locale,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionDbRow {
    pub keyword: String,
    pub locale: String,
    pub created_at: NaiveDateTime,
}

impl SubscriptionDbRow {
    pub(crate) fn into_subscription(self) -> Subscription {
        Subscription {
            locale: Locale::from(self.locale.as_str()),
            keyword: self.keyword,
            created_at: self.created_at,
        }
    }
}

/// Content resolution counts for one keyword's collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct CollectionStats {
    pub total: i64,
    pub with_content: i64,
    pub fetch_failed: i64,
    pub no_content: i64,
}

impl CollectionStats {
    /// Percentage of rows with real content; 0 for an empty collection.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.with_content as f64 / self.total as f64 * 100.0
    }
}

/// Partition key for a keyword: trimmed and lowercased.
pub fn partition_key(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}
