use anyhow::Result;
use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Article Store handle. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    /// Offset `fetched_at` and `created_at` are stamped in.
    offset: FixedOffset,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if the file is locked by another
    /// process (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for a competing writer
        // before returning SQLITE_BUSY. Applied to every pooled connection.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        // Every new connection to :memory: is a fresh empty database, so the
        // in-memory pool keeps exactly one connection alive for its lifetime.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self {
            pool,
            offset: Utc.fix(),
        };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Opened article store");
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Partition registry: one row per keyword that owns a collection
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                keyword TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                keyword TEXT NOT NULL REFERENCES collections(keyword) ON DELETE CASCADE,
                link TEXT NOT NULL,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                published TEXT NOT NULL,
                content TEXT,
                content_status TEXT NOT NULL
                    CHECK (content_status IN ('ok', 'fetch_failed', 'no_content')),
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (keyword, link)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(keyword, published DESC)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                keyword TEXT PRIMARY KEY,
                locale TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Stamp stored rows in `offset`, the same offset publication times are
    /// normalized to. Defaults to UTC.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Current time in the store's offset, without zone information.
    pub(crate) fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    /// Close the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_database() {
        let db = Database::open(":memory:").await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(names, vec!["articles", "collections", "subscriptions"]);
    }

    #[tokio::test]
    async fn test_now_uses_configured_offset() {
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let db = Database::open(":memory:").await.unwrap().with_utc_offset(kst);
        let expected = Utc::now().naive_utc() + chrono::Duration::hours(9);
        assert!((db.now() - expected).num_seconds().abs() < 5);

        let utc = Database::open(":memory:").await.unwrap();
        assert!((utc.now() - Utc::now().naive_utc()).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::open(":memory:").await.unwrap();
        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_file_database_persists_between_opens() {
        let dir = std::env::temp_dir().join("newsreel_schema_test_file");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("news.db");
        let path_str = path.to_string_lossy().to_string();
        std::fs::remove_file(&path).ok();

        let db = Database::open(&path_str).await.unwrap();
        db.ensure_collection("persisted").await.unwrap();
        db.close().await;

        let db = Database::open(&path_str).await.unwrap();
        assert_eq!(db.list_collections().await.unwrap(), vec!["persisted"]);
        db.close().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}
