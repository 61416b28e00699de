use anyhow::{bail, Result};

use super::schema::Database;
use super::types::{partition_key, ArticleContent, CollectionStats};

impl Database {
    // ========================================================================
    // Collection (partition) Operations
    // ========================================================================

    /// Create the keyword's partition if it does not exist yet.
    ///
    /// Idempotent; the pipeline calls this at the start of every run.
    pub async fn ensure_collection(&self, keyword: &str) -> Result<()> {
        let key = partition_key(keyword);
        if key.is_empty() {
            bail!("Keyword must not be empty");
        }
        sqlx::query("INSERT OR IGNORE INTO collections (keyword, created_at) VALUES (?, ?)")
            .bind(&key)
            .bind(self.now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Irreversibly remove a keyword's partition and every article in it.
    ///
    /// Returns the number of articles deleted. The keyword's subscription is
    /// left untouched.
    pub async fn drop_collection(&self, keyword: &str) -> Result<u64> {
        let key = partition_key(keyword);
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM articles WHERE keyword = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM collections WHERE keyword = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(keyword = %key, articles = deleted, "Dropped collection");
        Ok(deleted)
    }

    /// Keywords that currently own a partition, alphabetically.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT keyword FROM collections ORDER BY keyword")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    pub async fn collection_stats(&self, keyword: &str) -> Result<CollectionStats> {
        let stats: CollectionStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(content_status = ?2 AND TRIM(COALESCE(content, '')) != ''), 0) AS with_content,
                COALESCE(SUM(content_status = ?3), 0) AS fetch_failed,
                COALESCE(SUM(content_status = ?4), 0) AS no_content
            FROM articles
            WHERE keyword = ?1
            "#,
        )
        .bind(partition_key(keyword))
        .bind(ArticleContent::STATUS_OK)
        .bind(ArticleContent::STATUS_FETCH_FAILED)
        .bind(ArticleContent::STATUS_NO_CONTENT)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
