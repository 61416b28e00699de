use anyhow::Result;

use super::schema::Database;
use super::types::{partition_key, Article, ArticleContent, ArticleDbRow, StoredArticle};

const ARTICLE_COLUMNS: &str =
    "keyword, link, title, source, published, content, content_status, fetched_at";

/// Escape LIKE wildcards so the term matches literally (used with `ESCAPE '\'`).
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert or overwrite the article identified by `article.link` within the
    /// keyword's collection.
    ///
    /// A single `INSERT ... ON CONFLICT DO UPDATE` statement, so concurrent
    /// upserts of the same link never produce two rows; the last write wins.
    /// Fails if the keyword's collection has not been ensured.
    pub async fn upsert_article(&self, keyword: &str, article: &Article) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO articles
                (keyword, link, title, source, published, content, content_status, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(keyword, link) DO UPDATE SET
                title = excluded.title,
                source = excluded.source,
                published = excluded.published,
                content = excluded.content,
                content_status = excluded.content_status,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(partition_key(keyword))
        .bind(&article.link)
        .bind(&article.title)
        .bind(&article.source)
        .bind(article.published)
        .bind(article.content.text())
        .bind(article.content.status())
        .bind(self.now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// All articles in the keyword's collection, newest first.
    pub async fn list_articles(&self, keyword: &str) -> Result<Vec<StoredArticle>> {
        let rows: Vec<ArticleDbRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE keyword = ? \
             ORDER BY published DESC, link ASC"
        ))
        .bind(partition_key(keyword))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Articles with real, non-empty content, newest first, at most `limit`.
    pub async fn list_articles_with_content(
        &self,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<StoredArticle>> {
        let rows: Vec<ArticleDbRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE keyword = ? AND content_status = ? AND TRIM(COALESCE(content, '')) != '' \
             ORDER BY published DESC, link ASC LIMIT ?"
        ))
        .bind(partition_key(keyword))
        .bind(ArticleContent::STATUS_OK)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Articles whose title or content contains `term`, newest first.
    ///
    /// Matching is a case-insensitive substring match (ASCII case folding, as
    /// SQLite's `LIKE`). An empty term matches nothing.
    pub async fn search_articles(&self, keyword: &str, term: &str) -> Result<Vec<StoredArticle>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", escape_like(term));
        let rows: Vec<ArticleDbRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE keyword = ?1 AND (title LIKE ?2 ESCAPE '\\' OR content LIKE ?2 ESCAPE '\\') \
             ORDER BY published DESC, link ASC"
        ))
        .bind(partition_key(keyword))
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }
}
