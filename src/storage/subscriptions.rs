use anyhow::{bail, Result};

use super::schema::Database;
use super::types::{partition_key, Locale, Subscription, SubscriptionDbRow};

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Register a keyword for ingestion under `locale`.
    ///
    /// Keyed like collections, so "Acme" and " acme" are one subscription.
    /// The first registration wins: registering an existing keyword again,
    /// under any locale, changes nothing. Returns whether a row was inserted.
    pub async fn register_subscription(&self, keyword: &str, locale: Locale) -> Result<bool> {
        let keyword = partition_key(keyword);
        if keyword.is_empty() {
            bail!("Keyword must not be empty");
        }
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions (keyword, locale, created_at) VALUES (?, ?, ?)",
        )
        .bind(&keyword)
        .bind(locale.as_str())
        .bind(self.now())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::info!(keyword = %keyword, locale = %locale, "Registered keyword subscription");
        } else {
            tracing::debug!(keyword = %keyword, locale = %locale, "Keyword already registered");
        }
        Ok(inserted)
    }

    /// All registered subscriptions, oldest first.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionDbRow> = sqlx::query_as(
            "SELECT keyword, locale, created_at FROM subscriptions ORDER BY created_at, keyword",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SubscriptionDbRow::into_subscription).collect())
    }

    pub async fn get_subscription(&self, keyword: &str) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionDbRow> = sqlx::query_as(
            "SELECT keyword, locale, created_at FROM subscriptions WHERE keyword = ?",
        )
        .bind(partition_key(keyword))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SubscriptionDbRow::into_subscription))
    }

    /// Remove a keyword's subscription. Its collection is not touched.
    ///
    /// Returns whether a subscription existed.
    pub async fn delete_subscription(&self, keyword: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE keyword = ?")
            .bind(partition_key(keyword))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
