//! Short-lived storage of search result lists.
//!
//! A user searches once and later asks for "result 3 of search 12"; the list
//! is kept as JSON until it expires.

use std::time::Duration;

use sqlx::FromRow;
use tracing::instrument;

use super::Result;
use crate::archive::SearchResult;
use crate::db::{Database, unix_now};

/// How long cached searches stay addressable.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(60 * 60);

/// A cached search as stored.
#[derive(Debug, Clone, FromRow)]
pub struct CachedSearch {
    pub id: i64,
    pub user_id: i64,
    pub query: String,
    /// JSON array of [`SearchResult`].
    pub results: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl CachedSearch {
    /// Decodes the stored result list.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Payload`] if the JSON is corrupt.
    pub fn decode(&self) -> Result<Vec<SearchResult>> {
        Ok(serde_json::from_str(&self.results)?)
    }
}

/// `SQLite`-backed search cache.
#[derive(Debug, Clone)]
pub struct SearchCache {
    db: Database,
}

impl SearchCache {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores `results` for `user_id`, returning the cache id.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Payload`] if encoding fails or
    /// [`super::StoreError::Database`] if the insert fails.
    #[instrument(skip(self, results), fields(count = results.len()))]
    pub async fn store(
        &self,
        user_id: i64,
        query: &str,
        results: &[SearchResult],
        ttl: Duration,
    ) -> Result<i64> {
        let payload = serde_json::to_string(results)?;
        let now = unix_now();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

        let (id,): (i64,) = sqlx::query_as(
            r"INSERT INTO search_cache (user_id, query, results, created_at, expires_at)
              VALUES (?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(user_id)
        .bind(query)
        .bind(payload)
        .bind(now)
        .bind(expires_at)
        .fetch_one(self.db.pool())
        .await?;
        Ok(id)
    }

    /// Returns an unexpired cached search owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: i64, id: i64) -> Result<Option<CachedSearch>> {
        let cached = sqlx::query_as::<_, CachedSearch>(
            "SELECT * FROM search_cache WHERE id = ? AND user_id = ? AND expires_at > ?",
        )
        .bind(id)
        .bind(user_id)
        .bind(unix_now())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(cached)
    }

    /// Returns result `index` of an unexpired cached search.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Payload`] if the cached JSON is corrupt or
    /// [`super::StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn result_at(
        &self,
        user_id: i64,
        id: i64,
        index: usize,
    ) -> Result<Option<SearchResult>> {
        let Some(cached) = self.get(user_id, id).await? else {
            return Ok(None);
        };
        Ok(cached.decode()?.into_iter().nth(index))
    }

    /// Deletes searches that expired at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`super::StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
