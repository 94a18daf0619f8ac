//! Cache entry repository.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::CacheEntryDbModel;

/// Storage for aggregation results.
///
/// The store is append-only: concurrent writers for the same key both succeed
/// and readers take the newest row.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Find the most recent entry for a key.
    async fn find_latest(&self, cache_key: &str) -> Result<Option<CacheEntryDbModel>>;

    /// Insert a new entry.
    async fn insert(&self, entry: &CacheEntryDbModel) -> Result<()>;
}

/// SQLx implementation of CacheRepository.
pub struct SqlxCacheRepository {
    pool: SqlitePool,
}

impl SqlxCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheRepository for SqlxCacheRepository {
    async fn find_latest(&self, cache_key: &str) -> Result<Option<CacheEntryDbModel>> {
        let entry = sqlx::query_as::<_, CacheEntryDbModel>(
            r#"
            SELECT id, cache_key, payload, cached_at FROM cache_entries
            WHERE cache_key = ?
            ORDER BY cached_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn insert(&self, entry: &CacheEntryDbModel) -> Result<()> {
        sqlx::query(
            "INSERT INTO cache_entries (id, cache_key, payload, cached_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.cache_key)
        .bind(&entry.payload)
        .bind(entry.cached_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-process implementation, used when no database is configured.
#[derive(Default)]
pub struct MemoryCacheRepository {
    entries: DashMap<String, Vec<CacheEntryDbModel>>,
}

impl MemoryCacheRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries for a key.
    pub fn len_for(&self, cache_key: &str) -> usize {
        self.entries.get(cache_key).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CacheRepository for MemoryCacheRepository {
    async fn find_latest(&self, cache_key: &str) -> Result<Option<CacheEntryDbModel>> {
        Ok(self
            .entries
            .get(cache_key)
            .and_then(|list| list.iter().max_by_key(|e| e.cached_at).cloned()))
    }

    async fn insert(&self, entry: &CacheEntryDbModel) -> Result<()> {
        self.entries
            .entry(entry.cache_key.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, payload: &str, cached_at: i64) -> CacheEntryDbModel {
        CacheEntryDbModel {
            id: uuid::Uuid::new_v4().to_string(),
            cache_key: key.to_string(),
            payload: payload.to_string(),
            cached_at,
        }
    }

    #[tokio::test]
    async fn memory_returns_latest_entry() {
        let repo = MemoryCacheRepository::new();
        repo.insert(&entry("trending", "old", 1_000)).await.unwrap();
        repo.insert(&entry("trending", "new", 2_000)).await.unwrap();
        repo.insert(&entry("other", "x", 3_000)).await.unwrap();

        let latest = repo.find_latest("trending").await.unwrap().unwrap();
        assert_eq!(latest.payload, "new");
        assert_eq!(repo.len_for("trending"), 2);
        assert!(repo.find_latest("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_prefers_last_insert_on_equal_timestamps() {
        let repo = MemoryCacheRepository::new();
        for payload in ["first", "second", "third"] {
            repo.insert(&entry("trending", payload, 1_000)).await.unwrap();
        }

        let latest = repo.find_latest("trending").await.unwrap().unwrap();
        assert_eq!(latest.payload, "third");
    }
}
