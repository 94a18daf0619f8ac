//! Time-bounded cache of aggregation results.
//!
//! Entries are append-only rows keyed by a [`CacheKey`]; a lookup returns the
//! newest row only while it is younger than the key's TTL. Storage failures
//! never fail a request: a failed read is a miss, a failed write is logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::database::models::CacheEntryDbModel;
use crate::database::repositories::CacheRepository;
use crate::database::time::{ms_to_datetime, now_ms};
use crate::domain::ProviderId;

/// Logical cache key. Raw query strings never become keys directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Combined trending view (`local` + `external`).
    Trending,
    /// Trending list of a single provider.
    ProviderTrending(ProviderId),
    /// Search results for a normalized query.
    Search(String),
}

impl CacheKey {
    /// Key for a search query: trimmed and lowercased. `None` for blank queries.
    pub fn search(query: &str) -> Option<Self> {
        let normalized = query.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self::Search(normalized))
        }
    }

    /// Storage form of the key.
    pub fn as_storage_key(&self) -> String {
        match self {
            Self::Trending => "trending".to_string(),
            Self::ProviderTrending(provider) => format!("trending:{provider}"),
            Self::Search(query) => format!("search:{query}"),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_storage_key())
    }
}

/// Freshness windows per key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub trending: Duration,
    pub audio_trending: Duration,
    pub video_trending: Duration,
    pub search: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            trending: Duration::from_secs(24 * 3600),
            audio_trending: Duration::from_secs(24 * 3600),
            video_trending: Duration::from_secs(48 * 3600),
            search: Duration::from_secs(3600),
        }
    }
}

impl CacheTtls {
    pub fn ttl(&self, key: &CacheKey) -> Duration {
        match key {
            CacheKey::Trending => self.trending,
            CacheKey::ProviderTrending(ProviderId::Video) => self.video_trending,
            CacheKey::ProviderTrending(_) => self.audio_trending,
            CacheKey::Search(_) => self.search,
        }
    }
}

/// A fresh entry returned by [`ResultCache::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Aggregation result cache over a [`CacheRepository`].
#[derive(Clone)]
pub struct ResultCache {
    repository: Arc<dyn CacheRepository>,
    ttls: CacheTtls,
}

impl ResultCache {
    pub fn new(repository: Arc<dyn CacheRepository>, ttls: CacheTtls) -> Self {
        Self { repository, ttls }
    }

    /// The newest entry for `key`, if it is still fresh.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get_at(key, now_ms()).await
    }

    async fn get_at(&self, key: &CacheKey, now: i64) -> Option<CacheEntry> {
        let storage_key = key.as_storage_key();
        let row = match self.repository.find_latest(&storage_key).await {
            Ok(row) => row?,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let ttl_ms = i64::try_from(self.ttls.ttl(key).as_millis()).unwrap_or(i64::MAX);
        if row.age_ms(now) >= ttl_ms {
            debug!(key = %storage_key, "Cache entry expired");
            return None;
        }

        match serde_json::from_str(&row.payload) {
            Ok(payload) => Some(CacheEntry {
                key: row.cache_key,
                payload,
                cached_at: ms_to_datetime(row.cached_at),
            }),
            Err(e) => {
                warn!(
                    key = %storage_key,
                    error = %e,
                    "Cached payload unreadable, treating as miss"
                );
                None
            }
        }
    }

    /// Typed lookup; an undecodable payload is a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = self.get(key).await?;
        match entry.decode() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %entry.key, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    /// Store a new entry stamped now. Failures are logged and swallowed.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, payload: &T) {
        let storage_key = key.as_storage_key();
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Failed to encode cache payload");
                return;
            }
        };

        let entry = CacheEntryDbModel::new(storage_key.clone(), json);
        if let Err(e) = self.repository.insert(&entry).await {
            warn!(key = %storage_key, error = %e, "Cache write failed, result served uncached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::MemoryCacheRepository;
    use async_trait::async_trait;

    const HOUR_MS: i64 = 3_600_000;

    fn cache() -> (ResultCache, Arc<MemoryCacheRepository>) {
        let repo = Arc::new(MemoryCacheRepository::new());
        (ResultCache::new(repo.clone(), CacheTtls::default()), repo)
    }

    async fn insert_aged(repo: &MemoryCacheRepository, key: &CacheKey, payload: &str, age_ms: i64) {
        let mut entry = CacheEntryDbModel::new(key.as_storage_key(), payload);
        entry.cached_at = now_ms() - age_ms;
        repo.insert(&entry).await.unwrap();
    }

    #[test]
    fn search_keys_are_normalized() {
        assert_eq!(
            CacheKey::search("  LoFi Beats ").unwrap().as_storage_key(),
            "search:lofi beats"
        );
        assert_eq!(CacheKey::search("   "), None);
        assert_eq!(CacheKey::ProviderTrending(ProviderId::Video).to_string(), "trending:video");
    }

    #[test]
    fn ttls_per_key_family() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.ttl(&CacheKey::Trending), Duration::from_secs(86_400));
        assert_eq!(
            ttls.ttl(&CacheKey::ProviderTrending(ProviderId::Audio)),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            ttls.ttl(&CacheKey::ProviderTrending(ProviderId::Video)),
            Duration::from_secs(172_800)
        );
        assert_eq!(ttls.ttl(&CacheKey::search("x").unwrap()), Duration::from_secs(3_600));
    }

    #[tokio::test]
    async fn fresh_entry_is_returned() {
        let (cache, repo) = cache();
        insert_aged(&repo, &CacheKey::Trending, r#"{"n":1}"#, 23 * HOUR_MS).await;

        let entry = cache.get(&CacheKey::Trending).await.unwrap();
        assert_eq!(entry.payload["n"], 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let (cache, repo) = cache();
        insert_aged(&repo, &CacheKey::Trending, r#"{"n":1}"#, 25 * HOUR_MS).await;

        assert!(cache.get(&CacheKey::Trending).await.is_none());
    }

    #[tokio::test]
    async fn entry_exactly_at_ttl_is_a_miss() {
        let (cache, repo) = cache();
        let mut entry = CacheEntryDbModel::new("trending", "{}");
        entry.cached_at = 1_000;
        repo.insert(&entry).await.unwrap();

        assert!(cache.get_at(&CacheKey::Trending, 1_000 + 24 * HOUR_MS - 1).await.is_some());
        assert!(cache.get_at(&CacheKey::Trending, 1_000 + 24 * HOUR_MS).await.is_none());
    }

    #[tokio::test]
    async fn video_trending_lives_longer() {
        let (cache, repo) = cache();
        let key = CacheKey::ProviderTrending(ProviderId::Video);
        insert_aged(&repo, &key, "[]", 30 * HOUR_MS).await;

        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn newest_entry_wins() {
        let (cache, repo) = cache();
        insert_aged(&repo, &CacheKey::Trending, r#""older""#, 2 * HOUR_MS).await;
        insert_aged(&repo, &CacheKey::Trending, r#""newer""#, HOUR_MS).await;

        let value: String = cache.get_as(&CacheKey::Trending).await.unwrap();
        assert_eq!(value, "newer");
    }

    #[tokio::test]
    async fn put_then_get_returns_payload() {
        let (cache, repo) = cache();
        let key = CacheKey::search("Rain").unwrap();

        cache.put(&key, &vec!["a", "b"]).await;
        cache.put(&key, &vec!["c"]).await;

        assert_eq!(repo.len_for("search:rain"), 2);
        let value: Vec<String> = cache.get_as(&key).await.unwrap();
        assert_eq!(value, vec!["c"]);
    }

    struct BrokenRepository;

    #[async_trait]
    impl CacheRepository for BrokenRepository {
        async fn find_latest(&self, _: &str) -> crate::Result<Option<CacheEntryDbModel>> {
            Err(crate::Error::Other("disk gone".into()))
        }
        async fn insert(&self, _: &CacheEntryDbModel) -> crate::Result<()> {
            Err(crate::Error::Other("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn storage_failures_degrade_to_miss() {
        let cache = ResultCache::new(Arc::new(BrokenRepository), CacheTtls::default());

        cache.put(&CacheKey::Trending, &"value").await;
        assert!(cache.get(&CacheKey::Trending).await.is_none());
    }
}
