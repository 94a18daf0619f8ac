//! Aggregation service.
//!
//! Answers trending and search requests from the cache when it can, otherwise
//! fans out to the providers in parallel. A provider that fails contributes an
//! empty list; it never fails its sibling or the overall call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::database::repositories::LocalCatalog;
use crate::domain::{ProviderId, Track};
use crate::providers::{PooledProvider, SearchRequest};

/// Combined trending view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trending {
    /// Songs from the app's own catalog.
    pub local: Vec<Track>,
    /// Songs from the audio-catalog provider.
    pub external: Vec<Track>,
}

impl Trending {
    fn is_empty(&self) -> bool {
        self.local.is_empty() && self.external.is_empty()
    }
}

/// Search results, one list per provider in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub video_provider: Vec<Track>,
    pub audio_provider: Vec<Track>,
}

impl SearchResults {
    fn is_empty(&self) -> bool {
        self.video_provider.is_empty() && self.audio_provider.is_empty()
    }
}

/// Trending list of a single provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTracks {
    pub tracks: Vec<Track>,
}

/// Result sizes and seed queries.
#[derive(Debug, Clone)]
pub struct AggregationLimits {
    pub local_sample: u32,
    pub external_trending: u32,
    pub video_trending: u32,
    pub search_per_provider: u32,
    /// Query the audio provider's "trending" list is seeded with.
    pub audio_trending_query: String,
    /// Query the video provider's "trending" list is seeded with.
    pub video_trending_query: String,
}

impl Default for AggregationLimits {
    fn default() -> Self {
        Self {
            local_sample: 4,
            external_trending: 6,
            video_trending: 10,
            search_per_provider: 6,
            audio_trending_query: "pop".to_string(),
            video_trending_query: "trending songs".to_string(),
        }
    }
}

/// Orchestrates providers, the local catalog and the result cache.
#[derive(Clone)]
pub struct AggregationService {
    video: PooledProvider,
    audio: PooledProvider,
    catalog: Arc<dyn LocalCatalog>,
    cache: ResultCache,
    limits: AggregationLimits,
}

impl AggregationService {
    pub fn new(
        video: PooledProvider,
        audio: PooledProvider,
        catalog: Arc<dyn LocalCatalog>,
        cache: ResultCache,
    ) -> Self {
        Self {
            video,
            audio,
            catalog,
            cache,
            limits: AggregationLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: AggregationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Local sample plus the audio provider's seeded list.
    pub async fn get_trending(&self) -> Trending {
        let key = CacheKey::Trending;
        if let Some(hit) = self.cache.get_as::<Trending>(&key).await {
            debug!(%key, "Cache hit");
            return hit;
        }

        let external_request = SearchRequest::new(
            self.limits.audio_trending_query.as_str(),
            self.limits.external_trending,
        );
        let (local, external) = tokio::join!(
            self.sample_local(),
            self.audio.search(&external_request)
        );

        let trending = Trending { local, external };
        self.store(&key, &trending, trending.is_empty()).await;
        trending
    }

    /// Search both providers. Blank queries return empty lists without any I/O.
    pub async fn search(&self, query: &str) -> SearchResults {
        let Some(key) = CacheKey::search(query) else {
            return SearchResults::default();
        };
        if let Some(hit) = self.cache.get_as::<SearchResults>(&key).await {
            debug!(%key, "Cache hit");
            return hit;
        }

        let request = SearchRequest::new(query.trim(), self.limits.search_per_provider);
        let (video_provider, audio_provider) =
            tokio::join!(self.video.search(&request), self.audio.search(&request));

        let results = SearchResults {
            video_provider,
            audio_provider,
        };
        self.store(&key, &results, results.is_empty()).await;
        results
    }

    /// Trending list of one external provider. `None` for providers without one.
    pub async fn get_provider_trending(&self, provider: ProviderId) -> Option<ProviderTracks> {
        let (pooled, request) = match provider {
            ProviderId::Video => (
                &self.video,
                SearchRequest::new(
                    self.limits.video_trending_query.as_str(),
                    self.limits.video_trending,
                )
                .music_only(),
            ),
            ProviderId::Audio => (
                &self.audio,
                SearchRequest::new(
                    self.limits.audio_trending_query.as_str(),
                    self.limits.external_trending,
                ),
            ),
            ProviderId::Local => return None,
        };

        let key = CacheKey::ProviderTrending(provider);
        if let Some(hit) = self.cache.get_as::<ProviderTracks>(&key).await {
            debug!(%key, "Cache hit");
            return Some(hit);
        }

        let tracks = ProviderTracks {
            tracks: pooled.search(&request).await,
        };
        self.store(&key, &tracks, tracks.tracks.is_empty()).await;
        Some(tracks)
    }

    async fn sample_local(&self) -> Vec<Track> {
        match self.catalog.sample(self.limits.local_sample).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(error = %e, "Local catalog unavailable, returning no songs");
                Vec::new()
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, payload: &T, empty: bool) {
        // An outage would otherwise be served for a full TTL.
        if empty {
            debug!(%key, "All providers returned nothing, not caching");
            return;
        }
        self.cache.put(key, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTtls;
    use crate::credentials::{CredentialSlot, KeyRotationPool, slots_from_keys};
    use crate::database::models::CacheEntryDbModel;
    use crate::database::repositories::{CacheRepository, MemoryCacheRepository};
    use crate::database::time::now_ms;
    use crate::providers::{ProviderClient, ProviderError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeProvider {
        provider: ProviderId,
        fail: bool,
        calls: AtomicUsize,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl FakeProvider {
        fn new(provider: ProviderId, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                provider,
                fail,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn track(provider: ProviderId, id: &str) -> Track {
        Track {
            provider,
            source_ref: id.to_string(),
            title: format!("title {id}"),
            artist_name: "artist".to_string(),
            thumbnail_url: "img".to_string(),
            duration_seconds: 100,
            playable_ref: format!("play/{id}"),
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        fn provider(&self) -> ProviderId {
            self.provider
        }

        async fn search(
            &self,
            _credential: &CredentialSlot,
            request: &SearchRequest,
        ) -> Result<Vec<Track>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ProviderError::Api("down".into()));
            }
            Ok((0..request.limit)
                .map(|i| track(self.provider, &format!("{}-{}-{i}", self.provider, request.query)))
                .collect())
        }
    }

    struct FakeCatalog {
        fail: bool,
    }

    #[async_trait]
    impl LocalCatalog for FakeCatalog {
        async fn sample(&self, limit: u32) -> crate::Result<Vec<Track>> {
            if self.fail {
                return Err(crate::Error::Other("db down".into()));
            }
            Ok((0..limit)
                .map(|i| track(ProviderId::Local, &format!("song-{i}")))
                .collect())
        }
    }

    struct Harness {
        service: AggregationService,
        video: Arc<FakeProvider>,
        audio: Arc<FakeProvider>,
        repo: Arc<MemoryCacheRepository>,
    }

    fn harness(video_fails: bool, audio_fails: bool, catalog_fails: bool) -> Harness {
        let video = FakeProvider::new(ProviderId::Video, video_fails);
        let audio = FakeProvider::new(ProviderId::Audio, audio_fails);
        let pool = Arc::new(KeyRotationPool::new(
            slots_from_keys(ProviderId::Video, ["v0"])
                .into_iter()
                .chain(slots_from_keys(ProviderId::Audio, ["a0"])),
        ));
        let repo = Arc::new(MemoryCacheRepository::new());
        let service = AggregationService::new(
            PooledProvider::new(video.clone(), pool.clone(), Duration::from_secs(5)),
            PooledProvider::new(audio.clone(), pool, Duration::from_secs(5)),
            Arc::new(FakeCatalog {
                fail: catalog_fails,
            }),
            ResultCache::new(repo.clone(), CacheTtls::default()),
        );
        Harness {
            service,
            video,
            audio,
            repo,
        }
    }

    #[tokio::test]
    async fn trending_combines_local_and_external() {
        let h = harness(false, false, false);

        let trending = h.service.get_trending().await;

        assert_eq!(trending.local.len(), 4);
        assert_eq!(trending.external.len(), 6);
        assert!(trending.external.iter().all(|t| t.provider == ProviderId::Audio));
        assert_eq!(h.audio.requests.lock().unwrap()[0].query, "pop");
        assert_eq!(h.video.calls(), 0);
    }

    #[tokio::test]
    async fn trending_second_call_is_served_from_cache() {
        let h = harness(false, false, false);

        let first = h.service.get_trending().await;
        let second = h.service.get_trending().await;

        assert_eq!(first, second);
        assert_eq!(h.audio.calls(), 1);
        assert_eq!(h.repo.len_for("trending"), 1);
    }

    /// Store `payload` under `key` as if it had been cached `age` ago.
    async fn seed_aged<T: Serialize>(
        repo: &MemoryCacheRepository,
        key: &str,
        payload: &T,
        age: Duration,
    ) {
        let mut entry = CacheEntryDbModel::new(key, serde_json::to_string(payload).unwrap());
        entry.cached_at = now_ms() - age.as_millis() as i64;
        repo.insert(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn expired_trending_is_aggregated_again() {
        let h = harness(false, false, false);
        let stale = Trending {
            local: vec![track(ProviderId::Local, "stale")],
            external: Vec::new(),
        };
        let ttl = CacheTtls::default().ttl(&CacheKey::Trending);
        seed_aged(&h.repo, "trending", &stale, ttl + Duration::from_secs(1)).await;

        let trending = h.service.get_trending().await;

        assert_ne!(trending, stale);
        assert_eq!(trending.external.len(), 6);
        assert_eq!(h.audio.calls(), 1);
        assert_eq!(h.repo.len_for("trending"), 2);

        // The fresh row now wins over the expired one.
        assert_eq!(h.service.get_trending().await, trending);
        assert_eq!(h.audio.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_search_row_is_served_and_expired_one_is_not() {
        let h = harness(false, false, false);
        let key = CacheKey::search("lofi").unwrap();
        let ttl = CacheTtls::default().ttl(&key);
        let cached = SearchResults {
            video_provider: vec![track(ProviderId::Video, "cached")],
            audio_provider: Vec::new(),
        };

        seed_aged(&h.repo, "search:lofi", &cached, ttl - Duration::from_secs(60)).await;
        assert_eq!(h.service.search("lofi").await, cached);
        assert_eq!(h.video.calls(), 0);

        let h = harness(false, false, false);
        seed_aged(&h.repo, "search:lofi", &cached, ttl + Duration::from_secs(1)).await;
        let results = h.service.search("lofi").await;

        assert_ne!(results, cached);
        assert_eq!(h.video.calls(), 1);
        assert_eq!(h.audio.calls(), 1);
        assert_eq!(h.repo.len_for("search:lofi"), 2);
    }

    #[tokio::test]
    async fn search_runs_both_providers_with_limits() {
        let h = harness(false, false, false);

        let results = h.service.search("  Lofi ").await;

        assert_eq!(results.video_provider.len(), 6);
        assert_eq!(results.audio_provider.len(), 6);
        assert_eq!(results.video_provider[0].source_ref, "video-Lofi-0");
        assert_eq!(h.repo.len_for("search:lofi"), 1);
    }

    #[tokio::test]
    async fn search_cache_is_shared_across_query_spellings() {
        let h = harness(false, false, false);

        h.service.search("Lofi").await;
        h.service.search("  lofi").await;

        assert_eq!(h.video.calls(), 1);
        assert_eq!(h.audio.calls(), 1);
    }

    #[tokio::test]
    async fn failing_provider_does_not_affect_sibling() {
        let h = harness(true, false, false);

        let results = h.service.search("rain").await;

        assert!(results.video_provider.is_empty());
        assert_eq!(results.audio_provider.len(), 6);
    }

    #[tokio::test]
    async fn blank_query_short_circuits() {
        let h = harness(false, false, false);

        let results = h.service.search("   \t").await;

        assert_eq!(results, SearchResults::default());
        assert_eq!(h.video.calls(), 0);
        assert_eq!(h.audio.calls(), 0);
        assert_eq!(h.repo.len_for("search:"), 0);
    }

    #[tokio::test]
    async fn all_empty_result_is_not_cached() {
        let h = harness(true, true, false);

        let results = h.service.search("rain").await;
        assert!(results.video_provider.is_empty() && results.audio_provider.is_empty());
        assert_eq!(h.repo.len_for("search:rain"), 0);

        h.service.search("rain").await;
        assert_eq!(h.video.calls(), 2);
    }

    #[tokio::test]
    async fn catalog_failure_degrades_local_only() {
        let h = harness(false, false, true);

        let trending = h.service.get_trending().await;

        assert!(trending.local.is_empty());
        assert_eq!(trending.external.len(), 6);
    }

    #[tokio::test]
    async fn video_trending_uses_music_category() {
        let h = harness(false, false, false);

        let tracks = h.service.get_provider_trending(ProviderId::Video).await.unwrap();

        assert_eq!(tracks.tracks.len(), 10);
        let request = h.video.requests.lock().unwrap()[0].clone();
        assert_eq!(request.query, "trending songs");
        assert!(request.music_only);
        assert_eq!(h.repo.len_for("trending:video"), 1);
    }

    #[tokio::test]
    async fn local_has_no_provider_trending() {
        let h = harness(false, false, false);
        assert!(h.service.get_provider_trending(ProviderId::Local).await.is_none());
    }

    #[test]
    fn wire_shapes() {
        let search = serde_json::to_value(SearchResults::default()).unwrap();
        assert!(search.get("videoProvider").is_some());
        assert!(search.get("audioProvider").is_some());

        let trending = serde_json::to_value(Trending::default()).unwrap();
        assert!(trending.get("local").is_some());
        assert!(trending.get("external").is_some());
    }
}
