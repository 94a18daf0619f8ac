//! Video-search provider client (YouTube Data API v3 shape).

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::duration::parse_duration_secs;
use super::error::ProviderError;
use super::http::{check_status, non_empty, read_json};
use super::{DEFAULT_IMAGE, ProviderClient, SearchRequest};
use crate::credentials::CredentialSlot;
use crate::domain::{ProviderId, Track};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Category id of "Music".
const MUSIC_CATEGORY_ID: &str = "10";

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    #[serde(rename = "default")]
    standard: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

/// Client for the video-search provider.
///
/// Search results carry no duration, so every search is followed by a
/// `videos` lookup for the returned ids.
pub struct VideoSearchClient {
    http: Client,
    base_url: String,
    /// Root of this service's public URL; playable refs point at its stream route.
    stream_base_url: String,
    default_image: String,
}

impl VideoSearchClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        stream_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            stream_base_url: stream_base_url.into().trim_end_matches('/').to_string(),
            default_image: DEFAULT_IMAGE.to_string(),
        }
    }

    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    /// Look up durations for a batch of video ids.
    ///
    /// Ids missing from the response are absent from the map; unparsable
    /// durations map to `0`.
    pub async fn resolve_durations(
        &self,
        credential: &CredentialSlot,
        ids: &[String],
    ) -> Result<HashMap<String, u64>, ProviderError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .http
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "contentDetails"),
                ("id", ids.join(",").as_str()),
                ("key", credential.key.as_str()),
            ])
            .send()
            .await?;
        let body: VideoListResponse = read_json(check_status(response).await?).await?;

        Ok(body
            .items
            .into_iter()
            .map(|item| {
                let secs = item
                    .content_details
                    .and_then(|c| c.duration)
                    .map(|d| parse_duration_secs(&d))
                    .unwrap_or(0);
                (item.id, secs)
            })
            .collect())
    }

    fn thumbnail(&self, thumbnails: &Thumbnails) -> String {
        let high = thumbnails.high.as_ref().and_then(|t| t.url.as_deref());
        let standard = thumbnails.standard.as_ref().and_then(|t| t.url.as_deref());
        non_empty(high)
            .or(non_empty(standard))
            .unwrap_or(&self.default_image)
            .to_string()
    }

    fn stream_url(&self, video_id: &str) -> String {
        format!("{}/media/stream/{}", self.stream_base_url, video_id)
    }
}

#[async_trait]
impl ProviderClient for VideoSearchClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Video
    }

    async fn search(
        &self,
        credential: &CredentialSlot,
        request: &SearchRequest,
    ) -> Result<Vec<Track>, ProviderError> {
        let limit = request.limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("part", "snippet"),
            ("q", request.query.as_str()),
            ("type", "video"),
            ("maxResults", limit.as_str()),
            ("videoDuration", "medium"),
            ("key", credential.key.as_str()),
        ];
        if request.music_only {
            params.push(("videoCategoryId", MUSIC_CATEGORY_ID));
        }

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&params)
            .send()
            .await?;
        let body: SearchListResponse = read_json(check_status(response).await?).await?;

        let items: Vec<(String, Snippet)> = body
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id.filter(|id| !id.is_empty())?;
                Some((id, item.snippet))
            })
            .collect();
        debug!(query = %request.query, count = items.len(), "Video search returned");

        let ids: Vec<String> = items.iter().map(|(id, _)| id.clone()).collect();
        let durations = self.resolve_durations(credential, &ids).await?;

        Ok(items
            .into_iter()
            .map(|(id, snippet)| Track {
                provider: ProviderId::Video,
                title: snippet.title,
                artist_name: snippet.channel_title,
                thumbnail_url: self.thumbnail(&snippet.thumbnails),
                duration_seconds: durations.get(&id).copied().unwrap_or(0),
                playable_ref: self.stream_url(&id),
                source_ref: id,
            })
            .collect())
    }
}
