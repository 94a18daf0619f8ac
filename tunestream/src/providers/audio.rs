//! Audio-catalog provider client (Jamendo v3 shape).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::error::ProviderError;
use super::http::{check_status, non_empty, read_json};
use super::{DEFAULT_IMAGE, ProviderClient, SearchRequest};
use crate::credentials::CredentialSlot;
use crate::domain::{ProviderId, Track};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.jamendo.com/v3.0";

/// Image size requested from the catalog.
const IMAGE_SIZE: &str = "600";

#[derive(Debug, Deserialize)]
struct TracksResponse {
    #[serde(default)]
    headers: Option<ResponseHeaders>,
    #[serde(default)]
    results: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct ResponseHeaders {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    audio: String,
    album_image: Option<String>,
    image: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    duration: u64,
}

/// Catalog ids arrive as strings or bare numbers depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Durations are whole seconds as a number or numeric string; anything else is `0`.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    })
}

/// Client for the audio-catalog provider.
///
/// Tracks carry a direct audio URL, so no local stream route is involved.
pub struct AudioCatalogClient {
    http: Client,
    base_url: String,
    default_image: String,
}

impl AudioCatalogClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_image: DEFAULT_IMAGE.to_string(),
        }
    }

    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    fn into_track(&self, item: TrackItem) -> Track {
        let image = non_empty(item.album_image.as_deref())
            .or(non_empty(item.image.as_deref()))
            .unwrap_or(&self.default_image)
            .to_string();

        Track {
            provider: ProviderId::Audio,
            source_ref: item.id,
            title: item.name,
            artist_name: item.artist_name,
            thumbnail_url: image,
            duration_seconds: item.duration,
            playable_ref: item.audio,
        }
    }
}

#[async_trait]
impl ProviderClient for AudioCatalogClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Audio
    }

    async fn search(
        &self,
        credential: &CredentialSlot,
        request: &SearchRequest,
    ) -> Result<Vec<Track>, ProviderError> {
        let limit = request.limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", credential.key.as_str()),
            ("format", "json"),
            ("limit", limit.as_str()),
            ("search", request.query.as_str()),
            ("audioformat", "mp32"),
            ("imagesize", IMAGE_SIZE),
        ];
        if let Some(secret) = credential.secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .http
            .get(format!("{}/tracks/", self.base_url))
            .query(&params)
            .send()
            .await?;
        let body: TracksResponse = read_json(check_status(response).await?).await?;

        // The catalog reports bad credentials with a 200 and a failed envelope.
        if let Some(headers) = &body.headers {
            if headers.status.eq_ignore_ascii_case("failed") {
                let message = if headers.error_message.is_empty() {
                    "request failed".to_string()
                } else {
                    headers.error_message.clone()
                };
                return Err(ProviderError::Api(message));
            }
        }

        debug!(query = %request.query, count = body.results.len(), "Audio search returned");
        Ok(body
            .results
            .into_iter()
            .map(|item| self.into_track(item))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn tracks_handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        if params.get("client_id").map(String::as_str) != Some("good") {
            return Json(json!({
                "headers": {"status": "failed", "code": 5, "error_message": "Invalid client_id"},
                "results": []
            }));
        }
        assert_eq!(params.get("audioformat").map(String::as_str), Some("mp32"));
        assert_eq!(params.get("client_secret").map(String::as_str), Some("shh"));
        let limit: usize = params["limit"].parse().unwrap();

        let all = json!([
            {
                "id": "1001",
                "name": "Sunrise",
                "artist_name": "Band A",
                "audio": "https://cdn/1001.mp3",
                "album_image": "https://img/album.jpg",
                "image": "https://img/track.jpg",
                "duration": 215
            },
            {
                "id": 1002,
                "name": "Noon",
                "artist_name": "Band B",
                "audio": "https://cdn/1002.mp3",
                "album_image": "",
                "image": "https://img/1002.jpg",
                "duration": "187"
            },
            {
                "id": "1003",
                "name": "Dusk",
                "artist_name": "Band C",
                "audio": "https://cdn/1003.mp3",
                "duration": null
            }
        ]);
        let results: Vec<Value> = all.as_array().unwrap().iter().take(limit).cloned().collect();
        Json(json!({
            "headers": {"status": "success", "code": 0, "error_message": ""},
            "results": results
        }))
    }

    async fn spawn_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/tracks/", get(tracks_handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn credential(key: &str) -> CredentialSlot {
        CredentialSlot::new(ProviderId::Audio, 0, key).with_secret("shh")
    }

    #[tokio::test]
    async fn search_maps_results() {
        let base = spawn_upstream().await;
        let client = AudioCatalogClient::new(Client::new(), base);

        let tracks = client
            .search(&credential("good"), &SearchRequest::new("pop", 6))
            .await
            .unwrap();

        assert_eq!(tracks.len(), 3);

        assert_eq!(tracks[0].source_ref, "1001");
        assert_eq!(tracks[0].title, "Sunrise");
        assert_eq!(tracks[0].artist_name, "Band A");
        assert_eq!(tracks[0].thumbnail_url, "https://img/album.jpg");
        assert_eq!(tracks[0].duration_seconds, 215);
        assert_eq!(tracks[0].playable_ref, "https://cdn/1001.mp3");

        assert_eq!(tracks[1].source_ref, "1002");
        assert_eq!(tracks[1].thumbnail_url, "https://img/1002.jpg");
        assert_eq!(tracks[1].duration_seconds, 187);

        assert_eq!(tracks[2].thumbnail_url, DEFAULT_IMAGE);
        assert_eq!(tracks[2].duration_seconds, 0);
        assert!(tracks.iter().all(|t| t.provider == ProviderId::Audio));
    }

    #[tokio::test]
    async fn limit_is_forwarded() {
        let base = spawn_upstream().await;
        let client = AudioCatalogClient::new(Client::new(), base);

        let tracks = client
            .search(&credential("good"), &SearchRequest::new("pop", 2))
            .await
            .unwrap();

        assert_eq!(tracks.len(), 2);
    }

    #[tokio::test]
    async fn failed_envelope_is_an_api_error() {
        let base = spawn_upstream().await;
        let client = AudioCatalogClient::new(Client::new(), base);

        let err = client
            .search(&credential("bad"), &SearchRequest::new("pop", 6))
            .await
            .unwrap_err();

        match err {
            ProviderError::Api(message) => assert_eq!(message, "Invalid client_id"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_default_image_is_used() {
        let base = spawn_upstream().await;
        let client = AudioCatalogClient::new(Client::new(), base).with_default_image("/art.png");

        let tracks = client
            .search(&credential("good"), &SearchRequest::new("pop", 6))
            .await
            .unwrap();

        assert_eq!(tracks[2].thumbnail_url, "/art.png");
    }
}
