//! Media routes: live playback, search and trending.

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use crate::aggregation::{ProviderTracks, SearchResults, Trending};
use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::domain::ProviderId;
use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// Create the media router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stream/{source_ref}", get(stream_audio))
        .route("/search", get(search))
        .route("/trending", get(trending))
        .route("/trending/{provider}", get(provider_trending))
}

/// Stream a source as MP3.
///
/// The first chunk is read before the response is committed, so a pipeline
/// that dies early still gets a JSON error. After that the body is the live
/// transcoder output; dropping it tears the session down.
async fn stream_audio(
    State(state): State<AppState>,
    Path(source_ref): Path<String>,
) -> ApiResult<Response> {
    let stream = state.pipeline.open(&source_ref).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<SearchResults> {
    let q = query.q.unwrap_or_default();
    Json(state.aggregation.search(&q).await)
}

async fn trending(State(state): State<AppState>) -> Json<Trending> {
    Json(state.aggregation.get_trending().await)
}

async fn provider_trending(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Json<ProviderTracks>> {
    let id = ProviderId::parse(&provider).ok_or_else(|| Error::not_found("Provider", &provider))?;

    let tracks = state
        .aggregation
        .get_provider_trending(id)
        .await
        .ok_or_else(|| Error::not_found("Trending list for provider", id.to_string()))?;
    Ok(Json(tracks))
}
