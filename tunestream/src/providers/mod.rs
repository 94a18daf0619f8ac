//! External content provider clients.
//!
//! Each client maps one provider's loosely-typed JSON into [`Track`]s. Clients
//! return `Result`s so the [`KeyRotationPool`](crate::credentials::KeyRotationPool)
//! can fail over; [`PooledProvider`] is the boundary where failures turn into
//! empty lists.

mod audio;
mod duration;
mod error;
mod http;
mod pooled;
mod video;

use async_trait::async_trait;

pub use audio::{AudioCatalogClient, DEFAULT_BASE_URL as AUDIO_BASE_URL};
pub use duration::parse_duration_secs;
pub use error::ProviderError;
pub use http::build_client;
pub use pooled::PooledProvider;
pub use video::{DEFAULT_BASE_URL as VIDEO_BASE_URL, VideoSearchClient};

use crate::credentials::CredentialSlot;
use crate::domain::{ProviderId, Track};

/// Fallback artwork when a provider has no usable image.
pub const DEFAULT_IMAGE: &str = "/Fillflow.png";

/// One search against one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    /// Restrict to the provider's music category, when it has one.
    pub music_only: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            limit,
            music_only: false,
        }
    }

    pub fn music_only(mut self) -> Self {
        self.music_only = true;
        self
    }
}

/// Typed client for one external provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider this client talks to.
    fn provider(&self) -> ProviderId;

    /// Search with one credential. Any failure is retryable with the next one.
    async fn search(
        &self,
        credential: &CredentialSlot,
        request: &SearchRequest,
    ) -> Result<Vec<Track>, ProviderError>;
}
