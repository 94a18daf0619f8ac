//! Local song catalog database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{ProviderId, Track};

/// A song uploaded to the app's own catalog.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SongDbModel {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub image_url: String,
    pub audio_url: String,
    /// Whole seconds.
    pub duration: i64,
    /// Unix epoch milliseconds (UTC).
    pub created_at: i64,
}

impl SongDbModel {
    /// Normalize into a [`Track`], substituting `default_image` for a missing cover.
    pub fn into_track(self, default_image: &str) -> Track {
        let image = if self.image_url.trim().is_empty() {
            default_image.to_string()
        } else {
            self.image_url
        };

        Track {
            provider: ProviderId::Local,
            source_ref: self.id,
            title: self.title,
            artist_name: self.artist,
            thumbnail_url: image,
            duration_seconds: u64::try_from(self.duration).unwrap_or(0),
            playable_ref: self.audio_url,
        }
    }
}
