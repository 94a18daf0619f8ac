//! Local song catalog access.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::SongDbModel;
use crate::domain::Track;

/// Source of the app's own songs.
#[async_trait]
pub trait LocalCatalog: Send + Sync {
    /// A random sample of up to `limit` songs.
    async fn sample(&self, limit: u32) -> Result<Vec<Track>>;
}

/// SQLx implementation of LocalCatalog over the `songs` table.
pub struct SqlxLocalCatalog {
    pool: SqlitePool,
    default_image: String,
}

impl SqlxLocalCatalog {
    pub fn new(pool: SqlitePool, default_image: impl Into<String>) -> Self {
        Self {
            pool,
            default_image: default_image.into(),
        }
    }
}

#[async_trait]
impl LocalCatalog for SqlxLocalCatalog {
    async fn sample(&self, limit: u32) -> Result<Vec<Track>> {
        let songs = sqlx::query_as::<_, SongDbModel>(
            r#"
            SELECT id, title, artist, image_url, audio_url, duration, created_at
            FROM songs
            ORDER BY RANDOM()
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(songs
            .into_iter()
            .map(|song| song.into_track(&self.default_image))
            .collect())
    }
}

/// Catalog with no songs, used when no database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCatalog;

#[async_trait]
impl LocalCatalog for EmptyCatalog {
    async fn sample(&self, _limit: u32) -> Result<Vec<Track>> {
        Ok(Vec::new())
    }
}
