//! Cache entry database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored aggregation result.
///
/// Rows are never updated; a refresh inserts a newer row for the same key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct CacheEntryDbModel {
    /// Unique identifier (UUID)
    pub id: String,
    /// Logical key, e.g. `trending` or `search:lofi beats`
    pub cache_key: String,
    /// JSON-encoded payload
    pub payload: String,
    /// Unix epoch milliseconds (UTC) when the entry was written.
    pub cached_at: i64,
}

impl CacheEntryDbModel {
    pub fn new(cache_key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            cache_key: cache_key.into(),
            payload: payload.into(),
            cached_at: crate::database::time::now_ms(),
        }
    }

    /// Age of the entry in milliseconds relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.cached_at)
    }
}
