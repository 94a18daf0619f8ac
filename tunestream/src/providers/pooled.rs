//! Provider client bound to its credential pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{ProviderClient, SearchRequest};
use crate::credentials::KeyRotationPool;
use crate::domain::Track;

/// A provider client plus the credentials it fails over across.
///
/// This is where provider failures stop: [`search`](Self::search) never
/// errors, it logs and returns an empty list so sibling providers still answer.
#[derive(Clone)]
pub struct PooledProvider {
    client: Arc<dyn ProviderClient>,
    pool: Arc<KeyRotationPool>,
    timeout: Duration,
}

impl PooledProvider {
    pub fn new(
        client: Arc<dyn ProviderClient>,
        pool: Arc<KeyRotationPool>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            pool,
            timeout,
        }
    }

    /// Search with credential failover, bounded by the provider timeout.
    pub async fn search(&self, request: &SearchRequest) -> Vec<Track> {
        let provider = self.client.provider();
        let client = &self.client;
        let call = self.pool.with_credential(provider, |credential| async move {
            client.search(&credential, request).await
        });

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(tracks)) => tracks,
            Ok(Err(error)) => {
                warn!(
                    %provider,
                    query = %request.query,
                    error = %error,
                    "Provider unavailable, returning no results"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    %provider,
                    query = %request.query,
                    timeout = ?self.timeout,
                    "Provider timed out, returning no results"
                );
                Vec::new()
            }
        }
    }
}
