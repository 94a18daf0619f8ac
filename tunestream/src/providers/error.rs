//! Provider error types.

use std::time::Duration;

use thiserror::Error;

/// Failure of one provider call.
///
/// Every variant counts as retryable for the key rotation pool; outside the pool
/// the failure degrades that provider's contribution to an empty list.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),
}
