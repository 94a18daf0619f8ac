//! Shared HTTP plumbing for provider clients.

use std::time::Duration;

use reqwest::{Client, Response};

use super::error::ProviderError;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Longest upstream error body kept in a [`ProviderError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client used for every provider request.
///
/// `timeout` bounds each request end to end so one slow provider cannot hold an
/// aggregation open.
pub fn build_client(timeout: Duration) -> Client {
    match Client::builder()
        .user_agent(DEFAULT_UA)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Failed to build provider HTTP client; falling back to reqwest defaults"
            );
            Client::new()
        }
    }
}

/// Fail on non-2xx responses, keeping a bounded excerpt of the body.
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Decode a JSON body into a typed response.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, ProviderError> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Treat empty strings as absent.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
