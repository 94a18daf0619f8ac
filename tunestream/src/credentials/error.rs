//! Credential error types.

use thiserror::Error;

use crate::domain::ProviderId;
use crate::providers::ProviderError;

/// Errors surfaced by the key rotation pool.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credentials configured for the provider.
    #[error("No credentials configured for provider {0}")]
    NoCredentials(ProviderId),

    /// Every configured credential failed once.
    #[error("All {attempts} credentials exhausted for provider {provider}: {last}")]
    AllCredentialsExhausted {
        provider: ProviderId,
        attempts: usize,
        #[source]
        last: ProviderError,
    },
}

impl CredentialError {
    /// Provider the error belongs to.
    pub fn provider(&self) -> ProviderId {
        match self {
            Self::NoCredentials(provider) => *provider,
            Self::AllCredentialsExhausted { provider, .. } => *provider,
        }
    }
}
