//! Ordered credential failover per provider.

use std::collections::HashMap;
use std::future::Future;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::error::CredentialError;
use super::types::CredentialSlot;
use crate::domain::ProviderId;
use crate::providers::ProviderError;

/// Holds the ordered credential list of every provider and walks it on failure.
///
/// Each call starts again from ordinal 0: a key that failed for one request is
/// tried first again by the next one, and a key that worked is not pinned. The
/// walk is finite, every slot is attempted at most once per call.
pub struct KeyRotationPool {
    slots: HashMap<ProviderId, Vec<CredentialSlot>>,
    /// Failover counters per provider, for diagnostics only.
    failovers: DashMap<ProviderId, u64>,
}

impl KeyRotationPool {
    /// Create a pool from configured slots. Slots are kept in ordinal order.
    pub fn new(slots: impl IntoIterator<Item = CredentialSlot>) -> Self {
        let mut by_provider: HashMap<ProviderId, Vec<CredentialSlot>> = HashMap::new();
        for slot in slots {
            by_provider.entry(slot.provider).or_default().push(slot);
        }
        for list in by_provider.values_mut() {
            list.sort_by_key(|slot| slot.ordinal);
        }

        Self {
            slots: by_provider,
            failovers: DashMap::new(),
        }
    }

    /// Configured credentials for a provider, in the order they are tried.
    pub fn credentials(&self, provider: ProviderId) -> &[CredentialSlot] {
        self.slots.get(&provider).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of failovers recorded for a provider since startup.
    pub fn failover_count(&self, provider: ProviderId) -> u64 {
        self.failovers.get(&provider).map(|c| *c).unwrap_or(0)
    }

    /// Run `operation` with successive credentials until one succeeds.
    ///
    /// Returns the first success. When every slot fails, returns
    /// [`CredentialError::AllCredentialsExhausted`] carrying the last failure.
    pub async fn with_credential<T, F, Fut>(
        &self,
        provider: ProviderId,
        mut operation: F,
    ) -> Result<T, CredentialError>
    where
        F: FnMut(CredentialSlot) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let slots = self.credentials(provider);
        let mut last_error = None;

        for slot in slots {
            let fingerprint = slot.fingerprint();
            match operation(slot.clone()).await {
                Ok(value) => {
                    debug!(%provider, credential = %fingerprint, "Provider call succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        %provider,
                        credential = %fingerprint,
                        error = %e,
                        "Credential failed, trying next"
                    );
                    *self.failovers.entry(provider).or_insert(0) += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(CredentialError::AllCredentialsExhausted {
                provider,
                attempts: slots.len(),
                last,
            }),
            None => Err(CredentialError::NoCredentials(provider)),
        }
    }
}
