//! Credential types.

use crate::domain::ProviderId;

/// One API key (and optional secret) usable against a provider.
///
/// Read-only after startup. `Debug` never prints the key or the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSlot {
    pub provider: ProviderId,
    /// Position in the configured order, starting at 0.
    pub ordinal: usize,
    pub key: String,
    pub secret: Option<String>,
}

impl CredentialSlot {
    pub fn new(provider: ProviderId, ordinal: usize, key: impl Into<String>) -> Self {
        Self {
            provider,
            ordinal,
            key: key.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Short fingerprint safe to log: the last four characters of the key.
    pub fn fingerprint(&self) -> String {
        let tail: String = self
            .key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("#{}(…{})", self.ordinal, tail)
    }
}

impl std::fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("provider", &self.provider)
            .field("ordinal", &self.ordinal)
            .field("key", &"<redacted>")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Build ordered slots for a provider from raw keys, skipping blanks.
pub fn slots_from_keys<I, S>(provider: ProviderId, keys: I) -> Vec<CredentialSlot>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty())
        .enumerate()
        .map(|(ordinal, key)| CredentialSlot::new(provider, ordinal, key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let slot =
            CredentialSlot::new(ProviderId::Audio, 0, "client-id-1234").with_secret("s3cr3t");
        let rendered = format!("{slot:?}");
        assert!(!rendered.contains("client-id"));
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn slots_skip_blank_keys_and_number_in_order() {
        let slots = slots_from_keys(ProviderId::Video, ["a", " ", "b", ""]);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].key, "a");
        assert_eq!(slots[0].ordinal, 0);
        assert_eq!(slots[1].key, "b");
        assert_eq!(slots[1].ordinal, 1);
    }

    #[test]
    fn fingerprint_shows_only_tail() {
        let slot = CredentialSlot::new(ProviderId::Video, 2, "AIzaSyABCDEFG");
        assert_eq!(slot.fingerprint(), "#2(…DEFG)");
    }
}
