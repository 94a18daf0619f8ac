//! Provider credential management.
//!
//! - [`CredentialSlot`]: one configured key (and optional secret)
//! - [`KeyRotationPool`]: tries a provider's slots in order until one works

mod error;
mod pool;
mod types;

pub use error::CredentialError;
pub use pool::KeyRotationPool;
pub use types::{CredentialSlot, slots_from_keys};
