//! Database models.
//!
//! These map directly to the schema in `migrations/`.

pub mod cache_entry;
pub mod song;

pub use cache_entry::*;
pub use song::*;
