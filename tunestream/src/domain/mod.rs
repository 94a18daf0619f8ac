//! Domain types shared across the service.

pub mod track;

pub use track::{ProviderId, Track};
