//! Repository layer for database access.

pub mod cache;
pub mod catalog;

pub use cache::*;
pub use catalog::*;
