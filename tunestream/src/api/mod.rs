//! HTTP API.
//!
//! Media playback, search and trending endpoints, plus health and runtime
//! logging control.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
