//! tunestream library crate.
//!
//! Provider aggregation with credential failover and caching, and on-demand
//! audio streaming through an extraction and transcode subprocess pair.

pub mod aggregation;
pub mod api;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod database;
pub mod domain;
pub mod error;
pub mod housekeeping;
pub mod logging;
pub mod media;
pub mod presence;
pub mod providers;

pub use error::{Error, Result};
