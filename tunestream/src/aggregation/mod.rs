//! Trending and search aggregation across providers.

mod service;

pub use service::{AggregationLimits, AggregationService, ProviderTracks, SearchResults, Trending};
