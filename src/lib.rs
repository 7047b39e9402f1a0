//! `prettymap` - location resolution and geometry caching for map posters
//!
//! This library turns free-text or coordinate input into an area of interest,
//! fetches the OpenStreetMap geometries inside it and caches the remote calls
//! so repeated UI interactions stay cheap. Drawing the poster is left to a
//! [`pipeline::Renderer`] supplied by the caller.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod import;
pub mod location_resolver;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod service;
pub mod web;

// Re-export core types for public API
pub use cache::{CacheStats, ResultCache};
pub use config::MapConfig;
pub use error::MapError;
pub use geometry::{GeometryFetcher, OverpassClient};
pub use location_resolver::Geocoder;
pub use models::{
    AoiShape, AreaOfInterest, Bounds, Coordinates, Feature, FeatureClass, GeometryCollection,
    LocationParser, LocationQuery, RenderConfig, SearchResult,
};
pub use pipeline::{MapRequest, PipelineRun, PreparedMap, Renderer, Stage};
pub use search::{LocationSearch, NominatimClient, PlaceSearch};
pub use service::MapService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
