//! Data models for the map pipeline
//!
//! This module contains the core domain models organized by concern:
//! - Location: queries and coordinates
//! - Aoi: the area a map is drawn for
//! - Search: place-search suggestions
//! - Geometry: tagged features fetched for an AOI
//! - Render: visual settings passed to the renderer

pub mod aoi;
pub mod geometry;
pub mod location;
pub mod render;
pub mod search;

// Re-export all public types for convenient access
pub use aoi::{AoiKey, AoiShape, AreaOfInterest, Bounds};
pub use geometry::{Feature, FeatureClass, GeometryCollection};
pub use location::{Coordinates, LocationParser, LocationQuery};
pub use render::RenderConfig;
pub use search::SearchResult;
