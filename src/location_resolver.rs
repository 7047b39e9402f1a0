//! Location Resolution Module
//!
//! This module turns location queries (coordinates or free text) into an
//! [`AreaOfInterest`] of a given radius and shape.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::MapError;
use crate::models::aoi::validate_radius;
use crate::models::{AoiShape, AreaOfInterest, Coordinates, LocationQuery};
use crate::search::{MIN_QUERY_CHARS, NominatimClient};

/// A forward geocoding service
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for a free-text address
    async fn locate(&self, address: &str) -> Result<Coordinates, MapError>;

    /// Resolve a location query into an AOI polygon.
    ///
    /// Coordinate queries never touch the network. Every failure to find a
    /// place is reported as [`MapError::Geocoding`].
    async fn resolve(
        &self,
        query: &LocationQuery,
        radius_m: u32,
        shape: AoiShape,
    ) -> Result<AreaOfInterest, MapError> {
        debug!("Resolving location query: {:?}", query);
        validate_radius(radius_m)?;

        let center = match query {
            LocationQuery::Coordinates(coords) => *coords,
            LocationQuery::Text(text) => {
                let text = text.trim();
                if text.chars().count() < MIN_QUERY_CHARS {
                    return Err(MapError::geocoding(format!(
                        "Location '{text}' is too short to look up"
                    )));
                }
                self.locate(text).await?
            }
        };

        let aoi = AreaOfInterest::new(center, radius_m, shape)?;
        debug!(
            "Resolved AOI around ({}, {}) with bounds {:?}",
            center.latitude,
            center.longitude,
            aoi.bounds().as_tuple()
        );
        Ok(aoi)
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn locate(&self, address: &str) -> Result<Coordinates, MapError> {
        debug!("Geocoding location name: {}", address);

        let places = self.search_raw(address, 1).await.map_err(|e| match e {
            MapError::Upstream { message } => MapError::geocoding(message),
            other => other,
        })?;

        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| MapError::geocoding(format!("Location not found: {address}")))?;

        let latitude = place.lat.parse::<f64>();
        let longitude = place.lon.parse::<f64>();
        let coords = match (latitude, longitude) {
            (Ok(lat), Ok(lon)) => Coordinates::new(lat, lon)
                .map_err(|e| MapError::geocoding(format!("Bad coordinates for {address}: {e}")))?,
            _ => {
                return Err(MapError::geocoding(format!(
                    "Geocoder returned malformed coordinates for {address}"
                )));
            }
        };

        info!(
            "Found location: {} ({:.4}, {:.4})",
            place.display_name.as_deref().unwrap_or(address),
            coords.latitude,
            coords.longitude
        );
        Ok(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Knows a single place; everything else is "not found"
    struct FakeGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn locate(&self, address: &str) -> Result<Coordinates, MapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.eq_ignore_ascii_case("Central Park NYC") {
                Coordinates::new(40.7829, -73.9654)
            } else {
                Err(MapError::geocoding(format!("Location not found: {address}")))
            }
        }
    }

    fn geocoder() -> FakeGeocoder {
        FakeGeocoder {
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_resolve_text_query() {
        let geocoder = geocoder();
        let query = LocationQuery::Text("Central Park NYC".to_string());
        let aoi = geocoder.resolve(&query, 500, AoiShape::Circle).await.unwrap();

        assert_eq!(aoi.radius_m(), 500);
        assert_eq!(aoi.center().latitude, 40.7829);
        assert!((aoi.projected_bounds().width() - 1000.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_resolve_coordinates_skips_geocoder() {
        let geocoder = geocoder();
        let query = LocationQuery::Coordinates(Coordinates::new(38.7075, -9.1364).unwrap());
        let aoi = geocoder
            .resolve(&query, 1000, AoiShape::Rectangle)
            .await
            .unwrap();

        assert_eq!(aoi.shape(), AoiShape::Rectangle);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_and_garbage_queries_fail_with_geocoding_error() {
        let geocoder = geocoder();

        let empty = geocoder
            .resolve(&LocationQuery::Text("  ".to_string()), 500, AoiShape::Circle)
            .await;
        assert!(matches!(empty, Err(MapError::Geocoding { .. })));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);

        let garbage = geocoder
            .resolve(
                &LocationQuery::Text("xq#@!zzv qqq".to_string()),
                500,
                AoiShape::Circle,
            )
            .await;
        assert!(matches!(garbage, Err(MapError::Geocoding { .. })));
    }

    #[tokio::test]
    async fn test_radius_out_of_range_is_rejected_before_lookup() {
        let geocoder = geocoder();
        let query = LocationQuery::Text("Central Park NYC".to_string());
        let result = geocoder.resolve(&query, 50, AoiShape::Circle).await;

        assert!(matches!(result, Err(MapError::Validation { .. })));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }
}
