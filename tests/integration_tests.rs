//! End-to-end tests of the map pipeline against in-process fakes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use geo_types::{LineString, Polygon};

use prettymap::config::MapConfig;
use prettymap::export::export_geojson;
use prettymap::models::{FeatureClass, LocationParser};
use prettymap::pipeline::{MapRequest, Stage};
use prettymap::{
    AreaOfInterest, Coordinates, Feature, GeometryCollection, GeometryFetcher, Geocoder,
    MapError, MapService, PlaceSearch, RenderConfig, SearchResult,
};

#[derive(Default)]
struct World {
    geocode_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

#[async_trait]
impl Geocoder for World {
    async fn locate(&self, address: &str) -> Result<Coordinates, MapError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        match address.to_lowercase().as_str() {
            "central park nyc" => Coordinates::new(40.7829, -73.9654),
            _ => Err(MapError::geocoding(format!("Location not found: {address}"))),
        }
    }
}

#[async_trait]
impl GeometryFetcher for World {
    async fn fetch(&self, aoi: &AreaOfInterest) -> Result<GeometryCollection, MapError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;

        let b = aoi.bounds();
        let (cx, cy) = ((b.min_x + b.max_x) / 2.0, (b.min_y + b.max_y) / 2.0);
        let d = b.width().min(b.height()) / 10.0;
        let mut tags = BTreeMap::new();
        tags.insert("leisure".to_string(), "park".to_string());
        let park = Polygon::new(
            LineString::from(vec![(cx - d, cy - d), (cx + d, cy - d), (cx + d, cy + d), (cx - d, cy - d)]),
            vec![],
        );
        Ok(GeometryCollection::new(vec![Feature::new(park.into(), tags)]))
    }
}

#[async_trait]
impl PlaceSearch for World {
    async fn fetch_places(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MapError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let result = |label: &str, importance: f64| SearchResult {
            label: label.to_string(),
            address: format!("{label}, New York, United States"),
            latitude: 40.7829,
            longitude: -73.9654,
            place_type: "park".to_string(),
            place_class: "leisure".to_string(),
            importance,
        };
        let mut results = vec![result("Central Park", 0.82), result(query, 0.1)];
        results.truncate(limit);
        Ok(results)
    }
}

fn service() -> (MapService, Arc<World>) {
    let world = Arc::new(World::default());
    let service = MapService::new(
        world.clone(),
        world.clone(),
        world.clone(),
        &MapConfig::default(),
    );
    (service, world)
}

fn central_park(radius_m: u32) -> MapRequest {
    MapRequest::for_location(
        LocationParser::parse("Central Park NYC"),
        radius_m,
        RenderConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_geometry_fetch() {
    let (service, world) = service();
    let request = central_park(500);

    let (a, b) = tokio::join!(service.prepare(&request), service.prepare(&request));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(world.fetch_calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&a.geometries, &b.geometries));
    // geocoding is not cached
    assert_eq!(world.geocode_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_prepared_map_describes_the_aoi() {
    let (service, _) = service();
    let map = service.prepare(&central_park(1000)).await.unwrap();

    let (min_x, min_y, max_x, max_y) = map.aoi_bounds.as_tuple();
    assert!(min_x < -73.9654 && -73.9654 < max_x);
    assert!(min_y < 40.7829 && 40.7829 < max_y);
    assert_eq!(map.geometries.class_counts()[&FeatureClass::Park], 1);
    assert_eq!(map.config, RenderConfig::default());
}

#[tokio::test(start_paused = true)]
async fn test_search_is_cached_for_five_minutes() {
    let (service, world) = service();

    let first = service.search("central park", 5).await;
    assert_eq!(first[0].label, "Central Park");
    assert_eq!(first[0].type_label(), "park (leisure)");

    // whitespace and case normalise to the same key
    service.search("  Central   PARK ", 5).await;
    assert_eq!(world.search_calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(301)).await;
    service.search("central park", 5).await;
    assert_eq!(world.search_calls.load(Ordering::SeqCst), 2);

    assert!(service.search("c", 5).await.is_empty());
    assert_eq!(world.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_place_fails_before_fetching() {
    let (service, world) = service();
    let request = MapRequest::for_location(
        LocationParser::parse("Nowhere Special"),
        500,
        RenderConfig::default(),
    );

    let run = service.execute(&request).await;
    assert_eq!(
        run.trace(),
        &[Stage::Idle, Stage::ResolvingAoi, Stage::Failed]
    );
    assert!(matches!(
        run.into_result(),
        Err(MapError::Geocoding { .. })
    ));
    assert_eq!(world.fetch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetched_geometry_can_be_uploaded_again() {
    let (service, world) = service();
    let map = service.prepare(&central_park(500)).await.unwrap();
    let bytes = export_geojson(&map.geometries).unwrap();

    let boundary = service.import_boundary("map_geometry.geojson", &bytes).unwrap();
    let request = MapRequest::for_boundary(boundary, RenderConfig::default());
    let run = service.execute(&request).await;

    assert_eq!(run.trace(), &[Stage::Idle, Stage::Ready]);
    let reloaded = run.into_result().unwrap();
    assert_eq!(reloaded.geometries.len(), map.geometries.len());
    assert_eq!(
        reloaded.geometries.geometry_types(),
        map.geometries.geometry_types()
    );
    assert_eq!(world.fetch_calls.load(Ordering::SeqCst), 1);
}
