//! Geometry fetching from the Overpass API
//!
//! Builds an Overpass QL query restricted to the AOI polygon, then turns the
//! `out geom` response into tagged features. Failures surface immediately as
//! [`MapError::Upstream`]; nothing is retried.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use geo::{Contains, Intersects};
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::MapError;
use crate::config::{GeometryConfig, SearchConfig};
use crate::models::{AreaOfInterest, Feature, GeometryCollection};

/// Tag filters for every layer the poster draws
const FEATURE_FILTERS: [&str; 9] = [
    r#"["building"]"#,
    r#"["landuse"]"#,
    r#"["natural"]"#,
    r#"["leisure"]"#,
    r#"["amenity"="parking"]"#,
    r#"["water"]"#,
    r#"["waterway"]"#,
    r#"["highway"]"#,
    r#"["railway"]"#,
];

/// A remote source of vector geometries
#[async_trait]
pub trait GeometryFetcher: Send + Sync {
    /// All features intersecting `aoi`
    async fn fetch(&self, aoi: &AreaOfInterest) -> Result<GeometryCollection, MapError>;
}

/// Overpass API client
pub struct OverpassClient {
    client: Client,
    base_url: String,
    timeout_seconds: u32,
}

impl OverpassClient {
    /// Create a new client. The user agent is shared with the Nominatim client.
    pub fn new(config: &GeometryConfig, search: &SearchConfig) -> Result<Self, MapError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(search.user_agent.clone())
            .build()
            .map_err(|e| MapError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl GeometryFetcher for OverpassClient {
    #[instrument(skip(self, aoi), fields(bounds = ?aoi.bounds().as_tuple()))]
    async fn fetch(&self, aoi: &AreaOfInterest) -> Result<GeometryCollection, MapError> {
        let start_time = Instant::now();
        let query = build_query(aoi, self.timeout_seconds);
        debug!("Overpass query: {}", query);

        let response = self
            .client
            .post(format!("{}/interpreter", self.base_url))
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| MapError::upstream(format!("Overpass request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                429 => MapError::upstream("Overpass rate limit exceeded"),
                504 => MapError::upstream("Overpass server is overloaded (HTTP 504)"),
                _ => MapError::upstream(format!(
                    "Overpass returned {}: {}",
                    status,
                    status.canonical_reason().unwrap_or("Unknown error")
                )),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| MapError::upstream(format!("Failed to read Overpass response: {e}")))?;

        let collection = parse_response(&body, aoi)?;
        info!(
            "Fetched {} features in {:.3}s",
            collection.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(collection)
    }
}

/// `poly:` filter value: "lat lon lat lon ..." over the open ring
fn poly_filter(aoi: &AreaOfInterest) -> String {
    let coords: Vec<&Coord<f64>> = aoi.polygon().exterior().coords().collect();
    // the closing coordinate repeats the first one
    let open = &coords[..coords.len().saturating_sub(1)];
    open.iter()
        .map(|c| format!("{:.6} {:.6}", c.y, c.x))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Overpass QL for every drawn layer inside the AOI polygon
#[must_use]
pub fn build_query(aoi: &AreaOfInterest, timeout_seconds: u32) -> String {
    let poly = poly_filter(aoi);
    let mut query = format!("[out:json][timeout:{timeout_seconds}];\n(\n");
    for filter in FEATURE_FILTERS {
        query.push_str(&format!("  way{filter}(poly:\"{poly}\");\n"));
        query.push_str(&format!(
            "  relation{filter}[\"type\"=\"multipolygon\"](poly:\"{poly}\");\n"
        ));
    }
    query.push_str(");\nout geom;\n");
    query
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OverpassElement {
    Node {
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Way {
        #[serde(default)]
        geometry: Vec<LatLon>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Relation {
        #[serde(default)]
        members: Vec<RelationMember>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl From<LatLon> for Coord<f64> {
    fn from(p: LatLon) -> Self {
        Coord { x: p.lon, y: p.lat }
    }
}

#[derive(Debug, Deserialize)]
struct RelationMember {
    #[serde(rename = "type")]
    member_type: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    geometry: Vec<LatLon>,
}

/// Parse an Overpass JSON body into features intersecting `aoi`
pub fn parse_response(body: &str, aoi: &AreaOfInterest) -> Result<GeometryCollection, MapError> {
    let response: OverpassResponse = serde_json::from_str(body)
        .map_err(|e| MapError::upstream(format!("Malformed Overpass response: {e}")))?;

    let total = response.elements.len();
    let features: Vec<Feature> = response
        .elements
        .into_iter()
        .filter_map(element_to_feature)
        .filter(|feature| feature.geometry.intersects(aoi.polygon()))
        .collect();

    debug!("Kept {} of {} Overpass elements", features.len(), total);
    Ok(GeometryCollection::new(features))
}

fn element_to_feature(element: OverpassElement) -> Option<Feature> {
    match element {
        OverpassElement::Node { lat, lon, tags } => {
            // untagged nodes are only way vertices
            if tags.is_empty() {
                return None;
            }
            Some(Feature::new(Point::new(lon, lat).into(), tags))
        }
        OverpassElement::Way { geometry, tags } => {
            let coords: Vec<Coord<f64>> = geometry.into_iter().map(Coord::from).collect();
            if coords.len() < 2 {
                return None;
            }
            let closed = coords.len() >= 4 && coords.first() == coords.last();
            let geometry: Geometry<f64> = if closed && is_area(&tags) {
                Polygon::new(LineString::new(coords), vec![]).into()
            } else {
                LineString::new(coords).into()
            };
            Some(Feature::new(geometry, tags))
        }
        OverpassElement::Relation { members, tags } => {
            let multipolygon = assemble_multipolygon(members)?;
            Some(Feature::new(multipolygon.into(), tags))
        }
        OverpassElement::Other => None,
    }
}

/// Closed ways are areas, except linear features that happen to loop
fn is_area(tags: &BTreeMap<String, String>) -> bool {
    if tags.get("area").map(String::as_str) == Some("yes") {
        return true;
    }
    !["highway", "railway", "waterway", "barrier"]
        .iter()
        .any(|key| tags.contains_key(*key))
}

fn assemble_multipolygon(members: Vec<RelationMember>) -> Option<MultiPolygon<f64>> {
    let mut outer_parts = Vec::new();
    let mut inner_parts = Vec::new();
    for member in members {
        if member.member_type != "way" || member.geometry.len() < 2 {
            continue;
        }
        let coords: Vec<Coord<f64>> = member.geometry.into_iter().map(Coord::from).collect();
        match member.role.as_str() {
            "inner" => inner_parts.push(coords),
            _ => outer_parts.push(coords),
        }
    }

    let mut polygons: Vec<Polygon<f64>> = stitch_rings(outer_parts)
        .into_iter()
        .map(|ring| Polygon::new(LineString::new(ring), vec![]))
        .collect();
    if polygons.is_empty() {
        return None;
    }

    for ring in stitch_rings(inner_parts) {
        let hole = LineString::new(ring);
        let first = hole.0[0];
        match polygons.iter_mut().find(|p| p.contains(&Point::from(first))) {
            Some(polygon) => polygon.interiors_push(hole),
            None => warn!("Dropping inner ring outside every outer ring"),
        }
    }

    Some(MultiPolygon::new(polygons))
}

/// Join way segments sharing endpoints into closed rings. Segments that never close are dropped.
fn stitch_rings(mut parts: Vec<Vec<Coord<f64>>>) -> Vec<Vec<Coord<f64>>> {
    let mut rings = Vec::new();

    while let Some(mut ring) = parts.pop() {
        loop {
            if ring.len() >= 4 && ring.first() == ring.last() {
                rings.push(ring);
                break;
            }
            let Some(tail) = ring.last().copied() else {
                break;
            };
            let next = parts.iter().position(|p| {
                p.first() == Some(&tail) || p.last() == Some(&tail)
            });
            match next {
                Some(idx) => {
                    let mut part = parts.swap_remove(idx);
                    if part.first() != Some(&tail) {
                        part.reverse();
                    }
                    ring.extend(part.into_iter().skip(1));
                }
                None => {
                    debug!("Dropping unclosed ring of {} points", ring.len());
                    break;
                }
            }
        }
    }

    rings
}
