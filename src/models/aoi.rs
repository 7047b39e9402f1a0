//! Area of interest: the region a map is drawn for

use std::f64::consts::PI;

use geo::BoundingRect;
use geo_types::{Coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};

use super::location::Coordinates;
use crate::MapError;
use crate::config::{MAX_RADIUS_M, MIN_RADIUS_M};

/// WGS84 equatorial radius in metres
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Vertices used to approximate a circular AOI
const CIRCLE_SEGMENTS: usize = 64;

/// Outline of the AOI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AoiShape {
    #[default]
    Circle,
    Rectangle,
}

impl AoiShape {
    #[must_use]
    pub fn from_rectangular(rectangular: bool) -> Self {
        if rectangular {
            AoiShape::Rectangle
        } else {
            AoiShape::Circle
        }
    }
}

/// Axis-aligned bounding box `(minx, miny, maxx, maxy)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    #[must_use]
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Smallest box covering both
    #[must_use]
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Bounds {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

/// Structural identity of an AOI, used as the geometry cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AoiKey {
    pub center_lat: i64, // micro-degrees
    pub center_lon: i64, // micro-degrees
    pub radius_m: u32,
    pub shape: AoiShape,
}

/// A circle or square polygon around a center point. Immutable once built.
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    center: Coordinates,
    radius_m: u32,
    shape: AoiShape,
    polygon: Polygon<f64>,
}

impl AreaOfInterest {
    /// Build the AOI polygon for `center`. The radius is bounded to the range the UI offers,
    /// and the polygon may not cross a pole or the antimeridian.
    pub fn new(center: Coordinates, radius_m: u32, shape: AoiShape) -> Result<Self, MapError> {
        validate_radius(radius_m)?;

        let r = f64::from(radius_m);
        let ring: Vec<(f64, f64)> = match shape {
            AoiShape::Circle => (0..CIRCLE_SEGMENTS)
                .map(|i| {
                    let angle = 2.0 * PI * (i as f64) / (CIRCLE_SEGMENTS as f64);
                    (r * angle.cos(), r * angle.sin())
                })
                .collect(),
            AoiShape::Rectangle => vec![(-r, -r), (r, -r), (r, r), (-r, r)],
        };

        let exterior: LineString<f64> = ring
            .into_iter()
            .map(|(dx, dy)| unproject(&center, dx, dy))
            .collect::<Vec<Coord<f64>>>()
            .into();
        if let Some(coord) = exterior.coords().find(|coord| !is_plain_lon_lat(coord)) {
            return Err(MapError::validation(format!(
                "Area of interest around {} does not fit between the poles and the antimeridian \
                 (vertex {:.6},{:.6})",
                center.format_coordinates(),
                coord.y,
                coord.x
            )));
        }
        // Polygon::new closes the ring
        let polygon = Polygon::new(exterior, vec![]);

        Ok(Self {
            center,
            radius_m,
            shape,
            polygon,
        })
    }

    #[must_use]
    pub fn center(&self) -> Coordinates {
        self.center
    }

    #[must_use]
    pub fn radius_m(&self) -> u32 {
        self.radius_m
    }

    #[must_use]
    pub fn shape(&self) -> AoiShape {
        self.shape
    }

    /// Polygon in lon/lat (x = longitude, y = latitude)
    #[must_use]
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Bounding box in lon/lat
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        match self.polygon.bounding_rect() {
            Some(rect) => rect.into(),
            None => Bounds {
                min_x: self.center.longitude,
                min_y: self.center.latitude,
                max_x: self.center.longitude,
                max_y: self.center.latitude,
            },
        }
    }

    /// Bounding box in metres on a local plane centred on the AOI center
    #[must_use]
    pub fn projected_bounds(&self) -> Bounds {
        let mut bounds = Bounds {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for coord in self.polygon.exterior().coords() {
            let (x, y) = project(&self.center, coord);
            bounds.min_x = bounds.min_x.min(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_x = bounds.max_x.max(x);
            bounds.max_y = bounds.max_y.max(y);
        }
        bounds
    }

    #[must_use]
    pub fn key(&self) -> AoiKey {
        let (center_lat, center_lon) = self.center.micro_degrees();
        AoiKey {
            center_lat,
            center_lon,
            radius_m: self.radius_m,
            shape: self.shape,
        }
    }
}

impl PartialEq for AreaOfInterest {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

pub(crate) fn validate_radius(radius_m: u32) -> Result<(), MapError> {
    if !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(&radius_m) {
        return Err(MapError::validation(format!(
            "Radius must be between {MIN_RADIUS_M} and {MAX_RADIUS_M} metres, got: {radius_m}"
        )));
    }
    Ok(())
}

/// Finite, with no pole or antimeridian crossing
fn is_plain_lon_lat(coord: &Coord<f64>) -> bool {
    coord.x.is_finite()
        && coord.y.is_finite()
        && (-180.0..=180.0).contains(&coord.x)
        && (-90.0..=90.0).contains(&coord.y)
}

fn metres_per_degree_lat() -> f64 {
    EARTH_RADIUS_M * PI / 180.0
}

fn metres_per_degree_lon(latitude: f64) -> f64 {
    metres_per_degree_lat() * latitude.to_radians().cos()
}

/// Offset in metres from `center` to lon/lat
fn unproject(center: &Coordinates, dx: f64, dy: f64) -> Coord<f64> {
    Coord {
        x: center.longitude + dx / metres_per_degree_lon(center.latitude),
        y: center.latitude + dy / metres_per_degree_lat(),
    }
}

/// lon/lat to offset in metres from `center`
fn project(center: &Coordinates, coord: &Coord<f64>) -> (f64, f64) {
    (
        (coord.x - center.longitude) * metres_per_degree_lon(center.latitude),
        (coord.y - center.latitude) * metres_per_degree_lat(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use haversine::{Location as HaversineLocation, Units, distance};
    use rstest::rstest;

    fn central_park() -> Coordinates {
        Coordinates::new(40.7829, -73.9654).unwrap()
    }

    #[test]
    fn test_circle_projected_bounds_are_square() {
        let aoi = AreaOfInterest::new(central_park(), 500, AoiShape::Circle).unwrap();
        let projected = aoi.projected_bounds();

        assert!((projected.width() - 1000.0).abs() < 1.0);
        assert!((projected.height() - 1000.0).abs() < 1.0);
        assert!((projected.width() - projected.height()).abs() < 1e-6);
    }

    #[test]
    fn test_circle_vertices_lie_on_radius() {
        let center = central_park();
        let aoi = AreaOfInterest::new(center, 500, AoiShape::Circle).unwrap();
        for coord in aoi.polygon().exterior().coords() {
            let km = distance(
                HaversineLocation {
                    latitude: center.latitude,
                    longitude: center.longitude,
                },
                HaversineLocation {
                    latitude: coord.y,
                    longitude: coord.x,
                },
                Units::Kilometers,
            );
            assert!((km - 0.5).abs() < 0.01, "vertex {coord:?} is {km} km away");
        }
    }

    #[test]
    fn test_bounds_enclose_center() {
        let center = central_park();
        let aoi = AreaOfInterest::new(center, 800, AoiShape::Rectangle).unwrap();
        let (min_x, min_y, max_x, max_y) = aoi.bounds().as_tuple();
        assert!(min_x < center.longitude && center.longitude < max_x);
        assert!(min_y < center.latitude && center.latitude < max_y);
        // longitude span is wider than latitude span away from the equator
        assert!(aoi.bounds().width() > aoi.bounds().height());
    }

    #[test]
    fn test_rectangle_and_circle_share_bounds() {
        let circle = AreaOfInterest::new(central_park(), 500, AoiShape::Circle).unwrap();
        let rect = AreaOfInterest::new(central_park(), 500, AoiShape::Rectangle).unwrap();
        let (a, b) = (circle.projected_bounds(), rect.projected_bounds());
        assert!((a.width() - b.width()).abs() < 1e-6);
        assert_eq!(rect.polygon().exterior().coords().count(), 5);
    }

    #[test]
    fn test_structural_equality() {
        let a = AreaOfInterest::new(central_park(), 500, AoiShape::Circle).unwrap();
        let b = AreaOfInterest::new(central_park(), 500, AoiShape::Circle).unwrap();
        let c = AreaOfInterest::new(central_park(), 500, AoiShape::Rectangle).unwrap();
        let d = AreaOfInterest::new(central_park(), 600, AoiShape::Circle).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[rstest]
    #[case(99, false)]
    #[case(100, true)]
    #[case(500, true)]
    #[case(2000, true)]
    #[case(2001, false)]
    fn test_radius_bounds(#[case] radius: u32, #[case] ok: bool) {
        assert_eq!(
            AreaOfInterest::new(central_park(), radius, AoiShape::Circle).is_ok(),
            ok
        );
    }

    #[rstest]
    #[case(90.0, 0.0, AoiShape::Circle)]
    #[case(-90.0, 0.0, AoiShape::Circle)]
    #[case(89.999, 12.0, AoiShape::Rectangle)]
    #[case(0.0, 179.999, AoiShape::Circle)]
    #[case(-33.9, -179.999, AoiShape::Rectangle)]
    fn test_aoi_crossing_pole_or_antimeridian_is_rejected(
        #[case] latitude: f64,
        #[case] longitude: f64,
        #[case] shape: AoiShape,
    ) {
        let center = Coordinates::new(latitude, longitude).unwrap();
        let result = AreaOfInterest::new(center, 500, shape);
        assert!(
            matches!(result, Err(MapError::Validation { .. })),
            "{result:?}"
        );
    }

    #[rstest]
    #[case(89.99, 0.0)]
    #[case(0.0, 179.99)]
    #[case(-64.5, -179.9)]
    fn test_aoi_near_pole_or_antimeridian_stays_finite(
        #[case] latitude: f64,
        #[case] longitude: f64,
    ) {
        let center = Coordinates::new(latitude, longitude).unwrap();
        let aoi = AreaOfInterest::new(center, 500, AoiShape::Circle).unwrap();
        let (min_x, min_y, max_x, max_y) = aoi.bounds().as_tuple();
        assert!(min_x >= -180.0 && max_x <= 180.0);
        assert!(min_y >= -90.0 && max_y <= 90.0);
        assert!(min_x < longitude && longitude < max_x);
    }
}
