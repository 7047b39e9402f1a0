//! Location queries and geographic coordinates

use serde::{Deserialize, Serialize};

use crate::MapError;

/// A point on the WGS84 ellipsoid
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates, validating the WGS84 ranges
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, MapError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(MapError::validation(format!(
                "Latitude must be between -90 and 90, got: {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(MapError::validation(format!(
                "Longitude must be between -180 and 180, got: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Format as "lat, lon" with four decimals
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    /// Coordinates in integer micro-degrees, used for structural cache keys
    #[must_use]
    pub fn micro_degrees(&self) -> (i64, i64) {
        // |lat|, |lon| <= 180 so the scaled values fit comfortably in i64
        let lat = (self.latitude * 1_000_000.0).round() as i64;
        let lon = (self.longitude * 1_000_000.0).round() as i64;
        (lat, lon)
    }
}

/// What the user asked for: free text or an explicit coordinate pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationQuery {
    /// Address or place name
    Text(String),
    /// Latitude / longitude pair
    Coordinates(Coordinates),
}

impl LocationQuery {
    /// Text used for logging and error messages
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            LocationQuery::Text(text) => text.clone(),
            LocationQuery::Coordinates(coords) => coords.format_coordinates(),
        }
    }
}

impl From<Coordinates> for LocationQuery {
    fn from(coords: Coordinates) -> Self {
        LocationQuery::Coordinates(coords)
    }
}

/// Location parsing utilities
pub struct LocationParser;

impl LocationParser {
    /// Parse user input: coordinate pairs become [`LocationQuery::Coordinates`],
    /// everything else is kept as trimmed text.
    #[must_use]
    pub fn parse(input: &str) -> LocationQuery {
        let input = input.trim();

        if let Ok(coords) = Self::parse_coordinates(input) {
            return LocationQuery::Coordinates(coords);
        }

        LocationQuery::Text(input.to_string())
    }

    /// Parse coordinates from string like "40.7829,-73.9654" or "40.7829 -73.9654"
    pub fn parse_coordinates(input: &str) -> Result<Coordinates, MapError> {
        let parts: Vec<&str> = input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.len() != 2 {
            return Err(MapError::validation(
                "Coordinates must be in format 'lat,lon'",
            ));
        }

        let lat = parts[0]
            .parse::<f64>()
            .map_err(|_| MapError::validation(format!("Invalid latitude: {}", parts[0])))?;
        let lon = parts[1]
            .parse::<f64>()
            .map_err(|_| MapError::validation(format!("Invalid longitude: {}", parts[1])))?;

        Coordinates::new(lat, lon)
    }
}
