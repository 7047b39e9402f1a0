//! Place-search suggestions

use serde::{Deserialize, Serialize};

use super::location::{Coordinates, LocationQuery};

/// One ranked match from the place-search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Short label shown in the suggestion list ("name, city, country")
    pub label: String,
    /// Full canonical address as reported upstream
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    /// OSM type of the place (e.g. "park")
    pub place_type: String,
    /// OSM class of the place (e.g. "leisure")
    pub place_class: String,
    /// Upstream relevance, higher is better
    pub importance: f64,
}

impl SearchResult {
    /// "type (class)", as shown next to a suggestion
    #[must_use]
    pub fn type_label(&self) -> String {
        format!("{} ({})", self.place_type, self.place_class)
    }

    /// The query a selected suggestion feeds back into the form.
    ///
    /// Falls back to the address when the coordinates are unusable.
    #[must_use]
    pub fn to_query(&self) -> LocationQuery {
        match Coordinates::new(self.latitude, self.longitude) {
            Ok(coords) => LocationQuery::Coordinates(coords),
            Err(_) => LocationQuery::Text(self.address.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_label_and_query() {
        let result = SearchResult {
            label: "Central Park, New York, United States".to_string(),
            address: "Central Park, Manhattan, New York".to_string(),
            latitude: 40.7829,
            longitude: -73.9654,
            place_type: "park".to_string(),
            place_class: "leisure".to_string(),
            importance: 0.8,
        };
        assert_eq!(result.type_label(), "park (leisure)");
        assert!(matches!(result.to_query(), LocationQuery::Coordinates(_)));
    }
}
