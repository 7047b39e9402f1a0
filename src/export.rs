//! GeoJSON and configuration export

use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::MapError;
use crate::models::{GeometryCollection, RenderConfig};

/// Feature collection with every tag as a string property
#[must_use]
pub fn to_geojson(collection: &GeometryCollection) -> GeoJson {
    let features = collection
        .features()
        .iter()
        .map(|feature| {
            let properties: JsonObject = feature
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect();
            geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&feature.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: collection
            .total_bounds()
            .map(|b| vec![b.min_x, b.min_y, b.max_x, b.max_y]),
        features,
        foreign_members: None,
    })
}

/// Serialized GeoJSON, ready to be written as `map_geometry.geojson`
pub fn export_geojson(collection: &GeometryCollection) -> Result<Vec<u8>, MapError> {
    serde_json::to_vec(&to_geojson(collection))
        .map_err(|e| MapError::file_format(format!("Failed to serialize GeoJSON: {e}")))
}

/// Pretty JSON of the render settings, ready to be written as `map_config.json`
pub fn export_config(config: &RenderConfig) -> Result<String, MapError> {
    serde_json::to_string_pretty(config)
        .map_err(|e| MapError::validation(format!("Failed to serialize configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::import;
    use crate::models::Feature;
    use geo_types::{LineString, Point, Polygon};
    use std::collections::BTreeMap;

    fn collection() -> GeometryCollection {
        let mut tags = BTreeMap::new();
        tags.insert("building".to_string(), "yes".to_string());
        tags.insert("name".to_string(), "Town Hall".to_string());

        GeometryCollection::new(vec![
            Feature::new(
                Polygon::new(
                    LineString::from(vec![(8.0, 50.0), (8.1, 50.0), (8.1, 50.1), (8.0, 50.0)]),
                    vec![],
                )
                .into(),
                tags,
            ),
            Feature::new(
                LineString::from(vec![(8.0, 50.0), (8.3, 50.2)]).into(),
                BTreeMap::new(),
            ),
            Feature::new(Point::new(8.05, 50.05).into(), BTreeMap::new()),
        ])
    }

    #[test]
    fn test_geojson_export_reimports_with_same_shape() {
        let original = collection();
        let bytes = export_geojson(&original).unwrap();
        let reloaded = import("map_geometry.geojson", &bytes).unwrap();

        assert_eq!(reloaded.len(), original.len());
        assert_eq!(reloaded.geometry_types(), original.geometry_types());
        assert_eq!(reloaded.features()[0].name(), Some("Town Hall"));
        assert_eq!(reloaded.total_bounds(), original.total_bounds());
    }

    #[test]
    fn test_geojson_carries_bbox() {
        let GeoJson::FeatureCollection(fc) = to_geojson(&collection()) else {
            panic!("expected a feature collection");
        };
        assert_eq!(fc.bbox, Some(vec![8.0, 50.0, 8.3, 50.2]));
    }

    #[test]
    fn test_config_export() {
        let config = RenderConfig {
            title: "Lisboa".to_string(),
            contour_width: 4,
            ..RenderConfig::default()
        };
        let json = export_config(&config).unwrap();
        let parsed: RenderConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
        assert!(json.contains("\"title\": \"Lisboa\""));
    }
}
