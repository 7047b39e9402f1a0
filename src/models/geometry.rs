//! Tagged vector features drawn on the map

use std::collections::BTreeMap;

use geo::BoundingRect;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use super::aoi::Bounds;

/// Layer a feature is drawn in, derived from its OSM tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureClass {
    Building,
    Water,
    Green,
    Park,
    Highway,
    Railway,
    Other,
}

impl FeatureClass {
    /// Classify a feature from its tags. The first matching rule wins.
    #[must_use]
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Self {
        let tag = |key: &str| tags.get(key).map(String::as_str);

        if tag("building").is_some() {
            return FeatureClass::Building;
        }
        if tag("leisure") == Some("park") {
            return FeatureClass::Park;
        }
        if tag("natural") == Some("water")
            || tag("waterway").is_some()
            || tag("water").is_some()
            || matches!(tag("landuse"), Some("reservoir" | "basin"))
        {
            return FeatureClass::Water;
        }
        if matches!(
            tag("landuse"),
            Some("grass" | "forest" | "meadow" | "recreation_ground" | "village_green" | "cemetery")
        ) || matches!(
            tag("natural"),
            Some("wood" | "scrub" | "grassland" | "heath")
        ) || matches!(tag("leisure"), Some("garden" | "pitch" | "golf_course"))
        {
            return FeatureClass::Green;
        }
        if tag("highway").is_some() {
            return FeatureClass::Highway;
        }
        if tag("railway").is_some() {
            return FeatureClass::Railway;
        }
        FeatureClass::Other
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureClass::Building => "building",
            FeatureClass::Water => "water",
            FeatureClass::Green => "green",
            FeatureClass::Park => "park",
            FeatureClass::Highway => "highway",
            FeatureClass::Railway => "railway",
            FeatureClass::Other => "other",
        }
    }
}

/// A geometry plus its attribute tags
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub tags: BTreeMap<String, String>,
    pub class: FeatureClass,
}

impl Feature {
    #[must_use]
    pub fn new(geometry: Geometry<f64>, tags: BTreeMap<String, String>) -> Self {
        let class = FeatureClass::from_tags(&tags);
        Self {
            geometry,
            tags,
            class,
        }
    }

    /// Optional display name (`name` tag)
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags.get("name").map(String::as_str)
    }
}

/// Name of a geometry variant as used by GeoJSON
#[must_use]
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Features intersecting an AOI, or loaded from an uploaded boundary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryCollection {
    features: Vec<Feature>,
}

impl GeometryCollection {
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// GeoJSON geometry type of every feature, in order
    #[must_use]
    pub fn geometry_types(&self) -> Vec<&'static str> {
        self.features
            .iter()
            .map(|f| geometry_type_name(&f.geometry))
            .collect()
    }

    /// Feature count per class
    #[must_use]
    pub fn class_counts(&self) -> BTreeMap<FeatureClass, usize> {
        let mut counts = BTreeMap::new();
        for feature in &self.features {
            *counts.entry(feature.class).or_insert(0) += 1;
        }
        counts
    }

    /// Bounding box over all features, `None` when there is nothing with extent
    #[must_use]
    pub fn total_bounds(&self) -> Option<Bounds> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .map(Bounds::from)
            .reduce(|acc, b| acc.union(&b))
    }
}
