//! Boundary file import
//!
//! Uploaded boundaries arrive as KML, GeoJSON or a zipped Shapefile. Each is
//! turned into a [`GeometryCollection`] whose total bounds become the map
//! extent. Failures are reported per file and never touch a pipeline run.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use geo_types::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use shapefile::dbase::FieldValue;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::MapError;
use crate::models::{Feature, GeometryCollection};

/// Upper bound on the extracted size of a zipped Shapefile
const MAX_UNZIPPED_BYTES: u64 = 200 * 1024 * 1024;

/// Supported upload formats, by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryFormat {
    Kml,
    GeoJson,
    ZippedShapefile,
}

impl BoundaryFormat {
    pub fn from_file_name(file_name: &str) -> Result<Self, MapError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("kml") => Ok(BoundaryFormat::Kml),
            Some("geojson" | "json") => Ok(BoundaryFormat::GeoJson),
            Some("zip") => Ok(BoundaryFormat::ZippedShapefile),
            _ => Err(MapError::file_format(format!(
                "Unsupported file type: {file_name}. Upload a KML, GeoJSON or zipped Shapefile"
            ))),
        }
    }
}

/// Parse an uploaded boundary file
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn import(file_name: &str, bytes: &[u8]) -> Result<GeometryCollection, MapError> {
    let features = match BoundaryFormat::from_file_name(file_name)? {
        BoundaryFormat::Kml => parse_kml(&utf8(bytes)?)?,
        BoundaryFormat::GeoJson => parse_geojson(&utf8(bytes)?)?,
        BoundaryFormat::ZippedShapefile => read_zipped_shapefile(bytes)?,
    };

    if features.is_empty() {
        return Err(MapError::file_format(format!(
            "No geometries found in {file_name}"
        )));
    }

    info!("Imported {} features from {}", features.len(), file_name);
    Ok(GeometryCollection::new(features))
}

fn utf8(bytes: &[u8]) -> Result<String, MapError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MapError::file_format(format!("File is not valid UTF-8: {e}")))
}

// ---------------------------------------------------------------------------
// KML

#[derive(Default)]
struct PlacemarkBuilder {
    tags: BTreeMap<String, String>,
    geometries: Vec<Geometry<f64>>,
    outer: Option<LineString<f64>>,
    inners: Vec<LineString<f64>>,
}

impl PlacemarkBuilder {
    fn finish_polygon(&mut self) {
        if let Some(outer) = self.outer.take() {
            let inners = std::mem::take(&mut self.inners);
            self.geometries.push(Polygon::new(outer, inners).into());
        }
    }

    fn into_feature(self) -> Option<Feature> {
        let PlacemarkBuilder {
            tags,
            mut geometries,
            ..
        } = self;

        let geometry = match geometries.len() {
            0 => return None,
            1 => geometries.remove(0),
            _ if geometries.iter().all(|g| matches!(g, Geometry::Polygon(_))) => {
                let polygons = geometries
                    .into_iter()
                    .filter_map(|g| match g {
                        Geometry::Polygon(p) => Some(p),
                        _ => None,
                    })
                    .collect();
                MultiPolygon::new(polygons).into()
            }
            _ => Geometry::GeometryCollection(geo_types::GeometryCollection::from(geometries)),
        };
        Some(Feature::new(geometry, tags))
    }
}

/// `lon,lat[,alt]` tuples separated by whitespace
fn parse_kml_coordinates(text: &str) -> Result<Vec<Coord<f64>>, MapError> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parts.next().and_then(|v| v.parse::<f64>().ok());
            let lat = parts.next().and_then(|v| v.parse::<f64>().ok());
            match (lon, lat) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(MapError::file_format(format!(
                    "Malformed KML coordinates: {tuple}"
                ))),
            }
        })
        .collect()
}

/// Character references and the five predefined XML entities. Other entities are kept verbatim.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, MapError> {
    if let Some(ch) = reference.resolve_char_ref().map_err(kml_text_error)? {
        return Ok(ch.to_string());
    }
    let name = reference.decode().map_err(kml_text_error)?;
    Ok(match resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => {
            debug!("Keeping unknown entity &{};", name);
            format!("&{name};")
        }
    })
}

fn kml_text_error(e: impl std::fmt::Display) -> MapError {
    MapError::file_format(format!("Undecodable KML text: {e}"))
}

fn parse_kml(text: &str) -> Result<Vec<Feature>, MapError> {
    // text is trimmed per element; trimming events would eat spaces around entities
    let mut reader = Reader::from_str(text);

    let mut features = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut placemark: Option<PlacemarkBuilder> = None;
    let mut data_key: Option<String> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "Placemark" => placemark = Some(PlacemarkBuilder::default()),
                    "SimpleData" | "Data" => {
                        data_key = e
                            .try_get_attribute("name")
                            .ok()
                            .flatten()
                            .map(|attr| String::from_utf8_lossy(&attr.value).into_owned());
                    }
                    _ => {}
                }
                text_buf.clear();
                path.push(name);
            }
            Ok(Event::Text(t)) => text_buf.push_str(&t.xml10_content().map_err(kml_text_error)?),
            Ok(Event::CData(c)) => text_buf.push_str(&c.decode().map_err(kml_text_error)?),
            Ok(Event::GeneralRef(r)) => text_buf.push_str(&resolve_reference(&r)?),
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else {
                    continue;
                };
                let text = std::mem::take(&mut text_buf).trim().to_string();
                let Some(builder) = placemark.as_mut() else {
                    continue;
                };

                match name.as_str() {
                    "coordinates" => {
                        let coords = parse_kml_coordinates(&text)?;
                        let within = |tag: &str| path.iter().any(|p| p == tag);
                        if within("Polygon") {
                            let ring = LineString::new(coords);
                            if within("innerBoundaryIs") {
                                builder.inners.push(ring);
                            } else {
                                builder.outer = Some(ring);
                            }
                        } else if within("LineString") || within("LinearRing") {
                            builder.geometries.push(LineString::new(coords).into());
                        } else if within("Point") {
                            if let Some(first) = coords.first() {
                                builder.geometries.push(Point::from(*first).into());
                            }
                        }
                    }
                    "Polygon" => builder.finish_polygon(),
                    "name" if path.last().map(String::as_str) == Some("Placemark") => {
                        builder.tags.insert("name".to_string(), text);
                    }
                    "SimpleData" | "value" => {
                        if let Some(key) = data_key.take() {
                            builder.tags.insert(key, text);
                        }
                    }
                    "Placemark" => {
                        if let Some(feature) = placemark.take().and_then(PlacemarkBuilder::into_feature)
                        {
                            features.push(feature);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MapError::file_format(format!(
                    "Invalid KML at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    debug!("Parsed {} placemarks from KML", features.len());
    Ok(features)
}

// ---------------------------------------------------------------------------
// GeoJSON

fn parse_geojson(text: &str) -> Result<Vec<Feature>, MapError> {
    let geojson: geojson::GeoJson = text.parse()?;

    let features = match geojson {
        geojson::GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| convert_geojson_feature(f).transpose())
            .collect::<Result<Vec<_>, _>>()?,
        geojson::GeoJson::Feature(feature) => {
            convert_geojson_feature(feature)?.into_iter().collect()
        }
        geojson::GeoJson::Geometry(geometry) => {
            vec![Feature::new(Geometry::try_from(geometry)?, BTreeMap::new())]
        }
    };
    Ok(features)
}

/// `None` for features without a geometry
fn convert_geojson_feature(feature: geojson::Feature) -> Result<Option<Feature>, MapError> {
    let Some(geometry) = feature.geometry else {
        return Ok(None);
    };
    let geometry = Geometry::<f64>::try_from(geometry)?;

    let tags = feature
        .properties
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect();

    Ok(Some(Feature::new(geometry, tags)))
}

// ---------------------------------------------------------------------------
// Zipped Shapefile

fn read_zipped_shapefile(bytes: &[u8]) -> Result<Vec<Feature>, MapError> {
    let scratch = tempfile::tempdir()?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    check_unzipped_size(&mut archive, MAX_UNZIPPED_BYTES)?;
    archive.extract(scratch.path())?;
    debug!("Extracted {} entries to {}", archive.len(), scratch.path().display());

    let shp_path = find_shapefile(scratch.path())
        .ok_or_else(|| MapError::file_format("No shapefile found in ZIP archive"))?;
    read_shapefile(&shp_path)
}

/// Sums the declared sizes of all entries before anything is written to disk
fn check_unzipped_size<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    limit: u64,
) -> Result<(), MapError> {
    let mut total: u64 = 0;
    for index in 0..archive.len() {
        total = total.saturating_add(archive.by_index(index)?.size());
        if total > limit {
            return Err(MapError::file_format(format!(
                "ZIP archive expands to more than {} MB",
                limit / (1024 * 1024)
            )));
        }
    }
    Ok(())
}

/// First `.shp` below `dir`, in sorted path order
fn find_shapefile(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .find(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"))
        })
}

fn read_shapefile(path: &Path) -> Result<Vec<Feature>, MapError> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|e| {
        MapError::file_format(format!("Cannot open shapefile {}: {e}", path.display()))
    })?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) =
            result.map_err(|e| MapError::file_format(format!("Corrupt shapefile: {e}")))?;

        let geometry = match Geometry::<f64>::try_from(shape) {
            Ok(geometry) => geometry,
            Err(e) => {
                warn!("Skipping shape: {}", e);
                continue;
            }
        };

        let tags = record
            .into_iter()
            .filter_map(|(name, value)| field_to_string(value).map(|v| (name, v)))
            .collect();
        features.push(Feature::new(geometry, tags));
    }
    Ok(features)
}

fn field_to_string(value: FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(text) => text.map(|t| t.trim().to_string()),
        FieldValue::Memo(text) => Some(text),
        FieldValue::Numeric(number) => number.map(|n| n.to_string()),
        FieldValue::Float(number) => number.map(|n| n.to_string()),
        FieldValue::Double(number) | FieldValue::Currency(number) => Some(number.to_string()),
        FieldValue::Integer(number) => Some(number.to_string()),
        FieldValue::Logical(flag) => flag.map(|b| b.to_string()),
        _ => None,
    }
}
