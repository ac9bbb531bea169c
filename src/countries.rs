// src/countries.rs - Country boundaries and metadata loaded from GeoJSON
use crate::error::ReferenceDataError;
use crate::record::BoundingBox;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Property names tried, in order, for the ISO 3166-1 alpha-2 code.
/// `ISO_A2_EH` comes first because Natural Earth leaves `ISO_A2` as "-99" for
/// a few countries (France, Norway) while `ISO_A2_EH` carries the real code.
const CODE_KEYS: &[&str] = &["ISO_A2_EH", "ISO_A2", "iso_a2", "code"];
const NAME_KEYS: &[&str] = &["NAME", "ADMIN", "name", "admin"];

/// Linear ring as (lon, lat) pairs
type Ring = Vec<(f64, f64)>;

/// Polygon with one outer ring and optional holes
#[derive(Debug, Clone)]
struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    fn contains(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|hole| ring_contains(hole, lon, lat))
    }
}

/// Even-odd ray casting test
fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let mut inside = false;
    let mut j = ring.len().wrapping_sub(1);
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl Extent {
    fn of(polygons: &[Polygon]) -> Option<Self> {
        let mut points = polygons.iter().flat_map(|p| p.exterior.iter());
        let &(lon, lat) = points.next()?;
        let mut extent = Extent { min_lon: lon, min_lat: lat, max_lon: lon, max_lat: lat };
        for &(lon, lat) in points {
            extent.min_lon = extent.min_lon.min(lon);
            extent.min_lat = extent.min_lat.min(lat);
            extent.max_lon = extent.max_lon.max(lon);
            extent.max_lat = extent.max_lat.max(lat);
        }
        Some(extent)
    }

    fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Display metadata for one country
#[derive(Debug, Clone, PartialEq)]
pub struct CountryInfo {
    pub code: String,
    pub name: String,
    pub flag: String,
}

impl CountryInfo {
    /// Metadata for a code we have no boundary entry for
    pub fn placeholder(code: &str) -> Self {
        CountryInfo {
            code: code.to_string(),
            name: code.to_string(),
            flag: flag_emoji(code).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct CountryShape {
    info: CountryInfo,
    polygons: Vec<Polygon>,
    extent: Option<Extent>,
    geometry: Value,
}

/// Read-only lookup table of country boundaries, built once per run
#[derive(Debug, Clone, Default)]
pub struct CountryIndex {
    shapes: Vec<CountryShape>,
    by_code: HashMap<String, usize>,
}

impl CountryIndex {
    /// An index without boundaries: every lookup fails, metadata is placeholder only
    pub fn empty() -> Self {
        CountryIndex::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, ReferenceDataError> {
        let content = fs::read_to_string(path)?;
        let index = Self::from_geojson(&content)?;
        debug!(path = %path.display(), countries = index.len(), "loaded country boundaries");
        Ok(index)
    }

    pub fn from_geojson(content: &str) -> Result<Self, ReferenceDataError> {
        let document: Value = serde_json::from_str(content)?;
        let features = document
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ReferenceDataError::Invalid("expected a FeatureCollection with a 'features' array".to_string())
            })?;

        let mut index = CountryIndex::default();
        for (position, feature) in features.iter().enumerate() {
            let properties = feature.get("properties").and_then(Value::as_object);
            let code = properties.and_then(|props| first_property(props, CODE_KEYS, is_country_code));
            let Some(code) = code else {
                warn!(feature = position, "boundary feature without country code, ignoring");
                continue;
            };
            let code = code.to_uppercase();
            let name = properties
                .and_then(|props| first_property(props, NAME_KEYS, |s| !s.is_empty()))
                .unwrap_or_else(|| code.clone());

            let geometry = feature.get("geometry").cloned().unwrap_or(Value::Null);
            let polygons = parse_geometry(&geometry).map_err(|e| {
                ReferenceDataError::Invalid(format!("feature {} ({}): {}", position, code, e))
            })?;

            if index.by_code.contains_key(&code) {
                warn!(code = %code, "duplicate boundary feature, keeping the first");
                continue;
            }

            index.by_code.insert(code.clone(), index.shapes.len());
            index.shapes.push(CountryShape {
                info: CountryInfo {
                    flag: flag_emoji(&code).unwrap_or_default(),
                    code,
                    name,
                },
                extent: Extent::of(&polygons),
                polygons,
                geometry,
            });
        }

        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Country containing the point, if any
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&CountryInfo> {
        self.shapes
            .iter()
            .filter(|shape| shape.extent.is_some_and(|extent| extent.contains(lon, lat)))
            .find(|shape| shape.polygons.iter().any(|polygon| polygon.contains(lon, lat)))
            .map(|shape| &shape.info)
    }

    /// Resolve a changeset extent: the centre wins, corners are the fallback
    /// for extents whose centre lies at sea or outside every boundary.
    pub fn resolve(&self, bbox: &BoundingBox) -> Option<&CountryInfo> {
        bbox.sample_points()
            .iter()
            .find_map(|&(lon, lat)| self.locate(lon, lat))
    }

    pub fn info(&self, code: &str) -> Option<&CountryInfo> {
        self.by_code.get(code).map(|&i| &self.shapes[i].info)
    }

    /// Metadata for a code, falling back to a placeholder for unknown codes
    pub fn info_or_placeholder(&self, code: &str) -> CountryInfo {
        match self.info(code) {
            Some(info) => info.clone(),
            None => CountryInfo::placeholder(code),
        }
    }

    /// All countries with their raw GeoJSON geometry, in file order
    pub fn geometries(&self) -> impl Iterator<Item = (&CountryInfo, &Value)> {
        self.shapes.iter().map(|shape| (&shape.info, &shape.geometry))
    }
}

fn first_property(
    properties: &serde_json::Map<String, Value>,
    keys: &[&str],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    keys.iter()
        .filter_map(|key| properties.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| accept(value))
        .map(str::to_string)
}

fn is_country_code(value: &str) -> bool {
    value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic())
}

/// Regional indicator pair for a two-letter code ("DE" -> 🇩🇪)
pub fn flag_emoji(code: &str) -> Option<String> {
    if !is_country_code(code) {
        return None;
    }
    code.to_ascii_uppercase()
        .chars()
        .map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}

fn parse_geometry(geometry: &Value) -> Result<Vec<Polygon>, String> {
    if geometry.is_null() {
        return Ok(Vec::new());
    }
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or("");
    let coordinates = geometry.get("coordinates");
    match kind {
        "Polygon" => Ok(vec![parse_polygon(coordinates.ok_or("Polygon without coordinates")?)?]),
        "MultiPolygon" => coordinates
            .and_then(Value::as_array)
            .ok_or("MultiPolygon without coordinates")?
            .iter()
            .map(parse_polygon)
            .collect(),
        other => Err(format!("unsupported geometry type '{}'", other)),
    }
}

fn parse_polygon(value: &Value) -> Result<Polygon, String> {
    let mut rings = value
        .as_array()
        .ok_or("polygon is not an array of rings")?
        .iter()
        .map(parse_ring);
    let exterior = rings.next().ok_or("polygon without rings")??;
    let holes = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon { exterior, holes })
}

fn parse_ring(value: &Value) -> Result<Ring, String> {
    value
        .as_array()
        .ok_or("ring is not an array of positions")?
        .iter()
        .map(|position| {
            let lon = position.get(0).and_then(Value::as_f64);
            let lat = position.get(1).and_then(Value::as_f64);
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok((lon, lat)),
                _ => Err(format!("invalid position {}", position)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two unit-ish squares side by side plus a country with a hole (a lake)
    const BOUNDARIES: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {"ISO_A2": "-99", "ISO_A2_EH": "FR", "NAME": "France"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
        {"type": "Feature", "properties": {"ISO_A2_EH": "DE", "NAME": "Germany"},
         "geometry": {"type": "MultiPolygon", "coordinates": [
            [[[10,0],[20,0],[20,10],[10,10],[10,0]]],
            [[[30,30],[31,30],[31,31],[30,31],[30,30]]]
         ]}},
        {"type": "Feature", "properties": {"ISO_A2": "ch", "ADMIN": "Switzerland"},
         "geometry": {"type": "Polygon", "coordinates": [
            [[0,20],[10,20],[10,30],[0,30],[0,20]],
            [[4,24],[6,24],[6,26],[4,26],[4,24]]
         ]}},
        {"type": "Feature", "properties": {"ISO_A2": "-99", "NAME": "Nowhere"},
         "geometry": {"type": "Polygon", "coordinates": [[[50,50],[51,50],[51,51],[50,51],[50,50]]]}}
      ]
    }"#;

    fn index() -> CountryIndex {
        CountryIndex::from_geojson(BOUNDARIES).unwrap()
    }

    #[test]
    fn test_codes_and_names_are_read() {
        let index = index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.info("FR").unwrap().name, "France");
        assert_eq!(index.info("CH").unwrap().name, "Switzerland");
        assert!(index.info("XX").is_none());
    }

    #[test]
    fn test_locate_point() {
        let index = index();
        assert_eq!(index.locate(5.0, 5.0).unwrap().code, "FR");
        assert_eq!(index.locate(15.0, 5.0).unwrap().code, "DE");
        assert_eq!(index.locate(30.5, 30.5).unwrap().code, "DE");
        assert!(index.locate(-5.0, -5.0).is_none());
    }

    #[test]
    fn test_holes_are_excluded() {
        let index = index();
        assert_eq!(index.locate(2.0, 22.0).unwrap().code, "CH");
        assert!(index.locate(5.0, 25.0).is_none());
    }

    #[test]
    fn test_resolve_prefers_center_then_corners() {
        let index = index();
        let inside = BoundingBox { min_lat: 1.0, min_lon: 1.0, max_lat: 2.0, max_lon: 2.0 };
        assert_eq!(index.resolve(&inside).unwrap().code, "FR");

        // centre at sea, south-west corner in Germany
        let coastal = BoundingBox { min_lat: 9.0, min_lon: 19.0, max_lat: 15.0, max_lon: 25.0 };
        assert_eq!(index.resolve(&coastal).unwrap().code, "DE");

        let open_sea = BoundingBox { min_lat: -20.0, min_lon: -20.0, max_lat: -10.0, max_lon: -10.0 };
        assert!(index.resolve(&open_sea).is_none());
    }

    #[test]
    fn test_flag_emoji() {
        assert_eq!(flag_emoji("DE").unwrap(), "\u{1F1E9}\u{1F1EA}");
        assert_eq!(flag_emoji("fr").unwrap(), "\u{1F1EB}\u{1F1F7}");
        assert!(flag_emoji("-99").is_none());
    }

    #[test]
    fn test_placeholder_for_unknown_codes() {
        let index = CountryIndex::empty();
        let info = index.info_or_placeholder("NL");
        assert_eq!(info.name, "NL");
        assert_eq!(info.flag, "\u{1F1F3}\u{1F1F1}");
        assert_eq!(index.info_or_placeholder("??").flag, "");
    }

    #[test]
    fn test_invalid_documents_are_rejected() {
        assert!(CountryIndex::from_geojson("[]").is_err());
        assert!(CountryIndex::from_geojson("not json").is_err());
        let point = r#"{"features": [{"properties": {"ISO_A2": "XY"}, "geometry": {"type": "Point", "coordinates": [1, 2]}}]}"#;
        assert!(CountryIndex::from_geojson(point).is_err());
    }
}
