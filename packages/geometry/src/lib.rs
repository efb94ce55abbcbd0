#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Esri JSON to `GeoJSON` parcel geometry normalization.
//!
//! `ArcGIS` services return polygons as `{ "rings": [...] }` and points as
//! `{ "x": .., "y": .. }`. Map clients want `GeoJSON`. [`normalize`] maps
//! the former onto the latter without touching coordinates; anything it
//! cannot recognize becomes `None` so callers treat the parcel as absent.
//!
//! Also builds the synthetic square polygons used for fallback and grid
//! parcels, and converts [`ParcelFeature`] values into `geojson` types for
//! HTTP responses.

use geo::{Rect, coord};
use parcel_map_parcel_models::{
    Coordinate, NormalizedGeometry, ParcelFeature, Position, RawParcelGeometry,
};

/// Classifies raw upstream geometry.
///
/// Checks `rings`, then numeric `x`/`y`, then an existing `GeoJSON`
/// `Polygon`, in that order. Returns `None` for anything else, including
/// malformed or empty rings.
#[must_use]
pub fn classify(value: &serde_json::Value) -> Option<RawParcelGeometry> {
    if let Some(rings) = value.get("rings") {
        return parse_rings(rings).map(|rings| RawParcelGeometry::EsriPolygon { rings });
    }

    if let (Some(x), Some(y)) = (
        value.get("x").and_then(serde_json::Value::as_f64),
        value.get("y").and_then(serde_json::Value::as_f64),
    ) {
        return Some(RawParcelGeometry::EsriPoint { x, y });
    }

    if value.get("type").and_then(serde_json::Value::as_str) == Some("Polygon") {
        let rings = parse_rings(value.get("coordinates")?)?;
        return Some(RawParcelGeometry::GeoJson(NormalizedGeometry::Polygon(
            rings,
        )));
    }

    None
}

/// Converts a classified geometry into `GeoJSON`.
#[must_use]
pub fn normalize_raw(raw: RawParcelGeometry) -> NormalizedGeometry {
    match raw {
        RawParcelGeometry::EsriPolygon { rings } => NormalizedGeometry::Polygon(rings),
        RawParcelGeometry::EsriPoint { x, y } => NormalizedGeometry::Point(vec![x, y]),
        RawParcelGeometry::GeoJson(geometry) => geometry,
    }
}

/// Normalizes upstream geometry into `GeoJSON`.
///
/// Returns `None` when the geometry is missing or unrecognizable. Never
/// panics on malformed input.
#[must_use]
pub fn normalize(geometry: Option<&serde_json::Value>) -> Option<NormalizedGeometry> {
    let Some(value) = geometry else {
        log::debug!("normalize: no geometry");
        return None;
    };

    let normalized = classify(value).map(normalize_raw);
    if normalized.is_none() {
        log::debug!("normalize: unrecognized geometry {value}");
    }
    normalized
}

/// Parses a rings array. Every position needs at least two numbers.
fn parse_rings(value: &serde_json::Value) -> Option<Vec<Vec<Position>>> {
    let rings = value.as_array()?;
    if rings.is_empty() {
        return None;
    }

    rings
        .iter()
        .map(|ring| {
            ring.as_array()?
                .iter()
                .map(|position| {
                    let position = position
                        .as_array()?
                        .iter()
                        .map(serde_json::Value::as_f64)
                        .collect::<Option<Position>>()?;
                    (position.len() >= 2).then_some(position)
                })
                .collect::<Option<Vec<Position>>>()
        })
        .collect()
}

/// Returns `true` if the ring has at least four positions and its first
/// position equals its last.
#[must_use]
pub fn is_closed_ring(ring: &[Position]) -> bool {
    ring.len() >= 4 && ring.first() == ring.last()
}

/// Builds a closed square polygon of `side` degrees centered on `center`.
#[must_use]
pub fn square_polygon(center: Coordinate, side: f64) -> NormalizedGeometry {
    let half = side / 2.0;
    rect_polygon(
        center.longitude - half,
        center.latitude - half,
        center.longitude + half,
        center.latitude + half,
    )
}

/// Builds a closed square polygon of `side` degrees whose southwest corner
/// is `(lng, lat)`.
#[must_use]
pub fn cell_polygon(lng: f64, lat: f64, side: f64) -> NormalizedGeometry {
    rect_polygon(lng, lat, lng + side, lat + side)
}

fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> NormalizedGeometry {
    let polygon = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
        .to_polygon();
    let ring = polygon
        .exterior()
        .coords()
        .map(|c| vec![c.x, c.y])
        .collect();
    NormalizedGeometry::Polygon(vec![ring])
}

/// Converts a normalized geometry into a `geojson` geometry.
#[must_use]
pub fn to_geojson_geometry(geometry: &NormalizedGeometry) -> geojson::Geometry {
    let value = match geometry {
        NormalizedGeometry::Point(position) => geojson::Value::Point(position.clone()),
        NormalizedGeometry::Polygon(rings) => geojson::Value::Polygon(rings.clone()),
    };
    geojson::Geometry::new(value)
}

/// Converts a parcel into a `GeoJSON` `Feature`.
#[must_use]
pub fn to_geojson_feature(feature: &ParcelFeature) -> geojson::Feature {
    let properties = match serde_json::to_value(&feature.properties) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            log::error!("Failed to serialize parcel properties: {e}");
            None
        }
    };

    geojson::Feature {
        bbox: None,
        geometry: Some(to_geojson_geometry(&feature.geometry)),
        id: None,
        properties,
        foreign_members: None,
    }
}

/// Wraps parcels in a `GeoJSON` `FeatureCollection`.
///
/// When `truncated` is set, the collection carries a `truncated: true`
/// foreign member so clients know the grid was capped.
#[must_use]
pub fn to_feature_collection(
    features: &[ParcelFeature],
    truncated: bool,
) -> geojson::FeatureCollection {
    let foreign_members = truncated.then(|| {
        let mut members = serde_json::Map::new();
        members.insert("truncated".to_string(), serde_json::Value::Bool(true));
        members
    });

    geojson::FeatureCollection {
        bbox: None,
        features: features.iter().map(to_geojson_feature).collect(),
        foreign_members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_map_parcel_models::{DataQuality, ParcelProperties};
    use serde_json::json;

    fn sample_rings() -> serde_json::Value {
        json!([[
            [-92.331, 38.951],
            [-92.329, 38.951],
            [-92.329, 38.949],
            [-92.331, 38.949],
            [-92.331, 38.951]
        ]])
    }

    #[test]
    fn rings_become_polygon_verbatim() {
        let rings = sample_rings();
        let normalized = normalize(Some(&json!({ "rings": rings.clone() }))).unwrap();
        assert_eq!(
            serde_json::to_value(&normalized).unwrap(),
            json!({ "type": "Polygon", "coordinates": rings })
        );
    }

    #[test]
    fn rings_keep_extra_ordinates() {
        let value = json!({ "rings": [[[1.0, 2.0, 30.0], [3.0, 4.0, 31.0]]] });
        let normalized = normalize(Some(&value)).unwrap();
        assert_eq!(
            normalized,
            NormalizedGeometry::Polygon(vec![vec![vec![1.0, 2.0, 30.0], vec![3.0, 4.0, 31.0]]])
        );
    }

    #[test]
    fn xy_becomes_point() {
        for (x, y) in [(-92.33, 38.95), (0.0, 0.0), (180.0, -90.0)] {
            assert_eq!(
                normalize(Some(&json!({ "x": x, "y": y }))),
                Some(NormalizedGeometry::Point(vec![x, y]))
            );
        }
    }

    #[test]
    fn missing_or_empty_geometry_is_none() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(&json!({}))), None);
        assert_eq!(normalize(Some(&serde_json::Value::Null)), None);
        assert_eq!(normalize(Some(&json!({ "x": "a", "y": 1 }))), None);
    }

    #[test]
    fn malformed_rings_are_none() {
        assert_eq!(normalize(Some(&json!({ "rings": [] }))), None);
        assert_eq!(normalize(Some(&json!({ "rings": "nope" }))), None);
        assert_eq!(normalize(Some(&json!({ "rings": [[[1.0]]] }))), None);
        assert_eq!(normalize(Some(&json!({ "rings": [[["a", "b"]]] }))), None);
    }

    #[test]
    fn geojson_point_is_not_passed_through() {
        let value = json!({ "type": "Point", "coordinates": [1.0, 2.0] });
        assert_eq!(normalize(Some(&value)), None);
    }

    #[test]
    fn normalize_is_idempotent_on_polygons() {
        let first = normalize(Some(&json!({ "rings": sample_rings() }))).unwrap();
        let serialized = serde_json::to_value(&first).unwrap();
        let second = normalize(Some(&serialized)).unwrap();
        assert_eq!(first, second);
        assert_eq!(serde_json::to_value(&second).unwrap(), serialized);
    }

    #[test]
    fn square_polygon_is_closed_and_centered() {
        let center = Coordinate::new(-92.33, 38.95).unwrap();
        let NormalizedGeometry::Polygon(rings) = square_polygon(center, 0.002) else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        assert!(is_closed_ring(ring));

        let xs: Vec<f64> = ring.iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = ring.iter().map(|p| p[1]).collect();
        let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);
        let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!((max_x - min_x - 0.002).abs() < 1e-12);
        assert!((max_y - min_y - 0.002).abs() < 1e-12);
        assert!(((max_x + min_x) / 2.0 - -92.33).abs() < 1e-12);
        assert!(((max_y + min_y) / 2.0 - 38.95).abs() < 1e-12);
    }

    #[test]
    fn cell_polygon_is_anchored_at_southwest() {
        let NormalizedGeometry::Polygon(rings) = cell_polygon(-92.34, 38.94, 0.008) else {
            panic!("expected polygon");
        };
        let ring = &rings[0];
        assert!(is_closed_ring(ring));
        assert!(ring.contains(&vec![-92.34, 38.94]));
        assert!(ring.contains(&vec![-92.34 + 0.008, 38.94 + 0.008]));
    }

    #[test]
    fn feature_conversion_flattens_properties() {
        let mut extra = serde_json::Map::new();
        extra.insert("OBJECTID".to_string(), json!(12));
        let feature = ParcelFeature {
            geometry: NormalizedGeometry::Point(vec![1.0, 2.0]),
            properties: ParcelProperties::new(
                "Owner".to_string(),
                2.0,
                "P".to_string(),
                DataQuality::Live,
                extra,
            ),
        };

        let json = serde_json::to_value(to_geojson_feature(&feature)).unwrap();
        assert_eq!(json["type"], "Feature");
        assert_eq!(json["geometry"]["type"], "Point");
        assert_eq!(json["properties"]["OBJECTID"], 12);
        assert_eq!(json["properties"]["ACRES_CALC"], 2.0);
    }

    #[test]
    fn truncated_collection_carries_flag() {
        let json = serde_json::to_value(to_feature_collection(&[], true)).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["truncated"], true);

        let json = serde_json::to_value(to_feature_collection(&[], false)).unwrap();
        assert!(json.get("truncated").is_none());
    }
}
