#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Parcel, geometry, contact, and query log value types.
//!
//! These types are shared by every parcel map crate. Upstream responses
//! are reshaped into [`ParcelRecord`] values, normalized into
//! [`ParcelFeature`] values for display, and projected into
//! [`QueryLogEntry`] values for the audit log.

pub mod events;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// A single `GeoJSON` position (`[lng, lat]`, optionally with extra
/// ordinates passed through from the upstream service).
pub type Position = Vec<f64>;

/// Owner used when the upstream record has no owner field.
pub const UNKNOWN_OWNER: &str = "Unknown Owner";

/// Parcel ID used when the upstream record has no identifier field.
pub const UNKNOWN_PARCEL_ID: &str = "N/A";

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
}

/// Error returned when a coordinate is outside the WGS84 range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid coordinate ({longitude}, {latitude}): {reason}")]
pub struct InvalidCoordinateError {
    /// The rejected longitude.
    pub longitude: f64,
    /// The rejected latitude.
    pub latitude: f64,
    /// Why the coordinate was rejected.
    pub reason: &'static str,
}

impl Coordinate {
    /// Creates a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either value is non-finite or
    /// outside the WGS84 range.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, InvalidCoordinateError> {
        let reason = if !longitude.is_finite() || !latitude.is_finite() {
            Some("values must be finite")
        } else if !(-180.0..=180.0).contains(&longitude) {
            Some("longitude must be within [-180, 180]")
        } else if !(-90.0..=90.0).contains(&latitude) {
            Some("latitude must be within [-90, 90]")
        } else {
            None
        };

        reason.map_or(
            Ok(Self {
                longitude,
                latitude,
            }),
            |reason| {
                Err(InvalidCoordinateError {
                    longitude,
                    latitude,
                    reason,
                })
            },
        )
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.longitude, self.latitude)
    }
}

/// An axis-aligned bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude.
    pub west: f64,
    /// Southern latitude.
    pub south: f64,
    /// Eastern longitude.
    pub east: f64,
    /// Northern latitude.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box. No validation is performed.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// East-west extent in degrees.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// North-south extent in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }
}

/// Geometry as delivered by an upstream service, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawParcelGeometry {
    /// Esri JSON polygon (`{ "rings": [...] }`).
    EsriPolygon {
        /// Polygon rings, each an ordered list of positions.
        rings: Vec<Vec<Position>>,
    },
    /// Esri JSON point (`{ "x": .., "y": .. }`).
    EsriPoint {
        /// Longitude.
        x: f64,
        /// Latitude.
        y: f64,
    },
    /// Already-normalized `GeoJSON` geometry.
    GeoJson(NormalizedGeometry),
}

/// A `GeoJSON` geometry, serialized as `{ "type": .., "coordinates": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum NormalizedGeometry {
    /// `[lng, lat]`.
    Point(Position),
    /// Rings of positions; each ring is closed (first == last).
    Polygon(Vec<Vec<Position>>),
}

/// Whether a parcel came from the live cadastral service or was
/// synthesized locally.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataQuality {
    /// Served by the upstream cadastral service.
    Live,
    /// Synthetic placeholder data (upstream unreachable or grid preview).
    Synthetic,
}

/// A parcel extracted from an upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelRecord {
    /// Owner name.
    pub owner: String,
    /// Calculated acreage, never negative.
    pub acres: f64,
    /// Parcel identifier.
    pub parcel_id: String,
    /// Raw geometry exactly as the upstream returned it.
    pub geometry: Option<serde_json::Value>,
    /// The coordinate that was queried.
    pub source_coordinate: Coordinate,
    /// Every attribute the upstream returned.
    pub extra_attributes: serde_json::Map<String, serde_json::Value>,
}

/// Property keys that are always set from the resolved [`ParcelRecord`]
/// fields and therefore never taken from raw attributes.
pub const RESERVED_PROPERTY_KEYS: &[&str] = &[
    "OWNER",
    "OWNER_NAME",
    "ACRES_CALC",
    "PARCEL_ID",
    "selected",
    "dataQuality",
];

/// Properties of a displayable parcel feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelProperties {
    /// Owner name.
    #[serde(rename = "OWNER")]
    pub owner: String,
    /// Duplicate of `OWNER` kept for clients that read `OWNER_NAME`.
    #[serde(rename = "OWNER_NAME")]
    pub owner_name: String,
    /// Acreage.
    #[serde(rename = "ACRES_CALC")]
    pub acres: f64,
    /// Parcel identifier.
    #[serde(rename = "PARCEL_ID")]
    pub parcel_id: String,
    /// Always `true` for a looked-up parcel.
    pub selected: bool,
    /// Live or synthetic.
    #[serde(rename = "dataQuality")]
    pub data_quality: DataQuality,
    /// Remaining upstream attributes.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ParcelProperties {
    /// Builds properties from resolved fields. Keys in `extra` that clash
    /// with a resolved field are dropped.
    #[must_use]
    pub fn new(
        owner: String,
        acres: f64,
        parcel_id: String,
        data_quality: DataQuality,
        mut extra: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        // Resolved fields take precedence over raw attributes of the same
        // name, so a null `OWNER` attribute never hides the fallback owner.
        for key in RESERVED_PROPERTY_KEYS {
            extra.remove(*key);
        }
        Self {
            owner_name: owner.clone(),
            owner,
            acres,
            parcel_id,
            selected: true,
            data_quality,
            extra,
        }
    }
}

/// A parcel ready for display: normalized geometry plus properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelFeature {
    /// Normalized `GeoJSON` geometry.
    pub geometry: NormalizedGeometry,
    /// Display properties.
    pub properties: ParcelProperties,
}

impl ParcelFeature {
    /// Returns the data quality tag of this feature.
    #[must_use]
    pub const fn data_quality(&self) -> DataQuality {
        self.properties.data_quality
    }
}

/// Owner contact details returned by the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Mailing address.
    #[serde(default)]
    pub address: Option<String>,
    /// Whether the enrichment service verified the contact.
    #[serde(default)]
    pub verified: bool,
}

/// What triggered a parcel query.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuerySource {
    /// The user clicked the map.
    MapClick,
    /// The user searched an address.
    AddressSearch,
}

/// A parcel query to be appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    /// The queried coordinate, if known.
    pub coordinate: Option<Coordinate>,
    /// The searched address, for address searches.
    pub address: Option<String>,
    /// Snapshot of the result shown to the user (`None` if nothing found).
    pub result: Option<serde_json::Value>,
    /// What triggered the query.
    pub source: QuerySource,
}

/// A browser geolocation access to be appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeolocationLogEntry {
    /// The reported location.
    pub coordinate: Coordinate,
    /// Reported accuracy in meters.
    pub accuracy: Option<f64>,
}

/// Request metadata captured by the server alongside log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// `User-Agent` header value.
    pub user_agent: Option<String>,
    /// Client IP address as seen by the server.
    pub ip_address: Option<String>,
}

/// Identifier of an appended log record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(pub String);

impl std::fmt::Display for LogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(-92.33, 38.95).is_ok());
        assert!(Coordinate::new(181.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -90.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn normalized_geometry_uses_geojson_shape() {
        let point = NormalizedGeometry::Point(vec![-92.3, 38.9]);
        assert_eq!(
            serde_json::to_value(&point).unwrap(),
            serde_json::json!({ "type": "Point", "coordinates": [-92.3, 38.9] })
        );
    }

    #[test]
    fn properties_drop_clashing_attributes() {
        let mut extra = serde_json::Map::new();
        extra.insert("OWNER".to_string(), serde_json::Value::Null);
        extra.insert("ZONING".to_string(), serde_json::json!("R-1"));

        let props = ParcelProperties::new(
            "Jane Doe".to_string(),
            1.5,
            "P-1".to_string(),
            DataQuality::Live,
            extra,
        );
        let json = serde_json::to_value(&props).unwrap();

        assert_eq!(json["OWNER"], "Jane Doe");
        assert_eq!(json["OWNER_NAME"], "Jane Doe");
        assert_eq!(json["ZONING"], "R-1");
        assert_eq!(json["selected"], true);
        assert_eq!(json["dataQuality"], "live");
    }

    #[test]
    fn query_source_serializes_snake_case() {
        assert_eq!(QuerySource::AddressSearch.to_string(), "address_search");
        assert_eq!(
            serde_json::to_value(QuerySource::MapClick).unwrap(),
            serde_json::json!("map_click")
        );
    }
}
