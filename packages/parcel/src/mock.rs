//! Fixed synthetic parcel table used when real data is unavailable.
//!
//! The entries mirror typical Boone County, MO parcels. Synthetic
//! polygons are squares whose side grows with acreage:
//! `side = sqrt(acres * FALLBACK_SIZE_FACTOR)` degrees.

use parcel_map_parcel_models::{
    Coordinate, DataQuality, ParcelFeature, ParcelProperties,
};

/// Degrees² per acre used to size synthetic parcels.
pub const FALLBACK_SIZE_FACTOR: f64 = 0.000_052;

/// Sale date stamped on every synthetic parcel.
pub const MOCK_LAST_SALE_DATE: &str = "2023-06-15";

/// A synthetic parcel template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockParcel {
    /// Owner name.
    pub owner: &'static str,
    /// Acreage.
    pub acres: f64,
    /// Parcel identifier.
    pub parcel_id: &'static str,
    /// Situs address.
    pub address: &'static str,
    /// Stable object ID.
    pub object_id: u32,
}

/// The fixed synthetic parcel table.
pub const MOCK_PARCELS: &[MockParcel] = &[
    MockParcel {
        owner: "Smith, John & Mary",
        acres: 3.45,
        parcel_id: "BC-2024-001245",
        address: "3708 N Oakland Gravel Road",
        object_id: 1245,
    },
    MockParcel {
        owner: "Johnson Family Trust",
        acres: 15.2,
        parcel_id: "BC-2024-001246",
        address: "405 Bear Creek Road",
        object_id: 1246,
    },
    MockParcel {
        owner: "Columbia Municipal Utilities",
        acres: 2.1,
        parcel_id: "BC-2024-001247",
        address: "Downtown District",
        object_id: 1247,
    },
    MockParcel {
        owner: "Stephens College Foundation",
        acres: 87.5,
        parcel_id: "BC-2024-001248",
        address: "College Avenue Campus",
        object_id: 1248,
    },
];

/// Side length in degrees of a synthetic square for `acres`.
#[must_use]
pub fn fallback_side(acres: f64) -> f64 {
    (acres.max(0.0) * FALLBACK_SIZE_FACTOR).sqrt()
}

impl MockParcel {
    /// Synthesizes a parcel feature centered on `center`.
    #[must_use]
    pub fn synthesize(&self, center: Coordinate) -> ParcelFeature {
        ParcelFeature {
            geometry: parcel_map_geometry::square_polygon(center, fallback_side(self.acres)),
            properties: ParcelProperties::new(
                self.owner.to_string(),
                self.acres,
                self.parcel_id.to_string(),
                DataQuality::Synthetic,
                self.attributes(),
            ),
        }
    }

    /// Assessor-style attributes attached to synthetic parcels.
    #[allow(clippy::cast_possible_truncation)]
    fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attrs = serde_json::Map::new();
        attrs.insert("OBJECTID".to_string(), self.object_id.into());
        attrs.insert("ADDRESS".to_string(), self.address.into());
        attrs.insert(
            "ASSESSED_VALUE".to_string(),
            ((self.acres * 45_000.0).floor() as i64).into(),
        );
        attrs.insert(
            "LAST_SALE_PRICE".to_string(),
            ((self.acres * 50_000.0).floor() as i64).into(),
        );
        attrs.insert("LAST_SALE_DATE".to_string(), MOCK_LAST_SALE_DATE.into());
        attrs
    }
}
