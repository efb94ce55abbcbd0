#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! API request and response types for the parcel map server.
//!
//! Field names follow what the map client already sends (`lng`/`lat`,
//! `ownerName`), so these stay separate from the internal parcel types.

use parcel_map_geocoder::GeocodedAddress;
use parcel_map_parcel_models::LogId;
use serde::{Deserialize, Serialize};

/// Body of `POST /parcel/lookup`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParcelLookupRequest {
    /// Longitude of the click.
    pub lng: f64,
    /// Latitude of the click.
    pub lat: f64,
}

/// Body of `POST /parcel/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSearchRequest {
    /// Free-form address.
    pub address: String,
}

/// Response of `POST /parcel/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSearchResponse {
    /// The geocoded address, or `None` if nothing matched.
    pub geocoded: Option<GeocodedAddress>,
    /// The parcel at the geocoded location, if any.
    pub parcel: Option<geojson::Feature>,
}

/// Body of `POST /parcel/bounds`: `[[west, south], [east, north]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsRequest {
    /// Southwest and northeast corners.
    pub bounds: Vec<Vec<f64>>,
}

/// Body of `POST /owner/contact`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerContactRequest {
    /// Owner name as shown on the parcel.
    pub owner_name: String,
    /// Parcel identifier, if known.
    #[serde(default)]
    pub parcel_id: Option<String>,
}

/// Body of `POST /log/geolocation`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeolocationLogRequest {
    /// Reported latitude.
    pub latitude: f64,
    /// Reported longitude.
    pub longitude: f64,
    /// Reported accuracy in meters.
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Response of `POST /log/geolocation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationLogResponse {
    /// Id of the stored record, or `None` if logging failed.
    pub id: Option<LogId>,
}

/// Body returned for a lookup that found no parcel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyFeatures {
    /// Always empty.
    pub features: Vec<serde_json::Value>,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Short error summary.
    pub error: String,
    /// Detail.
    pub message: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Always `"ok"`.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Deployment environment.
    pub environment: String,
}
