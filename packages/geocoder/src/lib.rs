#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Address search for parcel map.
//!
//! Converts a free-form address typed by the user into a coordinate that
//! the parcel resolver can look up. The only provider is a Mapbox-style
//! forward geocoding API ([`mapbox`]).

pub mod mapbox;

use parcel_map_parcel_models::Coordinate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mapbox::MapboxGeocoder;

/// A geocoding result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    /// The matched address as the provider formats it.
    pub address: Option<String>,
    /// Where the address is.
    pub coordinate: Coordinate,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Geocoding failed with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The geocoder is missing required configuration.
    #[error("Geocoder not configured: {message}")]
    Config {
        /// What is missing.
        message: String,
    },
}

/// Something that can geocode a free-form address.
#[async_trait::async_trait]
pub trait AddressGeocoder: Send + Sync {
    /// Returns the best match for `address`, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the provider is misconfigured,
    /// unreachable, or answers with something unreadable.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocodeError>;
}
