//! Mapbox forward geocoding.
//!
//! Requests `{base}/{address}.json` with a proximity bias toward the map's
//! home area, restricted to the US. The first feature is the most
//! relevant; its `center` is `[lng, lat]`.
//!
//! See <https://docs.mapbox.com/api/search/geocoding-v5/>

use std::time::Duration;

use parcel_map_parcel_models::Coordinate;
use reqwest::Url;

use crate::{AddressGeocoder, GeocodeError, GeocodedAddress};

/// Default forward geocoding endpoint.
pub const MAPBOX_PLACES_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

/// Default proximity bias (Columbia, MO).
pub const DEFAULT_PROXIMITY: Coordinate = Coordinate {
    longitude: -92.33,
    latitude: 38.95,
};

/// Results requested per query.
const RESULT_LIMIT: &str = "5";

/// Mapbox geocoding client.
pub struct MapboxGeocoder {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    proximity: Coordinate,
}

impl MapboxGeocoder {
    /// Creates a geocoder. A missing token is reported on first use.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        proximity: Coordinate,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            proximity,
        })
    }

    /// Builds the request URL for `address`. The address is percent-encoded
    /// as a single path segment.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Config`] if the token is missing or the base
    /// URL is invalid.
    pub fn request_url(&self, address: &str) -> Result<Url, GeocodeError> {
        let Some(token) = &self.token else {
            return Err(GeocodeError::Config {
                message: "Mapbox token not configured".to_string(),
            });
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| GeocodeError::Config {
            message: format!("Invalid geocoder URL {}: {e}", self.base_url),
        })?;

        url.path_segments_mut()
            .map_err(|()| GeocodeError::Config {
                message: format!("Geocoder URL {} cannot have a path", self.base_url),
            })?
            .pop_if_empty()
            .push(&format!("{address}.json"));

        url.query_pairs_mut()
            .append_pair("proximity", &self.proximity.to_string())
            .append_pair("country", "us")
            .append_pair("limit", RESULT_LIMIT)
            .append_pair("access_token", token);

        Ok(url)
    }
}

#[async_trait::async_trait]
impl AddressGeocoder for MapboxGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let url = self.request_url(address)?;
        log::debug!("Geocoding address: {address}");

        let resp = self.client.get(url).send().await?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a Mapbox `FeatureCollection` response.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if there is no `features` array or the
/// first feature has no usable `center`.
pub fn parse_response(body: &serde_json::Value) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let features = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Mapbox response missing 'features' array".to_string(),
        })?;

    let Some(first) = features.first() else {
        return Ok(None);
    };

    let center = first
        .get("center")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Feature missing center".to_string(),
        })?;

    let (Some(lng), Some(lat)) = (
        center.first().and_then(serde_json::Value::as_f64),
        center.get(1).and_then(serde_json::Value::as_f64),
    ) else {
        return Err(GeocodeError::Parse {
            message: "center is not a [lng, lat] pair".to_string(),
        });
    };

    let coordinate = Coordinate::new(lng, lat).map_err(|e| GeocodeError::Parse {
        message: e.to_string(),
    })?;

    let address = first
        .get("place_name")
        .and_then(serde_json::Value::as_str)
        .map(String::from);

    Ok(Some(GeocodedAddress {
        address,
        coordinate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocoder(token: Option<&str>) -> MapboxGeocoder {
        MapboxGeocoder::new(
            MAPBOX_PLACES_URL,
            token.map(String::from),
            DEFAULT_PROXIMITY,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn parses_first_feature() {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "place_name": "701 E Broadway, Columbia, Missouri 65201, United States",
                    "center": [-92.3277, 38.9517]
                },
                {
                    "place_name": "Broadway, Kansas City, Missouri",
                    "center": [-94.58, 39.09]
                }
            ]
        });
        let result = parse_response(&body).unwrap().unwrap();
        assert!((result.coordinate.longitude - -92.3277).abs() < 1e-6);
        assert!((result.coordinate.latitude - 38.9517).abs() < 1e-6);
        assert_eq!(
            result.address.as_deref(),
            Some("701 E Broadway, Columbia, Missouri 65201, United States")
        );
    }

    #[test]
    fn no_features_is_none() {
        let body = serde_json::json!({ "type": "FeatureCollection", "features": [] });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn missing_features_is_parse_error() {
        let body = serde_json::json!({ "message": "Not Authorized - Invalid Token" });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn bad_center_is_parse_error() {
        let body = serde_json::json!({ "features": [{ "center": ["x"] }] });
        assert!(matches!(
            parse_response(&body),
            Err(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn request_url_encodes_address_segment() {
        let url = geocoder(Some("pk.test"))
            .request_url("701 E Broadway #2")
            .unwrap();
        assert!(
            url.path()
                .ends_with("/mapbox.places/701%20E%20Broadway%20%232.json")
        );

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("proximity".to_string(), "-92.33,38.95".to_string())));
        assert!(query.contains(&("country".to_string(), "us".to_string())));
        assert!(query.contains(&("limit".to_string(), "5".to_string())));
        assert!(query.contains(&("access_token".to_string(), "pk.test".to_string())));
    }

    #[tokio::test]
    async fn missing_token_is_config_error() {
        for token in [None, Some("  ")] {
            let result = geocoder(token).geocode("701 E Broadway").await;
            assert!(matches!(result, Err(GeocodeError::Config { .. })));
        }
    }
}
