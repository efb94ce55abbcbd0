#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `ArcGIS` cadastral point-intersection client.
//!
//! Queries a county `MapServer` layer for the parcel polygon containing a
//! WGS84 coordinate and reshapes the first returned feature into a
//! [`ParcelRecord`]. The service sits behind the [`CadastralService`]
//! trait so resolvers can run against simulated upstreams.

use std::time::Duration;

use parcel_map_parcel_models::{
    Coordinate, ParcelRecord, UNKNOWN_OWNER, UNKNOWN_PARCEL_ID,
};
use thiserror::Error;

/// Boone County, MO parcel layer query endpoint.
pub const BOONE_COUNTY_PARCELS_URL: &str =
    "https://maps.boonecountymo.org/arcgis/rest/services/AS_ParcelMapping/MapServer/0/query";

/// Default upstream timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `User-Agent` sent with every upstream request.
const USER_AGENT: &str = concat!("ParcelMap/", env!("CARGO_PKG_VERSION"));

/// Attribute names tried, in order, for the owner.
pub const OWNER_FIELDS: &[&str] = &["OWNER", "OWNER_NAME"];

/// Attribute names tried, in order, for the acreage.
pub const ACRES_FIELDS: &[&str] = &["ACRES_CALC", "ACRES"];

/// Attribute names tried, in order, for the parcel identifier.
pub const PARCEL_ID_FIELDS: &[&str] = &["PARCEL_ID", "PIN", "OBJECTID"];

/// Errors from the cadastral service.
#[derive(Debug, Error)]
pub enum ArcGisError {
    /// Network failure, timeout, or unreadable body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("ArcGIS returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The service answered 200 with an `error` payload.
    #[error("ArcGIS error: {message}")]
    Service {
        /// Error code reported by the service, if any.
        code: Option<i64>,
        /// Error message reported by the service.
        message: String,
    },

    /// The response body was not a query result.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl ArcGisError {
    /// Whether the failure was a client-side timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}

/// A single feature from a query response.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcGisFeature {
    /// Attribute map (`OWNER`, `ACRES_CALC`, ...).
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Raw Esri geometry, if returned.
    pub geometry: Option<serde_json::Value>,
}

/// A cadastral service that can answer point-intersection queries.
#[async_trait::async_trait]
pub trait CadastralService: Send + Sync {
    /// Returns every parcel feature intersecting `coordinate`, in the
    /// order the service returned them.
    ///
    /// # Errors
    ///
    /// Returns [`ArcGisError`] if the service is unreachable, times out,
    /// or answers with an error.
    async fn query_point(&self, coordinate: Coordinate) -> Result<Vec<ArcGisFeature>, ArcGisError>;

    /// Short description used in logs (usually the endpoint URL).
    fn describe(&self) -> &str;
}

/// HTTP client for an `ArcGIS` `MapServer`/`FeatureServer` query endpoint.
pub struct ArcGisClient {
    client: reqwest::Client,
    query_url: String,
}

impl ArcGisClient {
    /// Creates a client for `query_url` (up to and including `/query`)
    /// whose requests fail after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ArcGisError::Http`] if the HTTP client cannot be built.
    pub fn new(query_url: impl Into<String>, timeout: Duration) -> Result<Self, ArcGisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            query_url: query_url.into(),
        })
    }

    /// Query parameters for a point-intersection query in EPSG:4326.
    #[must_use]
    pub fn point_query_params(coordinate: Coordinate) -> Vec<(&'static str, String)> {
        vec![
            (
                "geometry",
                format!("{},{}", coordinate.longitude, coordinate.latitude),
            ),
            ("geometryType", "esriGeometryPoint".to_string()),
            ("spatialRel", "esriSpatialRelIntersects".to_string()),
            ("inSR", "4326".to_string()),
            ("outSR", "4326".to_string()),
            ("outFields", "*".to_string()),
            ("returnGeometry", "true".to_string()),
            ("f", "json".to_string()),
        ]
    }
}

#[async_trait::async_trait]
impl CadastralService for ArcGisClient {
    async fn query_point(&self, coordinate: Coordinate) -> Result<Vec<ArcGisFeature>, ArcGisError> {
        log::debug!("ArcGIS point query at {coordinate} against {}", self.query_url);

        let resp = self
            .client
            .get(&self.query_url)
            .query(&Self::point_query_params(coordinate))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ArcGisError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().await?;
        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ArcGisError::Parse {
                message: format!("Failed to parse ArcGIS response: {e}"),
            })?;

        let features = parse_query_response(&json)?;
        log::debug!("ArcGIS returned {} feature(s)", features.len());
        Ok(features)
    }

    fn describe(&self) -> &str {
        &self.query_url
    }
}

/// Parses a `f=json` query response body.
///
/// # Errors
///
/// Returns [`ArcGisError::Service`] for an embedded `error` payload and
/// [`ArcGisError::Parse`] when there is no `features` array.
pub fn parse_query_response(body: &serde_json::Value) -> Result<Vec<ArcGisFeature>, ArcGisError> {
    if let Some(error) = body.get("error") {
        return Err(ArcGisError::Service {
            code: error.get("code").and_then(serde_json::Value::as_i64),
            message: error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    let features = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| ArcGisError::Parse {
            message: "No features array in ArcGIS response".to_string(),
        })?;

    Ok(features
        .iter()
        .map(|feature| ArcGisFeature {
            attributes: feature
                .get("attributes")
                .and_then(serde_json::Value::as_object)
                .cloned()
                .unwrap_or_default(),
            geometry: feature.get("geometry").filter(|g| !g.is_null()).cloned(),
        })
        .collect())
}

/// Builds a [`ParcelRecord`] from a feature using the owner, acreage, and
/// parcel ID fallback chains.
#[must_use]
pub fn extract_record(feature: &ArcGisFeature, coordinate: Coordinate) -> ParcelRecord {
    let attrs = &feature.attributes;
    ParcelRecord {
        owner: first_text(attrs, OWNER_FIELDS).unwrap_or_else(|| UNKNOWN_OWNER.to_string()),
        acres: first_acres(attrs).unwrap_or(0.0),
        parcel_id: first_text(attrs, PARCEL_ID_FIELDS)
            .unwrap_or_else(|| UNKNOWN_PARCEL_ID.to_string()),
        geometry: feature.geometry.clone(),
        source_coordinate: coordinate,
        extra_attributes: attrs.clone(),
    }
}

/// First non-empty string (or number, rendered as text) among `fields`.
fn first_text(
    attrs: &serde_json::Map<String, serde_json::Value>,
    fields: &[&str],
) -> Option<String> {
    fields.iter().find_map(|field| match attrs.get(*field)? {
        serde_json::Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First positive, finite acreage among [`ACRES_FIELDS`]. Numeric strings
/// are accepted.
fn first_acres(attrs: &serde_json::Map<String, serde_json::Value>) -> Option<f64> {
    ACRES_FIELDS.iter().find_map(|field| {
        let value = attrs.get(*field)?;
        let acres = value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))?;
        (acres.is_finite() && acres > 0.0).then_some(acres)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coordinate() -> Coordinate {
        Coordinate::new(-92.33, 38.95).unwrap()
    }

    fn feature(attributes: serde_json::Value) -> ArcGisFeature {
        ArcGisFeature {
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            geometry: None,
        }
    }

    #[test]
    fn point_query_requests_wgs84_and_all_fields() {
        let params = ArcGisClient::point_query_params(coordinate());
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("geometry"), Some("-92.33,38.95"));
        assert_eq!(get("inSR"), Some("4326"));
        assert_eq!(get("outSR"), Some("4326"));
        assert_eq!(get("outFields"), Some("*"));
        assert_eq!(get("returnGeometry"), Some("true"));
        assert_eq!(get("spatialRel"), Some("esriSpatialRelIntersects"));
    }

    #[test]
    fn parses_features_in_response_order() {
        let body = json!({
            "features": [
                { "attributes": { "OWNER": "A" }, "geometry": { "rings": [] } },
                { "attributes": { "OWNER": "B" } }
            ]
        });
        let features = parse_query_response(&body).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].attributes["OWNER"], "A");
        assert!(features[0].geometry.is_some());
        assert!(features[1].geometry.is_none());
    }

    #[test]
    fn empty_features_is_not_an_error() {
        let features = parse_query_response(&json!({ "features": [] })).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn error_payload_in_success_body_is_an_error() {
        let body = json!({ "error": { "code": 400, "message": "Invalid query" } });
        let err = parse_query_response(&body).unwrap_err();
        assert!(matches!(
            err,
            ArcGisError::Service { code: Some(400), ref message } if message == "Invalid query"
        ));
    }

    #[test]
    fn missing_features_is_a_parse_error() {
        let err = parse_query_response(&json!({ "count": 3 })).unwrap_err();
        assert!(matches!(err, ArcGisError::Parse { .. }));
    }

    #[test]
    fn record_uses_primary_fields() {
        let record = extract_record(
            &feature(json!({ "OWNER": "SMITH, JOHN", "ACRES_CALC": 2.5, "PARCEL_ID": "12-345" })),
            coordinate(),
        );
        assert_eq!(record.owner, "SMITH, JOHN");
        assert!((record.acres - 2.5).abs() < f64::EPSILON);
        assert_eq!(record.parcel_id, "12-345");
        assert_eq!(record.extra_attributes.len(), 3);
    }

    #[test]
    fn record_falls_back_through_alternate_fields() {
        let record = extract_record(
            &feature(json!({ "OWNER": "", "OWNER_NAME": "DOE TRUST", "ACRES": "4.75", "OBJECTID": 991 })),
            coordinate(),
        );
        assert_eq!(record.owner, "DOE TRUST");
        assert!((record.acres - 4.75).abs() < f64::EPSILON);
        assert_eq!(record.parcel_id, "991");
    }

    #[test]
    fn record_defaults_when_fields_absent() {
        let record = extract_record(&feature(json!({ "ACRES_CALC": -3.0 })), coordinate());
        assert_eq!(record.owner, UNKNOWN_OWNER);
        assert!(record.acres.abs() < f64::EPSILON);
        assert_eq!(record.parcel_id, UNKNOWN_PARCEL_ID);
    }

    #[test]
    fn pin_is_preferred_over_objectid() {
        let record = extract_record(
            &feature(json!({ "PIN": "17-200-00-01", "OBJECTID": 5 })),
            coordinate(),
        );
        assert_eq!(record.parcel_id, "17-200-00-01");
    }

    #[tokio::test]
    async fn unreachable_service_is_an_http_error() {
        let client = ArcGisClient::new("http://127.0.0.1:1/query", Duration::from_secs(2)).unwrap();
        let err = client.query_point(coordinate()).await.unwrap_err();
        assert!(matches!(err, ArcGisError::Http(_)));
    }
}
