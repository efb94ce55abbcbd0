//! HTTP handler functions for the parcel map API.

use std::sync::Arc;

use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, web};
use parcel_map_contact::ContactError;
use parcel_map_geocoder::GeocodeError;
use parcel_map_parcel::parse_bounds;
use parcel_map_parcel_models::events::{EventKind, ObservabilityEvent};
use parcel_map_parcel_models::{
    ClientMetadata, Coordinate, GeolocationLogEntry, ParcelFeature, QueryLogEntry, QuerySource,
};
use parcel_map_query_log::QueryLogger;
use parcel_map_server_models::{
    AddressSearchRequest, AddressSearchResponse, ApiError, ApiHealth, BoundsRequest,
    EmptyFeatures, GeolocationLogRequest, GeolocationLogResponse, OwnerContactRequest,
    ParcelLookupRequest,
};

use crate::{AppState, DATA_QUALITY_HEADER};

fn client_metadata(req: &HttpRequest) -> ClientMetadata {
    ClientMetadata {
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ip_address: req.connection_info().realip_remote_addr().map(String::from),
    }
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiError::new("Invalid request", message))
}

fn upstream_error(error: &str, e: &impl std::fmt::Display) -> HttpResponse {
    log::error!("{error}: {e}");
    HttpResponse::BadGateway().json(ApiError::new(error, e.to_string()))
}

/// Appends a query to the audit log on a blocking task nobody waits for.
fn spawn_query_log(state: &AppState, entry: QueryLogEntry, client: ClientMetadata) {
    let logger: Arc<QueryLogger> = Arc::clone(&state.query_log);
    tokio::task::spawn_blocking(move || {
        let _ = logger.log_query(&entry, &client);
    });
}

fn parcel_snapshot(feature: Option<&ParcelFeature>) -> Option<serde_json::Value> {
    feature.and_then(|f| serde_json::to_value(&f.properties).ok())
}

fn parcel_response(feature: &ParcelFeature) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((DATA_QUALITY_HEADER, feature.data_quality().as_ref()))
        .json(parcel_map_geometry::to_geojson_feature(feature))
}

/// `GET /health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.to_string(),
    })
}

/// Fallback for a known path hit with the wrong method.
pub async fn method_not_allowed(req: HttpRequest) -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ApiError::new(
        "Method not allowed",
        format!("{} is not supported on {}", req.method(), req.path()),
    ))
}

/// `POST /parcel/lookup`
///
/// Returns the parcel at the clicked point as a `GeoJSON` `Feature`, or
/// `{ "features": [] }` when there is none.
pub async fn lookup(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ParcelLookupRequest>,
) -> HttpResponse {
    let coordinate = match Coordinate::new(body.lng, body.lat) {
        Ok(c) => c,
        Err(e) => return bad_request(e.to_string()),
    };

    let result = state.resolver.resolve(coordinate).await;

    let feature = match result {
        Ok(feature) => feature,
        Err(e) => return upstream_error("Failed to query parcel data", &e),
    };

    spawn_query_log(
        &state,
        QueryLogEntry {
            coordinate: Some(coordinate),
            address: None,
            result: parcel_snapshot(feature.as_ref()),
            source: QuerySource::MapClick,
        },
        client_metadata(&req),
    );

    feature.as_ref().map_or_else(
        || HttpResponse::Ok().json(EmptyFeatures::default()),
        parcel_response,
    )
}

/// `POST /parcel/search`
///
/// Geocodes an address and looks up the parcel at the match.
pub async fn search(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<AddressSearchRequest>,
) -> HttpResponse {
    let address = body.address.trim();
    if address.is_empty() {
        return bad_request("Address is required");
    }

    let geocoded = match state.geocoder.geocode(address).await {
        Ok(geocoded) => geocoded,
        Err(e @ GeocodeError::Config { .. }) => {
            log::error!("Geocoder misconfigured: {e}");
            return HttpResponse::InternalServerError()
                .json(ApiError::new("Geocoding unavailable", e.to_string()));
        }
        Err(e) => return upstream_error("Failed to geocode address", &e),
    };

    let parcel = match &geocoded {
        Some(g) => match state.resolver.resolve(g.coordinate).await {
            Ok(parcel) => parcel,
            Err(e) => return upstream_error("Failed to query parcel data", &e),
        },
        None => None,
    };

    spawn_query_log(
        &state,
        QueryLogEntry {
            coordinate: geocoded.as_ref().map(|g| g.coordinate),
            address: Some(address.to_string()),
            result: parcel_snapshot(parcel.as_ref()),
            source: QuerySource::AddressSearch,
        },
        client_metadata(&req),
    );

    let mut response = HttpResponse::Ok();
    if let Some(p) = &parcel {
        response.insert_header((DATA_QUALITY_HEADER, p.data_quality().as_ref()));
    }
    response.json(AddressSearchResponse {
        geocoded,
        parcel: parcel.as_ref().map(parcel_map_geometry::to_geojson_feature),
    })
}

/// `POST /parcel/bounds`
///
/// Returns a `GeoJSON` `FeatureCollection` of parcels in the viewport.
/// A request for a viewport that is already being generated gets 409.
pub async fn bounds(state: web::Data<AppState>, body: web::Json<BoundsRequest>) -> HttpResponse {
    let bbox = match parse_bounds(&body.bounds) {
        Ok(bbox) => bbox,
        Err(e) => return bad_request(e.to_string()),
    };

    let Some(permit) = state.viewport_guard.try_acquire(&bbox) else {
        return HttpResponse::Conflict().json(ApiError::new(
            "Viewport in flight",
            "Parcels for this viewport are already being generated",
        ));
    };

    let source = Arc::clone(&state.bounds);
    let generated = web::block(move || source.parcels_in(&bbox)).await;
    drop(permit);

    let parcels = match generated {
        Ok(parcels) => parcels,
        Err(e) => {
            log::error!("Viewport generation failed: {e}");
            return HttpResponse::InternalServerError()
                .json(ApiError::new("Failed to generate parcels", e.to_string()));
        }
    };

    if parcels.truncated {
        state.reporter.report(
            &ObservabilityEvent::new(EventKind::BoundsTruncated, "Viewport grid capped")
                .with("features", parcels.features.len())
                .with(
                    "bounds",
                    format!("{},{},{},{}", bbox.west, bbox.south, bbox.east, bbox.north),
                ),
        );
    }

    HttpResponse::Ok().json(parcel_map_geometry::to_feature_collection(
        &parcels.features,
        parcels.truncated,
    ))
}

/// `POST /owner/contact`
pub async fn contact(
    state: web::Data<AppState>,
    body: web::Json<OwnerContactRequest>,
) -> HttpResponse {
    match state
        .contacts
        .resolve(&body.owner_name, body.parcel_id.as_deref())
        .await
    {
        Ok(contact) => HttpResponse::Ok().json(contact),
        Err(ContactError::Validation(message)) => bad_request(message),
        Err(e @ ContactError::Upstream(_)) => upstream_error("Failed to fetch owner data", &e),
        Err(e @ ContactError::NotConfigured) => {
            log::error!("{e}");
            HttpResponse::InternalServerError()
                .json(ApiError::new("Failed to fetch owner data", e.to_string()))
        }
    }
}

/// `POST /log/geolocation`
///
/// Always answers 200 for a valid body; `id` is `null` if the record
/// could not be stored.
pub async fn geolocation(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<GeolocationLogRequest>,
) -> HttpResponse {
    let coordinate = match Coordinate::new(body.longitude, body.latitude) {
        Ok(c) => c,
        Err(e) => return bad_request(e.to_string()),
    };
    if body.accuracy.is_some_and(|a| !a.is_finite() || a < 0.0) {
        return bad_request("Accuracy must be a non-negative number");
    }

    let entry = GeolocationLogEntry {
        coordinate,
        accuracy: body.accuracy,
    };
    let client = client_metadata(&req);
    let logger = Arc::clone(&state.query_log);

    let id = web::block(move || logger.log_geolocation(&entry, &client))
        .await
        .unwrap_or_else(|e| {
            log::error!("Geolocation log task failed: {e}");
            None
        });

    HttpResponse::Ok().json(GeolocationLogResponse { id })
}
