#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Actix-Web API server for the parcel map application.
//!
//! Proxies parcel lookups to the county cadastral service (falling back to
//! synthetic parcels), fills viewports with grid parcels, keeps the
//! contact provider key and geocoder token server-side, and appends every
//! query to the audit log without making the user wait for it.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use parcel_map_arcgis::{ArcGisClient, ArcGisError};
use parcel_map_config::{AppConfig, Environment};
use parcel_map_contact::{ContactClient, ContactResolver, ContactService, ContactServiceError};
use parcel_map_geocoder::{AddressGeocoder, GeocodeError, MapboxGeocoder};
use parcel_map_parcel::{
    BoundsParcelSource, CoordinateHashSelector, GridParcelGenerator, ParcelResolver, ViewportGuard,
};
use parcel_map_parcel_models::events::{EventReporter, LogReporter};
use parcel_map_query_log::{DuckDbQueryLog, QueryLogError, QueryLogger};
use parcel_map_server_models::ApiError;
use thiserror::Error;

/// Response header telling the client whether a parcel is real or
/// synthetic.
pub const DATA_QUALITY_HEADER: &str = "X-Data-Quality";

/// Errors from building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cadastral client could not be built.
    #[error("Cadastral client error: {0}")]
    Cadastral(#[from] ArcGisError),

    /// The contact client could not be built.
    #[error("Contact client error: {0}")]
    Contact(#[from] ContactServiceError),

    /// The geocoder could not be built.
    #[error("Geocoder error: {0}")]
    Geocoder(#[from] GeocodeError),

    /// The query log could not be opened.
    #[error("Query log error: {0}")]
    QueryLog(#[from] QueryLogError),
}

/// Shared application state.
pub struct AppState {
    /// Deployment environment.
    pub environment: Environment,
    /// Click-to-parcel resolution.
    pub resolver: Arc<ParcelResolver>,
    /// Viewport parcel source.
    pub bounds: Arc<dyn BoundsParcelSource>,
    /// Viewports currently being generated.
    pub viewport_guard: Arc<ViewportGuard>,
    /// Owner contact lookup.
    pub contacts: Arc<ContactResolver>,
    /// Address search.
    pub geocoder: Arc<dyn AddressGeocoder>,
    /// Audit log.
    pub query_log: Arc<QueryLogger>,
    /// Observability sink.
    pub reporter: Arc<dyn EventReporter>,
}

/// Builds the cadastral resolver described by `config`.
///
/// # Errors
///
/// Returns [`ServerError::Cadastral`] if the HTTP client cannot be built.
pub fn parcel_resolver(
    config: &AppConfig,
    reporter: Arc<dyn EventReporter>,
) -> Result<ParcelResolver, ServerError> {
    log::info!("Cadastral service: {}", config.cadastral_url);
    let cadastral = ArcGisClient::new(&config.cadastral_url, config.cadastral_timeout)?;
    Ok(ParcelResolver::new(
        Arc::new(cadastral),
        Arc::new(CoordinateHashSelector::default()),
        reporter,
    )
    .with_timeout(config.cadastral_timeout)
    .with_fallback(config.mock_fallback))
}

/// Builds the owner contact resolver described by `config`.
///
/// # Errors
///
/// Returns [`ServerError::Contact`] if the HTTP client cannot be built.
pub fn contact_resolver(
    config: &AppConfig,
    reporter: Arc<dyn EventReporter>,
) -> Result<ContactResolver, ServerError> {
    let service: Option<Arc<dyn ContactService>> = match &config.contact {
        Some(contact) => Some(Arc::new(ContactClient::new(
            &contact.url,
            &contact.api_key,
            parcel_map_config::DEFAULT_PROVIDER_TIMEOUT,
        )?)),
        None => {
            log::warn!("No contact provider configured");
            None
        }
    };
    Ok(ContactResolver::new(
        service,
        config.allow_placeholder_contact(),
        reporter,
    ))
}

/// Builds the address geocoder described by `config`.
///
/// # Errors
///
/// Returns [`ServerError::Geocoder`] if the HTTP client cannot be built.
pub fn address_geocoder(config: &AppConfig) -> Result<MapboxGeocoder, ServerError> {
    Ok(MapboxGeocoder::new(
        &config.geocoder_url,
        config.geocoder_token.clone(),
        config.geocoder_proximity,
        parcel_map_config::DEFAULT_PROVIDER_TIMEOUT,
    )?)
}

impl AppState {
    /// Builds every client and store from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if an HTTP client cannot be built or the
    /// query log cannot be opened.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServerError> {
        let reporter: Arc<dyn EventReporter> = Arc::new(LogReporter);

        log::info!("Opening query log at {}", config.query_log_path.display());
        let store = DuckDbQueryLog::open(&config.query_log_path)?;

        Ok(Self {
            environment: config.environment,
            resolver: Arc::new(parcel_resolver(config, reporter.clone())?),
            bounds: Arc::new(GridParcelGenerator::default()),
            viewport_guard: Arc::new(ViewportGuard::new()),
            contacts: Arc::new(contact_resolver(config, reporter.clone())?),
            geocoder: Arc::new(address_geocoder(config)?),
            query_log: Arc::new(QueryLogger::new(Arc::new(store), reporter.clone())),
            reporter,
        })
    }
}

/// Registers every route and the JSON body error handler.
///
/// Unknown methods on a known path answer 405 and malformed JSON bodies
/// answer 400, both with an [`ApiError`] body.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let response =
            HttpResponse::BadRequest().json(ApiError::new("Invalid request", err.to_string()));
        actix_web::error::InternalError::from_response(err, response).into()
    }))
    .service(
        web::resource("/parcel/lookup")
            .route(web::post().to(handlers::lookup))
            .default_service(web::to(handlers::method_not_allowed)),
    )
    .service(
        web::resource("/parcel/search")
            .route(web::post().to(handlers::search))
            .default_service(web::to(handlers::method_not_allowed)),
    )
    .service(
        web::resource("/parcel/bounds")
            .route(web::post().to(handlers::bounds))
            .default_service(web::to(handlers::method_not_allowed)),
    )
    .service(
        web::resource("/owner/contact")
            .route(web::post().to(handlers::contact))
            .default_service(web::to(handlers::method_not_allowed)),
    )
    .service(
        web::resource("/log/geolocation")
            .route(web::post().to(handlers::geolocation))
            .default_service(web::to(handlers::method_not_allowed)),
    )
    .service(
        web::resource("/health")
            .route(web::get().to(handlers::health))
            .default_service(web::to(handlers::method_not_allowed)),
    );
}

/// Starts the parcel map API server.
///
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if the application state cannot be built or
/// the HTTP server fails to bind or run.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: AppConfig) -> Result<(), ServerError> {
    log::info!("Environment: {}", config.environment);
    if config.mock_fallback {
        log::info!("Synthetic parcel fallback enabled");
    }

    let state = web::Data::new(AppState::from_config(&config)?);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.clone(), config.port))?
    .run()
    .await?;

    Ok(())
}
