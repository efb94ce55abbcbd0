#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Command-line entry point for the parcel map toolchain.
//!
//! ```text
//! parcel_map serve
//! parcel_map lookup --lng -92.33 --lat 38.95
//! parcel_map search "701 E Broadway, Columbia, MO"
//! parcel_map bounds --west -92.34 --south 38.94 --east -92.33 --north 38.95
//! parcel_map contact "Smith, John" --parcel-id 17-1
//! parcel_map logs --limit 20
//! ```
//!
//! Every subcommand reads the same configuration as the server
//! (`PARCEL_MAP_CONFIG` plus environment variables).

use std::sync::Arc;

use clap::{Parser, Subcommand};
use parcel_map_config::AppConfig;
use parcel_map_geocoder::AddressGeocoder as _;
use parcel_map_parcel::{GridParcelGenerator, generate_parcels_for_bounds};
use parcel_map_parcel_models::Coordinate;
use parcel_map_parcel_models::events::{
    EventKind, EventReporter as _, LogReporter, ObservabilityEvent,
};
use parcel_map_query_log::{DuckDbQueryLog, QueryLogStore as _};

#[derive(Parser)]
#[command(name = "parcel_map", about = "Land parcel lookup toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
    /// Look up the parcel at a coordinate
    Lookup {
        /// Longitude
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Latitude
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },
    /// Geocode an address and look up the parcel there
    Search {
        /// Free-form address
        address: String,
    },
    /// Generate the parcel grid for a viewport
    Bounds {
        /// Western longitude
        #[arg(long, allow_negative_numbers = true)]
        west: f64,
        /// Southern latitude
        #[arg(long, allow_negative_numbers = true)]
        south: f64,
        /// Eastern longitude
        #[arg(long, allow_negative_numbers = true)]
        east: f64,
        /// Northern latitude
        #[arg(long, allow_negative_numbers = true)]
        north: f64,
    },
    /// Look up contact details for a parcel owner
    Contact {
        /// Owner name
        owner: String,
        /// Parcel identifier
        #[arg(long)]
        parcel_id: Option<String>,
    },
    /// Show recent query log records
    Logs {
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve => {
            // The server uses actix-web's runtime, so run it in a blocking
            // task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(parcel_map_server::run_server(config))
            })
            .await??;
        }
        Commands::Lookup { lng, lat } => {
            let resolver = parcel_map_server::parcel_resolver(&config, Arc::new(LogReporter))?;
            match resolver.resolve(Coordinate::new(lng, lat)?).await? {
                Some(feature) => println!(
                    "{}",
                    serde_json::to_string_pretty(&parcel_map_geometry::to_geojson_feature(
                        &feature
                    ))?
                ),
                None => println!("No parcel found at {lng},{lat}."),
            }
        }
        Commands::Search { address } => {
            let geocoder = parcel_map_server::address_geocoder(&config)?;
            let Some(geocoded) = geocoder.geocode(&address).await? else {
                println!("No match for {address:?}.");
                return Ok(());
            };
            println!(
                "{} ({})",
                geocoded.address.as_deref().unwrap_or(&address),
                geocoded.coordinate
            );

            let resolver = parcel_map_server::parcel_resolver(&config, Arc::new(LogReporter))?;
            match resolver.resolve(geocoded.coordinate).await? {
                Some(feature) => println!(
                    "{}",
                    serde_json::to_string_pretty(&parcel_map_geometry::to_geojson_feature(
                        &feature
                    ))?
                ),
                None => println!("No parcel found at {}.", geocoded.coordinate),
            }
        }
        Commands::Bounds {
            west,
            south,
            east,
            north,
        } => {
            let parcels = generate_parcels_for_bounds(
                &GridParcelGenerator::default(),
                &[[west, south], [east, north]],
            )?;
            if parcels.truncated {
                LogReporter.report(
                    &ObservabilityEvent::new(EventKind::BoundsTruncated, "Viewport grid capped")
                        .with("features", parcels.features.len())
                        .with("bounds", format!("{west},{south},{east},{north}")),
                );
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&parcel_map_geometry::to_feature_collection(
                    &parcels.features,
                    parcels.truncated,
                ))?
            );
        }
        Commands::Contact { owner, parcel_id } => {
            let contacts = parcel_map_server::contact_resolver(&config, Arc::new(LogReporter))?;
            let contact = contacts.resolve(&owner, parcel_id.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&contact)?);
        }
        Commands::Logs { limit } => {
            let store = DuckDbQueryLog::open(&config.query_log_path)?;
            let records = store.recent(limit)?;

            if records.is_empty() {
                println!("No query log records found.");
                return Ok(());
            }

            for record in records {
                let location = record
                    .coordinate
                    .map_or_else(|| "-".to_string(), |c| c.to_string());
                println!(
                    "{}  {:<18}  {:<24}  {}  {}",
                    record.logged_at.format("%Y-%m-%d %H:%M:%S"),
                    record.kind,
                    location,
                    record.address.as_deref().unwrap_or("-"),
                    record.id,
                );
            }
        }
    }

    Ok(())
}
