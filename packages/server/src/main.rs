#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Parcel map API server binary.
//!
//! Reads configuration from `PARCEL_MAP_CONFIG` and the environment, then
//! serves the API until interrupted.

use parcel_map_config::AppConfig;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = AppConfig::from_env()?;
    parcel_map_server::run_server(config).await?;

    Ok(())
}
