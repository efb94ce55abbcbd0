#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Parcel resolution.
//!
//! [`ParcelResolver`] turns a clicked coordinate into a parcel feature,
//! falling back to a synthetic parcel when the cadastral service is down.
//! [`bounds`] fills a map viewport with a grid of synthetic parcels.

pub mod bounds;
pub mod guard;
pub mod mock;
pub mod resolver;
pub mod selector;

use std::time::Duration;

use parcel_map_arcgis::ArcGisError;
use thiserror::Error;

pub use bounds::{
    BoundsParcelSource, BoundsParcels, GridParcelGenerator, InvalidBoundsError,
    generate_parcels_for_bounds, parse_bounds,
};
pub use guard::{ViewportGuard, ViewportPermit};
pub use resolver::{ParcelResolver, feature_from_record};
pub use selector::{CoordinateHashSelector, ParcelSelector, RoundRobinSelector};

/// Errors surfaced by [`ParcelResolver::resolve`] when the fallback is
/// disabled.
#[derive(Debug, Error)]
pub enum ParcelError {
    /// The cadastral service failed.
    #[error(transparent)]
    Upstream(#[from] ArcGisError),

    /// The cadastral service did not answer in time.
    #[error("Cadastral service timed out after {0:?}")]
    Timeout(Duration),
}
