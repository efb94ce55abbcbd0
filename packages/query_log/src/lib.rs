#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Audit log of parcel queries and geolocation accesses.
//!
//! Logging sits off the user's critical path: [`QueryLogger`] never fails.
//! A storage error becomes `None` plus a `query_log_failed` event. Records
//! are append-only.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parcel_map_parcel_models::events::{EventKind, EventReporter, ObservabilityEvent};
use parcel_map_parcel_models::{
    ClientMetadata, Coordinate, GeolocationLogEntry, LogId, QueryLogEntry, QuerySource,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use store::DuckDbQueryLog;

/// Errors from query log storage.
#[derive(Debug, Error)]
pub enum QueryLogError {
    /// `DuckDB` error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// I/O error preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A result snapshot could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed.
    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// A stored record kind is unknown.
    #[error("Invalid record kind: {0}")]
    Kind(#[from] strum::ParseError),

    /// The store cannot accept records.
    #[error("Query log unavailable: {0}")]
    Unavailable(String),
}

/// What a log record describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogKind {
    /// A map click lookup.
    MapClick,
    /// An address search.
    AddressSearch,
    /// A browser geolocation access.
    GeolocationAccess,
}

impl From<QuerySource> for LogKind {
    fn from(value: QuerySource) -> Self {
        match value {
            QuerySource::MapClick => Self::MapClick,
            QuerySource::AddressSearch => Self::AddressSearch,
        }
    }
}

/// A stored log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Server-assigned id.
    pub id: LogId,
    /// What the record describes.
    pub kind: LogKind,
    /// Server-assigned time of the event.
    pub logged_at: DateTime<Utc>,
    /// Queried or reported coordinate.
    pub coordinate: Option<Coordinate>,
    /// Searched address.
    pub address: Option<String>,
    /// Snapshot of the result shown to the user.
    pub result: Option<serde_json::Value>,
    /// Geolocation accuracy in meters.
    pub accuracy: Option<f64>,
    /// Request metadata.
    pub client: ClientMetadata,
}

impl LogRecord {
    fn stamp(kind: LogKind, client: &ClientMetadata) -> Self {
        Self {
            id: LogId(uuid::Uuid::new_v4().to_string()),
            kind,
            logged_at: Utc::now(),
            coordinate: None,
            address: None,
            result: None,
            accuracy: None,
            client: client.clone(),
        }
    }

    /// Builds a record for a parcel query.
    #[must_use]
    pub fn for_query(entry: &QueryLogEntry, client: &ClientMetadata) -> Self {
        Self {
            coordinate: entry.coordinate,
            address: entry.address.clone(),
            result: entry.result.clone(),
            ..Self::stamp(entry.source.into(), client)
        }
    }

    /// Builds a record for a geolocation access.
    #[must_use]
    pub fn for_geolocation(entry: &GeolocationLogEntry, client: &ClientMetadata) -> Self {
        Self {
            coordinate: Some(entry.coordinate),
            accuracy: entry.accuracy,
            ..Self::stamp(LogKind::GeolocationAccess, client)
        }
    }
}

/// Append-only record storage.
pub trait QueryLogStore: Send + Sync {
    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns [`QueryLogError`] if the record cannot be stored.
    fn append(&self, record: &LogRecord) -> Result<(), QueryLogError>;

    /// Returns up to `limit` records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryLogError`] if the records cannot be read.
    fn recent(&self, limit: usize) -> Result<Vec<LogRecord>, QueryLogError>;
}

/// Fire-and-forget front end over a [`QueryLogStore`].
pub struct QueryLogger {
    store: Arc<dyn QueryLogStore>,
    reporter: Arc<dyn EventReporter>,
}

impl QueryLogger {
    /// Creates a logger.
    #[must_use]
    pub fn new(store: Arc<dyn QueryLogStore>, reporter: Arc<dyn EventReporter>) -> Self {
        Self { store, reporter }
    }

    /// Logs a parcel query. Returns `None` if it could not be stored.
    #[must_use]
    pub fn log_query(&self, entry: &QueryLogEntry, client: &ClientMetadata) -> Option<LogId> {
        self.append(LogRecord::for_query(entry, client))
    }

    /// Logs a geolocation access. Returns `None` if it could not be stored.
    #[must_use]
    pub fn log_geolocation(
        &self,
        entry: &GeolocationLogEntry,
        client: &ClientMetadata,
    ) -> Option<LogId> {
        self.append(LogRecord::for_geolocation(entry, client))
    }

    /// Returns up to `limit` records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryLogError`] if the store cannot be read.
    pub fn recent(&self, limit: usize) -> Result<Vec<LogRecord>, QueryLogError> {
        self.store.recent(limit)
    }

    fn append(&self, record: LogRecord) -> Option<LogId> {
        match self.store.append(&record) {
            Ok(()) => {
                log::debug!("Logged {} as {}", record.kind, record.id);
                Some(record.id)
            }
            Err(e) => {
                self.reporter.report(
                    &ObservabilityEvent::new(EventKind::QueryLogFailed, "Failed to log query")
                        .with("kind", record.kind)
                        .with("error", e),
                );
                None
            }
        }
    }
}
