//! `DuckDB`-backed query log.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::Connection;
use parcel_map_parcel_models::{ClientMetadata, Coordinate, LogId};

use crate::{LogKind, LogRecord, QueryLogError, QueryLogStore};

/// Query log stored in a `query_log` table.
pub struct DuckDbQueryLog {
    conn: Mutex<Connection>,
}

impl DuckDbQueryLog {
    /// Opens (or creates) the query log database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryLogError`] if the directory, connection, or schema
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self, QueryLogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a throwaway in-memory query log.
    ///
    /// # Errors
    ///
    /// Returns [`QueryLogError`] if the connection or schema cannot be
    /// created.
    pub fn open_in_memory() -> Result<Self, QueryLogError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, QueryLogError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn create_schema(conn: &Connection) -> Result<(), QueryLogError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS query_log (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            logged_at TEXT NOT NULL,
            longitude DOUBLE,
            latitude DOUBLE,
            address TEXT,
            result TEXT,
            accuracy DOUBLE,
            user_agent TEXT,
            ip_address TEXT
        );",
    )?;
    Ok(())
}

impl QueryLogStore for DuckDbQueryLog {
    fn append(&self, record: &LogRecord) -> Result<(), QueryLogError> {
        let result = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let logged_at = record
            .logged_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO query_log
                (id, kind, logged_at, longitude, latitude, address, result, accuracy, user_agent, ip_address)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                record.id.0,
                record.kind.as_ref(),
                logged_at,
                record.coordinate.map(|c| c.longitude),
                record.coordinate.map(|c| c.latitude),
                record.address.as_deref(),
                result,
                record.accuracy,
                record.client.user_agent.as_deref(),
                record.client.ip_address.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<LogRecord>, QueryLogError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, kind, logged_at, longitude, latitude, address, result, accuracy, user_agent, ip_address
             FROM query_log
             ORDER BY logged_at DESC
             LIMIT ?",
        )?;

        let mut rows = stmt.query(duckdb::params![limit])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(1)?;
            let logged_at: String = row.get(2)?;
            let longitude: Option<f64> = row.get(3)?;
            let latitude: Option<f64> = row.get(4)?;
            let result: Option<String> = row.get(6)?;

            records.push(LogRecord {
                id: LogId(row.get(0)?),
                kind: kind.parse::<LogKind>()?,
                logged_at: DateTime::parse_from_rfc3339(&logged_at)?.with_timezone(&Utc),
                coordinate: longitude
                    .zip(latitude)
                    .map(|(longitude, latitude)| Coordinate {
                        longitude,
                        latitude,
                    }),
                address: row.get(5)?,
                result: result.as_deref().map(serde_json::from_str).transpose()?,
                accuracy: row.get(7)?,
                client: ClientMetadata {
                    user_agent: row.get(8)?,
                    ip_address: row.get(9)?,
                },
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_map_parcel_models::{GeolocationLogEntry, QueryLogEntry, QuerySource};

    fn client() -> ClientMetadata {
        ClientMetadata {
            user_agent: Some("test-agent".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
        }
    }

    #[test]
    fn appended_records_read_back_newest_first() {
        let store = DuckDbQueryLog::open_in_memory().unwrap();

        let search = LogRecord::for_query(
            &QueryLogEntry {
                coordinate: Some(Coordinate::new(-92.33, 38.95).unwrap()),
                address: Some("701 E Broadway".to_string()),
                result: Some(serde_json::json!({ "OWNER": "Smith" })),
                source: QuerySource::AddressSearch,
            },
            &client(),
        );
        store.append(&search).unwrap();

        let mut geolocation = LogRecord::for_geolocation(
            &GeolocationLogEntry {
                coordinate: Coordinate::new(-92.3, 38.9).unwrap(),
                accuracy: Some(25.0),
            },
            &ClientMetadata::default(),
        );
        geolocation.logged_at = search.logged_at + chrono::Duration::seconds(1);
        store.append(&geolocation).unwrap();

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, geolocation.id);
        assert_eq!(records[0].kind, LogKind::GeolocationAccess);
        assert_eq!(records[0].accuracy, Some(25.0));

        let stored = &records[1];
        assert_eq!(stored.id, search.id);
        assert_eq!(stored.address.as_deref(), Some("701 E Broadway"));
        assert_eq!(stored.result, search.result);
        assert_eq!(stored.client, client());
        assert_eq!(stored.coordinate, search.coordinate);
    }

    #[test]
    fn recent_honors_limit() {
        let store = DuckDbQueryLog::open_in_memory().unwrap();
        for _ in 0..3 {
            let record = LogRecord::for_geolocation(
                &GeolocationLogEntry {
                    coordinate: Coordinate::new(0.0, 0.0).unwrap(),
                    accuracy: None,
                },
                &ClientMetadata::default(),
            );
            store.append(&record).unwrap();
        }
        assert_eq!(store.recent(2).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_id_is_an_error() {
        let store = DuckDbQueryLog::open_in_memory().unwrap();
        let record = LogRecord::for_geolocation(
            &GeolocationLogEntry {
                coordinate: Coordinate::new(0.0, 0.0).unwrap(),
                accuracy: None,
            },
            &ClientMetadata::default(),
        );
        store.append(&record).unwrap();
        assert!(matches!(
            store.append(&record),
            Err(QueryLogError::Database(_))
        ));
    }
}
