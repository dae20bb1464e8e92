// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registration sink
//!
//! Every accepted registration is upserted into a device document store
//! keyed by name. The store is write-only from the gateway's point of
//! view; the routing table never reads it back.

use greenhouse_proto::DeviceKind;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sink lock poisoned")]
    Poisoned,
}

/// Document written for each registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDocument {
    pub name: String,
    pub kind: DeviceKind,
    pub port: u16,
}

/// Upsert-by-name store for device registrations.
pub trait RegistrationSink: Send + Sync {
    fn upsert(&self, doc: &DeviceDocument) -> Result<(), SinkError>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RegistrationSink for NullSink {
    fn upsert(&self, _doc: &DeviceDocument) -> Result<(), SinkError> {
        Ok(())
    }
}

/// SQLite-backed sink.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE devices (
///     name TEXT PRIMARY KEY,
///     kind TEXT NOT NULL,
///     port INTEGER NOT NULL,
///     updated_at INTEGER NOT NULL
/// );
/// ```
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) a file-based store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let sink = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> Result<Self, SinkError> {
        let sink = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    fn init_schema(&self) -> Result<(), SinkError> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS devices (
                name TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                port INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Look a document up (for testing).
    #[cfg(test)]
    fn get(&self, name: &str) -> Result<Option<DeviceDocument>, SinkError> {
        use rusqlite::OptionalExtension;

        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        let row = conn
            .query_row(
                "SELECT name, kind, port FROM devices WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(name, kind, port)| DeviceDocument {
            name,
            kind: kind.parse().unwrap_or(DeviceKind::Sensor),
            port,
        }))
    }

    #[cfg(test)]
    fn count(&self) -> Result<i64, SinkError> {
        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?)
    }
}

impl RegistrationSink for SqliteSink {
    fn upsert(&self, doc: &DeviceDocument) -> Result<(), SinkError> {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let conn = self.conn.lock().map_err(|_| SinkError::Poisoned)?;
        conn.execute(
            "INSERT INTO devices (name, kind, port, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                kind = excluded.kind,
                port = excluded.port,
                updated_at = excluded.updated_at",
            params![doc.name, doc.kind.to_string(), doc.port, updated_at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, port: u16) -> DeviceDocument {
        DeviceDocument {
            name: name.into(),
            kind: DeviceKind::Actuator,
            port,
        }
    }

    #[test]
    fn test_upsert_inserts() {
        let sink = SqliteSink::in_memory().unwrap();
        sink.upsert(&doc("Heater", 6006)).unwrap();

        assert_eq!(sink.get("Heater").unwrap(), Some(doc("Heater", 6006)));
    }

    #[test]
    fn test_upsert_keyed_by_name() {
        let sink = SqliteSink::in_memory().unwrap();
        sink.upsert(&doc("Heater", 6006)).unwrap();
        sink.upsert(&doc("Heater", 7006)).unwrap();
        sink.upsert(&doc("Cooler", 6007)).unwrap();

        assert_eq!(sink.count().unwrap(), 2);
        assert_eq!(sink.get("Heater").unwrap().unwrap().port, 7006);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.db");

        SqliteSink::open(&path)
            .unwrap()
            .upsert(&doc("Lamps", 6008))
            .unwrap();

        let reopened = SqliteSink::open(&path).unwrap();
        assert_eq!(reopened.get("Lamps").unwrap(), Some(doc("Lamps", 6008)));
    }

    #[test]
    fn test_null_sink() {
        assert!(NullSink.upsert(&doc("Heater", 6006)).is_ok());
    }
}
