//! Durable event store for pulse records
//!
//! Time-ordered SQLite log of every accepted pulse. The store assigns the
//! row id and the authoritative `server_time` at insert; records are never
//! updated in place and only leave the table through `purge_before`.

use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Device id stored when the sensor omits one from the payload
pub const DEFAULT_DEVICE_ID: &str = "ESP32-001";

/// Current wall clock in milliseconds since epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug)]
pub enum StorageError {
    Database(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "Database error: {}", e),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

/// A persisted pulse as returned by every query path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseRecord {
    pub id: i64,
    pub device_id: String,
    pub pulse_number: Option<i64>,
    pub uptime_ms: Option<i64>,
    /// Milliseconds since epoch, assigned by the server at acceptance
    pub server_time: i64,
}

/// Inbound pulse payload before the store assigns id and server_time
///
/// Every field is optional: a sensor reading with a defective payload is
/// still accepted with defaults rather than provoking a device retry storm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPulse {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub pulse_number: Option<i64>,
    #[serde(default)]
    pub uptime_ms: Option<i64>,
}

/// Summary row over the full retained window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub total_count: u64,
    pub first_ms: Option<i64>,
    pub last_ms: Option<i64>,
}

/// SQLite-backed pulse log
///
/// The connection is mutex-guarded: appends serialize id assignment, so
/// concurrent ingestion requests always get distinct, ordered ids.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open (or create) the store at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        Self::init_schema(&conn)?;

        log::info!("✅ Pulse store initialized with WAL mode");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ephemeral store for short-lived deployments and tests
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pulses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                pulse_number INTEGER,
                uptime_ms INTEGER,
                server_time INTEGER NOT NULL
            )",
            [],
        )?;

        // Range scans (history, bootstrap) and purges both key on server_time
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_pulses_server_time ON pulses(server_time)",
            [],
        )?;

        Ok(())
    }

    /// Persist a pulse, assigning its id and server_time
    ///
    /// `server_time` is captured under the connection lock, so it is
    /// non-decreasing with id even under concurrent appends.
    pub fn append(&self, pulse: NewPulse) -> Result<PulseRecord, StorageError> {
        let device_id = pulse
            .device_id
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string());

        let conn = self.conn.lock().unwrap();
        let server_time = now_ms();

        conn.execute(
            "INSERT INTO pulses (device_id, pulse_number, uptime_ms, server_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![device_id, pulse.pulse_number, pulse.uptime_ms, server_time],
        )?;

        let id = conn.last_insert_rowid();

        log::debug!(
            "💓 Pulse stored: id={} device={} server_time={}",
            id,
            device_id,
            server_time
        );

        Ok(PulseRecord {
            id,
            device_id,
            pulse_number: pulse.pulse_number,
            uptime_ms: pulse.uptime_ms,
            server_time,
        })
    }

    /// All records with `server_time >= since_ms`, ascending
    pub fn query_since(&self, since_ms: i64) -> Result<Vec<PulseRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, device_id, pulse_number, uptime_ms, server_time
             FROM pulses
             WHERE server_time >= ?1
             ORDER BY server_time ASC, id ASC",
        )?;

        let rows = stmt.query_map([since_ms], |row| {
            Ok(PulseRecord {
                id: row.get(0)?,
                device_id: row.get(1)?,
                pulse_number: row.get(2)?,
                uptime_ms: row.get(3)?,
                server_time: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Delete all records with `server_time < cutoff_ms`, returning the count
    ///
    /// Idempotent: a second run with the same cutoff deletes nothing.
    pub fn purge_before(&self, cutoff_ms: i64) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM pulses WHERE server_time < ?1", [cutoff_ms])?;
        Ok(deleted)
    }

    /// COUNT/MIN/MAX over the whole table in a single row
    pub fn summary(&self) -> Result<StoreSummary, StorageError> {
        let conn = self.conn.lock().unwrap();
        let summary = conn.query_row(
            "SELECT COUNT(*), MIN(server_time), MAX(server_time) FROM pulses",
            [],
            |row| {
                Ok(StoreSummary {
                    total_count: row.get::<_, i64>(0)? as u64,
                    first_ms: row.get(1)?,
                    last_ms: row.get(2)?,
                })
            },
        )?;
        Ok(summary)
    }
}
