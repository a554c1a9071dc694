//! SQLite state store
//!
//! Schema:
//! - `seen(document_id, first_seen)` one row per seen document
//! - `aggregates(date, payload)` one JSON-encoded [`DailyAggregate`] per day
//! - `meta(key, value)` scalar state such as the fetch watermark
//!
//! Every commit rewrites the three tables inside one transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::{PipelineSnapshot, SeenSet, StateStore, StorageError};
use crate::analytics::{AggregationEngine, DailyAggregate};

const LAST_FETCH_KEY: &str = "last_fetch_at";

/// State store backed by a single SQLite database file
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (and create if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS seen (
            document_id TEXT PRIMARY KEY,
            first_seen TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS aggregates (
            date TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp '{raw}': {e}")))
}

impl StateStore for SqliteStateStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self) -> Result<PipelineSnapshot, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let mut stmt = conn.prepare("SELECT document_id, first_seen FROM seen")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut seen_rows = Vec::new();
        for row in rows {
            let (id, first_seen) = row?;
            seen_rows.push((id, parse_timestamp(&first_seen)?));
        }
        let seen: SeenSet = seen_rows.into_iter().collect();

        let mut stmt = conn.prepare("SELECT date, payload FROM aggregates ORDER BY date")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut aggregates = Vec::new();
        for row in rows {
            let (date, payload) = row?;
            let aggregate: DailyAggregate = serde_json::from_str(&payload)
                .map_err(|e| StorageError::Corrupt(format!("aggregate for {date}: {e}")))?;
            if aggregate.date.to_string() != date {
                return Err(StorageError::Corrupt(format!(
                    "aggregate row {date} holds data for {}",
                    aggregate.date
                )));
            }
            aggregates.push(aggregate);
        }
        let series = AggregationEngine::from_aggregates(aggregates)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let last_fetch_at = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_FETCH_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?;

        tracing::debug!(
            seen = seen.len(),
            days = series.len(),
            "Loaded state from SQLite"
        );

        Ok(PipelineSnapshot {
            seen,
            series,
            last_fetch_at,
        })
    }

    fn commit(&self, snapshot: &PipelineSnapshot) -> Result<(), StorageError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM seen", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO seen (document_id, first_seen) VALUES (?1, ?2)")?;
            for (id, first_seen) in snapshot.seen.iter() {
                insert.execute(params![id, format_timestamp(first_seen)])?;
            }
        }

        tx.execute("DELETE FROM aggregates", [])?;
        {
            let mut insert = tx.prepare("INSERT INTO aggregates (date, payload) VALUES (?1, ?2)")?;
            for aggregate in snapshot.series.aggregates() {
                let payload = serde_json::to_string(aggregate)?;
                insert.execute(params![aggregate.date.to_string(), payload])?;
            }
        }

        match snapshot.last_fetch_at {
            Some(ts) => {
                tx.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![LAST_FETCH_KEY, format_timestamp(ts)],
                )?;
            }
            None => {
                tx.execute("DELETE FROM meta WHERE key = ?1", params![LAST_FETCH_KEY])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            seen = snapshot.seen.len(),
            days = snapshot.series.len(),
            "Committed state to SQLite"
        );
        Ok(())
    }
}
