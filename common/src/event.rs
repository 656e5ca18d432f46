use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::motion::MotionArea;

/// SQLite schema for a camera's event log. Shared by the writer (watcher) and
/// the reader (API) so both agree on column layout.
pub const EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        camera_id       TEXT    NOT NULL,
        start_ms        INTEGER NOT NULL,
        end_ms          INTEGER NOT NULL,
        zones           TEXT    NOT NULL DEFAULT '[]',
        areas           TEXT    NOT NULL DEFAULT '[]',
        thumbnail_path  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_events_time
        ON events(camera_id, start_ms);
";

/// Column list matching [`MotionEvent`] field order.
pub const EVENT_COLUMNS: &str = "id, camera_id, start_ms, end_ms, zones, areas, thumbnail_path";

/// One motion incident as persisted in the event log.
///
/// `start_ms` is the first detection, `end_ms` the last detection seen before
/// the incident closed (equal to `start_ms` while it is still open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub id: i64,
    pub camera_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub zones: Vec<String>,
    pub areas: Vec<MotionArea>,
    pub thumbnail_path: Option<String>,
}

impl MotionEvent {
    /// Build from a row selected with [`EVENT_COLUMNS`]. A malformed JSON
    /// column decodes as empty and is logged.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let id: i64 = row.get(0)?;
        let zones_raw: String = row.get(4)?;
        let areas_raw: String = row.get(5)?;
        Ok(Self {
            id,
            camera_id: row.get(1)?,
            start_ms: row.get(2)?,
            end_ms: row.get(3)?,
            zones: decode_json_column(id, "zones", &zones_raw),
            areas: decode_json_column(id, "areas", &areas_raw),
            thumbnail_path: row.get(6)?,
        })
    }
}

fn decode_json_column<T: DeserializeOwned + Default>(id: i64, column: &str, raw: &str) -> T {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(id, column, error = %e, "malformed JSON column, using empty value");
            T::default()
        }
    }
}
