use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};
use zonewatch_common::event::{MotionEvent, EVENTS_SCHEMA, EVENT_COLUMNS};
use zonewatch_common::motion::MotionArea;

/// Per-camera SQLite event log.
///
/// One file per camera: `{db_dir}/{camera_id}.db`. WAL mode is enabled so the
/// watcher (writer) and API server (reader) can work on it concurrently.
pub struct EventDb {
    conn: Mutex<Connection>,
    camera_id: String,
}

impl EventDb {
    /// Open (or create) the database for a camera. Creates `db_dir` if needed.
    pub fn open(db_dir: &Path, camera_id: &str) -> SqlResult<Self> {
        if let Err(e) = std::fs::create_dir_all(db_dir) {
            error!(
                path = db_dir.display().to_string(),
                error = %e,
                "failed to create DB directory"
            );
            return Err(rusqlite::Error::InvalidPath(db_dir.into()));
        }

        let db_path = db_dir.join(format!("{camera_id}.db"));
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(EVENTS_SCHEMA)?;

        info!(path = db_path.display().to_string(), camera_id, "event database opened");

        Ok(Self {
            conn: Mutex::new(conn),
            camera_id: camera_id.to_string(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a newly opened incident. Returns the new row id.
    pub fn insert_event(
        &self,
        start_ms: i64,
        zones: &[String],
        areas: &[MotionArea],
        thumbnail_path: Option<&str>,
    ) -> SqlResult<i64> {
        let zones_json = to_json(zones)?;
        let areas_json = to_json(areas)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO events (camera_id, start_ms, end_ms, zones, areas, thumbnail_path)
             VALUES (?1, ?2, ?2, ?3, ?4, ?5)",
            params![self.camera_id, start_ms, zones_json, areas_json, thumbnail_path],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, start_ms, zones = ?zones, "inserted event");
        Ok(id)
    }

    /// Finalize an incident with its last motion time and every zone it touched.
    pub fn close_event(&self, id: i64, end_ms: i64, zones: &[String]) -> SqlResult<bool> {
        let zones_json = to_json(zones)?;
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE events SET end_ms = ?1, zones = ?2 WHERE id = ?3 AND camera_id = ?4",
            params![end_ms, zones_json, id, self.camera_id],
        )?;
        debug!(id, end_ms, "closed event");
        Ok(changed > 0)
    }

    pub fn get_event(&self, id: i64) -> SqlResult<Option<MotionEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1 AND camera_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![id, self.camera_id], MotionEvent::from_row)?;
        rows.next().transpose()
    }

    /// Most recent events first.
    pub fn list_events(&self, limit: u32) -> SqlResult<Vec<MotionEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE camera_id = ?1
             ORDER BY start_ms DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![self.camera_id, limit], MotionEvent::from_row)?;
        rows.collect()
    }

    /// Events that started within `[start_ms, end_ms]`, oldest first.
    pub fn events_in_range(&self, start_ms: i64, end_ms: i64) -> SqlResult<Vec<MotionEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE camera_id = ?1 AND start_ms BETWEEN ?2 AND ?3
             ORDER BY start_ms ASC, id ASC"
        ))?;
        let rows = stmt.query_map(
            params![self.camera_id, start_ms, end_ms],
            MotionEvent::from_row,
        )?;
        rows.collect()
    }

    pub fn delete_event(&self, id: i64) -> SqlResult<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM events WHERE id = ?1 AND camera_id = ?2",
            params![id, self.camera_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete events that started at or before `cutoff_ms`.
    /// Returns the thumbnail paths of the removed rows so callers can clean them up.
    pub fn delete_older_than(&self, cutoff_ms: i64) -> SqlResult<Vec<String>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let thumbnails = {
            let mut stmt = tx.prepare(
                "SELECT thumbnail_path FROM events
                 WHERE camera_id = ?1 AND start_ms <= ?2 AND thumbnail_path IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![self.camera_id, cutoff_ms], |row| row.get(0))?;
            rows.collect::<SqlResult<Vec<String>>>()?
        };
        let deleted = tx.execute(
            "DELETE FROM events WHERE camera_id = ?1 AND start_ms <= ?2",
            params![self.camera_id, cutoff_ms],
        )?;
        tx.commit()?;
        debug!(deleted, cutoff_ms, "deleted expired events");
        Ok(thumbnails)
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> SqlResult<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}
