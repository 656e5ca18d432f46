use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use zonewatch_common::config::{is_valid_camera_id, Config};
use zonewatch_common::event::{MotionEvent, EVENT_COLUMNS};
use zonewatch_common::zone::Zone;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct AppState {
    db_dir: PathBuf,
    zones: Vec<Zone>,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct EventQuery {
    start_ms: Option<i64>,
    end_ms: Option<i64>,
    zone: Option<String>,
    limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// DB helpers (sync, wrapped in spawn_blocking)
// ---------------------------------------------------------------------------

/// Open an existing camera DB. `None` when the id is malformed or the camera
/// has never recorded anything.
fn open_camera_db(db_dir: &Path, camera_id: &str) -> rusqlite::Result<Option<Connection>> {
    if !is_valid_camera_id(camera_id) {
        return Ok(None);
    }
    let path = db_dir.join(format!("{camera_id}.db"));
    if !path.exists() {
        return Ok(None);
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    Ok(Some(conn))
}


/// Events for a camera, newest first, filtered by the optional query bounds.
fn query_events(
    conn: &Connection,
    camera_id: &str,
    q: &EventQuery,
) -> rusqlite::Result<Vec<MotionEvent>> {
    let mut wheres = vec!["camera_id = ?"];
    let mut args: Vec<Value> = vec![Value::Text(camera_id.to_string())];
    if let Some(start) = q.start_ms {
        wheres.push("end_ms >= ?");
        args.push(Value::Integer(start));
    }
    if let Some(end) = q.end_ms {
        wheres.push("start_ms <= ?");
        args.push(Value::Integer(end));
    }
    if let Some(zone) = &q.zone {
        wheres.push("EXISTS (SELECT 1 FROM json_each(events.zones) WHERE json_each.value = ?)");
        args.push(Value::Text(zone.clone()));
    }
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let sql = format!(
        "SELECT {EVENT_COLUMNS}
         FROM events
         WHERE {}
         ORDER BY start_ms DESC, id DESC
         LIMIT {limit}",
        wheres.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), MotionEvent::from_row)?;
    rows.collect()
}

fn get_event_row(
    conn: &Connection,
    camera_id: &str,
    id: i64,
) -> rusqlite::Result<Option<MotionEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1 AND camera_id = ?2"
    ))?;
    let mut rows = stmt.query_map(params![id, camera_id], MotionEvent::from_row)?;
    rows.next().transpose()
}

/// Map the outcome of a blocking DB task onto an HTTP response.
/// `Ok(None)` is a 404.
fn db_response<T>(
    result: Result<rusqlite::Result<Option<T>>, tokio::task::JoinError>,
    ok: impl FnOnce(T) -> Response,
) -> Response {
    match result {
        Ok(Ok(Some(value))) => ok(value),
        Ok(Ok(None)) => StatusCode::NOT_FOUND.into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "SQLite query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /cameras: list all cameras that have a .db file in db_dir
async fn list_cameras(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_dir = state.db_dir.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut cameras = Vec::new();
        let Ok(entries) = std::fs::read_dir(&db_dir) else {
            return cameras;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("db") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    cameras.push(stem.to_string());
                }
            }
        }
        cameras.sort();
        cameras
    })
    .await;

    match result {
        Ok(cameras) => Json(cameras).into_response(),
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /cameras/:camera_id/events?start_ms=&end_ms=&zone=&limit=
async fn list_events(
    State(state): State<Arc<AppState>>,
    AxumPath(camera_id): AxumPath<String>,
    Query(q): Query<EventQuery>,
) -> Response {
    let db_dir = state.db_dir.clone();
    let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<Option<Vec<MotionEvent>>> {
        let Some(conn) = open_camera_db(&db_dir, &camera_id)? else {
            return Ok(None);
        };
        query_events(&conn, &camera_id, &q).map(Some)
    })
    .await;
    db_response(result, |events| Json(events).into_response())
}

/// GET /cameras/:camera_id/events/:id
async fn get_event(
    State(state): State<Arc<AppState>>,
    AxumPath((camera_id, id)): AxumPath<(String, i64)>,
) -> Response {
    let db_dir = state.db_dir.clone();
    let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<Option<MotionEvent>> {
        let Some(conn) = open_camera_db(&db_dir, &camera_id)? else {
            return Ok(None);
        };
        get_event_row(&conn, &camera_id, id)
    })
    .await;
    db_response(result, |event| Json(event).into_response())
}

/// DELETE /cameras/:camera_id/events/:id: removes the row and its thumbnail
async fn delete_event(
    State(state): State<Arc<AppState>>,
    AxumPath((camera_id, id)): AxumPath<(String, i64)>,
) -> Response {
    let db_dir = state.db_dir.clone();
    let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<Option<()>> {
        let Some(conn) = open_camera_db(&db_dir, &camera_id)? else {
            return Ok(None);
        };
        let Some(event) = get_event_row(&conn, &camera_id, id)? else {
            return Ok(None);
        };
        conn.execute(
            "DELETE FROM events WHERE id = ?1 AND camera_id = ?2",
            params![id, camera_id],
        )?;
        if let Some(thumb) = &event.thumbnail_path {
            match std::fs::remove_file(thumb) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = thumb, error = %e, "failed to delete thumbnail"),
            }
        }
        Ok(Some(()))
    })
    .await;
    db_response(result, |()| {
        info!(id, "event deleted");
        StatusCode::NO_CONTENT.into_response()
    })
}

/// GET /cameras/:camera_id/events/:id/thumbnail: the JPEG captured when the event opened
async fn event_thumbnail(
    State(state): State<Arc<AppState>>,
    AxumPath((camera_id, id)): AxumPath<(String, i64)>,
) -> Response {
    let db_dir = state.db_dir.clone();
    let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<Option<Vec<u8>>> {
        let Some(conn) = open_camera_db(&db_dir, &camera_id)? else {
            return Ok(None);
        };
        let path = get_event_row(&conn, &camera_id, id)?.and_then(|e| e.thumbnail_path);
        Ok(path.and_then(|p| std::fs::read(p).ok()))
    })
    .await;
    db_response(result, |jpeg| {
        ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response()
    })
}

/// GET /zones: zones from the loaded configuration
async fn list_zones(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.zones.clone())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/cameras", get(list_cameras))
        .route("/cameras/:camera_id/events", get(list_events))
        .route("/cameras/:camera_id/events/:id", get(get_event).delete(delete_event))
        .route("/cameras/:camera_id/events/:id/thumbnail", get(event_thumbnail))
        .route("/zones", get(list_zones))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let state = Arc::new(AppState {
        db_dir: PathBuf::from(&config.database.path),
        zones: config.zones.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.api.port);
    info!(addr, zones = config.zones.len(), "zonewatch API server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!(error = %e, "API server stopped");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonewatch_common::event::EVENTS_SCHEMA;

    fn seeded_db(dir: &Path) -> Connection {
        let conn = Connection::open(dir.join("front.db")).unwrap();
        conn.execute_batch(EVENTS_SCHEMA).unwrap();
        let rows = [
            (100, 150, r#"["door"]"#),
            (200, 260, r#"["yard"]"#),
            (300, 300, r#"["door","yard"]"#),
            (400, 420, "[]"),
        ];
        for (start, end, zones) in rows {
            conn.execute(
                "INSERT INTO events (camera_id, start_ms, end_ms, zones)
                 VALUES ('front', ?1, ?2, ?3)",
                params![start, end, zones],
            )
            .unwrap();
        }
        conn
    }

    fn starts(events: &[MotionEvent]) -> Vec<i64> {
        events.iter().map(|e| e.start_ms).collect()
    }

    #[test]
    fn lists_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let conn = seeded_db(dir.path());
        let events = query_events(&conn, "front", &EventQuery::default()).unwrap();
        assert_eq!(starts(&events), vec![400, 300, 200, 100]);
    }

    #[test]
    fn filters_by_time_overlap_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let conn = seeded_db(dir.path());
        let q = EventQuery {
            start_ms: Some(250),
            end_ms: Some(400),
            ..Default::default()
        };
        assert_eq!(starts(&query_events(&conn, "front", &q).unwrap()), vec![400, 300, 200]);

        let q = EventQuery {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(starts(&query_events(&conn, "front", &q).unwrap()), vec![400]);
    }

    #[test]
    fn filters_by_zone() {
        let dir = tempfile::tempdir().unwrap();
        let conn = seeded_db(dir.path());
        let q = EventQuery {
            zone: Some("door".into()),
            ..Default::default()
        };
        assert_eq!(starts(&query_events(&conn, "front", &q).unwrap()), vec![300, 100]);
    }

    #[test]
    fn unknown_or_malformed_camera_is_none() {
        let dir = tempfile::tempdir().unwrap();
        seeded_db(dir.path());
        assert!(open_camera_db(dir.path(), "front").unwrap().is_some());
        assert!(open_camera_db(dir.path(), "back").unwrap().is_none());
        assert!(open_camera_db(dir.path(), "../front").unwrap().is_none());
    }

    #[test]
    fn reads_single_event() {
        let dir = tempfile::tempdir().unwrap();
        let conn = seeded_db(dir.path());
        let event = get_event_row(&conn, "front", 3).unwrap().unwrap();
        assert_eq!(event.zones, vec!["door".to_string(), "yard".to_string()]);
        assert!(get_event_row(&conn, "other", 3).unwrap().is_none());
    }
}
