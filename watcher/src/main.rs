use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use zonewatch_common::config::Config;
use zonewatch_watcher::source::{self, SourceEvent};
use zonewatch_watcher::watch::{self, Watcher};
use zonewatch_watcher::{db, retention};

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

    info!(
        camera_id = config.source.camera_id,
        mode = ?config.source.mode,
        fps = config.source.fps,
        strategy = ?config.detection.strategy,
        zones = config.zones.len(),
        enabled = config.detection.enabled,
        trigger_duration_secs = config.events.trigger_duration_secs,
        "starting zonewatch watcher"
    );

    // Open per-camera SQLite database for motion events.
    let camera_id = config.source.camera_id.clone();
    let db_dir = std::path::Path::new(&config.database.path);
    let event_db = match db::EventDb::open(db_dir, &camera_id) {
        Ok(d) => {
            info!(path = config.database.path, camera_id, "SQLite event DB opened");
            Some(Arc::new(d))
        }
        Err(e) => {
            error!(error = %e, "failed to open SQLite event DB; events will not be persisted");
            None
        }
    };

    if let Some(db) = &event_db {
        let retention_db = Arc::clone(db);
        let retention_config = config.retention.clone();
        tokio::spawn(async move {
            retention::run_retention_loop(retention_db, retention_config).await;
        });
    }

    let detector = watch::build_detector(&config);
    let watcher = Watcher::new(&config, detector, event_db);

    let (tx, rx) = mpsc::channel(8);
    let source_task = source::spawn_source(config.source.clone(), tx);

    info!("entering main detection loop");
    run_watch_loop(rx, watcher).await;
    source_task.abort();
}

async fn run_watch_loop(mut rx: mpsc::Receiver<SourceEvent>, mut watcher: Watcher) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SourceEvent::Frame(bytes)) => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    watcher.process_frame(&bytes, now_ms);
                }
                Some(SourceEvent::Restarted) => watcher.restart(),
                None => {
                    info!("frame source finished");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    watcher.finish();
    info!(frames = watcher.frames_processed(), "watcher stopped");
}
