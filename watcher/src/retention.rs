use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use zonewatch_common::config::RetentionConfig;

use crate::db::EventDb;

const MS_PER_DAY: i64 = 86_400_000;

/// Delete events older than `days_to_keep` days before `now_ms`, along with
/// their thumbnails. Returns the number of thumbnail files removed.
pub fn purge_expired(db: &EventDb, now_ms: i64, days_to_keep: u32) -> rusqlite::Result<usize> {
    let cutoff_ms = now_ms.saturating_sub(i64::from(days_to_keep) * MS_PER_DAY);
    let thumbnails = db.delete_older_than(cutoff_ms)?;

    let mut removed = 0;
    for path in &thumbnails {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "thumbnail already gone");
            }
            Err(e) => warn!(path, error = %e, "failed to delete thumbnail"),
        }
    }
    Ok(removed)
}

/// Periodically apply the retention window. Does nothing when
/// `days_to_keep` is 0.
pub async fn run_retention_loop(db: Arc<EventDb>, config: RetentionConfig) {
    if config.days_to_keep == 0 {
        info!("retention disabled, events are kept forever");
        return;
    }
    let interval = Duration::from_secs(config.check_interval_secs.max(1));
    info!(
        days_to_keep = config.days_to_keep,
        check_interval_secs = config.check_interval_secs,
        "retention loop started"
    );

    loop {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let db_ref = Arc::clone(&db);
        let days = config.days_to_keep;
        match tokio::task::spawn_blocking(move || purge_expired(&db_ref, now_ms, days)).await {
            Ok(Ok(removed)) if removed > 0 => info!(removed, "expired events purged"),
            Ok(Ok(_)) => debug!("no expired events"),
            Ok(Err(e)) => error!(error = %e, "retention sweep failed"),
            Err(e) => error!(error = %e, "retention task panicked"),
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purges_old_rows_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = EventDb::open(dir.path(), "cam").unwrap();

        let old_thumb = dir.path().join("old.jpg");
        std::fs::write(&old_thumb, b"jpeg").unwrap();
        let old_path = old_thumb.display().to_string();
        let missing_path = dir.path().join("missing.jpg").display().to_string();

        let now = 40 * MS_PER_DAY;
        db.insert_event(MS_PER_DAY, &[], &[], Some(&old_path)).unwrap();
        db.insert_event(2 * MS_PER_DAY, &[], &[], Some(&missing_path)).unwrap();
        let fresh = db.insert_event(35 * MS_PER_DAY, &[], &[], None).unwrap();

        let removed = purge_expired(&db, now, 30).unwrap();
        assert_eq!(removed, 1);
        assert!(!old_thumb.exists());

        let remaining = db.list_events(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh);
    }
}
