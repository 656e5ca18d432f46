use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use zonewatch_common::config::{Config, DetectionStrategy, Resolution};
use zonewatch_common::frame::Frame;
use zonewatch_common::motion::DetectionResult;
use zonewatch_detector::{GridMotionDetector, MotionDetector, ZoneMotionEvaluator};

use crate::db::EventDb;
use crate::decode::decode_frame;
use crate::incident::{Incident, IncidentTracker, IncidentUpdate};
use crate::thumbnail::write_thumbnail;

/// Build the detector selected by `detection.strategy`.
pub fn build_detector(config: &Config) -> Box<dyn MotionDetector> {
    match config.detection.strategy {
        DetectionStrategy::Zones => Box::new(ZoneMotionEvaluator::new(config.zones.clone())),
        DetectionStrategy::Grid => Box::new(GridMotionDetector::new(config.detection.sensitivity)),
    }
}

/// Per-camera detection pipeline: decode, evaluate, group into incidents,
/// persist events and thumbnails.
pub struct Watcher {
    detector: Box<dyn MotionDetector>,
    tracker: IncidentTracker,
    db: Option<Arc<EventDb>>,
    camera_id: String,
    thumbnail_dir: PathBuf,
    thumbnail_width: u32,
    resolution: Option<Resolution>,
    enabled: bool,
    /// Row id of the event for the incident currently open.
    open_event: Option<i64>,
    frames: u64,
}

impl Watcher {
    pub fn new(
        config: &Config,
        detector: Box<dyn MotionDetector>,
        db: Option<Arc<EventDb>>,
    ) -> Self {
        Self {
            detector,
            tracker: IncidentTracker::new(Duration::from_secs(config.events.trigger_duration_secs)),
            db,
            camera_id: config.source.camera_id.clone(),
            thumbnail_dir: PathBuf::from(&config.thumbnails.dir),
            thumbnail_width: config.thumbnails.width,
            resolution: config.detection.resolution,
            enabled: config.detection.enabled,
            open_event: None,
            frames: 0,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Decode and evaluate one encoded frame captured at `now_ms`.
    ///
    /// Returns `None` when the frame could not be decoded or detection is
    /// disabled. Undecodable frames are skipped without touching the
    /// detector baseline.
    pub fn process_frame(&mut self, encoded: &[u8], now_ms: i64) -> Option<DetectionResult> {
        if !self.enabled {
            return None;
        }

        let frame = match decode_frame(encoded, self.resolution) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, bytes = encoded.len(), "failed to decode frame, skipping");
                return None;
            }
        };
        self.frames += 1;

        let result = self.detector.evaluate(&frame);
        if result.detected {
            debug!(
                detector = self.detector.name(),
                zones = ?result.triggered_zone_ids,
                areas = result.areas.len(),
                "motion detected"
            );
        }

        for update in self.tracker.observe(now_ms, &result) {
            match update {
                IncidentUpdate::Opened(incident) => self.record_opened(&incident, &frame),
                IncidentUpdate::Closed(incident) => self.record_closed(&incident),
            }
        }

        if self.frames % 100 == 0 {
            info!(frames = self.frames, active = self.tracker.is_active(), "watcher stats");
        }
        Some(result)
    }

    /// The source reconnected: the next frame is not comparable to the last.
    pub fn restart(&mut self) {
        info!(detector = self.detector.name(), "source restarted, clearing baseline");
        self.detector.reset();
    }

    /// Close any open incident. Called on shutdown.
    pub fn finish(&mut self) {
        if let Some(incident) = self.tracker.finish() {
            self.record_closed(&incident);
        }
    }

    fn record_opened(&mut self, incident: &Incident, frame: &Frame) {
        let Some(db) = &self.db else {
            return;
        };

        let thumbnail = match write_thumbnail(
            frame,
            &self.thumbnail_dir,
            &self.camera_id,
            incident.start_ms,
            self.thumbnail_width,
        ) {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                error!(error = %e, "failed to write event thumbnail");
                None
            }
        };

        match db.insert_event(
            incident.start_ms,
            &incident.zones,
            &incident.areas,
            thumbnail.as_deref(),
        ) {
            Ok(id) => {
                info!(id, start_ms = incident.start_ms, "event recorded");
                self.open_event = Some(id);
            }
            Err(e) => error!(error = %e, "failed to insert event"),
        }
    }

    fn record_closed(&mut self, incident: &Incident) {
        let Some(id) = self.open_event.take() else {
            return;
        };
        let Some(db) = &self.db else {
            return;
        };
        if let Err(e) = db.close_event(id, incident.end_ms, &incident.zones) {
            error!(id, error = %e, "failed to close event");
        }
    }
}
