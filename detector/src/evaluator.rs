use tracing::{debug, trace};
use zonewatch_common::frame::Frame;
use zonewatch_common::motion::{DetectionResult, MotionArea};
use zonewatch_common::zone::{Sensitivity, Zone};

use crate::differencer::{diff_region, FULL_FRAME_BASE_AREA, ZONE_BASE_AREA};
use crate::traits::MotionDetector;

/// Turns each new frame into a [`DetectionResult`] for a set of zones.
///
/// The first frame after construction, [`reset`](Self::reset) or a change in
/// frame dimensions only becomes the baseline and never reports motion.
/// With no enabled zones the whole frame is checked at default sensitivity.
#[derive(Debug, Default)]
pub struct ZoneMotionEvaluator {
    zones: Vec<Zone>,
    previous: Option<Frame>,
}

impl ZoneMotionEvaluator {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self {
            zones,
            previous: None,
        }
    }

    /// Replace the zone set. Applies from the next evaluation and keeps the baseline.
    pub fn set_zones(&mut self, zones: Vec<Zone>) {
        self.zones = zones;
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Whether a baseline frame is held.
    pub fn is_armed(&self) -> bool {
        self.previous.is_some()
    }

    /// Drop the baseline frame.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn evaluate(&mut self, current: &Frame) -> DetectionResult {
        let Some(previous) = self.previous.replace(current.clone()) else {
            debug!(
                width = current.width(),
                height = current.height(),
                "baseline frame stored"
            );
            return DetectionResult::none();
        };

        if !previous.same_dimensions(current) {
            debug!(
                from = format!("{}x{}", previous.width(), previous.height()),
                to = format!("{}x{}", current.width(), current.height()),
                "frame dimensions changed, re-baselining"
            );
            return DetectionResult::none();
        }

        let mut result = DetectionResult::none();
        let mut active = self.zones.iter().filter(|z| z.enabled).peekable();

        if active.peek().is_none() {
            let diff = diff_region(
                current,
                &previous,
                current.bounds(),
                Sensitivity::DEFAULT,
                FULL_FRAME_BASE_AREA,
            );
            trace!(
                changed_pixels = diff.changed_pixel_count,
                changed = diff.changed,
                "whole-frame check"
            );
            if diff.changed {
                result.areas.push(MotionArea::new(current.bounds(), None));
            }
        } else {
            for zone in active {
                let Some(region) = zone.rect.clip(current.width(), current.height()) else {
                    trace!(zone = zone.id, "zone outside frame, skipped");
                    continue;
                };
                let diff =
                    diff_region(current, &previous, region, zone.sensitivity, ZONE_BASE_AREA);
                trace!(
                    zone = zone.id,
                    changed_pixels = diff.changed_pixel_count,
                    changed = diff.changed,
                    "zone check"
                );
                if diff.changed {
                    result.triggered_zone_ids.push(zone.id.clone());
                    result.areas.push(MotionArea::new(zone.rect, Some(zone.id.clone())));
                }
            }
        }

        result.detected = !result.areas.is_empty();
        if result.detected {
            debug!(
                areas = result.areas.len(),
                zones = ?result.triggered_zone_ids,
                "motion detected"
            );
        }
        result
    }
}

impl MotionDetector for ZoneMotionEvaluator {
    fn evaluate(&mut self, frame: &Frame) -> DetectionResult {
        ZoneMotionEvaluator::evaluate(self, frame)
    }

    fn reset(&mut self) {
        ZoneMotionEvaluator::reset(self)
    }

    fn name(&self) -> &str {
        "zones"
    }
}
