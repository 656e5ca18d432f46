use tracing::debug;
use zonewatch_common::frame::{Frame, Rect};
use zonewatch_common::motion::{DetectionResult, MotionArea};
use zonewatch_common::zone::Sensitivity;

use crate::differencer::{changed_mask, FULL_FRAME_BASE_AREA};
use crate::traits::MotionDetector;

/// Side length of a reporting cell.
pub const GRID_CELL_SIZE: u32 = 50;
/// Fraction of a full cell that must change for the cell to be reported.
pub const GRID_CELL_FILL: f64 = 0.2;

/// Whole-frame detector that reports which grid cells moved.
///
/// Motion is decided over the whole frame at a single global sensitivity.
/// When motion is found the frame is cut into 50x50 cells (edge cells
/// truncated) and every cell with more than 20% of a full cell changed is
/// returned as an untagged area.
#[derive(Debug, Default)]
pub struct GridMotionDetector {
    sensitivity: Sensitivity,
    previous: Option<Frame>,
}

impl GridMotionDetector {
    pub fn new(sensitivity: Sensitivity) -> Self {
        Self {
            sensitivity,
            previous: None,
        }
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: Sensitivity) {
        self.sensitivity = sensitivity;
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn evaluate(&mut self, current: &Frame) -> DetectionResult {
        let Some(previous) = self.previous.replace(current.clone()) else {
            debug!("baseline frame stored");
            return DetectionResult::none();
        };
        if !previous.same_dimensions(current) {
            debug!(
                width = current.width(),
                height = current.height(),
                "frame dimensions changed, re-baselining"
            );
            return DetectionResult::none();
        }

        let mask = changed_mask(current, &previous, self.sensitivity);
        let min_pixels = self.sensitivity.min_changed_pixels(FULL_FRAME_BASE_AREA);
        let detected = mask.count() as f64 > min_pixels;
        if !detected {
            return DetectionResult::none();
        }

        let cell_threshold = (GRID_CELL_SIZE * GRID_CELL_SIZE) as f64 * GRID_CELL_FILL;
        let mut areas = Vec::new();
        for y in (0..current.height()).step_by(GRID_CELL_SIZE as usize) {
            for x in (0..current.width()).step_by(GRID_CELL_SIZE as usize) {
                let cell = Rect::new(
                    x,
                    y,
                    GRID_CELL_SIZE.min(current.width() - x),
                    GRID_CELL_SIZE.min(current.height() - y),
                );
                if mask.count_in(cell) as f64 > cell_threshold {
                    areas.push(MotionArea::new(cell, None));
                }
            }
        }

        debug!(
            changed_pixels = mask.count(),
            min_pixels,
            cells = areas.len(),
            "motion detected"
        );
        DetectionResult {
            detected,
            areas,
            triggered_zone_ids: Vec::new(),
        }
    }
}

impl MotionDetector for GridMotionDetector {
    fn evaluate(&mut self, frame: &Frame) -> DetectionResult {
        GridMotionDetector::evaluate(self, frame)
    }

    fn reset(&mut self) {
        GridMotionDetector::reset(self)
    }

    fn name(&self) -> &str {
        "grid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonewatch_common::frame::CHANNELS;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn with_block(width: u32, height: u32, block: Rect) -> Frame {
        let mut data = BLACK.repeat(width as usize * height as usize);
        for y in block.y..block.bottom() {
            for x in block.x..block.right() {
                let i = (y * width + x) as usize * CHANNELS;
                data[i..i + CHANNELS].copy_from_slice(&WHITE);
            }
        }
        Frame::from_rgba(width, height, data).unwrap()
    }

    #[test]
    fn baseline_then_quiet() {
        let mut det = GridMotionDetector::default();
        let frame = Frame::filled(120, 120, BLACK).unwrap();
        assert_eq!(det.evaluate(&frame), DetectionResult::none());
        assert!(!det.evaluate(&frame).detected);
    }

    #[test]
    fn reports_cells_that_moved() {
        let mut det = GridMotionDetector::new(Sensitivity::DEFAULT);
        det.evaluate(&Frame::filled(150, 100, BLACK).unwrap());
        // Fills the cell at (50,0) and 600 px of the cell at (100,0).
        let result = det.evaluate(&with_block(150, 100, Rect::new(50, 0, 62, 50)));
        assert!(result.detected);
        assert_eq!(
            result.areas,
            vec![
                MotionArea::new(Rect::new(50, 0, 50, 50), None),
                MotionArea::new(Rect::new(100, 0, 50, 50), None),
            ]
        );
        assert!(result.triggered_zone_ids.is_empty());
    }

    #[test]
    fn edge_cells_are_truncated() {
        let mut det = GridMotionDetector::default();
        det.evaluate(&Frame::filled(130, 70, BLACK).unwrap());
        let result = det.evaluate(&Frame::filled(130, 70, WHITE).unwrap());
        assert!(result.detected);
        assert_eq!(result.areas.len(), 6);
        let corner = result.areas.last().unwrap();
        assert_eq!(corner.rect(), Rect::new(100, 50, 30, 20));
    }

    #[test]
    fn detected_without_any_qualifying_cell() {
        // 800 changed pixels spread thinly: above 500 overall, but no cell reaches 500.
        let mut det = GridMotionDetector::default();
        det.evaluate(&Frame::filled(200, 200, BLACK).unwrap());
        let mut data = BLACK.repeat(200 * 200);
        for y in (0..200).step_by(5) {
            for x in (0..200).step_by(10) {
                let i = (y * 200 + x) as usize * CHANNELS;
                data[i..i + CHANNELS].copy_from_slice(&WHITE);
            }
        }
        let result = det.evaluate(&Frame::from_rgba(200, 200, data).unwrap());
        assert!(result.detected);
        assert!(result.areas.is_empty());
    }

    #[test]
    fn sensitivity_changes_minimum() {
        // 400 changed pixels: below 500 at sensitivity 50, above 250 at 100.
        let block = Rect::new(0, 0, 20, 20);
        let mut det = GridMotionDetector::default();
        det.evaluate(&Frame::filled(100, 100, BLACK).unwrap());
        assert!(!det.evaluate(&with_block(100, 100, block)).detected);

        det.set_sensitivity(Sensitivity::MAX);
        det.evaluate(&Frame::filled(100, 100, BLACK).unwrap());
        assert!(det.evaluate(&with_block(100, 100, block)).detected);
    }

    #[test]
    fn reset_and_resize_rebaseline() {
        let mut det = GridMotionDetector::default();
        det.evaluate(&Frame::filled(100, 100, BLACK).unwrap());
        det.reset();
        assert_eq!(det.evaluate(&Frame::filled(100, 100, WHITE).unwrap()), DetectionResult::none());
        assert_eq!(det.evaluate(&Frame::filled(60, 60, BLACK).unwrap()), DetectionResult::none());
    }

    #[test]
    fn usable_as_trait_object() {
        let mut det: Box<dyn MotionDetector> = Box::new(GridMotionDetector::default());
        assert_eq!(det.name(), "grid");
        det.evaluate(&Frame::filled(100, 100, BLACK).unwrap());
        assert!(det.evaluate(&Frame::filled(100, 100, WHITE).unwrap()).detected);
    }
}
