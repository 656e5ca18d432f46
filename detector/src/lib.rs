//! Zone-aware frame-differencing motion detection.
//!
//! Callers feed consecutive [`Frame`]s into a [`MotionDetector`] and get back a
//! [`DetectionResult`] per frame. Detectors keep only the previous frame and
//! their configuration; they do no I/O and never fail.

pub mod differencer;
pub mod evaluator;
pub mod grid;
pub mod traits;

pub use evaluator::ZoneMotionEvaluator;
pub use grid::GridMotionDetector;
pub use traits::MotionDetector;
pub use zonewatch_common::frame::{Frame, Rect};
pub use zonewatch_common::motion::{DetectionResult, MotionArea};
pub use zonewatch_common::zone::{Sensitivity, Zone};
