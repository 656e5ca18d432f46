use zonewatch_common::frame::Frame;
use zonewatch_common::motion::DetectionResult;

/// Frame-to-frame motion detection strategy.
///
/// Implementations hold the previous frame and compare each new frame against
/// it. Calls must be serialized; `evaluate` is not reentrant.
pub trait MotionDetector: Send + Sync {
    /// Compare `frame` with the previous one and make it the new baseline.
    fn evaluate(&mut self, frame: &Frame) -> DetectionResult;

    /// Forget the baseline so the next frame only re-establishes it.
    fn reset(&mut self);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
