use serde::{Deserialize, Serialize};

use crate::frame::Rect;

/// Bounding box of detected motion, optionally tagged with the zone that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl MotionArea {
    pub fn new(rect: Rect, zone: Option<String>) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            zone,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Outcome of evaluating one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub areas: Vec<MotionArea>,
    pub triggered_zone_ids: Vec<String>,
}

impl DetectionResult {
    /// No motion, no areas, no zones.
    pub fn none() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_area_omits_zone_field() {
        let area = MotionArea::new(Rect::new(1, 2, 3, 4), None);
        let json = serde_json::to_string(&area).unwrap();
        assert_eq!(json, r#"{"x":1,"y":2,"width":3,"height":4}"#);
    }

    #[test]
    fn tagged_area_keeps_zone() {
        let area = MotionArea::new(Rect::new(0, 0, 10, 10), Some("porch".into()));
        let json = serde_json::to_string(&area).unwrap();
        let back: MotionArea = serde_json::from_str(&json).unwrap();
        assert_eq!(back.zone.as_deref(), Some("porch"));
        assert_eq!(back.rect(), Rect::new(0, 0, 10, 10));
    }
}
