use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::frame::Rect;

/// Colours handed out to newly drawn zones.
pub const ZONE_PALETTE: [&str; 7] = [
    "#3b82f6", // blue
    "#10b981", // green
    "#f59e0b", // amber
    "#ef4444", // red
    "#8b5cf6", // purple
    "#ec4899", // pink
    "#14b8a6", // teal
];

/// Palette colour for the `index`-th zone, wrapping around.
pub fn palette_color(index: usize) -> &'static str {
    ZONE_PALETTE[index % ZONE_PALETTE.len()]
}

/// A uniformly random palette colour.
pub fn random_zone_color() -> &'static str {
    ZONE_PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(ZONE_PALETTE[0])
}

/// User-facing motion sensitivity dial, always within `[1, 100]`.
///
/// Higher values lower both the per-pixel change threshold and the number of
/// changed pixels required before a region counts as motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Sensitivity(u8);

impl Sensitivity {
    pub const MIN: Sensitivity = Sensitivity(1);
    pub const MAX: Sensitivity = Sensitivity(100);
    pub const DEFAULT: Sensitivity = Sensitivity(50);

    /// Clamps `value` into `[1, 100]`.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Average per-channel delta a pixel must exceed to count as changed.
    /// Ranges from 25.0 (sensitivity 100) to 74.5 (sensitivity 1).
    pub fn pixel_threshold(self) -> f64 {
        25.0 + (100 - self.0) as f64 * 0.5
    }

    /// Changed-pixel count a region must exceed to count as motion.
    /// Equals `base_area` at sensitivity 50.
    pub fn min_changed_pixels(self, base_area: f64) -> f64 {
        base_area / (self.0 as f64 / 50.0)
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Sensitivity {
    fn from(value: u8) -> Self {
        Self::new(value as i64)
    }
}

impl From<i64> for Sensitivity {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Sensitivity> for u8 {
    fn from(value: Sensitivity) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// A user-defined rectangular region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub rect: Rect,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub alert_level: AlertLevel,
}

impl Zone {
    /// An enabled zone at default sensitivity with a random palette colour.
    pub fn new(id: impl Into<String>, name: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rect,
            sensitivity: Sensitivity::DEFAULT,
            enabled: true,
            color: random_zone_color().to_string(),
            alert_level: AlertLevel::default(),
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        self.rect.contains_point(x, y)
    }
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_clamps() {
        assert_eq!(Sensitivity::new(0).get(), 1);
        assert_eq!(Sensitivity::new(-20).get(), 1);
        assert_eq!(Sensitivity::new(250).get(), 100);
        assert_eq!(Sensitivity::from(200u8).get(), 100);
        assert_eq!(Sensitivity::from(300i64).get(), 100);
        assert_eq!(Sensitivity::from(-5i64).get(), 1);
        assert_eq!(Sensitivity::default().get(), 50);
    }

    #[test]
    fn threshold_formulas() {
        assert_eq!(Sensitivity::new(50).pixel_threshold(), 50.0);
        assert_eq!(Sensitivity::new(100).pixel_threshold(), 25.0);
        assert_eq!(Sensitivity::new(1).pixel_threshold(), 74.5);

        assert_eq!(Sensitivity::new(50).min_changed_pixels(200.0), 200.0);
        assert_eq!(Sensitivity::new(100).min_changed_pixels(500.0), 250.0);
        assert!((Sensitivity::new(1).min_changed_pixels(200.0) - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn palette_cycles() {
        assert_eq!(palette_color(0), "#3b82f6");
        assert_eq!(palette_color(7), "#3b82f6");
        assert_eq!(palette_color(9), "#f59e0b");
        assert!(ZONE_PALETTE.contains(&random_zone_color()));
    }

    #[test]
    fn zone_defaults() {
        let zone = Zone::new("door", "Front door", Rect::new(0, 0, 10, 10));
        assert!(zone.enabled);
        assert_eq!(zone.sensitivity, Sensitivity::DEFAULT);
        assert_eq!(zone.alert_level, AlertLevel::Medium);
        assert!(ZONE_PALETTE.contains(&zone.color.as_str()));
        assert!(zone.contains_point(10, 10));
        assert!(!zone.contains_point(11, 0));
    }
}
