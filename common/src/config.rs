use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::zone::{random_zone_color, Sensitivity, Zone};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_mode")]
    pub mode: SourceMode,
    /// Snapshot or MJPEG stream URL (`polling` / `mjpeg`).
    #[serde(default)]
    pub url: String,
    /// Image directory (`directory`).
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_camera_id")]
    pub camera_id: String,
}

/// Highest accepted `source.fps`; one frame per millisecond.
pub const MAX_FPS: f64 = 1000.0;

impl SourceConfig {
    /// Time between frames, never below 1ms.
    pub fn frame_interval(&self) -> Duration {
        let min = Duration::from_millis(1);
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return min;
        }
        Duration::try_from_secs_f64(1.0 / self.fps)
            .unwrap_or(min)
            .max(min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Polling,
    Mjpeg,
    Directory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_detection_enabled")]
    pub enabled: bool,
    #[serde(default = "default_strategy")]
    pub strategy: DetectionStrategy,
    /// Global sensitivity for the whole-frame grid strategy.
    #[serde(default)]
    pub sensitivity: Sensitivity,
    /// Frames are resampled to this size before detection when set.
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Per-zone evaluation, whole frame when no zone is enabled.
    Zones,
    /// Whole-frame detection reporting 50x50 grid cells.
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Seconds without motion before an open incident is closed.
    #[serde(default = "default_trigger_duration")]
    pub trigger_duration_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumbnail_dir")]
    pub dir: String,
    #[serde(default = "default_thumbnail_width")]
    pub width: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// 0 disables retention.
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_detection_enabled(),
            strategy: default_strategy(),
            sensitivity: Sensitivity::DEFAULT,
            resolution: None,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            trigger_duration_secs: default_trigger_duration(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            dir: default_thumbnail_dir(),
            width: default_thumbnail_width(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep: default_days_to_keep(),
            check_interval_secs: default_check_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    /// Parse, validate and fill in zone colours.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        for zone in config.zones.iter_mut().filter(|z| z.color.is_empty()) {
            zone.color = random_zone_color().to_string();
            debug!(zone = zone.id, color = zone.color, "assigned zone colour");
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fps = self.source.fps;
        if !fps.is_finite() || fps <= 0.0 || fps > MAX_FPS {
            return Err(ConfigError::Invalid(format!(
                "source.fps must be in (0, {MAX_FPS}], got {fps}"
            )));
        }
        let id = &self.source.camera_id;
        if !is_valid_camera_id(id) {
            return Err(ConfigError::Invalid(format!(
                "source.camera_id {id:?} must be a non-empty [A-Za-z0-9._-] name"
            )));
        }
        if let Some(res) = self.detection.resolution {
            if res.width == 0 || res.height == 0 {
                return Err(ConfigError::Invalid(
                    "detection.resolution must be non-zero".into(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if zone.id.is_empty() {
                return Err(ConfigError::Invalid("zone id must not be empty".into()));
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(ConfigError::DuplicateZone(zone.id.clone()));
            }
            if zone.rect.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "zone {} has an empty rect",
                    zone.id
                )));
            }
        }
        Ok(())
    }
}

/// Camera ids name files on disk: `[A-Za-z0-9._-]+`, not starting with a dot.
pub fn is_valid_camera_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("duplicate zone id {0}")]
    DuplicateZone(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_source_mode() -> SourceMode {
    SourceMode::Polling
}
fn default_fps() -> f64 {
    10.0
}
fn default_camera_id() -> String {
    "camera-0".into()
}
fn default_detection_enabled() -> bool {
    true
}
fn default_strategy() -> DetectionStrategy {
    DetectionStrategy::Zones
}
fn default_trigger_duration() -> u64 {
    10
}
fn default_thumbnail_dir() -> String {
    "data/thumbnails".into()
}
fn default_thumbnail_width() -> u32 {
    320
}
fn default_database_path() -> String {
    "data/db".into()
}
fn default_days_to_keep() -> u32 {
    30
}
fn default_check_interval() -> u64 {
    3600
}
fn default_api_port() -> u16 {
    8090
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rect;
    use crate::zone::{AlertLevel, ZONE_PALETTE};

    const MINIMAL: &str = r#"
        [source]
        url = "http://camera.local/frame"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.source.mode, SourceMode::Polling);
        assert_eq!(config.source.fps, 10.0);
        assert_eq!(config.source.camera_id, "camera-0");
        assert!(config.detection.enabled);
        assert_eq!(config.detection.strategy, DetectionStrategy::Zones);
        assert_eq!(config.detection.sensitivity, Sensitivity::DEFAULT);
        assert!(config.zones.is_empty());
        assert_eq!(config.events.trigger_duration_secs, 10);
        assert_eq!(config.retention.days_to_keep, 30);
        assert_eq!(config.api.port, 8090);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parses_zones_and_fills_colour() {
        let config = Config::from_toml(
            r##"
            [source]
            mode = "directory"
            path = "/tmp/frames"

            [detection]
            strategy = "grid"
            sensitivity = 80
            resolution = { width = 640, height = 360 }

            [[zones]]
            id = "driveway"
            name = "Driveway"
            rect = { x = 0, y = 100, width = 200, height = 150 }
            sensitivity = 70
            alert_level = "high"

            [[zones]]
            id = "porch"
            rect = { x = 300, y = 0, width = 50, height = 50 }
            enabled = false
            color = "#000000"
            "##,
        )
        .unwrap();

        assert_eq!(config.source.mode, SourceMode::Directory);
        assert_eq!(config.detection.strategy, DetectionStrategy::Grid);
        assert_eq!(config.detection.sensitivity.get(), 80);
        assert_eq!(
            config.detection.resolution,
            Some(Resolution { width: 640, height: 360 })
        );

        let driveway = &config.zones[0];
        assert_eq!(driveway.rect, Rect::new(0, 100, 200, 150));
        assert_eq!(driveway.sensitivity.get(), 70);
        assert!(driveway.enabled);
        assert_eq!(driveway.alert_level, AlertLevel::High);
        assert!(ZONE_PALETTE.contains(&driveway.color.as_str()));

        let porch = &config.zones[1];
        assert!(!porch.enabled);
        assert_eq!(porch.sensitivity, Sensitivity::DEFAULT);
        assert_eq!(porch.color, "#000000");
    }

    #[test]
    fn out_of_range_sensitivity_clamps() {
        let config = Config::from_toml(
            r#"
            [source]
            [[zones]]
            id = "a"
            rect = { x = 0, y = 0, width = 1, height = 1 }
            sensitivity = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.zones[0].sensitivity.get(), 1);
    }

    #[test]
    fn sensitivity_outside_byte_range_clamps() {
        for (raw, expected) in [(300, 100), (-5, 1), (256, 100)] {
            let config = Config::from_toml(&format!(
                "[source]\n[detection]\nsensitivity = {raw}\n"
            ))
            .unwrap();
            assert_eq!(config.detection.sensitivity.get(), expected, "sensitivity = {raw}");
        }
    }

    #[test]
    fn rejects_duplicate_zone_ids() {
        let err = Config::from_toml(
            r#"
            [source]
            [[zones]]
            id = "a"
            rect = { x = 0, y = 0, width = 10, height = 10 }
            [[zones]]
            id = "a"
            rect = { x = 5, y = 5, width = 10, height = 10 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateZone(id) if id == "a"));
    }

    #[test]
    fn rejects_empty_zone_rect() {
        let err = Config::from_toml(
            r#"
            [source]
            [[zones]]
            id = "a"
            rect = { x = 0, y = 0, width = 0, height = 10 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_positive_fps() {
        let err = Config::from_toml("[source]\nfps = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unbounded_fps() {
        for fps in ["inf", "1e12", "1000.5"] {
            let err = Config::from_toml(&format!("[source]\nfps = {fps}\n")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "fps = {fps}");
        }
        let config = Config::from_toml("[source]\nfps = 1000.0\n").unwrap();
        assert_eq!(config.source.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn frame_interval_never_zero() {
        let mut source = Config::from_toml(MINIMAL).unwrap().source;
        assert_eq!(source.frame_interval(), Duration::from_millis(100));
        source.fps = 1e12;
        assert_eq!(source.frame_interval(), Duration::from_millis(1));
        source.fps = f64::INFINITY;
        assert_eq!(source.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn rejects_path_like_camera_id() {
        let err = Config::from_toml("[source]\ncamera_id = \"../etc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/zonewatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(..)));
    }
}
