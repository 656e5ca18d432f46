use chrono::{DateTime, TimeZone, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zonewatch_common::frame::Frame;

const JPEG_EXT: &str = "jpg";

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("frame buffer does not match its dimensions")]
    Buffer,
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write thumbnail {0}: {1}")]
    Write(String, std::io::Error),
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Thumbnail location for an event captured at `captured_at_ms`.
/// e.g. "data/thumbnails/front-door/2026-02-18/20260218T093000000Z.jpg"
pub fn thumbnail_path(dir: &Path, camera_id: &str, captured_at_ms: i64) -> PathBuf {
    let dt = timestamp(captured_at_ms);
    dir.join(camera_id)
        .join(dt.format("%Y-%m-%d").to_string())
        .join(format!("{}.{JPEG_EXT}", dt.format("%Y%m%dT%H%M%S%3fZ")))
}

/// Scale `frame` to `width` pixels wide (aspect preserved, never upscaled)
/// and JPEG-encode it.
pub fn encode_thumbnail(frame: &Frame, width: u32) -> Result<Vec<u8>, ThumbnailError> {
    let rgba = RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or(ThumbnailError::Buffer)?;
    let mut img = DynamicImage::ImageRgba8(rgba);

    if width > 0 && width < frame.width() {
        let height = ((frame.height() as u64 * width as u64) / frame.width() as u64).max(1) as u32;
        img = img.resize_exact(width, height, FilterType::Triangle);
    }

    let mut buf = Vec::new();
    img.to_rgb8()
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
    Ok(buf)
}

/// Encode and store the thumbnail for an event. Returns the written path.
pub fn write_thumbnail(
    frame: &Frame,
    dir: &Path,
    camera_id: &str,
    captured_at_ms: i64,
    width: u32,
) -> Result<PathBuf, ThumbnailError> {
    let jpeg = encode_thumbnail(frame, width)?;
    let path = thumbnail_path(dir, camera_id, captured_at_ms);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ThumbnailError::Write(parent.display().to_string(), e))?;
    }
    std::fs::write(&path, jpeg).map_err(|e| ThumbnailError::Write(path.display().to_string(), e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_layout() {
        // 2026-02-18T09:30:00.000Z
        let ms = 1_771_407_000_000i64;
        let path = thumbnail_path(Path::new("thumbs"), "front-door", ms);
        assert_eq!(
            path,
            PathBuf::from("thumbs/front-door/2026-02-18/20260218T093000000Z.jpg")
        );
    }

    #[test]
    fn downscales_preserving_aspect() {
        let frame = Frame::filled(640, 360, [30, 60, 90, 255]).unwrap();
        let jpeg = encode_thumbnail(&frame, 320).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 180));
    }

    #[test]
    fn never_upscales() {
        let frame = Frame::filled(100, 50, [0, 0, 0, 255]).unwrap();
        let jpeg = encode_thumbnail(&frame, 320).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn writes_under_camera_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::filled(40, 30, [255, 0, 0, 255]).unwrap();
        let path = write_thumbnail(&frame, dir.path(), "cam", 1_771_407_000_000, 20).unwrap();
        assert!(path.starts_with(dir.path().join("cam").join("2026-02-18")));
        assert!(path.exists());
    }
}
