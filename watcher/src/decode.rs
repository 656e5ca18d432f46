use image::imageops::FilterType;
use image::ImageReader;
use std::io::Cursor;
use zonewatch_common::config::Resolution;
use zonewatch_common::frame::{Frame, FrameError};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to sniff image format: {0}")]
    Format(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("decoded image is not a valid frame: {0}")]
    Frame(#[from] FrameError),
}

/// Decode a JPEG/PNG snapshot into an RGBA [`Frame`].
///
/// When `resolution` is set the image is resampled to it, so every frame fed
/// to a detector has the same dimensions regardless of what the camera sends.
pub fn decode_frame(bytes: &[u8], resolution: Option<Resolution>) -> Result<Frame, DecodeError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let img = match resolution {
        Some(r) if (img.width(), img.height()) != (r.width, r.height) => {
            img.resize_exact(r.width, r.height, FilterType::Triangle)
        }
        _ => img,
    };

    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame::from_rgba(width, height, rgba.into_raw())?)
}
