use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bytes per pixel in a [`Frame`] buffer (R, G, B, A).
pub const CHANNELS: usize = 4;

/// An immutable raster snapshot of the video source.
///
/// Pixels are stored row-major as interleaved RGBA. The buffer is shared, so
/// cloning a frame (e.g. to keep it as the previous frame) does not copy
/// pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap an RGBA buffer. The buffer must hold exactly `width * height * 4`
    /// bytes and both dimensions must be non-zero.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// A frame where every pixel has the same RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, FrameError> {
        let pixels = width as usize * height as usize;
        let data = rgba.repeat(pixels);
        Self::from_rgba(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw interleaved RGBA bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Rectangle covering the whole frame.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Byte offset of the pixel at (x, y). Caller guarantees the coordinate is in bounds.
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero: got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
    #[error("frame buffer has {got} bytes, expected {expected}")]
    BufferSize { got: usize, expected: usize },
}

/// Axis-aligned rectangle in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Intersect with a `frame_width` x `frame_height` frame anchored at the
    /// origin. Returns `None` when nothing of the rect remains.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<Rect> {
        if self.is_empty() || self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let right = self.right().min(frame_width);
        let bottom = self.bottom().min(frame_height);
        Some(Rect::new(self.x, self.y, right - self.x, bottom - self.y))
    }

    /// Point test, inclusive on all four edges.
    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba_checks_buffer_size() {
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_ok());
        let err = Frame::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, FrameError::BufferSize { got: 15, expected: 16 }));
    }

    #[test]
    fn from_rgba_rejects_zero_dimensions() {
        let err = Frame::from_rgba(0, 4, vec![]).unwrap_err();
        assert!(matches!(err, FrameError::EmptyDimensions { .. }));
    }

    #[test]
    fn filled_frame_and_offsets() {
        let frame = Frame::filled(3, 2, [10, 20, 30, 255]).unwrap();
        assert_eq!(frame.data().len(), 24);
        let off = frame.offset(2, 1);
        assert_eq!(off, 20);
        assert_eq!(&frame.data()[off..off + 4], &[10, 20, 30, 255]);
        assert_eq!(frame.bounds(), Rect::new(0, 0, 3, 2));
    }

    #[test]
    fn clone_shares_buffer() {
        let frame = Frame::filled(4, 4, [0, 0, 0, 255]).unwrap();
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.data().as_ptr(), copy.data().as_ptr()));
        assert!(frame.same_dimensions(&copy));
    }

    #[test]
    fn clip_inside_partial_and_outside() {
        let r = Rect::new(10, 10, 20, 20);
        assert_eq!(r.clip(100, 100), Some(r));
        assert_eq!(Rect::new(90, 95, 20, 20).clip(100, 100), Some(Rect::new(90, 95, 10, 5)));
        assert_eq!(Rect::new(100, 0, 5, 5).clip(100, 100), None);
        assert_eq!(Rect::new(0, 0, 0, 5).clip(100, 100), None);
    }

    #[test]
    fn clip_does_not_overflow_near_u32_max() {
        let r = Rect::new(5, 5, u32::MAX, u32::MAX);
        assert_eq!(r.clip(10, 10), Some(Rect::new(5, 5, 5, 5)));
    }

    #[test]
    fn contains_point_is_edge_inclusive() {
        let r = Rect::new(10, 10, 5, 5);
        assert!(r.contains_point(10, 10));
        assert!(r.contains_point(15, 15));
        assert!(!r.contains_point(16, 12));
        assert!(!r.contains_point(9, 12));
    }

    #[test]
    fn intersects_disjoint_and_overlapping() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(5, 5, 10, 10)));
        assert!(!a.intersects(&Rect::new(10, 0, 10, 10)));
    }
}
