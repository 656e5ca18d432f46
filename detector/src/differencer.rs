use zonewatch_common::frame::{Frame, Rect, CHANNELS};
use zonewatch_common::zone::Sensitivity;

/// Minimum-changed-pixel base for whole-frame detection.
pub const FULL_FRAME_BASE_AREA: f64 = 500.0;
/// Minimum-changed-pixel base for per-zone detection. Zones are usually
/// smaller than the frame, so fewer pixels still count as motion.
pub const ZONE_BASE_AREA: f64 = 200.0;

/// Per-region differencing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDiff {
    pub changed: bool,
    pub changed_pixel_count: u64,
}

/// Largest R+G+B delta sum that still counts as unchanged.
///
/// A pixel changed when `(dR + dG + dB) / 3 > threshold`. The sum is an
/// integer, so that is the same as `sum > floor(3 * threshold)`.
#[inline]
fn sum_cutoff(sensitivity: Sensitivity) -> u32 {
    (3.0 * sensitivity.pixel_threshold()).floor() as u32
}

/// Sum of absolute R, G and B deltas; alpha is ignored.
#[inline]
fn delta_sum(a: &[u8], b: &[u8]) -> u32 {
    a[0].abs_diff(b[0]) as u32 + a[1].abs_diff(b[1]) as u32 + a[2].abs_diff(b[2]) as u32
}

/// Count changed pixels inside `region` and decide whether that is motion.
///
/// Preconditions: both frames share dimensions and `region` is non-empty and
/// already clipped to them (see [`Rect::clip`]). Only the rows and columns of
/// `region` are read.
pub fn diff_region(
    current: &Frame,
    previous: &Frame,
    region: Rect,
    sensitivity: Sensitivity,
    base_area: f64,
) -> RegionDiff {
    debug_assert!(current.same_dimensions(previous));
    debug_assert_eq!(region.clip(current.width(), current.height()), Some(region));

    let cutoff = sum_cutoff(sensitivity);
    let cur = current.data();
    let prev = previous.data();
    let row_bytes = region.width as usize * CHANNELS;

    let mut changed_pixel_count = 0u64;
    for y in region.y..region.bottom() {
        let start = current.offset(region.x, y);
        let end = start + row_bytes;
        changed_pixel_count += cur[start..end]
            .chunks_exact(CHANNELS)
            .zip(prev[start..end].chunks_exact(CHANNELS))
            .filter(|(a, b)| delta_sum(a, b) > cutoff)
            .count() as u64;
    }

    RegionDiff {
        changed: changed_pixel_count as f64 > sensitivity.min_changed_pixels(base_area),
        changed_pixel_count,
    }
}

/// Per-pixel changed flags over a whole frame.
#[derive(Debug, Clone)]
pub struct ChangeMask {
    width: u32,
    height: u32,
    changed: Vec<bool>,
    count: u64,
}

impl ChangeMask {
    /// Total changed pixels.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_changed(&self, x: u32, y: u32) -> bool {
        self.changed[y as usize * self.width as usize + x as usize]
    }

    /// Changed pixels inside `rect`, clipped to the mask.
    pub fn count_in(&self, rect: Rect) -> u64 {
        let Some(rect) = rect.clip(self.width, self.height) else {
            return 0;
        };
        (rect.y..rect.bottom())
            .map(|y| {
                let start = y as usize * self.width as usize + rect.x as usize;
                self.changed[start..start + rect.width as usize]
                    .iter()
                    .filter(|&&c| c)
                    .count() as u64
            })
            .sum()
    }
}

/// Mark every changed pixel of two same-sized frames.
pub fn changed_mask(current: &Frame, previous: &Frame, sensitivity: Sensitivity) -> ChangeMask {
    debug_assert!(current.same_dimensions(previous));

    let cutoff = sum_cutoff(sensitivity);
    let changed: Vec<bool> = current
        .data()
        .chunks_exact(CHANNELS)
        .zip(previous.data().chunks_exact(CHANNELS))
        .map(|(a, b)| delta_sum(a, b) > cutoff)
        .collect();
    let count = changed.iter().filter(|&&c| c).count() as u64;

    ChangeMask {
        width: current.width(),
        height: current.height(),
        changed,
        count,
    }
}
