//! Box geometry: pixel space ⇄ normalized page space.
//!
//! Every box that crosses a boundary of the pipeline (detector output, analyze
//! response, confirm request) is expressed as fractions of the page width and
//! height, so the caller can draw on a scaled preview and the server can map
//! the same box back onto the stored raster at any resolution.
//!
//! Invariant for every [`DetectedBox`] and every accepted [`ConfirmedBox`]:
//! `0 ≤ x, y, w, h ≤ 1`, `x + w ≤ 1`, `y + h ≤ 1`.

use serde::{Deserialize, Serialize};

/// Slack allowed on confirmed boxes before they are rejected as malformed.
///
/// Browsers round coordinates through CSS pixels, so a box dragged to the
/// page edge can come back as `x + w = 1.0000000002`.
pub const CONFIRM_TOLERANCE: f64 = 1e-6;

/// A detector hit in pixel space, as returned by the detector backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelDetection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
}

/// A normalized, bounds-clamped candidate signature region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub score: f64,
}

impl DetectedBox {
    /// Normalize a pixel-space detection against a `width` × `height` page.
    ///
    /// Corners are divided by the page size and clamped to `[0, 1]`, so edge
    /// detections overflowing by a few pixels are cut at the page border.
    /// Returns `None` for non-finite input or boxes with no area left after
    /// clamping.
    pub fn from_pixels(det: &PixelDetection, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let coords = [det.x1, det.y1, det.x2, det.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let (w_px, h_px) = (f64::from(width), f64::from(height));
        let nx1 = (det.x1 / w_px).clamp(0.0, 1.0);
        let nx2 = (det.x2 / w_px).clamp(0.0, 1.0);
        let ny1 = (det.y1 / h_px).clamp(0.0, 1.0);
        let ny2 = (det.y2 / h_px).clamp(0.0, 1.0);

        let (x, right) = (nx1.min(nx2), nx1.max(nx2));
        let (y, bottom) = (ny1.min(ny2), ny1.max(ny2));
        let w = fit_extent(x, right - x);
        let h = fit_extent(y, bottom - y);
        if w <= 0.0 || h <= 0.0 {
            return None;
        }

        let score = if det.confidence.is_finite() {
            det.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(Self { x, y, w, h, score })
    }
}

/// A caller-confirmed region to obliterate, in normalized page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl ConfirmedBox {
    /// Validate a box received from the caller.
    ///
    /// Accepts values within [`CONFIRM_TOLERANCE`] of the unit square and
    /// clamps them onto it; anything else is reported as malformed.
    pub fn validated(self) -> Result<Self, String> {
        let Self { x, y, w, h } = self;
        for (name, v) in [("x", x), ("y", y), ("w", w), ("h", h)] {
            if !v.is_finite() {
                return Err(format!("box {name} is not a finite number"));
            }
            if !(-CONFIRM_TOLERANCE..=1.0 + CONFIRM_TOLERANCE).contains(&v) {
                return Err(format!("box {name}={v} is outside [0, 1]"));
            }
        }
        if x + w > 1.0 + CONFIRM_TOLERANCE {
            return Err(format!("box overflows page width: x + w = {}", x + w));
        }
        if y + h > 1.0 + CONFIRM_TOLERANCE {
            return Err(format!("box overflows page height: y + h = {}", y + h));
        }

        let x = x.clamp(0.0, 1.0);
        let y = y.clamp(0.0, 1.0);
        Ok(Self {
            x,
            y,
            w: fit_extent(x, w.clamp(0.0, 1.0)),
            h: fit_extent(y, h.clamp(0.0, 1.0)),
        })
    }

    /// Map onto a `width` × `height` raster: `px = round(x × width)` and
    /// likewise for the other three values, clipped to the raster.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let (w_px, h_px) = (f64::from(width), f64::from(height));
        let left = (self.x * w_px).round().max(0.0) as u32;
        let top = (self.y * h_px).round().max(0.0) as u32;
        let rect_w = (self.w * w_px).round().max(0.0) as u32;
        let rect_h = (self.h * h_px).round().max(0.0) as u32;

        let left = left.min(width);
        let top = top.min(height);
        PixelRect {
            left,
            top,
            width: rect_w.min(width - left),
            height: rect_h.min(height - top),
        }
    }
}

/// An integer pixel rectangle, always inside the raster it was mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.left && px < self.left + self.width && py >= self.top && py < self.top + self.height
    }
}

/// Shrink `extent` so that `origin + extent ≤ 1` holds in floating point.
fn fit_extent(origin: f64, extent: f64) -> f64 {
    let mut e = extent.max(0.0);
    if origin + e > 1.0 {
        e = 1.0 - origin;
    }
    e
}
