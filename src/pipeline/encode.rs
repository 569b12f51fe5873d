//! Image encoding for the vision detector: page raster → base64 PNG.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request body
//! and tile or downsample anything large on their side. We downscale pages
//! above [`MAX_MODEL_EDGE`] ourselves so the pixel coordinates the model
//! reports refer to an image whose size we know, then map them back with
//! [`EncodedPage::rescale`].

use crate::geometry::PixelDetection;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Longest edge, in pixels, of the image sent to the model.
pub const MAX_MODEL_EDGE: u32 = 2048;

/// A page prepared for the model, plus the geometry needed to undo scaling.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub data: ImageData,
    /// Size of the image actually sent.
    pub sent_width: u32,
    pub sent_height: u32,
    /// Size of the page raster the detections must refer to.
    pub page_width: u32,
    pub page_height: u32,
}

impl EncodedPage {
    /// Map a detection from sent-image pixels back to page-raster pixels.
    pub fn rescale(&self, det: PixelDetection) -> PixelDetection {
        let sx = f64::from(self.page_width) / f64::from(self.sent_width.max(1));
        let sy = f64::from(self.page_height) / f64::from(self.sent_height.max(1));
        PixelDetection {
            x1: det.x1 * sx,
            y1: det.y1 * sy,
            x2: det.x2 * sx,
            y2: det.y2 * sy,
            confidence: det.confidence,
        }
    }
}

/// Encode a page raster as a base64 PNG, downscaled to at most `max_edge`.
///
/// PNG keeps thin pen strokes intact; JPEG ringing around ink makes faint
/// signatures harder to tell apart from printed text.
pub fn encode_page(img: &DynamicImage, max_edge: u32) -> Result<EncodedPage, image::ImageError> {
    let (page_width, page_height) = (img.width(), img.height());

    let scaled;
    let sent = if page_width.max(page_height) > max_edge {
        scaled = img.resize(max_edge, max_edge, FilterType::Triangle);
        &scaled
    } else {
        img
    };

    let mut buf = Vec::new();
    sent.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} page as {}x{} → {} bytes base64",
        page_width,
        page_height,
        sent.width(),
        sent.height(),
        b64.len()
    );

    Ok(EncodedPage {
        data: ImageData::new(b64, "image/png").with_detail("high"),
        sent_width: sent.width(),
        sent_height: sent.height(),
        page_width,
        page_height,
    })
}
