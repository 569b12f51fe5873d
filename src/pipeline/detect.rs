//! Detector adapter: run a [`SignatureDetector`] on one stored page and turn
//! its pixel-space answer into normalized [`DetectedBox`]es.
//!
//! Detection is best-effort. Every failure mode (undecodable page, backend
//! error, unparsable answer, timeout) is logged and reported as an empty box
//! list, because the caller can always draw boxes by hand at confirm time.

use crate::error::DetectionError;
use crate::geometry::{DetectedBox, PixelDetection};
use crate::workspace::StoredPage;
use async_trait::async_trait;
use image::DynamicImage;
use std::time::Duration;
use tracing::{debug, warn};

/// The detector boundary: one page image in, pixel boxes with confidence out.
///
/// Coordinates are relative to the image passed in. Implementations need not
/// clamp or validate them; [`normalize`] does that.
#[async_trait]
pub trait SignatureDetector: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<PixelDetection>, DetectionError>;

    /// Short name used in log lines.
    fn name(&self) -> &str {
        "detector"
    }
}

/// Detector that never finds anything; every box comes from the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDetector;

#[async_trait]
impl SignatureDetector for NoopDetector {
    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<PixelDetection>, DetectionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Normalize raw detections against a `width` × `height` image.
///
/// Degenerate boxes are dropped, as are boxes scoring below `min_confidence`.
pub fn normalize(
    detections: &[PixelDetection],
    width: u32,
    height: u32,
    min_confidence: f64,
) -> Vec<DetectedBox> {
    detections
        .iter()
        .filter_map(|d| DetectedBox::from_pixels(d, width, height))
        .filter(|b| b.score >= min_confidence)
        .collect()
}

/// Detect signature candidates on a stored page. Never fails.
pub async fn detect_page(
    detector: &dyn SignatureDetector,
    page: &StoredPage,
    min_confidence: f64,
    timeout: Duration,
) -> Vec<DetectedBox> {
    match try_detect(detector, page, min_confidence, timeout).await {
        Ok(boxes) => {
            debug!(
                "Page {}: {} detected {} candidate(s)",
                page.index,
                detector.name(),
                boxes.len()
            );
            boxes
        }
        Err(e) => {
            warn!("Page {}: detection skipped — {}", page.index, e);
            Vec::new()
        }
    }
}

async fn try_detect(
    detector: &dyn SignatureDetector,
    page: &StoredPage,
    min_confidence: f64,
    timeout: Duration,
) -> Result<Vec<DetectedBox>, DetectionError> {
    let path = page.path.clone();
    let image = tokio::task::spawn_blocking(move || image::open(&path))
        .await
        .map_err(|e| DetectionError::Decode(e.to_string()))?
        .map_err(|e| DetectionError::Decode(e.to_string()))?;

    let detections = tokio::time::timeout(timeout, detector.detect(&image))
        .await
        .map_err(|_| DetectionError::Timeout {
            secs: timeout.as_secs(),
        })??;

    Ok(normalize(
        &detections,
        image.width(),
        image.height(),
        min_confidence,
    ))
}
