//! Redaction engine: paint confirmed boxes over stored page rasters.
//!
//! The fill is written straight into the RGB pixel buffer, so nothing of the
//! original content survives underneath; there is no overlay layer to peel
//! off. Redacted rasters are only ever held in memory and handed to
//! [`super::assemble`]; the workspace keeps the unmodified originals until it
//! is destroyed.

use crate::error::DocumentError;
use crate::geometry::{ConfirmedBox, PixelRect};
use crate::model::ConfirmPage;
use crate::workspace::Workspace;
use image::{Rgb, RgbImage};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Overwrite every pixel of `rect` with `color`.
pub fn fill_rect(img: &mut RgbImage, rect: PixelRect, color: Rgb<u8>) {
    if rect.is_empty() {
        return;
    }
    let right = (rect.left + rect.width).min(img.width());
    let bottom = (rect.top + rect.height).min(img.height());
    for y in rect.top..bottom {
        for x in rect.left..right {
            img.put_pixel(x, y, color);
        }
    }
}

/// Validate every box and merge duplicate `page_index` entries.
///
/// Keyed by page index, so iteration is in ascending numeric order.
pub fn collect_boxes(
    pages: &[ConfirmPage],
) -> Result<BTreeMap<usize, Vec<ConfirmedBox>>, DocumentError> {
    let mut merged: BTreeMap<usize, Vec<ConfirmedBox>> = BTreeMap::new();
    for page in pages {
        let entry = merged.entry(page.page_index).or_default();
        for b in &page.boxes {
            let valid = b.validated().map_err(|e| {
                DocumentError::redaction(format!("page {}: {e}", page.page_index))
            })?;
            entry.push(valid);
        }
    }
    Ok(merged)
}

/// Produce the redacted rasters of one document, one per stored page in
/// ascending index order.
///
/// Pages the request does not mention are carried over unmodified. A page
/// index the workspace does not hold is skipped with a warning, unless no
/// requested index exists at all, which fails the document.
pub fn redact_document(
    workspace: &Workspace,
    pages: &[ConfirmPage],
    fill: Rgb<u8>,
) -> Result<Vec<RgbImage>, DocumentError> {
    let requested = collect_boxes(pages)?;

    let stored = workspace.pages();
    if stored.is_empty() {
        return Err(DocumentError::redaction("workspace holds no pages"));
    }

    let mut matched = 0usize;
    for index in requested.keys() {
        if workspace.page(*index).is_some() {
            matched += 1;
        } else {
            warn!(
                "Workspace {}: page {} does not exist ({} pages), skipped",
                workspace.id(),
                index,
                stored.len()
            );
        }
    }
    if !requested.is_empty() && matched == 0 {
        return Err(DocumentError::redaction(format!(
            "none of the requested pages exist (document has {} pages)",
            stored.len()
        )));
    }

    let mut output = Vec::with_capacity(stored.len());
    for page in stored {
        let mut img = image::open(&page.path)
            .map_err(|e| {
                DocumentError::redaction(format!("page {} could not be read: {e}", page.index))
            })?
            .into_rgb8();

        if let Some(boxes) = requested.get(&page.index) {
            for b in boxes {
                let rect = b.to_pixels(img.width(), img.height());
                fill_rect(&mut img, rect, fill);
            }
            debug!(
                "Workspace {}: page {} redacted {} box(es)",
                workspace.id(),
                page.index,
                boxes.len()
            );
        }
        output.push(img);
    }

    Ok(output)
}
