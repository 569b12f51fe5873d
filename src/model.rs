//! Request and response records exchanged with callers.
//!
//! These are the shapes of the analyze response and the confirm request.
//! Boxes are validated whenever they cross this boundary: detector output in
//! [`crate::geometry::DetectedBox::from_pixels`], caller input in
//! [`crate::geometry::ConfirmedBox::validated`].

use crate::error::DocumentFailure;
use crate::geometry::{ConfirmedBox, DetectedBox};
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Analyze ──────────────────────────────────────────────────────────────────

/// Metadata for one rasterised page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// Zero-based page index.
    pub index: usize,
    /// Where the caller can fetch the page raster while the workspace lives.
    pub image_reference: String,
    pub width: u32,
    pub height: u32,
    pub detected_boxes: Vec<DetectedBox>,
}

/// One accepted document of an analyze batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Handle to pass back at confirm time.
    pub id: WorkspaceId,
    pub filename: String,
    pub pages: Vec<PageSummary>,
}

impl DocumentAnalysis {
    pub fn box_count(&self) -> usize {
        self.pages.iter().map(|p| p.detected_boxes.len()).sum()
    }
}

/// Result of an analyze call: accepted documents in upload order, plus the
/// documents that could not be rasterised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeOutput {
    pub documents: Vec<DocumentAnalysis>,
    #[serde(default)]
    pub failures: Vec<DocumentFailure>,
}

// ── Confirm ──────────────────────────────────────────────────────────────────

/// Boxes to obliterate on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmPage {
    pub page_index: usize,
    #[serde(default)]
    pub boxes: Vec<ConfirmedBox>,
}

/// One document of a confirm request.
///
/// Deserialization never fails on a single document. A malformed id is
/// reported as a per-document not-found failure, and pages or boxes of the
/// wrong shape become a redaction failure for that document only, so its
/// siblings are still redacted and every named workspace is still cleaned up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmDocument {
    pub id: String,
    /// Display name for the archive entry.
    pub filename: String,
    pub pages: Vec<ConfirmPage>,
    /// Why the entry could not be read, when it could not.
    #[serde(skip)]
    pub(crate) malformed: Option<String>,
}

impl ConfirmDocument {
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        pages: Vec<ConfirmPage>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            pages,
            malformed: None,
        }
    }

    /// Description of the shape error found while reading this entry.
    pub fn malformed(&self) -> Option<&str> {
        self.malformed.as_deref()
    }

    fn from_value(raw: &Value) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let mut doc = Self::new(text("id"), text("filename"), Vec::new());

        if !raw.is_object() {
            doc.malformed = Some("document entry is not a JSON object".into());
            return doc;
        }
        match raw.get("pages") {
            None | Some(Value::Null) => {}
            Some(pages) => match Vec::<ConfirmPage>::deserialize(pages) {
                Ok(pages) => doc.pages = pages,
                Err(e) => doc.malformed = Some(format!("pages are malformed: {e}")),
            },
        }
        doc
    }
}

impl<'de> Deserialize<'de> for ConfirmDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub documents: Vec<ConfirmDocument>,
}

/// Result of a confirm call that produced at least one redacted document.
#[derive(Debug, Clone)]
pub struct ConfirmOutput {
    /// The gzip-compressed tar archive.
    pub archive: Vec<u8>,
    /// Entry names in archive order.
    pub entries: Vec<String>,
    pub failures: Vec<DocumentFailure>,
}

impl ConfirmOutput {
    pub fn redacted_count(&self) -> usize {
        self.entries.len()
    }
}
