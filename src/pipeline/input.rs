//! Input validation: accept one uploaded document before it reaches pdfium.
//!
//! We check the PDF magic bytes (`%PDF`) up front so callers get a clear
//! per-document conversion error instead of an opaque pdfium failure, and so
//! obviously wrong uploads never allocate a workspace.

use crate::error::DocumentError;
use tracing::debug;

/// The PDF header may be preceded by up to this many bytes of junk.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Name used when the caller did not supply one.
pub const DEFAULT_FILENAME: &str = "document.pdf";

/// One document as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Caller-supplied original filename (unsanitised).
    pub filename: String,
    /// Raw PDF bytes.
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        let filename = if filename.trim().is_empty() {
            DEFAULT_FILENAME.to_string()
        } else {
            filename
        };
        Self {
            filename,
            bytes: bytes.into(),
        }
    }
}

/// Validate that `bytes` plausibly hold a PDF.
pub fn check_pdf(bytes: &[u8]) -> Result<(), DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::conversion("uploaded file is empty"));
    }

    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if !window.windows(4).any(|w| w == b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(DocumentError::conversion(format!(
            "file is not a valid PDF (first bytes: {magic:?})"
        )));
    }

    debug!("Accepted PDF upload of {} bytes", bytes.len());
    Ok(())
}
