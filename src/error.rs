//! Error types for the edgequake-sigredact library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`RedactError`] — **Fatal**: the whole analyze or confirm call cannot
//!   produce a result (no files supplied, nothing left to archive, workspace
//!   storage unavailable). Returned as `Err(RedactError)` from
//!   [`crate::service::Redactor`].
//!
//! * [`DocumentError`] — **Per document**: one upload in a batch could not be
//!   rasterised or redacted. Collected into the `failures` list of the batch
//!   result so the remaining documents still make it into the response.
//!
//! * [`DetectionError`] — **Never surfaced**: automatic detection is
//!   best-effort. The adapter logs it and reports an empty box list.

use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All fatal errors returned by the edgequake-sigredact library.
#[derive(Debug, Error)]
pub enum RedactError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request itself is unusable (no files, missing required field).
    #[error("Invalid input: {0}")]
    Input(String),

    // ── Batch outcome errors ──────────────────────────────────────────────
    /// Every document of a confirm batch failed; no archive was produced.
    #[error("No redacted document could be produced: all {} documents failed", failures.len())]
    ArchiveEmpty { failures: Vec<DocumentFailure> },

    /// Every document of a confirm batch referenced an unknown or already
    /// consumed workspace.
    #[error("Workspace not found or already consumed: {}", ids.join(", "))]
    WorkspaceNotFound {
        ids: Vec<String>,
        failures: Vec<DocumentFailure>,
    },

    /// Writing the archive stream failed.
    #[error("Failed to build archive: {0}")]
    Archive(#[source] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Workspace storage errors ──────────────────────────────────────────
    /// The workspace root or a workspace directory could not be created.
    #[error("Workspace storage error: {0}")]
    Storage(#[source] std::io::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RedactError {
    /// Per-document failures attached to a batch-level error, if any.
    pub fn failures(&self) -> &[DocumentFailure] {
        match self {
            RedactError::ArchiveEmpty { failures } => failures,
            RedactError::WorkspaceNotFound { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// A failure scoped to exactly one document of a batch.
///
/// The rest of the batch continues; the failure is reported next to the
/// successful results rather than propagated.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentError {
    /// The upload could not be rasterised (not a PDF, corrupt, page render
    /// failure, page image could not be written).
    #[error("conversion failed: {detail}")]
    Conversion { detail: String },

    /// Confirmed boxes were malformed or a stored page could not be read back.
    #[error("redaction failed: {detail}")]
    Redaction { detail: String },

    /// The workspace id does not resolve (unknown, expired, or destroyed).
    #[error("workspace '{id}' not found")]
    WorkspaceNotFound { id: String },

    /// The workspace was already claimed by an earlier confirm.
    #[error("workspace '{id}' was already consumed")]
    AlreadyConsumed { id: String },
}

impl DocumentError {
    pub(crate) fn conversion(detail: impl Into<String>) -> Self {
        DocumentError::Conversion {
            detail: detail.into(),
        }
    }

    pub(crate) fn redaction(detail: impl Into<String>) -> Self {
        DocumentError::Redaction {
            detail: detail.into(),
        }
    }

    pub(crate) fn not_found(id: impl ToString) -> Self {
        DocumentError::WorkspaceNotFound { id: id.to_string() }
    }

    /// True for errors meaning "this id can no longer be addressed".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DocumentError::WorkspaceNotFound { .. } | DocumentError::AlreadyConsumed { .. }
        )
    }
}

/// A [`DocumentError`] tagged with the document it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    /// Caller-supplied filename of the failed document.
    pub filename: String,
    /// Workspace id, when one was known for the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// What went wrong.
    pub error: DocumentError,
}

impl DocumentFailure {
    pub fn new(filename: impl Into<String>, id: Option<&WorkspaceId>, error: DocumentError) -> Self {
        Self {
            filename: filename.into(),
            id: id.map(|i| i.to_string()),
            error,
        }
    }
}

/// Best-effort detection failure. Logged by the adapter, never returned to
/// the caller.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The stored page image could not be decoded.
    #[error("page image could not be decoded: {0}")]
    Decode(String),

    /// The detector backend returned an error.
    #[error("detector backend failed after {retries} retries: {detail}")]
    Backend { retries: u32, detail: String },

    /// The detector answered with something that is not a box list.
    #[error("detector answer could not be parsed: {0}")]
    Parse(String),

    /// The detector did not answer in time.
    #[error("detector timed out after {secs}s")]
    Timeout { secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_empty_display_counts_failures() {
        let e = RedactError::ArchiveEmpty {
            failures: vec![
                DocumentFailure::new("a.pdf", None, DocumentError::conversion("bad xref")),
                DocumentFailure::new("b.pdf", None, DocumentError::redaction("bad box")),
            ],
        };
        assert!(e.to_string().contains("all 2 documents"), "got: {e}");
        assert_eq!(e.failures().len(), 2);
    }

    #[test]
    fn not_found_display_lists_ids() {
        let e = RedactError::WorkspaceNotFound {
            ids: vec!["abc".into(), "def".into()],
            failures: vec![],
        };
        let msg = e.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("def"));
    }

    #[test]
    fn document_error_serialises_with_kind_tag() {
        let err = DocumentError::AlreadyConsumed { id: "x".into() };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "already_consumed");
        assert_eq!(json["id"], "x");
    }

    #[test]
    fn not_found_classification() {
        assert!(DocumentError::not_found("a").is_not_found());
        assert!(DocumentError::AlreadyConsumed { id: "a".into() }.is_not_found());
        assert!(!DocumentError::conversion("x").is_not_found());
    }

    #[test]
    fn other_errors_have_no_failures() {
        assert!(RedactError::Input("no files".into()).failures().is_empty());
    }
}
