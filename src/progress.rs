//! Progress-callback trait for per-document pipeline events.
//!
//! Inject an [`Arc<dyn RedactionProgressCallback>`] via
//! [`crate::config::RedactConfigBuilder::progress_callback`] to receive events
//! as a batch moves through analyze and confirm. Callers can forward them to
//! metrics, a WebSocket, or a log sink without the library knowing how.
//!
//! # Example
//!
//! ```rust
//! use edgequake_sigredact::{RedactConfig, RedactionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl RedactionProgressCallback for Counter {
//!     fn on_document_redacted(&self, _filename: &str, _pages: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = RedactConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by [`crate::service::Redactor`] as it processes each document.
///
/// Documents of one batch are processed concurrently, so methods may be
/// called from different tasks at the same time. All methods default to
/// no-ops.
pub trait RedactionProgressCallback: Send + Sync {
    /// A batch of `total_documents` entered the analyze or confirm phase.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// A document was rasterised and annotated.
    ///
    /// # Arguments
    /// * `filename` — caller-supplied name of the upload
    /// * `pages`    — number of rasterised pages
    /// * `boxes`    — total detected boxes across all pages
    fn on_document_analyzed(&self, filename: &str, pages: usize, boxes: usize) {
        let _ = (filename, pages, boxes);
    }

    /// A redacted PDF was produced for a document.
    fn on_document_redacted(&self, filename: &str, pages: usize) {
        let _ = (filename, pages);
    }

    /// A document was dropped from the batch.
    fn on_document_failed(&self, filename: &str, error: &str) {
        let _ = (filename, error);
    }

    /// All documents of the batch have been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RedactionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RedactConfig`].
pub type ProgressCallback = Arc<dyn RedactionProgressCallback>;
