//! # edgequake-sigredact
//!
//! Detect handwritten signatures in PDF documents and irreversibly redact
//! them, in two phases separated by a human review.
//!
//! ## Why rasterise?
//!
//! Drawing a black rectangle into a PDF's content stream hides a signature
//! from viewers but leaves the original image object in the file. This crate
//! renders every page to pixels, paints the confirmed regions directly into
//! the pixel buffer and rebuilds an image-only PDF, so the output holds no
//! trace of what was under a box.
//!
//! ## Pipeline Overview
//!
//! ```text
//! analyze(uploads)
//!  ├─ 1. Input     validate each upload (%PDF magic)
//!  ├─ 2. Workspace allocate an isolated temp dir, id = UUIDv4
//!  ├─ 3. Render    rasterise pages via pdfium (spawn_blocking)
//!  └─ 4. Detect    vision model → pixel boxes → normalized, clamped boxes
//!
//! confirm(ids + confirmed boxes)
//!  ├─ 5. Redact    opaque fill in memory
//!  ├─ 6. Assemble  one image per page → PDF (lopdf)
//!  ├─ 7. Archive   every redacted PDF → .tar.gz
//!  └─ 8. Cleanup   destroy every touched workspace, whatever happened
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_sigredact::{ConfirmRequest, RedactConfig, Redactor, Upload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let redactor = Redactor::from_config(RedactConfig::default())?;
//!
//!     let bytes = std::fs::read("contract.pdf")?;
//!     let analysis = redactor.analyze(vec![Upload::new("contract.pdf", bytes)]).await?;
//!
//!     // Show analysis.documents to a reviewer, collect their boxes…
//!     let request: ConfirmRequest = serde_json::from_str(r#"{"documents": []}"#)?;
//!     let output = redactor.confirm(request).await?;
//!     std::fs::write("redacted.tar.gz", output.archive)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | The axum [`http`] router and the `sigredact` binary |
//!
//! Disable `server` when embedding only the library:
//! ```toml
//! edgequake-sigredact = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod error;
pub mod geometry;
#[cfg(feature = "server")]
pub mod http;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cleanup::CleanupGuard;
pub use config::{CollisionPolicy, RedactConfig, RedactConfigBuilder};
pub use error::{DetectionError, DocumentError, DocumentFailure, RedactError};
pub use geometry::{ConfirmedBox, DetectedBox, PixelDetection, PixelRect};
pub use model::{
    AnalyzeOutput, ConfirmDocument, ConfirmOutput, ConfirmPage, ConfirmRequest, DocumentAnalysis,
    PageSummary,
};
pub use pipeline::detect::{NoopDetector, SignatureDetector};
pub use pipeline::input::Upload;
pub use pipeline::render::{PageRenderer, PageSink, PdfiumRenderer, RenderOptions};
pub use pipeline::vision::VisionDetector;
pub use progress::{NoopProgressCallback, ProgressCallback, RedactionProgressCallback};
pub use service::Redactor;
pub use workspace::{StoredPage, Workspace, WorkspaceId, WorkspaceStore};
