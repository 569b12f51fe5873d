//! Pipeline stages for signature redaction.
//!
//! Each submodule implements exactly one transformation step. The PDF engine
//! and the detector backend sit behind traits ([`render::PageRenderer`],
//! [`detect::SignatureDetector`]).
//!
//! ## Data Flow
//!
//! ```text
//! analyze:  input ──▶ render ──▶ detect (encode ─▶ vision)
//!           (bytes)   (pdfium)   (normalise + clamp)
//!
//! confirm:  redact ──▶ assemble ──▶ archive
//!           (fill)     (lopdf)      (tar.gz)
//! ```
//!
//! 1. [`input`]    — validate one upload (non-empty, `%PDF` magic)
//! 2. [`render`]   — rasterise every page into the document's workspace;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`detect`]   — run the detector on a stored page and normalise its
//!    pixel boxes; never fails
//! 4. [`encode`]   — PNG + base64 wrapping for vision-model requests
//! 5. [`vision`]   — the vision-model detector backend
//! 6. [`redact`]   — paint confirmed boxes over stored pages in memory
//! 7. [`assemble`] — one image per page into a single output PDF
//! 8. [`archive`]  — bundle every redacted PDF of a batch

pub mod archive;
pub mod assemble;
pub mod detect;
pub mod encode;
pub mod input;
pub mod redact;
pub mod render;
pub mod vision;
