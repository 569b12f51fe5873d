//! The two-phase redaction service.
//!
//! [`Redactor::analyze`] takes a batch of uploads, gives each document its
//! own workspace, rasterises it and runs the detector on every page.
//! [`Redactor::confirm`] takes the caller's confirmed boxes keyed by
//! workspace id, redacts, reassembles and archives, then destroys every
//! workspace it touched.
//!
//! Documents of a batch share no mutable state, so both phases process them
//! concurrently (`buffer_unordered(concurrency)`) and restore request order
//! afterwards. One failing document never aborts its siblings.

use crate::cleanup::CleanupGuard;
use crate::config::RedactConfig;
use crate::error::{DocumentError, DocumentFailure, RedactError};
use crate::model::{
    AnalyzeOutput, ConfirmDocument, ConfirmOutput, ConfirmRequest, DocumentAnalysis, PageSummary,
};
use crate::pipeline::archive::{build_archive, RedactedDocument};
use crate::pipeline::assemble::images_to_pdf;
use crate::pipeline::detect::{detect_page, NoopDetector, SignatureDetector};
use crate::pipeline::input::{check_pdf, Upload, DEFAULT_FILENAME};
use crate::pipeline::redact::redact_document;
use crate::pipeline::render::{rasterize, PageRenderer, PdfiumRenderer, RenderOptions};
use crate::pipeline::vision::VisionDetector;
use crate::workspace::{WorkspaceId, WorkspaceStore};
use futures::stream::{self, StreamExt};
use image::Rgb;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest TTL the sweeper honours (ten years), keeping the cutoff arithmetic
/// in range.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Signature redaction service. Share it behind an `Arc`.
pub struct Redactor {
    config: RedactConfig,
    store: Arc<WorkspaceStore>,
    renderer: Arc<dyn PageRenderer>,
    detector: Arc<dyn SignatureDetector>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("detector", &self.detector.name())
            .finish()
    }
}

impl Redactor {
    /// Create a service with its own workspace store under
    /// `config.workspace_root`.
    pub fn new(
        config: RedactConfig,
        renderer: Arc<dyn PageRenderer>,
        detector: Arc<dyn SignatureDetector>,
    ) -> Result<Self, RedactError> {
        config.validate()?;
        let store = Arc::new(WorkspaceStore::new(config.workspace_root.as_deref())?);
        Self::with_store(config, store, renderer, detector)
    }

    /// Create a service on an existing store.
    pub fn with_store(
        config: RedactConfig,
        store: Arc<WorkspaceStore>,
        renderer: Arc<dyn PageRenderer>,
        detector: Arc<dyn SignatureDetector>,
    ) -> Result<Self, RedactError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            renderer,
            detector,
        })
    }

    /// Production wiring: pdfium rendering and the vision detector.
    ///
    /// When no vision provider can be resolved the service still starts,
    /// with automatic detection disabled; callers then draw every box.
    pub fn from_config(config: RedactConfig) -> Result<Self, RedactError> {
        let renderer: Arc<dyn PageRenderer> =
            Arc::new(PdfiumRenderer::new(config.pdfium_lib_path.clone()));
        let detector: Arc<dyn SignatureDetector> = match VisionDetector::from_config(&config) {
            Ok(d) => Arc::new(d),
            Err(e) => {
                warn!("Automatic signature detection disabled: {}", e);
                Arc::new(NoopDetector)
            }
        };
        Self::new(config, renderer, detector)
    }

    pub fn config(&self) -> &RedactConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    // ── Analyze ──────────────────────────────────────────────────────────────

    /// Rasterise and annotate a batch of uploads.
    ///
    /// # Errors
    /// Only [`RedactError::Input`] when `uploads` is empty. Per-document
    /// problems are reported in [`AnalyzeOutput::failures`].
    pub async fn analyze(&self, uploads: Vec<Upload>) -> Result<AnalyzeOutput, RedactError> {
        if uploads.is_empty() {
            return Err(RedactError::Input("no files supplied".into()));
        }

        let total = uploads.len();
        let start = Instant::now();
        info!("Analyze: {} document(s)", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut results: Vec<(usize, Result<DocumentAnalysis, DocumentFailure>)> =
            stream::iter(uploads.into_iter().enumerate().map(|(i, upload)| async move {
                (i, self.analyze_one(upload).await)
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let mut output = AnalyzeOutput::default();
        for (_, result) in results {
            match result {
                Ok(doc) => output.documents.push(doc),
                Err(failure) => output.failures.push(failure),
            }
        }

        info!(
            "Analyze done: {}/{} document(s) accepted in {:?}",
            output.documents.len(),
            total,
            start.elapsed()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, output.documents.len());
        }
        Ok(output)
    }

    async fn analyze_one(&self, upload: Upload) -> Result<DocumentAnalysis, DocumentFailure> {
        let Upload { filename, bytes } = upload;
        let result = self.rasterize_and_detect(&filename, bytes).await;

        match &result {
            Ok(doc) => {
                debug!(
                    "'{}': {} page(s), {} candidate box(es)",
                    filename,
                    doc.pages.len(),
                    doc.box_count()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_analyzed(&filename, doc.pages.len(), doc.box_count());
                }
            }
            Err(e) => {
                warn!("'{}' rejected: {}", filename, e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_failed(&filename, &e.to_string());
                }
            }
        }
        result.map_err(|e| DocumentFailure::new(filename, None, e))
    }

    async fn rasterize_and_detect(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentAnalysis, DocumentError> {
        check_pdf(&bytes)?;

        let workspace = self.store.allocate(self.config.dpi).map_err(|e| {
            DocumentError::conversion(format!("workspace could not be allocated: {e}"))
        })?;
        let id = workspace.id();

        let options = RenderOptions {
            dpi: self.config.dpi,
            max_pixels: self.config.max_rendered_pixels,
            password: self.config.password.clone(),
        };
        let rendered = rasterize(
            Arc::clone(&self.renderer),
            Arc::clone(&workspace),
            bytes,
            options,
        )
        .await
        .and_then(|pages| {
            workspace
                .set_pages(pages)
                .map_err(|e| DocumentError::conversion(e.to_string()))
        });
        if let Err(e) = rendered {
            self.store.destroy(&id);
            return Err(e);
        }

        let timeout = Duration::from_secs(self.config.detection_timeout_secs);
        let mut pages = Vec::with_capacity(workspace.pages().len());
        for page in workspace.pages() {
            let detected_boxes = detect_page(
                self.detector.as_ref(),
                page,
                self.config.min_confidence,
                timeout,
            )
            .await;
            pages.push(PageSummary {
                index: page.index,
                image_reference: self.config.image_reference(id, page.index),
                width: page.width,
                height: page.height,
                detected_boxes,
            });
        }

        Ok(DocumentAnalysis {
            id,
            filename: filename.to_string(),
            pages,
        })
    }

    // ── Confirm ──────────────────────────────────────────────────────────────

    /// Redact every confirmed document and bundle the results.
    ///
    /// Every workspace named in `request` is destroyed before this returns,
    /// whatever the outcome.
    ///
    /// # Errors
    /// * [`RedactError::Input`] when `request` names no document.
    /// * [`RedactError::WorkspaceNotFound`] when no document was produced and
    ///   every failure was an unknown or already consumed id.
    /// * [`RedactError::ArchiveEmpty`] when no document was produced for any
    ///   other reason.
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmOutput, RedactError> {
        if request.documents.is_empty() {
            return Err(RedactError::Input("no documents to confirm".into()));
        }

        let total = request.documents.len();
        let start = Instant::now();
        info!("Confirm: {} document(s)", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut guard = CleanupGuard::new(Arc::clone(&self.store));
        for doc in &request.documents {
            if let Ok(id) = doc.id.parse::<WorkspaceId>() {
                guard.track(id);
            }
        }

        let mut results: Vec<(usize, Result<RedactedDocument, DocumentFailure>)> =
            stream::iter(request.documents.into_iter().enumerate().map(|(i, doc)| async move {
                (i, self.confirm_one(doc).await)
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);

        let mut redacted = Vec::new();
        let mut failures = Vec::new();
        for (_, result) in results {
            match result {
                Ok(doc) => redacted.push(doc),
                Err(failure) => failures.push(failure),
            }
        }

        let outcome = if redacted.is_empty() {
            Err(nothing_produced(failures))
        } else {
            let policy = self.config.collision_policy;
            tokio::task::spawn_blocking(move || {
                build_archive(&redacted, policy).map(|archive| ConfirmOutput {
                    archive: archive.bytes,
                    entries: archive.entries,
                    failures,
                })
            })
            .await
            .map_err(|e| RedactError::Internal(format!("archive task panicked: {e}")))
            .and_then(|r| r)
        };

        let destroyed = guard.finish();
        debug!("Confirm cleanup destroyed {} workspace(s)", destroyed);

        let produced = outcome.as_ref().map_or(0, ConfirmOutput::redacted_count);
        info!(
            "Confirm done: {}/{} document(s) redacted in {:?}",
            produced,
            total,
            start.elapsed()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, produced);
        }
        outcome
    }

    async fn confirm_one(&self, doc: ConfirmDocument) -> Result<RedactedDocument, DocumentFailure> {
        let filename = if doc.filename.trim().is_empty() {
            DEFAULT_FILENAME.to_string()
        } else {
            doc.filename.clone()
        };

        let result = self.redact_one(doc).await;
        match result {
            Ok((id, pdf, pages)) => {
                debug!("'{}' ({}): {} page(s) redacted", filename, id, pages);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_redacted(&filename, pages);
                }
                Ok(RedactedDocument { filename, pdf })
            }
            Err((id, e)) => {
                warn!("'{}' not redacted: {}", filename, e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_failed(&filename, &e.to_string());
                }
                Err(DocumentFailure {
                    filename,
                    id: Some(id),
                    error: e,
                })
            }
        }
    }

    /// Returns `(id, pdf bytes, page count)`, or the raw id with the error.
    async fn redact_one(
        &self,
        doc: ConfirmDocument,
    ) -> Result<(WorkspaceId, Vec<u8>, usize), (String, DocumentError)> {
        let raw_id = doc.id;
        let Ok(id) = raw_id.parse::<WorkspaceId>() else {
            return Err((raw_id.clone(), DocumentError::not_found(&raw_id)));
        };
        let Some(workspace) = self.store.resolve(&id) else {
            return Err((raw_id, DocumentError::not_found(id)));
        };
        if !workspace.claim() {
            return Err((
                raw_id,
                DocumentError::AlreadyConsumed { id: id.to_string() },
            ));
        }

        if let Some(reason) = doc.malformed {
            return Err((raw_id, DocumentError::redaction(reason)));
        }

        let fill = Rgb(self.config.fill_color);
        let pages = doc.pages;
        tokio::task::spawn_blocking(move || {
            let rasters = redact_document(&workspace, &pages, fill)?;
            let count = rasters.len();
            images_to_pdf(&rasters, workspace.dpi()).map(|pdf| (pdf, count))
        })
        .await
        .map_err(|e| DocumentError::redaction(format!("redaction task panicked: {e}")))
        .and_then(|r| r)
        .map(|(pdf, count)| (id, pdf, count))
        .map_err(|e| (raw_id, e))
    }

    // ── Page images ──────────────────────────────────────────────────────────

    /// PNG bytes of a stored page, while its workspace is live and
    /// unconsumed.
    pub async fn page_image(&self, id: &str, index: usize) -> Option<Vec<u8>> {
        let id = id.parse::<WorkspaceId>().ok()?;
        let workspace = self.store.resolve(&id)?;
        if workspace.is_consumed() {
            return None;
        }
        let path = workspace.page(index)?.path.clone();
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Workspace {}: page {} unreadable: {}", id, index, e);
                None
            }
        }
    }

    // ── Expiry ───────────────────────────────────────────────────────────────

    /// Destroy workspaces older than the configured TTL.
    pub fn sweep_expired(&self) -> usize {
        let secs = self.config.workspace_ttl_secs.min(MAX_TTL_SECS) as i64;
        self.store.sweep_expired(chrono::Duration::seconds(secs))
    }

    /// Run [`Self::sweep_expired`] every `sweep_interval_secs` until the task
    /// is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = Duration::from_secs(this.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.sweep_expired();
            }
        })
    }
}

/// Classify a confirm batch that produced no document.
fn nothing_produced(failures: Vec<DocumentFailure>) -> RedactError {
    if !failures.is_empty() && failures.iter().all(|f| f.error.is_not_found()) {
        let ids = failures
            .iter()
            .filter_map(|f| f.id.clone())
            .collect();
        RedactError::WorkspaceNotFound { ids, failures }
    } else {
        RedactError::ArchiveEmpty { failures }
    }
}
