//! Shared helpers for the integration tests.
//!
//! [`LopdfRenderer`] stands in for pdfium: it parses the upload with `lopdf`
//! (so corrupt input fails the same way) and produces one solid-colour page
//! per PDF page, with a distinct size and colour per index.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_sigredact::{
    DetectionError, DocumentError, NoopDetector, PageRenderer, PageSink, PixelDetection,
    RedactConfig, RedactionProgressCallback, Redactor, RenderOptions, SignatureDetector,
};
use flate2::read::ZlibDecoder;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Synthetic input ──────────────────────────────────────────────────────────

/// Build a small text PDF with `num_pages` pages.
pub fn synthetic_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                ),
                Operation::new("Td", vec![Object::Integer(20), Object::Integer(50)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("Signed page {}", i + 1).into_bytes(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(200),
                    Object::Integer(100),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Starts like a PDF, but is not one.
pub fn corrupt_pdf() -> Vec<u8> {
    b"%PDF-1.7\n1 0 obj << /Type /Catalog >>\ngarbage without xref".to_vec()
}

// ── Fake renderer ────────────────────────────────────────────────────────────

/// Pixel size of page `index` at `dpi`.
pub fn page_size(index: usize, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / 72.0;
    let w = (200 + 20 * index as u32) as f32 * scale;
    let h = (100 + 10 * index as u32) as f32 * scale;
    (w.round() as u32, h.round() as u32)
}

/// Solid colour of page `index`.
pub fn page_color(index: usize) -> Rgb<u8> {
    Rgb([(30 + 40 * index) as u8, 160, 220])
}

/// The raster [`LopdfRenderer`] produces for page `index`.
pub fn expected_page(index: usize, dpi: u32) -> RgbImage {
    let (w, h) = page_size(index, dpi);
    RgbImage::from_pixel(w, h, page_color(index))
}

pub struct LopdfRenderer;

impl PageRenderer for LopdfRenderer {
    fn render(
        &self,
        pdf: &[u8],
        options: &RenderOptions,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, DocumentError> {
        let doc = Document::load_mem(pdf).map_err(|e| DocumentError::Conversion {
            detail: format!("PDF is corrupt: {e}"),
        })?;
        let count = doc.get_pages().len();
        for index in 0..count {
            let (w, h) = page_size(index, options.dpi);
            let Rgb([r, g, b]) = page_color(index);
            let img = RgbaImage::from_pixel(w, h, Rgba([r, g, b, 255]));
            sink(index, DynamicImage::ImageRgba8(img))?;
        }
        Ok(count)
    }
}

// ── Detectors ────────────────────────────────────────────────────────────────

/// Returns preset detections, keyed by the width of the page it is shown.
#[derive(Default)]
pub struct FixedDetector {
    by_width: HashMap<u32, Vec<PixelDetection>>,
}

impl FixedDetector {
    pub fn on_page(mut self, index: usize, dpi: u32, detections: Vec<PixelDetection>) -> Self {
        self.by_width.insert(page_size(index, dpi).0, detections);
        self
    }
}

#[async_trait]
impl SignatureDetector for FixedDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<PixelDetection>, DetectionError> {
        Ok(self.by_width.get(&image.width()).cloned().unwrap_or_default())
    }
}

pub struct FailingDetector;

#[async_trait]
impl SignatureDetector for FailingDetector {
    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<PixelDetection>, DetectionError> {
        Err(DetectionError::Backend {
            retries: 2,
            detail: "503 Service Unavailable".into(),
        })
    }
}

/// A detection covering `(x, y, w, h)` in normalized space on a `width` ×
/// `height` page.
pub fn detection(width: u32, height: u32, x: f64, y: f64, w: f64, h: f64, score: f64) -> PixelDetection {
    let (pw, ph) = (f64::from(width), f64::from(height));
    PixelDetection {
        x1: x * pw,
        y1: y * ph,
        x2: (x + w) * pw,
        y2: (y + h) * ph,
        confidence: score,
    }
}

// ── Service construction ─────────────────────────────────────────────────────

pub const TEST_DPI: u32 = 72;

pub fn config(base: &tempfile::TempDir) -> RedactConfig {
    RedactConfig::builder()
        .dpi(TEST_DPI)
        .workspace_root(base.path())
        .concurrency(2)
        .build()
        .unwrap()
}

pub fn redactor_with(
    config: RedactConfig,
    detector: Arc<dyn SignatureDetector>,
) -> Arc<Redactor> {
    Arc::new(Redactor::new(config, Arc::new(LopdfRenderer), detector).unwrap())
}

pub fn redactor(base: &tempfile::TempDir) -> Arc<Redactor> {
    redactor_with(config(base), Arc::new(NoopDetector))
}

// ── Output inspection ────────────────────────────────────────────────────────

/// Entries of a `.tar.gz` archive as `(name, bytes)`.
pub fn archive_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|e| {
            let mut e = e.unwrap();
            let name = e.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            e.read_to_end(&mut body).unwrap();
            (name, body)
        })
        .collect()
}

/// The page images of a PDF produced by the redactor, in page order.
pub fn pdf_page_images(bytes: &[u8]) -> Vec<RgbImage> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
            let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
            let w = stream.dict.get(b"Width").unwrap().as_i64().unwrap() as u32;
            let h = stream.dict.get(b"Height").unwrap().as_i64().unwrap() as u32;
            let mut raw = Vec::new();
            ZlibDecoder::new(&stream.content[..])
                .read_to_end(&mut raw)
                .unwrap();
            RgbImage::from_raw(w, h, raw).unwrap()
        })
        .collect()
}

// ── Progress recording ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingProgress {
    pub batches: AtomicUsize,
    pub analyzed: AtomicUsize,
    pub redacted: AtomicUsize,
    pub failed: AtomicUsize,
    pub completed: Mutex<Vec<(usize, usize)>>,
}

impl RedactionProgressCallback for RecordingProgress {
    fn on_batch_start(&self, _total_documents: usize) {
        self.batches.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_analyzed(&self, _filename: &str, _pages: usize, _boxes: usize) {
        self.analyzed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_redacted(&self, _filename: &str, _pages: usize) {
        self.redacted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_failed(&self, _filename: &str, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        self.completed.lock().unwrap().push((total, succeeded));
    }
}
