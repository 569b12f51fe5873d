//! PDF rasterisation: render every page into the document's workspace.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`rasterize`] moves the work onto Tokio's blocking pool so the runtime's
//! worker threads never stall on CPU-heavy rendering.
//!
//! ## Why flatten?
//!
//! Redaction paints opaque rectangles straight into the pixel buffer. A page
//! that kept an alpha channel could carry recoverable content under a
//! "transparent" fill, so every page is composited onto white and stored as
//! plain RGB before anything else sees it.

use crate::error::DocumentError;
use crate::workspace::{StoredPage, Workspace};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// PDF user space units per inch; `dpi / NATIVE_DPI` is the render scale.
pub const NATIVE_DPI: f32 = 72.0;

/// Background every page is flattened onto.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Rendering parameters shared by every page of a document.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
    pub password: Option<String>,
}

impl RenderOptions {
    /// Scale factor from PDF points to output pixels.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / NATIVE_DPI
    }
}

/// Receives each rendered page as soon as it is ready.
pub type PageSink<'a> = dyn FnMut(usize, DynamicImage) -> Result<(), DocumentError> + 'a;

/// A PDF engine able to rasterise a whole document.
///
/// Pages are handed to `sink` in ascending index order; the first error from
/// either the engine or the sink aborts the document.
pub trait PageRenderer: Send + Sync {
    /// Render every page of `pdf`, returning the page count.
    fn render(
        &self,
        pdf: &[u8],
        options: &RenderOptions,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, DocumentError>;
}

/// [`PageRenderer`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    lib_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// `lib_path` may name the library file or the directory holding it.
    /// `None` falls back to `PDFIUM_LIB_PATH`, then to the system library.
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    fn bind(&self) -> Result<Pdfium, DocumentError> {
        let path = self
            .lib_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match path {
            Some(p) if p.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p))
            }
            Some(p) => Pdfium::bind_to_library(&p),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| DocumentError::conversion(format!("failed to bind pdfium: {e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(
        &self,
        pdf: &[u8],
        options: &RenderOptions,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, DocumentError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, options.password.as_deref())
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    DocumentError::conversion("PDF is encrypted and the password is missing or wrong")
                } else {
                    DocumentError::conversion(format!("PDF is corrupt: {err_str}"))
                }
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.scale())
            .set_maximum_width(options.max_pixels as i32)
            .set_maximum_height(options.max_pixels as i32);

        for (index, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                DocumentError::conversion(format!("page {index} could not be rendered: {e:?}"))
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                index,
                image.width(),
                image.height()
            );
            sink(index, image)?;
        }

        Ok(total_pages)
    }
}

/// Composite `image` onto an opaque `background`, dropping any alpha channel.
pub fn flatten_alpha(image: DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }

    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let a = u32::from(a);
        let blend = |c: u8, bg: u8| ((u32::from(c) * a + u32::from(bg) * (255 - a) + 127) / 255) as u8;
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}

/// Render `pdf` and persist every flattened page into `workspace`.
///
/// Blocking; call through [`rasterize`] from async code. On error the caller
/// is expected to destroy the workspace, so a half-written document is never
/// addressable.
pub fn rasterize_into(
    renderer: &dyn PageRenderer,
    workspace: &Workspace,
    pdf: &[u8],
    options: &RenderOptions,
) -> Result<Vec<StoredPage>, DocumentError> {
    let mut pages = Vec::new();

    let total = renderer.render(pdf, options, &mut |index, image| {
        let flat = flatten_alpha(image, BACKGROUND);
        let path = workspace.page_path(index);
        flat.save_with_format(&path, ImageFormat::Png).map_err(|e| {
            DocumentError::conversion(format!("page {index} could not be stored: {e}"))
        })?;
        pages.push(StoredPage {
            index,
            width: flat.width(),
            height: flat.height(),
            path,
        });
        Ok(())
    })?;

    if pages.is_empty() {
        return Err(DocumentError::conversion("PDF has no pages"));
    }
    debug!(
        "Workspace {}: stored {}/{} pages",
        workspace.id(),
        pages.len(),
        total
    );
    Ok(pages)
}

/// Async wrapper around [`rasterize_into`] running on the blocking pool.
pub async fn rasterize(
    renderer: Arc<dyn PageRenderer>,
    workspace: Arc<Workspace>,
    pdf: Vec<u8>,
    options: RenderOptions,
) -> Result<Vec<StoredPage>, DocumentError> {
    tokio::task::spawn_blocking(move || {
        rasterize_into(renderer.as_ref(), &workspace, &pdf, &options)
    })
    .await
    .map_err(|e| DocumentError::conversion(format!("render task panicked: {e}")))?
}
