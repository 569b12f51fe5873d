//! Reassembly: redacted page rasters → one image-only PDF.
//!
//! Each page holds exactly one image XObject and a content stream that paints
//! it across the whole MediaBox. There is no text layer and nothing from the
//! source PDF is copied, so the output cannot carry hidden content from the
//! original document.
//!
//! The image data is stored as 8-bit DeviceRGB compressed with Flate, which
//! is lossless: a page without boxes decodes to exactly the pixels that were
//! rasterised at analyze time.

use crate::error::DocumentError;
use crate::pipeline::render::NATIVE_DPI;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use tracing::debug;

/// Resource name of the page image inside each page's XObject dictionary.
pub const PAGE_IMAGE_NAME: &str = "Im0";

/// Build a PDF with one page per image, sized so the image renders at `dpi`.
pub fn images_to_pdf(pages: &[RgbImage], dpi: u32) -> Result<Vec<u8>, DocumentError> {
    if pages.is_empty() {
        return Err(DocumentError::redaction("no pages to assemble"));
    }
    if dpi == 0 {
        return Err(DocumentError::redaction("output DPI must be positive"));
    }

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::with_capacity(pages.len());
    for (index, img) in pages.iter().enumerate() {
        let page_id = add_image_page(&mut doc, pages_id, img, dpi)
            .map_err(|e| DocumentError::redaction(format!("page {index}: {e}")))?;
        page_ids.push(page_id);
    }

    let page_tree = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(page_tree));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| DocumentError::redaction(format!("PDF could not be written: {e}")))?;

    debug!("Assembled {} page(s) into {} bytes", page_ids.len(), buf.len());
    Ok(buf)
}

fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    img: &RgbImage,
    dpi: u32,
) -> Result<ObjectId, String> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err("image has no pixels".into());
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(img.as_raw())
        .map_err(|e| format!("image could not be compressed: {e}"))?;
    let data = encoder
        .finish()
        .map_err(|e| format!("image could not be compressed: {e}"))?;

    let image_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(b"FlateDecode".to_vec())),
    ]);
    // Already Flate-encoded; lopdf must not compress it a second time.
    let image_id = doc.add_object(Stream::new(image_dict, data).with_compression(false));

    let scale = NATIVE_DPI / dpi as f32;
    let (w_pt, h_pt) = (width as f32 * scale, height as f32 * scale);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(w_pt),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(h_pt),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(PAGE_IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| format!("content stream could not be encoded: {e}"))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

    let resources = Dictionary::from_iter(vec![(
        "XObject",
        Object::Dictionary(Dictionary::from_iter(vec![(
            PAGE_IMAGE_NAME,
            Object::Reference(image_id),
        )])),
    )]);

    let page = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(w_pt),
                Object::Real(h_pt),
            ]),
        ),
        ("Resources", Object::Dictionary(resources)),
        ("Contents", Object::Reference(content_id)),
    ]);
    Ok(doc.add_object(page))
}
