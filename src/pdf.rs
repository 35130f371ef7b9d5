//! PDF finalization: embeds signature stamps into the original PDF (spec
//! §4.5).
//!
//! No example in the retrieval pack manipulates PDFs, so this module reaches
//! for `lopdf` directly: the standard low-level crate for editing an
//! existing document's page content streams, as opposed to `printpdf` which
//! only authors new ones. PNG decoding goes through the `image` crate, since
//! `lopdf` stores raw (optionally Flate-compressed) sample data rather than
//! understanding PNG itself.

use std::collections::BTreeMap;

use image::GenericImageView;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{AppError, AppResult};

/// Fixed stamp size in PDF points (spec §4.5).
const STAMP_WIDTH: f64 = 180.0;
const STAMP_HEIGHT: f64 = 65.0;
const STACK_START_Y: f64 = 30.0;
const STACK_OFFSET_Y: f64 = 75.0;

/// A signer whose PNG should be stamped onto the document.
pub struct SignatureStamp {
    pub signer_id: String,
    /// Raw PNG bytes; `None` if the artefact couldn't be read (logged, not
    /// fatal — spec §4.5: "missing or unreadable artefact files ... do not
    /// abort finalization").
    pub png_bytes: Option<Vec<u8>>,
    /// 1-indexed page number; `None` means "stack on the last page".
    pub position_page: Option<u32>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
}

/// Embeds signature PNGs as Image XObjects and returns the mutated PDF
/// bytes.
pub struct PdfFinalizer;

impl PdfFinalizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Stamp every readable signature onto `original_bytes`, returning the
    /// finalized document bytes.
    pub fn finalize(&self, original_bytes: &[u8], stamps: &[SignatureStamp]) -> AppResult<Vec<u8>> {
        let mut doc = Document::load_mem(original_bytes)?;
        let pages: BTreeMap<u32, ObjectId> = doc.get_pages();
        let last_page_number = *pages.keys().next_back().ok_or_else(|| {
            AppError::Integrity("PDF has no pages to stamp".to_string())
        })?;

        let mut stack_index: u32 = 0;

        for stamp in stamps {
            let Some(png_bytes) = &stamp.png_bytes else {
                tracing::warn!(signer_id = %stamp.signer_id, "signature artefact unreadable, skipping stamp");
                continue;
            };

            let image = match image::load_from_memory(png_bytes) {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(signer_id = %stamp.signer_id, error = %err, "signature artefact is not a valid image, skipping stamp");
                    continue;
                }
            };

            let (page_number, x, y) = match (stamp.position_page, stamp.position_x, stamp.position_y) {
                (Some(page), Some(x), Some(y)) => (page, x, y),
                _ => {
                    let x = (page_width(&doc, &pages, last_page_number) - STAMP_WIDTH) / 2.0;
                    let y = STACK_START_Y + (f64::from(stack_index) * STACK_OFFSET_Y);
                    stack_index += 1;
                    (last_page_number, x, y)
                }
            };

            let Some(&page_id) = pages.get(&page_number) else {
                tracing::warn!(signer_id = %stamp.signer_id, page_number, "signature position page does not exist, skipping stamp");
                continue;
            };

            embed_image(&mut doc, page_id, &image, x, y, stamp.signer_id.as_str())?;
        }

        doc.compress();
        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

impl Default for PdfFinalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn page_width(doc: &Document, pages: &BTreeMap<u32, ObjectId>, page_number: u32) -> f64 {
    pages
        .get(&page_number)
        .and_then(|&page_id| doc.get_object(page_id).ok())
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| dict.get(b"MediaBox").ok())
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| arr.get(2))
        .and_then(|obj| obj.as_float().ok())
        .map_or(612.0, f64::from)
}

fn embed_image(
    doc: &mut Document,
    page_id: ObjectId,
    image: &image::DynamicImage,
    x: f64,
    y: f64,
    signer_id: &str,
) -> AppResult<()> {
    let (width, height) = image.dimensions();
    let rgb = image.to_rgb8().into_raw();

    let mut image_dict = Dictionary::new();
    image_dict.set("Type", Object::Name(b"XObject".to_vec()));
    image_dict.set("Subtype", Object::Name(b"Image".to_vec()));
    image_dict.set("Width", Object::Integer(i64::from(width)));
    image_dict.set("Height", Object::Integer(i64::from(height)));
    image_dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    image_dict.set("BitsPerComponent", Object::Integer(8));
    let image_id = doc.add_object(Stream::new(image_dict, rgb));

    let xobject_name = format!("Sig{signer_id}");
    let safe_name: String = xobject_name.chars().filter(char::is_ascii_alphanumeric).collect();
    doc.add_xobject(page_id, safe_name.as_bytes().to_vec(), image_id)?;

    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(STAMP_WIDTH as f32),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(STAMP_HEIGHT as f32),
                Object::Real(x as f32),
                Object::Real(y as f32),
            ],
        ),
        Operation::new("Do", vec![Object::Name(safe_name.into_bytes())]),
        Operation::new("Q", vec![]),
    ];

    let mut content = doc.get_and_decode_page_content(page_id)?;
    content.operations.extend(operations);
    let encoded = content.encode().map_err(|e| AppError::Internal(format!("pdf content encode: {e}")))?;
    doc.change_page_content(page_id, encoded)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pdf() -> Vec<u8> {
        // A single blank A4-ish page, built directly via lopdf so tests
        // don't depend on a fixture file.
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(612.0),
                Object::Real(792.0),
            ]),
        );
        page_dict.set("Resources", Object::Dictionary(Dictionary::new()));
        let page_id = doc.add_object(page_dict);

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages_dict.set("Count", Object::Integer(1));
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog_dict = Dictionary::new();
        catalog_dict.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog_dict.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog_dict);

        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn sample_png() -> Vec<u8> {
        let image = image::RgbImage::from_pixel(10, 10, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn stamps_one_signature_onto_the_last_page() {
        let original = minimal_pdf();
        let finalizer = PdfFinalizer::new();
        let stamps = vec![SignatureStamp {
            signer_id: "signer-1".to_string(),
            png_bytes: Some(sample_png()),
            position_page: None,
            position_x: None,
            position_y: None,
        }];

        let finalized = finalizer.finalize(&original, &stamps).unwrap();
        assert!(!finalized.is_empty());
        assert!(Document::load_mem(&finalized).is_ok());
    }

    #[test]
    fn missing_artefact_is_skipped_without_failing_finalization() {
        let original = minimal_pdf();
        let finalizer = PdfFinalizer::new();
        let stamps = vec![SignatureStamp {
            signer_id: "signer-1".to_string(),
            png_bytes: None,
            position_page: None,
            position_x: None,
            position_y: None,
        }];

        let finalized = finalizer.finalize(&original, &stamps).unwrap();
        assert!(!finalized.is_empty());
    }

    #[test]
    fn explicit_position_is_honored() {
        let original = minimal_pdf();
        let finalizer = PdfFinalizer::new();
        let stamps = vec![SignatureStamp {
            signer_id: "signer-1".to_string(),
            png_bytes: Some(sample_png()),
            position_page: Some(1),
            position_x: Some(50.0),
            position_y: Some(100.0),
        }];

        let finalized = finalizer.finalize(&original, &stamps).unwrap();
        assert!(Document::load_mem(&finalized).is_ok());
    }
}
