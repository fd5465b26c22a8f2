//! Single-page A4 card document
//!
//! The captured card is placed 85 mm wide, horizontally centred, 20 mm from
//! the top edge, with its height following the capture's aspect ratio.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbImage;
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::io::Write;

use crate::error::{KioskError, Result};

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;
pub const CARD_WIDTH_MM: f32 = 85.0;
pub const TOP_MARGIN_MM: f32 = 20.0;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Card rectangle on the page, in millimetres from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardPlacement {
    pub x_mm: f32,
    pub top_mm: f32,
    pub width_mm: f32,
    pub height_mm: f32,
}

impl CardPlacement {
    /// Lower edge measured from the page bottom (PDF user space origin)
    pub fn bottom_mm(&self) -> f32 {
        A4_HEIGHT_MM - self.top_mm - self.height_mm
    }
}

/// Where a `width`×`height` px capture goes on the page
pub fn place_card(width: u32, height: u32) -> Result<CardPlacement> {
    if width == 0 || height == 0 {
        return Err(KioskError::Capture(format!(
            "cannot place an empty capture ({}x{})",
            width, height
        )));
    }

    Ok(CardPlacement {
        x_mm: (A4_WIDTH_MM - CARD_WIDTH_MM) / 2.0,
        top_mm: TOP_MARGIN_MM,
        width_mm: CARD_WIDTH_MM,
        height_mm: CARD_WIDTH_MM * height as f32 / width as f32,
    })
}

fn pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

fn compose_error(e: impl std::fmt::Display) -> KioskError {
    KioskError::Capture(format!("PDF composition failed: {}", e))
}

/// Compose the one-page A4 document holding `capture`
pub fn compose_card_pdf(capture: &RgbImage) -> Result<Vec<u8>> {
    let (width, height) = capture.dimensions();
    let placement = place_card(width, height)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(capture.as_raw()).map_err(compose_error)?;
    let pixels = encoder.finish().map_err(compose_error)?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        },
        pixels,
    ));

    let content = format!(
        "q {:.3} 0 0 {:.3} {:.3} {:.3} cm /Im0 Do Q",
        pt(placement.width_mm),
        pt(placement.height_mm),
        pt(placement.x_mm),
        pt(placement.bottom_mm()),
    );
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(pt(A4_WIDTH_MM)),
            Object::Real(pt(A4_HEIGHT_MM)),
        ],
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1_i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(compose_error)?;
    Ok(bytes)
}
