//! QR payload encoder
//!
//! Turns an attendee into a deterministic JSON payload and rasterizes it at
//! fixed geometry: 300×300 px, 2-module quiet margin, black on white.
//! Bypassed entirely when the resolver supplies the QR image.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use evp_common::config::PayloadSchema;
use evp_common::{Attendee, QrArtifact};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

use crate::error::{KioskError, Result};

/// Rendered image edge length in pixels
pub const QR_SIZE_PX: u32 = 300;

/// Quiet margin in modules
pub const QUIET_MODULES: usize = 2;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Serialize)]
struct BasicPayload<'a> {
    id: &'a str,
    name: &'a str,
    mobile: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmation_number: Option<&'a str>,
    name: &'a str,
    mobile: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    district: Option<&'a str>,
}

/// Local QR encoder
#[derive(Debug, Clone, Copy)]
pub struct QrEncoder {
    schema: PayloadSchema,
}

impl QrEncoder {
    pub fn new(schema: PayloadSchema) -> Self {
        Self { schema }
    }

    /// Canonical payload string; key order is fixed by the schema
    pub fn payload(&self, attendee: &Attendee) -> Result<String> {
        let encoded = match self.schema {
            PayloadSchema::Basic => serde_json::to_string(&BasicPayload {
                id: attendee.id.as_str(),
                name: attendee.display_name(),
                mobile: &attendee.mobile,
                email: attendee.email.as_deref(),
                organization: attendee.organization.as_deref(),
            }),
            PayloadSchema::Event => serde_json::to_string(&EventPayload {
                id: attendee.id.as_str(),
                confirmation_number: attendee.confirmation_number.as_deref(),
                name: attendee.display_name(),
                mobile: &attendee.mobile,
                role: attendee.role.as_deref(),
                district: attendee.district.as_deref(),
            }),
        };
        encoded.map_err(|e| KioskError::Encoding(e.to_string()))
    }

    /// Rasterize a payload into PNG bytes
    pub fn render_png(&self, payload: &str) -> Result<Vec<u8>> {
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| KioskError::Encoding(format!("{} ({} bytes)", e, payload.len())))?;

        let modules = code.width();
        let colors = code.to_colors();
        let total = modules + 2 * QUIET_MODULES;
        let size = QR_SIZE_PX as usize;

        // Nearest-module sampling keeps every module solid
        let image = GrayImage::from_fn(QR_SIZE_PX, QR_SIZE_PX, |x, y| {
            let mx = x as usize * total / size;
            let my = y as usize * total / size;
            let inside = (QUIET_MODULES..QUIET_MODULES + modules).contains(&mx)
                && (QUIET_MODULES..QUIET_MODULES + modules).contains(&my);
            let dark = inside
                && colors[(my - QUIET_MODULES) * modules + (mx - QUIET_MODULES)] == Color::Dark;
            if dark {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| KioskError::Encoding(e.to_string()))?;

        debug!(modules, bytes = png.len(), "Rendered QR image");
        Ok(png)
    }

    /// Payload plus rendered image for one attendee
    pub fn encode(&self, attendee: &Attendee) -> Result<QrArtifact> {
        let payload = self.payload(attendee)?;
        let png = self.render_png(&payload)?;
        Ok(QrArtifact {
            reference: png_data_url(&png),
            payload: Some(payload),
            png,
        })
    }
}

/// `data:image/png;base64,...` reference for PNG bytes
pub fn png_data_url(png: &[u8]) -> String {
    format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(png))
}

pub fn is_data_url(reference: &str) -> bool {
    reference.trim_start().starts_with("data:")
}

/// Decode a base64 `data:` URL into its bytes
///
/// A malformed reference came from the resolver, so it is reported as a
/// transient (malformed body) failure.
pub fn decode_data_url(reference: &str) -> Result<Vec<u8>> {
    let rest = reference
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| KioskError::Transient("QR image is not a data URL".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| KioskError::Transient("QR data URL has no payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(KioskError::Transient(format!(
            "QR data URL is not base64 encoded ({})",
            header
        )));
    }
    STANDARD
        .decode(data.trim())
        .map_err(|e| KioskError::Transient(format!("QR data URL is not valid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rajesh() -> Attendee {
        Attendee::new("a1", "RAJESH KAKKAD", "9876543210").with_confirmation("YC-0202")
    }

    #[test]
    fn test_basic_payload_key_order() {
        let encoder = QrEncoder::new(PayloadSchema::Basic);
        let mut attendee = rajesh();
        assert_eq!(
            encoder.payload(&attendee).unwrap(),
            r#"{"id":"a1","name":"RAJESH KAKKAD","mobile":"9876543210"}"#
        );

        attendee.email = Some("rk@example.org".into());
        attendee.organization = Some("Youth Camp".into());
        assert_eq!(
            encoder.payload(&attendee).unwrap(),
            r#"{"id":"a1","name":"RAJESH KAKKAD","mobile":"9876543210","email":"rk@example.org","organization":"Youth Camp"}"#
        );
    }

    #[test]
    fn test_event_payload_fields() {
        let encoder = QrEncoder::new(PayloadSchema::Event);
        let mut attendee = rajesh();
        attendee.role = Some("COACH".into());
        assert_eq!(
            encoder.payload(&attendee).unwrap(),
            r#"{"id":"a1","confirmationNumber":"YC-0202","name":"RAJESH KAKKAD","mobile":"9876543210","role":"COACH"}"#
        );
    }

    #[test]
    fn test_payload_is_deterministic() {
        let encoder = QrEncoder::new(PayloadSchema::Basic);
        let first = encoder.encode(&rajesh()).unwrap();
        let second = encoder.encode(&rajesh()).unwrap();
        assert_eq!(first.payload, second.payload);
        assert_eq!(first.png, second.png);
        assert!(first.is_local());
    }

    #[test]
    fn test_render_geometry() {
        let encoder = QrEncoder::new(PayloadSchema::Basic);
        let payload = encoder.payload(&rajesh()).unwrap();
        let png = encoder.render_png(&payload).unwrap();
        let image = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (QR_SIZE_PX, QR_SIZE_PX));

        // Quiet margin is white
        assert_eq!(image.get_pixel(0, 0)[0], 255);
        assert_eq!(image.get_pixel(QR_SIZE_PX - 1, QR_SIZE_PX - 1)[0], 255);

        // Centre of the first module belongs to the top-left finder pattern
        let modules = QrCode::new(payload.as_bytes()).unwrap().width();
        let total = modules + 2 * QUIET_MODULES;
        let centre = ((2 * QUIET_MODULES + 1) * QR_SIZE_PX as usize / (2 * total)) as u32;
        assert_eq!(image.get_pixel(centre, centre)[0], 0);
    }

    #[test]
    fn test_oversized_payload_is_encoding_error() {
        let encoder = QrEncoder::new(PayloadSchema::Basic);
        let payload = "X".repeat(5000);
        let err = encoder.render_png(&payload).unwrap_err();
        assert!(matches!(err, KioskError::Encoding(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_data_url_reference() {
        let encoder = QrEncoder::new(PayloadSchema::Basic);
        let artifact = encoder.encode(&rajesh()).unwrap();
        assert!(artifact.reference.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_url(&artifact.reference).unwrap(), artifact.png);
    }

    #[test]
    fn test_malformed_data_urls() {
        assert!(matches!(
            decode_data_url("https://cdn.example/qr.png"),
            Err(KioskError::Transient(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png,rawbytes"),
            Err(KioskError::Transient(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Err(KioskError::Transient(_))
        ));
    }
}
