//! Artifact export pipeline
//!
//! Captures the mounted ID card surface and delivers it as a PNG or a
//! single-page A4 PDF, or delivers the raw QR image.

use evp_common::config::ExportConfig;
use evp_common::filenames::qr_filename;
use evp_common::{Attendee, ExportFormat, ExportJob, QrArtifact};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{KioskError, Result};

pub mod gateway;
pub mod pdf;
pub mod surface;

pub use gateway::{CardContent, CardSurface, FileSink};
pub use surface::{DirectorySink, RasterCardSurface};

/// A file handed to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub filename: String,
    /// `None` for the raw QR image
    pub format: Option<ExportFormat>,
    pub bytes: usize,
}

/// Composite RGBA pixels over an opaque white background
pub fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| KioskError::Capture(format!("PNG encoding failed: {}", e)))?;
    Ok(png)
}

/// Capture → encode → deliver
pub struct ExportPipeline {
    surface: Arc<dyn CardSurface>,
    sink: Arc<dyn FileSink>,
    settle_delay: Duration,
    capture_scale: f32,
}

impl ExportPipeline {
    pub fn new(
        surface: Arc<dyn CardSurface>,
        sink: Arc<dyn FileSink>,
        settle_delay: Duration,
        capture_scale: f32,
    ) -> Self {
        Self {
            surface,
            sink,
            settle_delay,
            capture_scale,
        }
    }

    pub fn from_config(
        config: &ExportConfig,
        surface: Arc<dyn CardSurface>,
        sink: Arc<dyn FileSink>,
    ) -> Self {
        Self::new(
            surface,
            sink,
            config.settle_delay(),
            config.capture_scale,
        )
    }

    pub fn surface(&self) -> &Arc<dyn CardSurface> {
        &self.surface
    }

    /// Capture the card under `element_id`, flattened onto white
    ///
    /// If the surface is not mounted yet, waits the settle delay once before
    /// capturing.
    pub async fn capture(&self, element_id: &str) -> Result<RgbImage> {
        if !self.surface.is_mounted(element_id).await {
            debug!(
                element_id,
                delay_ms = self.settle_delay.as_millis() as u64,
                "Card not mounted yet, waiting to settle"
            );
            tokio::time::sleep(self.settle_delay).await;
        }

        let rgba = self.surface.capture(element_id, self.capture_scale).await?;
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(KioskError::Capture(format!(
                "surface '{}' rendered an empty image",
                element_id
            )));
        }
        Ok(flatten_onto_white(&rgba))
    }

    /// Run one card export job
    pub async fn run(&self, job: &ExportJob) -> Result<SavedArtifact> {
        let filename = job
            .filename()
            .ok_or_else(|| KioskError::Capture("preview jobs produce no file".to_string()))?;

        let capture = self.capture(&job.source_element_id).await?;
        let bytes = match job.format {
            ExportFormat::Pdf => pdf::compose_card_pdf(&capture)?,
            _ => encode_png(&capture)?,
        };

        let path = self.sink.deliver(&filename, &bytes)?;
        info!(
            format = %job.format,
            filename = %filename,
            width = capture.width(),
            height = capture.height(),
            "Card exported"
        );

        Ok(SavedArtifact {
            path,
            filename,
            format: Some(job.format),
            bytes: bytes.len(),
        })
    }

    /// Deliver the raw QR image, bypassing capture
    pub fn save_qr(&self, attendee: &Attendee, qr: &QrArtifact) -> Result<SavedArtifact> {
        let filename = qr_filename(attendee);
        let path = self.sink.deliver(&filename, &qr.png)?;
        Ok(SavedArtifact {
            path,
            filename,
            format: None,
            bytes: qr.png.len(),
        })
    }
}
