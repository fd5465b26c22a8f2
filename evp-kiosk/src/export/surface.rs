//! Headless card surface and filesystem sink

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::gateway::{CardContent, CardSurface, FileSink};
use crate::error::{KioskError, Result};

/// Logical card size in px at scale 1
pub const CARD_WIDTH: u32 = 340;
pub const CARD_HEIGHT: u32 = 520;

const CORNER_RADIUS: u32 = 16;
const HEADER_HEIGHT: u32 = 96;
const QR_SIDE: u32 = 220;
const QR_TOP_GAP: u32 = 32;
const FOOTER_HEIGHT: u32 = 28;

const COACH_BLUE: Rgba<u8> = Rgba([37, 99, 235, 255]);
const PARTICIPANT_PURPLE: Rgba<u8> = Rgba([147, 51, 234, 255]);
const CHECKED_IN_GREEN: Rgba<u8> = Rgba([22, 163, 74, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// In-process card surface rendering cards straight to pixels
///
/// Presenting mounts immediately.
#[derive(Default)]
pub struct RasterCardSurface {
    mounted: RwLock<HashMap<String, CardContent>>,
}

impl RasterCardSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardSurface for RasterCardSurface {
    async fn present(&self, element_id: &str, card: &CardContent) -> Result<()> {
        debug!(element_id, attendee_id = %card.attendee.id, "Mounting card");
        self.mounted
            .write()
            .await
            .insert(element_id.to_string(), card.clone());
        Ok(())
    }

    async fn dismiss(&self, element_id: &str) {
        if self.mounted.write().await.remove(element_id).is_some() {
            debug!(element_id, "Card dismissed");
        }
    }

    async fn is_mounted(&self, element_id: &str) -> bool {
        self.mounted.read().await.contains_key(element_id)
    }

    async fn capture(&self, element_id: &str, scale: f32) -> Result<RgbaImage> {
        let mounted = self.mounted.read().await;
        let card = mounted
            .get(element_id)
            .ok_or_else(|| KioskError::ElementNotFound(element_id.to_string()))?;
        render_card(card, scale)
    }
}

/// Whether (x, y) falls in a clipped rounded corner
fn outside_rounded_rect(x: u32, y: u32, width: u32, height: u32, radius: u32) -> bool {
    let (x, y, w, h, r) = (
        i64::from(x),
        i64::from(y),
        i64::from(width),
        i64::from(height),
        i64::from(radius),
    );
    let cx = if x < r {
        r
    } else if x >= w - r {
        w - r - 1
    } else {
        return false;
    };
    let cy = if y < r {
        r
    } else if y >= h - r {
        h - r - 1
    } else {
        return false;
    };
    let (dx, dy) = (x - cx, y - cy);
    dx * dx + dy * dy > r * r
}

/// Rasterize a card at `scale`
///
/// Corners outside the rounded rectangle stay transparent.
pub fn render_card(card: &CardContent, scale: f32) -> Result<RgbaImage> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(KioskError::Capture(format!("invalid capture scale {}", scale)));
    }
    let px = |v: u32| ((v as f32 * scale).round() as u32).max(1);

    let (width, height) = (px(CARD_WIDTH), px(CARD_HEIGHT));
    let radius = px(CORNER_RADIUS);
    let header_height = px(HEADER_HEIGHT);
    let footer_top = height.saturating_sub(px(FOOTER_HEIGHT));
    let header = if card.attendee.is_coach() {
        COACH_BLUE
    } else {
        PARTICIPANT_PURPLE
    };
    let checked_in = card.attendee.is_checked_in;

    let mut canvas = RgbaImage::from_fn(width, height, |x, y| {
        if outside_rounded_rect(x, y, width, height, radius) {
            TRANSPARENT
        } else if y < header_height {
            header
        } else if checked_in && y >= footer_top {
            CHECKED_IN_GREEN
        } else {
            WHITE
        }
    });

    let qr = image::load_from_memory(&card.qr_png)
        .map_err(|e| KioskError::Capture(format!("QR image unreadable: {}", e)))?
        .to_rgba8();
    let side = px(QR_SIDE);
    let qr = imageops::resize(&qr, side, side, FilterType::Nearest);
    let left = width.saturating_sub(side) / 2;
    let top = header_height + px(QR_TOP_GAP);
    imageops::overlay(&mut canvas, &qr, i64::from(left), i64::from(top));

    Ok(canvas)
}

/// Delivers files into a directory
///
/// Bytes are written to `<name>.part` and renamed into place, so a reader
/// never sees a partial file under the final name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DirectorySink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let failed = |message: String| KioskError::Delivery {
            filename: filename.to_string(),
            message,
        };

        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
            return Err(failed("not a plain file name".to_string()));
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| failed(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let target = self.dir.join(filename);
        let partial = self.dir.join(format!("{}.part", filename));

        if let Err(e) = fs::write(&partial, bytes) {
            let _ = fs::remove_file(&partial);
            return Err(failed(e.to_string()));
        }
        if let Err(e) = fs::rename(&partial, &target) {
            warn!(path = %partial.display(), error = %e, "Rename failed, removing partial file");
            let _ = fs::remove_file(&partial);
            return Err(failed(e.to_string()));
        }

        info!(path = %target.display(), bytes = bytes.len(), "File saved");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::QrEncoder;
    use evp_common::config::PayloadSchema;
    use evp_common::Attendee;
    use tempfile::TempDir;

    fn card(role: &str, checked_in: bool) -> CardContent {
        let mut attendee = Attendee::new("a1", "RAJESH KAKKAD", "9876543210");
        attendee.role = Some(role.to_string());
        attendee.is_checked_in = checked_in;
        let qr = QrEncoder::new(PayloadSchema::Basic).encode(&attendee).unwrap();
        CardContent {
            attendee,
            qr_png: qr.png,
        }
    }

    #[test]
    fn test_render_dimensions_follow_scale() {
        let image = render_card(&card("PARTICIPANT", false), 2.0).unwrap();
        assert_eq!(image.dimensions(), (680, 1040));
        let image = render_card(&card("PARTICIPANT", false), 1.0).unwrap();
        assert_eq!(image.dimensions(), (CARD_WIDTH, CARD_HEIGHT));
    }

    #[test]
    fn test_render_colours() {
        let coach = render_card(&card("COACH", false), 1.0).unwrap();
        assert_eq!(*coach.get_pixel(CARD_WIDTH / 2, 10), COACH_BLUE);
        assert_eq!(*coach.get_pixel(0, 0), TRANSPARENT);
        assert_eq!(*coach.get_pixel(CARD_WIDTH / 2, CARD_HEIGHT - 5), WHITE);

        let participant = render_card(&card("PARTICIPANT", true), 1.0).unwrap();
        assert_eq!(*participant.get_pixel(CARD_WIDTH / 2, 10), PARTICIPANT_PURPLE);
        assert_eq!(
            *participant.get_pixel(CARD_WIDTH / 2, CARD_HEIGHT - 5),
            CHECKED_IN_GREEN
        );
    }

    #[test]
    fn test_unreadable_qr_is_capture_error() {
        let mut content = card("COACH", false);
        content.qr_png = b"not an image".to_vec();
        assert!(matches!(
            render_card(&content, 1.0),
            Err(KioskError::Capture(_))
        ));
    }

    #[tokio::test]
    async fn test_surface_mount_cycle() {
        let surface = RasterCardSurface::new();
        assert!(!surface.is_mounted("id-card-container").await);
        assert!(matches!(
            surface.capture("id-card-container", 1.0).await,
            Err(KioskError::ElementNotFound(_))
        ));

        surface
            .present("id-card-container", &card("COACH", false))
            .await
            .unwrap();
        assert!(surface.is_mounted("id-card-container").await);
        assert!(surface.capture("id-card-container", 1.0).await.is_ok());

        surface.dismiss("id-card-container").await;
        assert!(!surface.is_mounted("id-card-container").await);
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path().join("out"));
        let path = sink.deliver("qrcode-YC-0202.png", b"png-bytes").unwrap();
        assert_eq!(path, temp.path().join("out").join("qrcode-YC-0202.png"));
        assert_eq!(fs::read(&path).unwrap(), b"png-bytes");
        assert!(!temp.path().join("out").join("qrcode-YC-0202.png.part").exists());
    }

    #[test]
    fn test_directory_sink_rejects_paths() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path());
        assert!(matches!(
            sink.deliver("../escape.png", b"x"),
            Err(KioskError::Delivery { .. })
        ));
    }
}
