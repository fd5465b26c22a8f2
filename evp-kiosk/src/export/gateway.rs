//! Presentation and delivery seams
//!
//! The export pipeline never touches a concrete UI or filesystem directly.
//! A [`CardSurface`] owns the mounted ID card and can rasterize it; a
//! [`FileSink`] receives finished files.

use async_trait::async_trait;
use evp_common::Attendee;
use image::RgbaImage;
use std::path::PathBuf;

use crate::error::Result;

/// What the card surface shows
#[derive(Debug, Clone, PartialEq)]
pub struct CardContent {
    pub attendee: Attendee,
    /// QR image bytes as materialized by the resolver or the local encoder
    pub qr_png: Vec<u8>,
}

/// Presentation surface holding the ID card
#[async_trait]
pub trait CardSurface: Send + Sync {
    /// Request that the card be mounted under `element_id`
    ///
    /// Mounting may complete after this returns.
    async fn present(&self, element_id: &str, card: &CardContent) -> Result<()>;

    /// Unmount the card; no-op when absent
    async fn dismiss(&self, element_id: &str);

    async fn is_mounted(&self, element_id: &str) -> bool;

    /// Rasterize the mounted card at `scale` times its logical size
    ///
    /// Fails with `ElementNotFound` when nothing is mounted under
    /// `element_id` at call time.
    async fn capture(&self, element_id: &str, scale: f32) -> Result<RgbaImage>;
}

/// File delivery mechanism
pub trait FileSink: Send + Sync {
    /// Deliver `bytes` under `filename`, returning where it landed
    fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}
