//! evp-kiosk library
//!
//! Attendee self-service portal: resolve an attendee from a lookup query,
//! let them pick among several matches, show their QR and export the ID
//! card as PNG or single-page A4 PDF.

pub mod error;
pub mod export;
pub mod logging;
pub mod portal;
pub mod qr;
pub mod resolver;

pub use error::{KioskError, Result};
pub use export::{
    CardContent, CardSurface, DirectorySink, ExportPipeline, FileSink, RasterCardSurface,
    SavedArtifact,
};
pub use portal::{Applied, Notice, Portal, PortalSession};
pub use qr::QrEncoder;
pub use resolver::{ArtifactSnapshot, HttpResolver, Resolver};

/// Build identification: version, git hash, timestamp, profile
pub fn build_info() -> String {
    format!(
        "evp-kiosk {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    )
}
