//! Identity resolver client
//!
//! The portal talks to the resolver backend only through [`Resolver`], so
//! the state machine can run against in-memory fakes. [`HttpResolver`] is
//! the production implementation.

use async_trait::async_trait;
use evp_common::{Attendee, AttendeeId, LookupQuery, QrArtifact, Resolution};

use crate::error::Result;

pub mod http;
pub mod normalize;

pub use http::HttpResolver;

/// Authoritative artifact snapshot for one attendee
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSnapshot {
    pub qr: QrArtifact,
    /// Fresher attendee record; replaces the caller's copy when present
    pub attendee: Option<Attendee>,
}

/// Resolver backend contract
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a validated query
    ///
    /// # Returns
    /// * `Ok(Resolution)` - tagged outcome, never a raw response shape
    /// * `Err(KioskError::NotFound)` - backend reported no match
    /// * `Err(KioskError::Transient)` - network, server or malformed body
    async fn resolve(&self, query: &LookupQuery) -> Result<Resolution>;

    /// Re-fetch the QR artifact and attendee snapshot for one attendee
    async fn fetch_artifact(&self, attendee_id: &AttendeeId) -> Result<ArtifactSnapshot>;

    /// Materialize a QR reference handed out by a lookup response
    ///
    /// The reference is a `data:` URL or an absolute or base-relative URL.
    async fn fetch_qr(&self, reference: &str) -> Result<QrArtifact>;
}
