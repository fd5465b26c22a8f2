//! Portal driver
//!
//! Runs the [`PortalSession`] state machine against a resolver, the local
//! QR encoder and the export pipeline. All calls take `&mut self`, so one
//! portal has at most one request or export outstanding.

use evp_common::config::{PortalConfig, QrSource};
use evp_common::{AttendeeId, EventBus, ExportFormat, LookupMode, LookupQuery, PortalPhase};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{KioskError, Result};
use crate::export::{CardContent, CardSurface, ExportPipeline, FileSink, SavedArtifact};
use crate::qr::QrEncoder;
use crate::resolver::{ArtifactSnapshot, Resolver};

pub mod selector;
pub mod session;

pub use selector::DisambiguationSelector;
pub use session::{Applied, ArtifactOrigin, ArtifactTicket, Notice, PortalSession};

use session::{ExportTicket, SearchTicket};

/// Attendee self-service portal
pub struct Portal {
    session: PortalSession,
    resolver: Arc<dyn Resolver>,
    encoder: QrEncoder,
    exporter: ExportPipeline,
    mode: LookupMode,
    qr_source: QrSource,
    element_id: String,
}

impl Portal {
    pub fn new(
        config: &PortalConfig,
        resolver: Arc<dyn Resolver>,
        surface: Arc<dyn CardSurface>,
        sink: Arc<dyn FileSink>,
        events: EventBus,
    ) -> Self {
        Self {
            session: PortalSession::new(events),
            resolver,
            encoder: QrEncoder::new(config.lookup.payload_schema),
            exporter: ExportPipeline::from_config(&config.export, surface, sink),
            mode: config.lookup.mode,
            qr_source: config.lookup.qr_source,
            element_id: config.export.element_id.clone(),
        }
    }

    pub fn session(&self) -> &PortalSession {
        &self.session
    }

    pub fn phase(&self) -> PortalPhase {
        self.session.phase()
    }

    pub fn mode(&self) -> LookupMode {
        self.mode
    }

    /// Submit a query and drive it to a settled phase
    ///
    /// Validation errors are returned; resolver failures become notices.
    pub async fn search(&mut self, query: &LookupQuery) -> Result<PortalPhase> {
        let ticket = self.session.begin_search(query, self.mode)?;
        self.run_search(ticket).await
    }

    /// Re-run the retained query after a failed search
    pub async fn retry_search(&mut self) -> Result<PortalPhase> {
        let ticket = self.session.retry_search()?;
        self.run_search(ticket).await
    }

    async fn run_search(&mut self, ticket: SearchTicket) -> Result<PortalPhase> {
        let outcome = self.resolver.resolve(&ticket.query).await;
        self.session.complete_search(ticket, outcome);

        if self.session.phase() == PortalPhase::Resolved {
            let ticket = self.session.begin_artifact()?;
            self.run_artifact(ticket).await?;
        }
        Ok(self.session.phase())
    }

    /// Choose candidate `index` (0-based) and load its QR
    pub async fn select(&mut self, index: usize) -> Result<PortalPhase> {
        let ticket = self.session.select(index)?;
        self.run_artifact(ticket).await
    }

    pub async fn select_by_id(&mut self, id: &AttendeeId) -> Result<PortalPhase> {
        let ticket = self.session.select_by_id(id)?;
        self.run_artifact(ticket).await
    }

    /// Retry only the QR step, keeping the resolved attendee
    pub async fn retry_artifact(&mut self) -> Result<PortalPhase> {
        let ticket = self.session.begin_artifact()?;
        self.run_artifact(ticket).await
    }

    /// Load the QR for the ticket's attendee
    ///
    /// Resolver mode prefers the reference handed out by the lookup and falls
    /// back to an artifact fetch. Local mode never contacts the resolver.
    async fn run_artifact(&mut self, ticket: ArtifactTicket) -> Result<PortalPhase> {
        let outcome = match self.qr_source {
            QrSource::Resolver => match &ticket.qr_reference {
                Some(reference) => self
                    .resolver
                    .fetch_qr(reference)
                    .await
                    .map(|qr| ArtifactSnapshot { qr, attendee: None }),
                None => self.resolver.fetch_artifact(&ticket.attendee_id).await,
            },
            QrSource::Local => match self.session.attendee() {
                Some(attendee) => self
                    .encoder
                    .encode(attendee)
                    .map(|qr| ArtifactSnapshot { qr, attendee: None }),
                None => Err(KioskError::InvalidState {
                    action: "encode QR",
                    phase: self.session.phase(),
                }),
            },
        };

        if let Err(e) = &outcome {
            warn!(attendee_id = %ticket.attendee_id, error = %e, "QR artifact unavailable");
        }
        self.session.complete_artifact(ticket, outcome);
        Ok(self.session.phase())
    }

    fn card_content(&self) -> Result<CardContent> {
        match (self.session.attendee(), self.session.qr()) {
            (Some(attendee), Some(qr)) => Ok(CardContent {
                attendee: attendee.clone(),
                qr_png: qr.png.clone(),
            }),
            _ => Err(KioskError::InvalidState {
                action: "show card",
                phase: self.session.phase(),
            }),
        }
    }

    /// Show the ID card on the surface
    pub async fn open_preview(&mut self) -> Result<PortalPhase> {
        if self.session.phase() == PortalPhase::PreviewingCard {
            return Ok(PortalPhase::PreviewingCard);
        }
        self.session.open_preview()?;

        let presented = match self.card_content() {
            Ok(card) => self.exporter.surface().present(&self.element_id, &card).await,
            Err(e) => Err(e),
        };
        if let Err(e) = presented {
            self.session.close_preview()?;
            return Err(e);
        }
        Ok(self.session.phase())
    }

    pub async fn close_preview(&mut self) -> Result<PortalPhase> {
        self.session.close_preview()?;
        self.exporter.surface().dismiss(&self.element_id).await;
        Ok(self.session.phase())
    }

    /// Export the ID card
    ///
    /// `Preview` opens the preview and saves nothing. On failure the portal is
    /// back in `ArtifactReady` with an `ExportFailed` notice, and the error
    /// is returned as well.
    pub async fn export(&mut self, format: ExportFormat) -> Result<Option<SavedArtifact>> {
        if format == ExportFormat::Preview {
            self.open_preview().await?;
            return Ok(None);
        }

        let ticket = self.session.begin_export(format, &self.element_id)?;
        let result = match self.card_content() {
            Ok(card) => self.run_export(&ticket, &card).await,
            Err(e) => Err(e),
        };

        let previewing = ticket.resume == PortalPhase::PreviewingCard;
        if result.is_err() || !previewing {
            self.exporter.surface().dismiss(&self.element_id).await;
        }

        self.session.complete_export(ticket, &result);
        result.map(Some)
    }

    async fn run_export(&self, ticket: &ExportTicket, card: &CardContent) -> Result<SavedArtifact> {
        if ticket.resume != PortalPhase::PreviewingCard {
            self.exporter
                .surface()
                .present(&ticket.job.source_element_id, card)
                .await?;
        }
        self.exporter.run(&ticket.job).await
    }

    /// Save the raw QR image
    pub fn download_qr(&mut self) -> Result<SavedArtifact> {
        let phase = self.session.phase();
        if !phase.has_artifact() {
            return Err(if phase.is_busy() {
                KioskError::Busy(phase)
            } else {
                KioskError::InvalidState {
                    action: "download QR",
                    phase,
                }
            });
        }
        let (attendee, qr) = match (self.session.attendee(), self.session.qr()) {
            (Some(attendee), Some(qr)) => (attendee, qr),
            _ => {
                return Err(KioskError::InvalidState {
                    action: "download QR",
                    phase,
                })
            }
        };

        let saved = self.exporter.save_qr(attendee, qr)?;
        info!(filename = %saved.filename, "QR image downloaded");
        self.session.record_saved(&saved);
        Ok(saved)
    }

    /// Back to the search form
    pub async fn back(&mut self) -> PortalPhase {
        self.exporter.surface().dismiss(&self.element_id).await;
        self.session.back();
        self.session.phase()
    }
}
