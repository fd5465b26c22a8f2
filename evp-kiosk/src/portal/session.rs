//! Portal session state machine
//!
//! Sans-IO: network-bound steps are split into a `begin_*` call, which
//! validates the action, moves to a busy phase and hands back a ticket, and
//! a `complete_*` call that applies the outcome. Tickets carry the session
//! generation; `back` and every new search bump it, so a late completion
//! from an abandoned request is dropped instead of overwriting newer state.

use chrono::Utc;
use evp_common::{
    Attendee, AttendeeId, EventBus, ExportFormat, ExportJob, LookupMode, LookupQuery, PortalEvent,
    PortalPhase, QrArtifact, Resolution,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::selector::DisambiguationSelector;
use crate::error::{KioskError, Result};
use crate::export::SavedArtifact;
use crate::resolver::ArtifactSnapshot;

/// User-facing message left by a recoverable failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Resolver found nobody; re-enter the query
    NotFound(String),
    /// Search could not complete; `retry_search` re-runs the same query
    SearchFailed { message: String, retryable: bool },
    /// QR could not be loaded
    ArtifactFailed { message: String, retryable: bool },
    /// Export failed; the card is still available
    ExportFailed(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::NotFound(message)
            | Notice::SearchFailed { message, .. }
            | Notice::ArtifactFailed { message, .. }
            | Notice::ExportFailed(message) => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Notice::SearchFailed { retryable, .. } | Notice::ArtifactFailed { retryable, .. } => {
                *retryable
            }
            Notice::ExportFailed(_) => true,
            Notice::NotFound(_) => false,
        }
    }
}

/// Whether a completion was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Current,
    /// Superseded by `back` or a newer request; nothing changed
    Stale,
}

/// Outstanding resolution request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    generation: u64,
    /// Normalized query to send
    pub query: LookupQuery,
}

/// How the artifact step was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// Single match straight from the search
    Direct,
    /// Chosen from a candidate list
    Selection,
}

/// Outstanding artifact fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTicket {
    generation: u64,
    pub attendee_id: AttendeeId,
    pub origin: ArtifactOrigin,
    /// QR reference from the lookup response, used instead of an artifact fetch
    pub qr_reference: Option<String>,
}

/// Outstanding export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTicket {
    generation: u64,
    pub job: ExportJob,
    /// Phase the export started from
    pub resume: PortalPhase,
}

/// Per-kiosk session state
pub struct PortalSession {
    session_id: Uuid,
    phase: PortalPhase,
    generation: u64,
    query: Option<LookupQuery>,
    attendee: Option<Attendee>,
    correction: Option<String>,
    selector: DisambiguationSelector,
    qr_reference: Option<String>,
    qr: Option<QrArtifact>,
    notice: Option<Notice>,
    events: EventBus,
}

impl PortalSession {
    pub fn new(events: EventBus) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            phase: PortalPhase::Idle,
            generation: 0,
            query: None,
            attendee: None,
            correction: None,
            selector: DisambiguationSelector::new(),
            qr_reference: None,
            qr: None,
            notice: None,
            events,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> PortalPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last submitted (normalized) query, kept for retries
    pub fn query(&self) -> Option<&LookupQuery> {
        self.query.as_ref()
    }

    pub fn attendee(&self) -> Option<&Attendee> {
        self.attendee.as_ref()
    }

    pub fn correction(&self) -> Option<&str> {
        self.correction.as_deref()
    }

    pub fn candidates(&self) -> &[Attendee] {
        self.selector.candidates()
    }

    pub fn qr(&self) -> Option<&QrArtifact> {
        self.qr.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn transition_to(&mut self, new_phase: PortalPhase) {
        let old_phase = self.phase;
        if old_phase == new_phase {
            return;
        }
        self.phase = new_phase;
        info!(
            session_id = %self.session_id,
            from = %old_phase,
            to = %new_phase,
            "Portal phase changed"
        );
        self.events.emit_lossy(PortalEvent::PhaseChanged {
            session_id: self.session_id,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }

    /// Refuse when busy, else require one of `allowed`
    fn guard(&self, action: &'static str, allowed: &[PortalPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else if self.phase.is_busy() {
            Err(KioskError::Busy(self.phase))
        } else {
            Err(KioskError::InvalidState {
                action,
                phase: self.phase,
            })
        }
    }

    fn is_current(&self, generation: u64, expected: PortalPhase, what: &str) -> bool {
        let current = generation == self.generation && self.phase == expected;
        if !current {
            debug!(
                session_id = %self.session_id,
                ticket_generation = generation,
                generation = self.generation,
                phase = %self.phase,
                "Dropping stale {} completion",
                what
            );
        }
        current
    }

    fn clear_result(&mut self) {
        self.attendee = None;
        self.correction = None;
        self.selector.clear();
        self.qr_reference = None;
        self.qr = None;
    }

    fn mark_artifact_ready(&mut self, qr: QrArtifact) {
        let attendee_id = self
            .attendee
            .as_ref()
            .map(|a| a.id.to_string())
            .unwrap_or_default();
        self.events.emit_lossy(PortalEvent::ArtifactReady {
            session_id: self.session_id,
            attendee_id,
            local: qr.is_local(),
            timestamp: Utc::now(),
        });
        self.qr = Some(qr);
        self.transition_to(PortalPhase::ArtifactReady);
    }

    /// Validate and submit a query
    ///
    /// Validation runs before anything changes; a rejected query leaves the
    /// session as it was.
    pub fn begin_search(&mut self, query: &LookupQuery, mode: LookupMode) -> Result<SearchTicket> {
        self.guard("search", &[PortalPhase::Idle])?;
        mode.check(query)?;
        let query = query.normalized()?;

        self.generation += 1;
        self.clear_result();
        self.notice = None;
        self.query = Some(query.clone());
        self.transition_to(PortalPhase::Resolving);

        Ok(SearchTicket {
            generation: self.generation,
            query,
        })
    }

    /// Re-submit the retained query
    pub fn retry_search(&mut self) -> Result<SearchTicket> {
        self.guard("retry search", &[PortalPhase::Idle])?;
        let query = self.query.clone().ok_or(KioskError::InvalidState {
            action: "retry search",
            phase: self.phase,
        })?;

        self.generation += 1;
        self.notice = None;
        self.transition_to(PortalPhase::Resolving);

        Ok(SearchTicket {
            generation: self.generation,
            query,
        })
    }

    /// Apply a resolution outcome
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        outcome: Result<Resolution>,
    ) -> Applied {
        if !self.is_current(ticket.generation, PortalPhase::Resolving, "search") {
            return Applied::Stale;
        }

        match outcome {
            Ok(Resolution::NotFound) => {
                self.notice = Some(Notice::NotFound(
                    "No attendee found. Please check your details and try again.".to_string(),
                ));
                self.transition_to(PortalPhase::Idle);
            }
            Err(KioskError::NotFound(message)) => {
                self.notice = Some(Notice::NotFound(message));
                self.transition_to(PortalPhase::Idle);
            }
            Err(e) => {
                self.notice = Some(Notice::SearchFailed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                });
                self.transition_to(PortalPhase::Idle);
            }
            Ok(Resolution::SingleMatch(single)) => {
                self.attendee = Some(single.attendee);
                self.correction = single.correction;
                self.qr_reference = single.qr_reference;
                self.transition_to(PortalPhase::Resolved);
            }
            Ok(Resolution::MultipleMatches(candidates)) => {
                let count = candidates.len();
                self.selector.present(candidates.into_vec());
                self.events.emit_lossy(PortalEvent::CandidatesPresented {
                    session_id: self.session_id,
                    count,
                    timestamp: Utc::now(),
                });
                self.transition_to(PortalPhase::Disambiguating);
            }
        }
        Applied::Current
    }

    /// Start the artifact step for the resolved attendee
    pub fn begin_artifact(&mut self) -> Result<ArtifactTicket> {
        self.guard("load QR", &[PortalPhase::Resolved])?;
        let attendee_id = self
            .attendee
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(KioskError::InvalidState {
                action: "load QR",
                phase: self.phase,
            })?;

        self.notice = None;
        self.transition_to(PortalPhase::ArtifactLoading);
        Ok(ArtifactTicket {
            generation: self.generation,
            attendee_id,
            origin: ArtifactOrigin::Direct,
            qr_reference: self.qr_reference.clone(),
        })
    }

    fn choose(&mut self, chosen: Attendee) -> ArtifactTicket {
        let attendee_id = chosen.id.clone();
        info!(session_id = %self.session_id, attendee_id = %attendee_id, "Candidate selected");
        self.attendee = Some(chosen);
        self.correction = None;
        self.qr_reference = None;
        self.qr = None;
        self.notice = None;
        self.transition_to(PortalPhase::ArtifactLoading);
        ArtifactTicket {
            generation: self.generation,
            attendee_id,
            origin: ArtifactOrigin::Selection,
            qr_reference: None,
        }
    }

    /// Pick candidate `index` (0-based); the list is gone afterwards
    pub fn select(&mut self, index: usize) -> Result<ArtifactTicket> {
        self.guard("select", &[PortalPhase::Disambiguating])?;
        let chosen = self.selector.take(index)?;
        Ok(self.choose(chosen))
    }

    /// Pick the candidate with `id`; the list is gone afterwards
    pub fn select_by_id(&mut self, id: &AttendeeId) -> Result<ArtifactTicket> {
        self.guard("select", &[PortalPhase::Disambiguating])?;
        let chosen = self.selector.take_by_id(id)?;
        Ok(self.choose(chosen))
    }

    /// Apply an artifact outcome
    pub fn complete_artifact(
        &mut self,
        ticket: ArtifactTicket,
        outcome: Result<ArtifactSnapshot>,
    ) -> Applied {
        if !self.is_current(ticket.generation, PortalPhase::ArtifactLoading, "artifact") {
            return Applied::Stale;
        }

        match outcome {
            Ok(snapshot) => {
                if let Some(fresh) = snapshot.attendee {
                    self.attendee = Some(fresh);
                }
                self.mark_artifact_ready(snapshot.qr);
            }
            Err(e) => {
                self.notice = Some(Notice::ArtifactFailed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                });
                match ticket.origin {
                    ArtifactOrigin::Direct => self.transition_to(PortalPhase::Resolved),
                    ArtifactOrigin::Selection => {
                        self.clear_result();
                        self.transition_to(PortalPhase::Idle);
                    }
                }
            }
        }
        Applied::Current
    }

    pub fn open_preview(&mut self) -> Result<()> {
        self.guard(
            "preview",
            &[PortalPhase::ArtifactReady, PortalPhase::PreviewingCard],
        )?;
        self.transition_to(PortalPhase::PreviewingCard);
        Ok(())
    }

    pub fn close_preview(&mut self) -> Result<()> {
        self.guard("close preview", &[PortalPhase::PreviewingCard])?;
        self.transition_to(PortalPhase::ArtifactReady);
        Ok(())
    }

    /// Start a file export of the ID card
    pub fn begin_export(&mut self, format: ExportFormat, element_id: &str) -> Result<ExportTicket> {
        self.guard(
            "export",
            &[PortalPhase::ArtifactReady, PortalPhase::PreviewingCard],
        )?;
        if format == ExportFormat::Preview {
            return Err(KioskError::InvalidState {
                action: "export preview",
                phase: self.phase,
            });
        }
        let attendee = self.attendee.as_ref().ok_or(KioskError::InvalidState {
            action: "export",
            phase: self.phase,
        })?;

        let ticket = ExportTicket {
            generation: self.generation,
            job: ExportJob::for_card(attendee, format, element_id),
            resume: self.phase,
        };
        if matches!(self.notice, Some(Notice::ExportFailed(_))) {
            self.notice = None;
        }
        self.transition_to(PortalPhase::Exporting);
        Ok(ticket)
    }

    /// Apply an export outcome
    pub fn complete_export(
        &mut self,
        ticket: ExportTicket,
        outcome: &Result<SavedArtifact>,
    ) -> Applied {
        if !self.is_current(ticket.generation, PortalPhase::Exporting, "export") {
            return Applied::Stale;
        }

        match outcome {
            Ok(saved) => {
                self.record_saved(saved);
                self.transition_to(ticket.resume);
            }
            Err(e) => {
                let message = e.to_string();
                self.events.emit_lossy(PortalEvent::ExportFailed {
                    session_id: self.session_id,
                    format: ticket.job.format,
                    message: message.clone(),
                    timestamp: Utc::now(),
                });
                self.notice = Some(Notice::ExportFailed(message));
                self.transition_to(PortalPhase::ArtifactReady);
            }
        }
        Applied::Current
    }

    /// Publish a delivered file
    pub fn record_saved(&self, saved: &SavedArtifact) {
        self.events.emit_lossy(PortalEvent::ArtifactSaved {
            session_id: self.session_id,
            filename: saved.filename.clone(),
            format: saved.format,
            bytes: saved.bytes,
            timestamp: Utc::now(),
        });
    }

    /// Return to the search form, discarding everything in flight
    pub fn back(&mut self) {
        self.generation += 1;
        self.clear_result();
        self.query = None;
        self.notice = None;
        self.transition_to(PortalPhase::Idle);
    }
}
