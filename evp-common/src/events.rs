//! Portal phases and the EventBus
//!
//! Every phase change and artifact delivery is published so an attached
//! presentation layer can follow one portal session without polling it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::ExportFormat;

/// Portal session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalPhase {
    /// Search form shown (possibly with a notice)
    Idle,
    /// Lookup request in flight
    Resolving,
    /// Candidate list shown
    Disambiguating,
    /// Single attendee known, artifact pending
    Resolved,
    /// QR artifact being fetched or encoded
    ArtifactLoading,
    /// QR visible
    ArtifactReady,
    /// ID card preview open
    PreviewingCard,
    /// Export job running
    Exporting,
}

impl PortalPhase {
    /// Phases during which the triggering action is disabled
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PortalPhase::Resolving | PortalPhase::ArtifactLoading | PortalPhase::Exporting
        )
    }

    /// Phases in which a QR artifact is held
    pub fn has_artifact(&self) -> bool {
        matches!(
            self,
            PortalPhase::ArtifactReady | PortalPhase::PreviewingCard | PortalPhase::Exporting
        )
    }
}

impl std::fmt::Display for PortalPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PortalPhase::Idle => "idle",
            PortalPhase::Resolving => "resolving",
            PortalPhase::Disambiguating => "disambiguating",
            PortalPhase::Resolved => "resolved",
            PortalPhase::ArtifactLoading => "artifact_loading",
            PortalPhase::ArtifactReady => "artifact_ready",
            PortalPhase::PreviewingCard => "previewing_card",
            PortalPhase::Exporting => "exporting",
        };
        f.write_str(label)
    }
}

/// Portal event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortalEvent {
    /// Session moved between phases
    PhaseChanged {
        session_id: Uuid,
        old_phase: PortalPhase,
        new_phase: PortalPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Disambiguation list shown
    CandidatesPresented {
        session_id: Uuid,
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// QR artifact available for the resolved attendee
    ArtifactReady {
        session_id: Uuid,
        attendee_id: String,
        /// true when encoded locally, false when supplied by the resolver
        local: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// File handed to the delivery sink
    ArtifactSaved {
        session_id: Uuid,
        filename: String,
        /// `None` for the raw QR download
        format: Option<ExportFormat>,
        bytes: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Export job failed
    ExportFailed {
        session_id: Uuid,
        format: ExportFormat,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks on slow
/// subscribers, and dropped receivers clean themselves up.
///
/// # Examples
///
/// ```
/// use evp_common::events::{EventBus, PortalEvent, PortalPhase};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(PortalEvent::PhaseChanged {
///     session_id: uuid::Uuid::new_v4(),
///     old_phase: PortalPhase::Idle,
///     new_phase: PortalPhase::Resolving,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PortalEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PortalEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
