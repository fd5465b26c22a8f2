//! Error types for evp-kiosk
//!
//! Every failure is scoped to the current user action; none is fatal to
//! the process.

use evp_common::{PortalPhase, ValidationError};
use thiserror::Error;

/// Kiosk error taxonomy
#[derive(Debug, Error)]
pub enum KioskError {
    /// No matching attendee; recoverable by re-entering the query
    #[error("No attendee found: {0}")]
    NotFound(String),

    /// Network, server or malformed-body fault; retryable
    #[error("Resolver unavailable: {0}")]
    Transient(String),

    /// Payload too large or invalid for local QR generation
    #[error("QR encoding failed: {0}")]
    Encoding(String),

    /// Capture target not present in the presentation tree
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Raster capture or document composition fault
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Missing or malformed client-side input
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Triggering action disabled while the session is busy
    #[error("Action refused while {0}")]
    Busy(PortalPhase),

    /// Action not available in the current phase
    #[error("Action '{action}' not available while {phase}")]
    InvalidState {
        action: &'static str,
        phase: PortalPhase,
    },

    /// File delivery failed
    #[error("Could not save {filename}: {message}")]
    Delivery { filename: String, message: String },

    /// evp-common error
    #[error("Common error: {0}")]
    Common(#[from] evp_common::Error),
}

impl KioskError {
    /// Whether retrying the same action with the same input can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KioskError::Transient(_)
                | KioskError::ElementNotFound(_)
                | KioskError::Capture(_)
                | KioskError::Delivery { .. }
                | KioskError::Busy(_)
        )
    }
}

/// Convenience Result type using KioskError
pub type Result<T> = std::result::Result<T, KioskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(KioskError::Transient("503".into()).is_retryable());
        assert!(KioskError::ElementNotFound("id-card-container".into()).is_retryable());
        assert!(!KioskError::Encoding("too long".into()).is_retryable());
        assert!(!KioskError::NotFound("YC-0202".into()).is_retryable());
        assert!(!KioskError::Validation(ValidationError::MissingField("name")).is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = KioskError::InvalidState {
            action: "select",
            phase: PortalPhase::Idle,
        };
        assert_eq!(err.to_string(), "Action 'select' not available while idle");
        assert_eq!(
            KioskError::Busy(PortalPhase::Resolving).to_string(),
            "Action refused while resolving"
        );
    }
}
