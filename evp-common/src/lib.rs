//! # EVP Common Library
//!
//! Shared code for the event portal crates including:
//! - Attendee model and resolution outcome types
//! - Lookup queries and client-side validation
//! - Portal phases, events and the EventBus
//! - Configuration loading
//! - Artifact filename derivation

pub mod config;
pub mod error;
pub mod events;
pub mod filenames;
pub mod models;
pub mod query;

pub use error::{Error, Result};
pub use events::{EventBus, PortalEvent, PortalPhase};
pub use models::{Attendee, AttendeeId, ExportFormat, ExportJob, QrArtifact, Resolution, SingleMatch};
pub use query::{LookupMode, LookupQuery, ValidationError};
