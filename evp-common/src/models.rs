//! Attendee model and resolution outcome types
//!
//! Attendee records are sourced read-only from the resolver. The portal never
//! edits one in place; a fresher snapshot replaces the whole record.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::filenames;

/// Opaque stable attendee key
///
/// Backends send the id either as a JSON string or a number; both are held
/// as the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AttendeeId(String);

impl AttendeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AttendeeId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => AttendeeId(text),
            RawId::Number(number) => AttendeeId(number.to_string()),
        })
    }
}

/// Resolved registration record for one event participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Opaque stable key
    pub id: AttendeeId,

    /// Registered full name (current schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Name (legacy schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Registered mobile number
    #[serde(default)]
    pub mobile: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_number: Option<String>,

    /// Participant role, e.g. `COACH` or `PARTICIPANT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taluka: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracksuit_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<String>,

    /// Check-in status as last reported by the backend (null reads as false)
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_checked_in: bool,
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl Attendee {
    /// Minimal record, mostly useful for tests and fixtures
    pub fn new(id: impl Into<String>, full_name: impl Into<String>, mobile: impl Into<String>) -> Self {
        Self {
            id: AttendeeId::new(id),
            full_name: Some(full_name.into()),
            name: None,
            mobile: mobile.into(),
            confirmation_number: None,
            application_number: None,
            role: None,
            district: None,
            taluka: None,
            tracksuit_size: None,
            event_name: None,
            event_date: None,
            venue: None,
            email: None,
            organization: None,
            designation: None,
            registration_date: None,
            is_checked_in: false,
        }
    }

    pub fn with_confirmation(mut self, confirmation_number: impl Into<String>) -> Self {
        self.confirmation_number = Some(confirmation_number.into());
        self
    }

    /// `fullName` when present, else the legacy `name`
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    /// Confirmation number, falling back to the attendee id
    pub fn confirmation_or_id(&self) -> &str {
        self.confirmation_number
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.id.as_str())
    }

    pub fn is_coach(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("COACH"))
            .unwrap_or(false)
    }
}

/// QR artifact tied to the currently resolved attendee
///
/// `payload` is present only when the QR was encoded locally; resolver
/// supplied images carry no payload. `reference` is the image reference as
/// received or produced (a `data:` URL or remote URL), `png` the
/// materialized image bytes.
#[derive(Clone, PartialEq)]
pub struct QrArtifact {
    pub payload: Option<String>,
    pub reference: String,
    pub png: Vec<u8>,
}

impl fmt::Debug for QrArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reference: String = self.reference.chars().take(48).collect();
        if reference.len() < self.reference.len() {
            reference.push_str("...");
        }
        f.debug_struct("QrArtifact")
            .field("payload", &self.payload)
            .field("reference", &reference)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

impl QrArtifact {
    pub fn is_local(&self) -> bool {
        self.payload.is_some()
    }
}

/// Single resolved attendee with optional resolver-supplied extras
#[derive(Debug, Clone, PartialEq)]
pub struct SingleMatch {
    pub attendee: Attendee,
    /// QR reference (data URL or URL) supplied by the lookup response,
    /// materialized later in the artifact step
    pub qr_reference: Option<String>,
    /// Duplicate-confirmation-number correction notice, informational only
    pub correction: Option<String>,
}

impl SingleMatch {
    pub fn new(attendee: Attendee) -> Self {
        Self {
            attendee,
            qr_reference: None,
            correction: None,
        }
    }
}

/// Two or more candidates in resolver order
///
/// Only constructible through [`Resolution::from_candidates`], so a value
/// always holds more than one attendee.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidates(Vec<Attendee>);

impl Candidates {
    pub fn as_slice(&self) -> &[Attendee] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Attendee> {
        self.0
    }
}

/// Outcome of one identity resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    NotFound,
    SingleMatch(SingleMatch),
    MultipleMatches(Candidates),
}

impl Resolution {
    /// Collapse a candidate list into an outcome
    ///
    /// Empty → `NotFound`, one → `SingleMatch`, more → `MultipleMatches`
    /// with input order preserved.
    pub fn from_candidates(mut attendees: Vec<Attendee>) -> Self {
        match attendees.len() {
            0 => Resolution::NotFound,
            1 => match attendees.pop() {
                Some(attendee) => Resolution::SingleMatch(SingleMatch::new(attendee)),
                None => Resolution::NotFound,
            },
            _ => Resolution::MultipleMatches(Candidates(attendees)),
        }
    }

    pub fn single(attendee: Attendee) -> Self {
        Resolution::SingleMatch(SingleMatch::new(attendee))
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::NotFound => "not_found",
            Resolution::SingleMatch(_) => "single_match",
            Resolution::MultipleMatches(_) => "multiple_matches",
        }
    }
}

/// Requested export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Pdf,
    Preview,
}

impl ExportFormat {
    /// File extension, `None` for preview
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ExportFormat::Png => Some("png"),
            ExportFormat::Pdf => Some("pdf"),
            ExportFormat::Preview => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Preview => "preview",
        };
        f.write_str(label)
    }
}

/// One artifact export request, discarded after completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub format: ExportFormat,
    pub source_element_id: String,
    pub filename_stem: String,
}

impl ExportJob {
    /// ID card export job for an attendee
    pub fn for_card(attendee: &Attendee, format: ExportFormat, element_id: &str) -> Self {
        Self {
            format,
            source_element_id: element_id.to_string(),
            filename_stem: filenames::card_stem(attendee),
        }
    }

    /// Full filename, `None` for preview jobs
    pub fn filename(&self) -> Option<String> {
        self.format
            .extension()
            .map(|ext| format!("{}.{}", self.filename_stem, ext))
    }
}
