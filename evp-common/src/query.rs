//! Lookup queries and client-side validation
//!
//! A query is normalized (trimmed, codes and names uppercased) and validated
//! before any resolver call. Each deployment runs in one [`LookupMode`],
//! which decides the query shapes it accepts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Client-side rejection of a lookup or selection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("mobile number must be exactly 10 digits, got '{0}'")]
    InvalidMobile(String),

    #[error("{shape} lookups are not available in {mode} mode")]
    ModeMismatch { mode: LookupMode, shape: &'static str },

    #[error("no candidate {0} in the current list")]
    NoSuchCandidate(String),
}

/// One lookup request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupQuery {
    /// Mobile number alone
    Mobile { mobile: String },
    /// Mobile plus confirmation or application number
    MobileIdentifier { mobile: String, identifier: String },
    /// Mobile plus registered name
    MobileName { mobile: String, name: String },
    /// Download-only: full name plus mobile
    NameMobile { full_name: String, mobile: String },
    /// Download-only: confirmation number alone
    Confirmation { confirmation_number: String },
    /// Free text covering mobile or code
    FreeText { query: String },
}

impl LookupQuery {
    /// Shape label used in logs and errors
    pub fn shape(&self) -> &'static str {
        match self {
            LookupQuery::Mobile { .. } => "mobile",
            LookupQuery::MobileIdentifier { .. } => "mobile+identifier",
            LookupQuery::MobileName { .. } => "mobile+name",
            LookupQuery::NameMobile { .. } => "fullName+mobile",
            LookupQuery::Confirmation { .. } => "confirmation-number",
            LookupQuery::FreeText { .. } => "free-text",
        }
    }

    pub fn mobile(&self) -> Option<&str> {
        match self {
            LookupQuery::Mobile { mobile }
            | LookupQuery::MobileIdentifier { mobile, .. }
            | LookupQuery::MobileName { mobile, .. }
            | LookupQuery::NameMobile { mobile, .. } => Some(mobile),
            LookupQuery::Confirmation { .. } | LookupQuery::FreeText { .. } => None,
        }
    }

    /// Trimmed, uppercased and validated copy of this query
    pub fn normalized(&self) -> Result<LookupQuery, ValidationError> {
        Ok(match self {
            LookupQuery::Mobile { mobile } => LookupQuery::Mobile {
                mobile: normalize_mobile(mobile)?,
            },
            LookupQuery::MobileIdentifier { mobile, identifier } => LookupQuery::MobileIdentifier {
                mobile: normalize_mobile(mobile)?,
                identifier: required_upper(identifier, "confirmation or application number")?,
            },
            LookupQuery::MobileName { mobile, name } => LookupQuery::MobileName {
                mobile: normalize_mobile(mobile)?,
                name: required_upper(name, "name")?,
            },
            LookupQuery::NameMobile { full_name, mobile } => LookupQuery::NameMobile {
                full_name: required_upper(full_name, "full name")?,
                mobile: normalize_mobile(mobile)?,
            },
            LookupQuery::Confirmation {
                confirmation_number,
            } => LookupQuery::Confirmation {
                confirmation_number: required_upper(confirmation_number, "confirmation number")?,
            },
            LookupQuery::FreeText { query } => LookupQuery::FreeText {
                query: required_upper(query, "search text")?,
            },
        })
    }
}

fn normalize_mobile(mobile: &str) -> Result<String, ValidationError> {
    let mobile = mobile.trim();
    if mobile.is_empty() {
        return Err(ValidationError::MissingField("mobile number"));
    }
    if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidMobile(mobile.to_string()));
    }
    Ok(mobile.to_string())
}

fn required_upper(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value.to_uppercase())
}

/// Mask all but the last four digits, for logs
pub fn mask_mobile(mobile: &str) -> String {
    let count = mobile.chars().count();
    mobile
        .chars()
        .enumerate()
        .map(|(i, c)| if i + 4 < count { '*' } else { c })
        .collect()
}

/// Deployment lookup mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupMode {
    /// Verify by mobile, optionally with an identifier or name
    #[default]
    Verify,
    /// Download QR by full name plus mobile, or by confirmation number
    Download,
    /// Free-text search
    Search,
}

impl LookupMode {
    pub fn accepts(&self, query: &LookupQuery) -> bool {
        matches!(
            (self, query),
            (LookupMode::Verify, LookupQuery::Mobile { .. })
                | (LookupMode::Verify, LookupQuery::MobileIdentifier { .. })
                | (LookupMode::Verify, LookupQuery::MobileName { .. })
                | (LookupMode::Download, LookupQuery::NameMobile { .. })
                | (LookupMode::Download, LookupQuery::Confirmation { .. })
                | (LookupMode::Search, LookupQuery::FreeText { .. })
        )
    }

    pub fn check(&self, query: &LookupQuery) -> Result<(), ValidationError> {
        if self.accepts(query) {
            Ok(())
        } else {
            Err(ValidationError::ModeMismatch {
                mode: *self,
                shape: query.shape(),
            })
        }
    }
}

impl fmt::Display for LookupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LookupMode::Verify => "verify",
            LookupMode::Download => "download",
            LookupMode::Search => "search",
        };
        f.write_str(label)
    }
}

impl FromStr for LookupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify" => Ok(LookupMode::Verify),
            "download" => Ok(LookupMode::Download),
            "search" => Ok(LookupMode::Search),
            other => Err(format!(
                "unknown lookup mode '{}' (expected verify, download or search)",
                other
            )),
        }
    }
}
