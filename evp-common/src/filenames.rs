//! Deterministic artifact filenames
//!
//! - ID card: `event-id-card-<slugified-full-name>-<confirmation-number>.<ext>`
//! - Raw QR: `qrcode-<confirmation-number>.png`
//!
//! The attendee id stands in for a missing confirmation number. Characters
//! that are not allowed in filenames become `-` (application numbers such as
//! `YC/GSYB/0202` contain slashes).

use crate::models::Attendee;

const CARD_PREFIX: &str = "event-id-card";

/// Replace each whitespace run with `-`, keeping case
pub fn slugify_name(name: &str) -> String {
    sanitize_component(&name.split_whitespace().collect::<Vec<_>>().join("-"))
}

fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

/// Filename stem for an ID card export
pub fn card_stem(attendee: &Attendee) -> String {
    let slug = slugify_name(attendee.display_name());
    let code = sanitize_component(attendee.confirmation_or_id().trim());
    if slug.is_empty() {
        format!("{}-{}", CARD_PREFIX, code)
    } else {
        format!("{}-{}-{}", CARD_PREFIX, slug, code)
    }
}

/// Filename for the raw QR download
pub fn qr_filename(attendee: &Attendee) -> String {
    format!(
        "qrcode-{}.png",
        sanitize_component(attendee.confirmation_or_id().trim())
    )
}
