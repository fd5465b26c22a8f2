//! Response-shape normalization
//!
//! The only place that knows what resolver responses look like. Recognised
//! lookup shapes, checked in this order:
//! - `{attendees: [...]}` (empty array falls back to a sibling `attendee`)
//! - `{attendee: {...}}`
//! - legacy `{success, data, message}`
//! - a bare attendee object
//!
//! Siblings `qrCode` and `corrected`/`message` ride along with any shape.
//! Anything else is a malformed body.

use evp_common::{Attendee, Resolution};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{KioskError, Result};

fn malformed(detail: impl std::fmt::Display) -> KioskError {
    KioskError::Transient(format!("malformed resolver response: {}", detail))
}

fn parse_attendee(value: Value) -> Result<Attendee> {
    serde_json::from_value(value).map_err(malformed)
}

fn take_attendee(map: &mut Map<String, Value>, key: &str) -> Result<Option<Attendee>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Object(_)) => parse_attendee(value).map(Some),
        Some(other) => Err(malformed(format!("'{}' is not an object: {}", key, other))),
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Normalize a lookup response body
///
/// A `qrCode` sibling is kept as an unresolved reference on the single match.
pub fn normalize_lookup(body: Value) -> Result<Resolution> {
    let mut map = match body {
        Value::Object(map) => map,
        other => return Err(malformed(format!("expected an object, got {}", other))),
    };

    let correction = match map.get("corrected").and_then(Value::as_bool) {
        Some(true) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    let qr_reference = take_string(&mut map, "qrCode");
    let has_singular_key = map.contains_key("attendee");

    let resolution = if let Some(list) = map.remove("attendees") {
        let attendees: Vec<Attendee> = match list {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .map(parse_attendee)
                .collect::<Result<_>>()?,
            other => return Err(malformed(format!("'attendees' is not an array: {}", other))),
        };
        if attendees.is_empty() {
            match take_attendee(&mut map, "attendee")? {
                Some(attendee) => Resolution::single(attendee),
                None => Resolution::NotFound,
            }
        } else {
            Resolution::from_candidates(attendees)
        }
    } else if let Some(attendee) = take_attendee(&mut map, "attendee")? {
        Resolution::single(attendee)
    } else if map.contains_key("success") || map.contains_key("data") {
        let success = map.get("success").and_then(Value::as_bool).unwrap_or(true);
        match take_attendee(&mut map, "data")? {
            Some(attendee) if success => Resolution::single(attendee),
            _ => Resolution::NotFound,
        }
    } else if map.contains_key("id") {
        Resolution::single(parse_attendee(Value::Object(map))?)
    } else if has_singular_key {
        // `attendee: null` with nothing else to go on
        Resolution::NotFound
    } else {
        return Err(malformed("unrecognised response shape"));
    };

    Ok(match resolution {
        Resolution::SingleMatch(mut single) => {
            single.correction = correction;
            single.qr_reference = qr_reference;
            Resolution::SingleMatch(single)
        }
        other => other,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactBody {
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    attendee: Option<Attendee>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// Normalize an artifact response into (QR reference, fresher attendee)
pub fn normalize_artifact(body: Value) -> Result<(String, Option<Attendee>)> {
    let body: ArtifactBody = serde_json::from_value(body).map_err(malformed)?;

    if body.success == Some(false) {
        return Err(KioskError::Transient(
            body.message
                .unwrap_or_else(|| "Failed to generate QR code".to_string()),
        ));
    }

    match body.qr_code {
        Some(reference) if !reference.trim().is_empty() => Ok((reference, body.attendee)),
        _ => Err(malformed("artifact response has no qrCode")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(id: &str) -> Value {
        json!({ "id": id, "fullName": format!("NAME {}", id), "mobile": "9876543210" })
    }

    fn ids(resolution: &Resolution) -> Vec<String> {
        match resolution {
            Resolution::MultipleMatches(list) => list
                .as_slice()
                .iter()
                .map(|a| a.id.to_string())
                .collect(),
            Resolution::SingleMatch(single) => vec![single.attendee.id.to_string()],
            Resolution::NotFound => vec![],
        }
    }

    #[test]
    fn test_single_element_array_collapses() {
        let n = normalize_lookup(json!({ "attendees": [candidate("a1")] })).unwrap();
        assert!(matches!(n, Resolution::SingleMatch(_)));
        assert_eq!(ids(&n), vec!["a1"]);
    }

    #[test]
    fn test_empty_array_without_singular_is_not_found() {
        let n = normalize_lookup(json!({ "attendees": [] })).unwrap();
        assert_eq!(n, Resolution::NotFound);

        let n = normalize_lookup(json!({ "attendees": null, "attendee": null })).unwrap();
        assert_eq!(n, Resolution::NotFound);
    }

    #[test]
    fn test_empty_array_falls_back_to_singular() {
        let n = normalize_lookup(json!({ "attendees": [], "attendee": candidate("a9") })).unwrap();
        assert_eq!(ids(&n), vec!["a9"]);
    }

    #[test]
    fn test_multiple_preserves_order() {
        let n = normalize_lookup(json!({
            "attendees": [candidate("z"), candidate("a"), candidate("m")]
        }))
        .unwrap();
        assert!(matches!(n, Resolution::MultipleMatches(_)));
        assert_eq!(ids(&n), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_singular_with_correction_and_qr() {
        let n = normalize_lookup(json!({
            "attendee": candidate("a1"),
            "corrected": true,
            "message": "Your confirmation number was updated to YC-0203",
            "qrCode": "data:image/png;base64,AAAA"
        }))
        .unwrap();
        match n {
            Resolution::SingleMatch(single) => {
                assert_eq!(
                    single.correction.as_deref(),
                    Some("Your confirmation number was updated to YC-0203")
                );
                assert_eq!(
                    single.qr_reference.as_deref(),
                    Some("data:image/png;base64,AAAA")
                );
            }
            other => panic!("expected single match, got {:?}", other),
        }
    }

    #[test]
    fn test_uncorrected_message_is_not_a_correction() {
        let n = normalize_lookup(json!({
            "attendee": candidate("a1"),
            "corrected": false,
            "message": "Verified"
        }))
        .unwrap();
        match n {
            Resolution::SingleMatch(single) => assert!(single.correction.is_none()),
            other => panic!("expected single match, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_wrapped_shape() {
        let n = normalize_lookup(json!({ "success": true, "data": candidate("L1") })).unwrap();
        assert_eq!(ids(&n), vec!["L1"]);

        let n = normalize_lookup(json!({ "success": false, "message": "Failed to fetch attendee" }))
            .unwrap();
        assert_eq!(n, Resolution::NotFound);

        let n = normalize_lookup(json!({ "success": true, "data": null })).unwrap();
        assert_eq!(n, Resolution::NotFound);
    }

    #[test]
    fn test_qr_reference_only_rides_on_single_match() {
        let n = normalize_lookup(json!({
            "attendees": [candidate("a"), candidate("b")],
            "qrCode": "/static/qr/a.png"
        }))
        .unwrap();
        assert!(matches!(n, Resolution::MultipleMatches(_)));

        let n = normalize_lookup(json!({ "attendee": candidate("a"), "qrCode": "  " })).unwrap();
        match n {
            Resolution::SingleMatch(single) => assert!(single.qr_reference.is_none()),
            other => panic!("expected single match, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_attendee() {
        let n = normalize_lookup(candidate("b1")).unwrap();
        assert_eq!(ids(&n), vec!["b1"]);
    }

    #[test]
    fn test_malformed_shapes_are_transient() {
        for body in [
            json!([candidate("a")]),
            json!({ "status": "ok" }),
            json!({ "attendees": "a1" }),
            json!({ "attendees": [{ "fullName": "NO ID" }] }),
        ] {
            let err = normalize_lookup(body.clone()).unwrap_err();
            assert!(matches!(err, KioskError::Transient(_)), "{} -> {:?}", body, err);
        }
    }

    #[test]
    fn test_artifact_shapes() {
        let (reference, attendee) = normalize_artifact(json!({
            "qrCode": "data:image/png;base64,AAAA",
            "attendee": candidate("a1")
        }))
        .unwrap();
        assert_eq!(reference, "data:image/png;base64,AAAA");
        assert_eq!(attendee.unwrap().id.as_str(), "a1");

        let (_, attendee) =
            normalize_artifact(json!({ "success": true, "qrCode": "https://cdn/qr.png" })).unwrap();
        assert!(attendee.is_none());

        assert!(matches!(
            normalize_artifact(json!({ "success": false })),
            Err(KioskError::Transient(_))
        ));
        assert!(matches!(
            normalize_artifact(json!({ "attendee": candidate("a1") })),
            Err(KioskError::Transient(_))
        ));
    }
}
