//! HTTP resolver integration tests
//!
//! A local axum server on 127.0.0.1:0 plays the resolver backend.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use evp_common::config::{PortalConfig, QrSource, ResolverConfig};
use evp_common::{AttendeeId, EventBus, LookupMode, LookupQuery, PortalPhase, Resolution};
use evp_kiosk::qr::png_data_url;
use evp_kiosk::{
    DirectorySink, HttpResolver, KioskError, Notice, Portal, RasterCardSurface, Resolver,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

const TINY_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

fn rajesh() -> Value {
    json!({
        "id": "a1",
        "fullName": "RAJESH KAKKAD",
        "mobile": "9876543210",
        "confirmationNumber": "YC-0202",
        "role": "COACH",
        "isCheckedIn": null
    })
}

async fn verify(Json(body): Json<Value>) -> impl IntoResponse {
    match (body["mobile"].as_str(), body["identifier"].as_str()) {
        (Some("9876543210"), Some("YC-0202")) => {
            (StatusCode::OK, Json(json!({ "attendees": [rajesh()] })))
        }
        (Some("9876543210"), Some("YC-0999")) => (
            StatusCode::OK,
            Json(json!({
                "attendee": rajesh(),
                "qrCode": png_data_url(TINY_PNG),
                "corrected": true,
                "message": "Confirmation number corrected to YC-0202"
            })),
        ),
        (Some("9876543210"), Some("YC-0500")) => (
            StatusCode::OK,
            Json(json!({ "attendee": rajesh(), "qrCode": "/static/qr/missing.png" })),
        ),
        (Some("1111111111"), _) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "database unavailable" })),
        ),
        (Some("2222222222"), _) => (StatusCode::OK, Json(json!({ "attendees": [] }))),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
    }
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let query = params.get("query").cloned().unwrap_or_default();
    if query == "YC-0202" {
        Json(json!({
            "attendees": [
                { "id": "B", "fullName": "BALU", "mobile": "9876543211" },
                { "id": "A", "fullName": "ASHA", "mobile": "9876543212" }
            ]
        }))
    } else {
        Json(json!({ "success": false, "message": "Failed to fetch attendee" }))
    }
}

async fn by_confirmation(Json(body): Json<Value>) -> Json<Value> {
    let mut attendee = rajesh();
    attendee["confirmationNumber"] = body["confirmationNumber"].clone();
    Json(json!({ "success": true, "data": attendee, "qrCode": "/static/qr/a1.png" }))
}

async fn artifact(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "a1" => (
            StatusCode::OK,
            Json(json!({
                "qrCode": png_data_url(TINY_PNG),
                "attendee": {
                    "id": "a1",
                    "fullName": "RAJESH KAKKAD",
                    "mobile": "9876543210",
                    "isCheckedIn": true
                }
            })),
        ),
        "broken" => (StatusCode::OK, Json(json!({ "qrCode": "data:image/png;base64,@@" }))),
        _ => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn by_mobile(Path(mobile): Path<String>) -> Json<Value> {
    if mobile == "9876543210" {
        Json(json!({ "success": true, "data": rajesh() }))
    } else {
        Json(json!({ "success": false, "message": "Attendee not found" }))
    }
}

async fn static_qr() -> Vec<u8> {
    TINY_PNG.to_vec()
}

async fn missing_qr() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/attendees/verify", post(verify))
        .route("/attendees/search", get(search))
        .route("/attendees/mobile/:mobile", get(by_mobile))
        .route("/attendees/qrcode/by-confirmation", post(by_confirmation))
        .route("/attendees/:id/qrcode", post(artifact))
        .route("/static/qr/a1.png", get(static_qr))
        .route("/static/qr/missing.png", get(missing_qr));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: String) -> HttpResolver {
    HttpResolver::new(&ResolverConfig {
        base_url,
        timeout_secs: 5,
        ..ResolverConfig::default()
    })
    .unwrap()
}

fn verify_query(mobile: &str, identifier: &str) -> LookupQuery {
    LookupQuery::MobileIdentifier {
        mobile: mobile.into(),
        identifier: identifier.into(),
    }
}

#[tokio::test]
async fn test_single_element_array_resolves_to_single_match() {
    // Given: backend returning {attendees: [rajesh]}
    let resolver = client(spawn_backend().await);

    // When: verifying by mobile + confirmation number
    let resolution = resolver
        .resolve(&verify_query("9876543210", "YC-0202"))
        .await
        .unwrap();

    // Then: single match, no QR yet, no correction
    match resolution {
        Resolution::SingleMatch(single) => {
            assert_eq!(single.attendee.id.as_str(), "a1");
            assert_eq!(single.attendee.display_name(), "RAJESH KAKKAD");
            assert!(single.attendee.is_coach());
            assert!(!single.attendee.is_checked_in);
            assert!(single.qr_reference.is_none());
            assert!(single.correction.is_none());
        }
        other => panic!("expected single match, got {:?}", other),
    }
}

#[tokio::test]
async fn test_inline_qr_reference_and_correction() {
    let resolver = client(spawn_backend().await);

    let resolution = resolver
        .resolve(&verify_query("9876543210", "YC-0999"))
        .await
        .unwrap();

    let reference = match resolution {
        Resolution::SingleMatch(single) => {
            assert_eq!(
                single.correction.as_deref(),
                Some("Confirmation number corrected to YC-0202")
            );
            single.qr_reference.expect("inline QR reference")
        }
        other => panic!("expected single match, got {:?}", other),
    };

    let qr = resolver.fetch_qr(&reference).await.unwrap();
    assert_eq!(qr.png, TINY_PNG);
    assert!(!qr.is_local());
}

#[tokio::test]
async fn test_remote_qr_reference_is_downloaded() {
    // Given: legacy {success, data} shape with a relative qrCode URL
    let resolver = client(spawn_backend().await);

    let resolution = resolver
        .resolve(&LookupQuery::Confirmation {
            confirmation_number: "YC-0202".into(),
        })
        .await
        .unwrap();

    let reference = match resolution {
        Resolution::SingleMatch(single) => {
            assert_eq!(
                single.attendee.confirmation_number.as_deref(),
                Some("YC-0202")
            );
            single.qr_reference.expect("remote QR reference")
        }
        other => panic!("expected single match, got {:?}", other),
    };
    assert_eq!(reference, "/static/qr/a1.png");

    let qr = resolver.fetch_qr(&reference).await.unwrap();
    assert_eq!(qr.reference, "/static/qr/a1.png");
    assert_eq!(qr.png, TINY_PNG);
}

#[tokio::test]
async fn test_search_keeps_resolver_order() {
    let resolver = client(spawn_backend().await);

    let resolution = resolver
        .resolve(&LookupQuery::FreeText {
            query: "YC-0202".into(),
        })
        .await
        .unwrap();

    match resolution {
        Resolution::MultipleMatches(list) => {
            let ids: Vec<&str> = list.as_slice().iter().map(|a| a.id.as_str()).collect();
            assert_eq!(ids, vec!["B", "A"]);
        }
        other => panic!("expected multiple matches, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_shapes() {
    let resolver = client(spawn_backend().await);

    // HTTP 404
    let err = resolver
        .resolve(&verify_query("9876543210", "NOPE"))
        .await
        .unwrap_err();
    assert!(matches!(err, KioskError::NotFound(_)), "{:?}", err);

    // Empty array
    let resolution = resolver
        .resolve(&verify_query("2222222222", "YC-0202"))
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::NotFound);

    // Legacy success:false
    let resolution = resolver
        .resolve(&LookupQuery::FreeText {
            query: "ZZZ".into(),
        })
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::NotFound);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let resolver = client(spawn_backend().await);

    let err = resolver
        .resolve(&verify_query("1111111111", "YC-0202"))
        .await
        .unwrap_err();
    assert!(matches!(err, KioskError::Transient(_)), "{:?}", err);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_unreachable_backend_is_transient() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let resolver = client(format!("http://{}", addr));
    let err = resolver
        .resolve(&verify_query("9876543210", "YC-0202"))
        .await
        .unwrap_err();
    assert!(matches!(err, KioskError::Transient(_)), "{:?}", err);
}

#[tokio::test]
async fn test_fetch_artifact_returns_fresher_attendee() {
    let resolver = client(spawn_backend().await);

    let snapshot = resolver
        .fetch_artifact(&AttendeeId::new("a1"))
        .await
        .unwrap();
    assert_eq!(snapshot.qr.png, TINY_PNG);
    assert!(snapshot.attendee.unwrap().is_checked_in);

    let err = resolver
        .fetch_artifact(&AttendeeId::new("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, KioskError::NotFound(_)));

    let err = resolver
        .fetch_artifact(&AttendeeId::new("broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, KioskError::Transient(_)));
}

#[tokio::test]
async fn test_mobile_lookup_reads_legacy_wrapper() {
    let resolver = client(spawn_backend().await);

    let resolution = resolver
        .resolve(&LookupQuery::Mobile {
            mobile: "9876543210".into(),
        })
        .await
        .unwrap();
    match resolution {
        Resolution::SingleMatch(single) => assert_eq!(single.attendee.id.as_str(), "a1"),
        other => panic!("expected single match, got {:?}", other),
    }

    let resolution = resolver
        .resolve(&LookupQuery::Mobile {
            mobile: "9000000000".into(),
        })
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::NotFound);
}

#[tokio::test]
async fn test_broken_qr_reference_does_not_fail_lookup() {
    // Given: a lookup whose qrCode points at an image the backend cannot serve
    let resolver = client(spawn_backend().await);

    // When: resolving
    let resolution = resolver
        .resolve(&verify_query("9876543210", "YC-0500"))
        .await
        .unwrap();

    // Then: the attendee is resolved and only the QR download fails
    let reference = match resolution {
        Resolution::SingleMatch(single) => single.qr_reference.expect("QR reference"),
        other => panic!("expected single match, got {:?}", other),
    };
    let err = resolver.fetch_qr(&reference).await.unwrap_err();
    assert!(matches!(err, KioskError::Transient(_)), "{:?}", err);
    assert!(err.to_string().contains("500"));
}

fn http_portal(base_url: String, qr_source: QrSource, out: &TempDir) -> Portal {
    let mut config = PortalConfig::default();
    config.resolver.base_url = base_url;
    config.resolver.timeout_secs = 5;
    config.lookup.mode = LookupMode::Verify;
    config.lookup.qr_source = qr_source;
    config.export.output_dir = out.path().to_path_buf();

    let resolver = Arc::new(HttpResolver::new(&config.resolver).unwrap());
    let sink = Arc::new(DirectorySink::new(out.path().to_path_buf()));
    Portal::new(
        &config,
        resolver,
        Arc::new(RasterCardSurface::new()),
        sink,
        EventBus::new(32),
    )
}

#[tokio::test]
async fn test_local_mode_ignores_broken_resolver_qr() {
    let out = TempDir::new().unwrap();
    let mut portal = http_portal(spawn_backend().await, QrSource::Local, &out);

    let phase = portal
        .search(&verify_query("9876543210", "YC-0500"))
        .await
        .unwrap();

    assert_eq!(phase, PortalPhase::ArtifactReady);
    assert!(portal.session().qr().unwrap().is_local());
    assert!(portal.session().notice().is_none());
}

#[tokio::test]
async fn test_resolver_mode_broken_qr_is_an_artifact_failure() {
    let out = TempDir::new().unwrap();
    let mut portal = http_portal(spawn_backend().await, QrSource::Resolver, &out);

    let phase = portal
        .search(&verify_query("9876543210", "YC-0500"))
        .await
        .unwrap();

    assert_eq!(phase, PortalPhase::Resolved);
    assert_eq!(portal.session().attendee().unwrap().id.as_str(), "a1");
    assert!(matches!(
        portal.session().notice(),
        Some(Notice::ArtifactFailed { retryable: true, .. })
    ));
}
