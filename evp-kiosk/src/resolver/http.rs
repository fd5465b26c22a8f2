//! HTTP resolver client
//!
//! Thin reqwest adapter: builds the request for each query shape, maps HTTP
//! status to the error taxonomy, and hands bodies to [`super::normalize`].
//! Lookups never download QR images; a reference from a lookup response is
//! materialized later through [`Resolver::fetch_qr`].

use async_trait::async_trait;
use evp_common::config::{EndpointConfig, ResolverConfig};
use evp_common::query::mask_mobile;
use evp_common::{AttendeeId, LookupQuery, QrArtifact, Resolution};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::normalize::{normalize_artifact, normalize_lookup};
use super::{ArtifactSnapshot, Resolver};
use crate::error::{KioskError, Result};
use crate::qr::{decode_data_url, is_data_url};

const USER_AGENT: &str = concat!("evp-kiosk/", env!("CARGO_PKG_VERSION"));

/// Longest error body excerpt kept in a Transient message
const ERROR_EXCERPT_CHARS: usize = 200;

/// Resolver backend over HTTP
pub struct HttpResolver {
    http_client: reqwest::Client,
    base_url: String,
    endpoints: EndpointConfig,
}

impl HttpResolver {
    /// Create a client for the configured backend
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| KioskError::Transient(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn lookup_request(&self, query: &LookupQuery) -> RequestBuilder {
        match query {
            LookupQuery::Mobile { mobile } => self
                .http_client
                .get(self.url(&self.endpoints.by_mobile.replace("{mobile}", mobile))),
            LookupQuery::MobileIdentifier { mobile, identifier } => self
                .http_client
                .post(self.url(&self.endpoints.verify))
                .json(&json!({ "mobile": mobile, "identifier": identifier })),
            LookupQuery::MobileName { mobile, name } => self
                .http_client
                .post(self.url(&self.endpoints.verify))
                .json(&json!({ "mobile": mobile, "name": name })),
            LookupQuery::NameMobile { full_name, mobile } => self
                .http_client
                .post(self.url(&self.endpoints.qr_by_name_mobile))
                .json(&json!({ "fullName": full_name, "mobile": mobile })),
            LookupQuery::Confirmation {
                confirmation_number,
            } => self
                .http_client
                .post(self.url(&self.endpoints.qr_by_confirmation))
                .json(&json!({ "confirmationNumber": confirmation_number })),
            LookupQuery::FreeText { query } => self
                .http_client
                .get(self.url(&self.endpoints.search))
                .query(&[("query", query.as_str())]),
        }
    }

    /// Send a request and return its JSON body
    ///
    /// 404 → NotFound, any other non-2xx or network fault → Transient.
    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| KioskError::Transient(format!("{} request failed: {}", what, e)))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(KioskError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let excerpt: String = error_text.chars().take(ERROR_EXCERPT_CHARS).collect();
            return Err(KioskError::Transient(format!(
                "{} returned HTTP {}: {}",
                what,
                status.as_u16(),
                excerpt
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| KioskError::Transient(format!("{} returned malformed body: {}", what, e)))
    }

    /// Turn a QR reference into image bytes
    async fn materialize(&self, reference: &str) -> Result<QrArtifact> {
        let png = if is_data_url(reference) {
            decode_data_url(reference)?
        } else {
            let url = self.url(reference.trim());
            debug!(url = %url, "Downloading resolver QR image");

            let response = self
                .http_client
                .get(&url)
                .send()
                .await
                .map_err(|e| KioskError::Transient(format!("QR download failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(KioskError::Transient(format!(
                    "QR download returned HTTP {}",
                    status.as_u16()
                )));
            }

            response
                .bytes()
                .await
                .map_err(|e| KioskError::Transient(format!("QR download interrupted: {}", e)))?
                .to_vec()
        };

        if png.is_empty() {
            return Err(KioskError::Transient("resolver QR image is empty".to_string()));
        }

        Ok(QrArtifact {
            payload: None,
            reference: reference.to_string(),
            png,
        })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, query: &LookupQuery) -> Result<Resolution> {
        let masked = query.mobile().map(mask_mobile).unwrap_or_default();
        info!(shape = query.shape(), mobile = %masked, "Resolving attendee");

        let body = match self.send_json(self.lookup_request(query), "lookup").await {
            Ok(body) => body,
            Err(KioskError::NotFound(_)) => {
                info!(shape = query.shape(), "Resolver reported no match");
                return Err(KioskError::NotFound(format!(
                    "no attendee matches this {}",
                    query.shape()
                )));
            }
            Err(e) => {
                warn!(shape = query.shape(), error = %e, "Lookup failed");
                return Err(e);
            }
        };

        let resolution = normalize_lookup(body)?;
        info!(outcome = resolution.kind(), "Lookup resolved");
        Ok(resolution)
    }

    async fn fetch_artifact(&self, attendee_id: &AttendeeId) -> Result<ArtifactSnapshot> {
        let path = self.endpoints.artifact.replace("{id}", attendee_id.as_str());
        debug!(attendee_id = %attendee_id, "Fetching QR artifact");

        let body = match self
            .send_json(self.http_client.post(self.url(&path)), "artifact")
            .await
        {
            Ok(body) => body,
            Err(KioskError::NotFound(_)) => {
                return Err(KioskError::NotFound(format!("attendee {}", attendee_id)));
            }
            Err(e) => {
                warn!(attendee_id = %attendee_id, error = %e, "Artifact fetch failed");
                return Err(e);
            }
        };

        let (reference, attendee) = normalize_artifact(body)?;
        let qr = self.materialize(&reference).await?;

        info!(
            attendee_id = %attendee_id,
            refreshed = attendee.is_some(),
            png_bytes = qr.png.len(),
            "QR artifact fetched"
        );
        Ok(ArtifactSnapshot { qr, attendee })
    }

    async fn fetch_qr(&self, reference: &str) -> Result<QrArtifact> {
        let qr = self.materialize(reference).await.map_err(|e| {
            warn!(error = %e, "Resolver QR unavailable");
            e
        })?;
        debug!(png_bytes = qr.png.len(), "Resolver QR materialized");
        Ok(qr)
    }
}
