//! Transport sinks: where a flushed batch goes.
//!
//! Every sink implements [`Sink`]: take one [`Upload`] (a whole document or a
//! single page) and report success or failure. The flusher decides what a
//! success means for the queue based on [`Sink::layout`]; sinks themselves
//! never see the queue.
//!
//! | Sink | Layout | Body |
//! |------|--------|------|
//! | [`DocumentSink`] | one PDF | multipart, `file` part + metadata fields |
//! | [`PerPageSink`]  | one request per page | multipart, `file` part + metadata fields |
//! | [`FieldSink`]    | one PDF | base64 `fileData` field, URL-encoded or JSON |
//!
//! ## Response contract
//!
//! Servers answer either with plain text (`Success` or an error message) or
//! with JSON `{ "success": bool, "url"?: string, "error"?: string }`.
//! [`interpret_response`] maps both, plus the HTTP status, onto
//! success / recoverable / terminal.

mod document;
mod fields;
mod per_page;

pub use document::DocumentSink;
pub use fields::FieldSink;
pub use per_page::PerPageSink;

use crate::config::{CaptureConfig, SinkKind};
use crate::error::ScanError;
use crate::pipeline::assemble::{ArtifactLayout, Upload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A transport strategy that accepts uploads.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Artifact shape this sink transmits.
    fn layout(&self) -> ArtifactLayout;

    /// Transmit one upload.
    ///
    /// # Errors
    /// Recoverable errors ([`ScanError::is_recoverable`]) for network-class
    /// failures; [`ScanError::UploadRejected`] when the server refuses the
    /// payload.
    async fn send(&self, upload: &Upload) -> Result<Receipt, ScanError>;
}

/// What the server said about an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Receipt {
    pub status: u16,
    /// Location of the stored file, when the server reports one.
    pub url: Option<String>,
}

/// JSON response shape.
#[derive(Debug, Deserialize)]
struct JsonReply {
    success: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Create the sink selected by `config.sink`.
pub fn from_config(config: &CaptureConfig) -> Result<Arc<dyn Sink>, ScanError> {
    let endpoint = config.endpoint.clone().ok_or_else(|| {
        ScanError::InvalidConfig("An upload endpoint is required (--endpoint <URL>)".into())
    })?;
    let http = HttpTarget::new(endpoint, config.upload_timeout_secs)?;
    let sink: Arc<dyn Sink> = match config.sink {
        SinkKind::Document => Arc::new(DocumentSink::new(http)),
        SinkKind::PerPage => Arc::new(PerPageSink::new(http)),
        SinkKind::Fields(encoding) => Arc::new(FieldSink::new(http, encoding)),
    };
    Ok(sink)
}

/// Endpoint + client shared by the HTTP sinks.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HttpTarget {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ScanError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self) -> reqwest::RequestBuilder {
        self.client.post(&self.endpoint)
    }

    /// Send a prepared request and interpret the reply.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Receipt, ScanError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(
            endpoint = %self.endpoint,
            status,
            response_len = body.len(),
            "Upload response"
        );
        interpret_response(&self.endpoint, status, &body)
    }

    fn transport_error(&self, e: reqwest::Error) -> ScanError {
        if e.is_timeout() {
            ScanError::UploadTimeout {
                secs: self.timeout_secs,
            }
        } else {
            ScanError::NetworkFailure {
                endpoint: self.endpoint.clone(),
                detail: e.to_string(),
            }
        }
    }
}

/// Classify a server reply.
///
/// * 408, 429 and 5xx → [`ScanError::ServerUnavailable`] (recoverable)
/// * other non-2xx → [`ScanError::UploadRejected`]
/// * 2xx with JSON `success: false`, an empty body, or a plain-text body
///   other than `Success` → [`ScanError::UploadRejected`]
/// * 2xx with `Success` or JSON `success: true` → [`Receipt`]
pub fn interpret_response(endpoint: &str, status: u16, body: &str) -> Result<Receipt, ScanError> {
    let text = body.trim();

    if status == 408 || status == 429 || (500..600).contains(&status) {
        return Err(ScanError::ServerUnavailable {
            endpoint: endpoint.to_string(),
            status,
            detail: truncate(text),
        });
    }
    if !(200..300).contains(&status) {
        return Err(ScanError::UploadRejected {
            status: Some(status),
            message: if text.is_empty() {
                format!("HTTP {status}")
            } else {
                truncate(text)
            },
        });
    }

    if text.starts_with('{') {
        if let Ok(reply) = serde_json::from_str::<JsonReply>(text) {
            return if reply.success {
                Ok(Receipt {
                    status,
                    url: reply.url,
                })
            } else {
                Err(ScanError::UploadRejected {
                    status: Some(status),
                    message: reply.error.unwrap_or_else(|| "upload refused".to_string()),
                })
            };
        }
    }

    if text == "Success" {
        Ok(Receipt { status, url: None })
    } else if text.is_empty() {
        Err(ScanError::UploadRejected {
            status: Some(status),
            message: "empty reply; delivery not confirmed".to_string(),
        })
    } else {
        Err(ScanError::UploadRejected {
            status: Some(status),
            message: truncate(text),
        })
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}\u{2026}")
    } else {
        text.to_string()
    }
}

/// Multipart form shared by the document and per-page sinks.
fn multipart_form(upload: &Upload) -> Result<reqwest::multipart::Form, ScanError> {
    let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
        .file_name(upload.file_name.clone())
        .mime_str(upload.mime_type)
        .map_err(|e| ScanError::Internal(format!("multipart: {e}")))?;

    let mut form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("fileName", upload.file_name.clone())
        .text("pageCount", upload.page_ids.len().to_string());
    if let Some(ref id) = upload.identity {
        form = form.text("idNumber", id.to_string());
    }
    if let Some(ref t) = upload.document_type {
        form = form.text("documentType", t.clone());
    }
    Ok(form)
}
