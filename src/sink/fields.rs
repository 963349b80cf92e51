//! Field-encoded sink: the PDF travels as a base64 form field.
//!
//! Script-hosted endpoints (spreadsheet macros, serverless form handlers)
//! often cannot read multipart file parts but can read plain fields. Same
//! semantics as the document sink, different wire encoding.

use super::{HttpTarget, Receipt, Sink};
use crate::config::FieldEncoding;
use crate::error::ScanError;
use crate::pipeline::assemble::{ArtifactLayout, Upload};
use crate::pipeline::encode::to_base64;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Body of a field-encoded upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPayload {
    pub file_name: String,
    pub file_data: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
}

impl FieldPayload {
    pub fn from_upload(upload: &Upload) -> Self {
        Self {
            file_name: upload.file_name.clone(),
            file_data: to_base64(&upload.bytes),
            mime_type: upload.mime_type.to_string(),
            id_number: upload.identity.as_ref().map(ToString::to_string),
            document_type: upload.document_type.clone(),
        }
    }
}

/// Posts the document as `fileName` / `fileData` fields.
#[derive(Debug, Clone)]
pub struct FieldSink {
    http: HttpTarget,
    encoding: FieldEncoding,
}

impl FieldSink {
    pub fn new(http: HttpTarget, encoding: FieldEncoding) -> Self {
        Self { http, encoding }
    }
}

#[async_trait]
impl Sink for FieldSink {
    fn name(&self) -> &str {
        match self.encoding {
            FieldEncoding::UrlEncoded => "form",
            FieldEncoding::Json => "json",
        }
    }

    fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::Document
    }

    async fn send(&self, upload: &Upload) -> Result<Receipt, ScanError> {
        let payload = FieldPayload::from_upload(upload);
        info!(
            "Uploading '{}' as {} fields ({} base64 chars)",
            payload.file_name,
            self.name(),
            payload.file_data.len()
        );
        let request = match self.encoding {
            FieldEncoding::UrlEncoded => self.http.post().form(&payload),
            FieldEncoding::Json => self.http.post().json(&payload),
        };
        self.http.execute(request).await
    }
}
