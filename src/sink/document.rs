//! Whole-document sink: one multipart POST carrying the assembled PDF.

use super::{multipart_form, HttpTarget, Receipt, Sink};
use crate::error::ScanError;
use crate::pipeline::assemble::{ArtifactLayout, Upload};
use async_trait::async_trait;
use tracing::info;

/// Posts the whole PDF in one request.
#[derive(Debug, Clone)]
pub struct DocumentSink {
    http: HttpTarget,
}

impl DocumentSink {
    pub fn new(http: HttpTarget) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Sink for DocumentSink {
    fn name(&self) -> &str {
        "document"
    }

    fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::Document
    }

    #[tracing::instrument(skip(self, upload), fields(file = %upload.file_name, bytes = upload.bytes.len()))]
    async fn send(&self, upload: &Upload) -> Result<Receipt, ScanError> {
        info!("Uploading document to {}", self.http.endpoint());
        let form = multipart_form(upload)?;
        self.http.execute(self.http.post().multipart(form)).await
    }
}
