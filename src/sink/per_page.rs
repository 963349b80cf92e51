//! Per-page sink: one multipart POST per page image.
//!
//! The only sink with partial progress: the flusher removes each page as its
//! own request succeeds, so a failed run leaves exactly the failed pages.

use super::{multipart_form, HttpTarget, Receipt, Sink};
use crate::error::ScanError;
use crate::pipeline::assemble::{ArtifactLayout, Upload};
use async_trait::async_trait;
use tracing::debug;

/// Posts every page as its own request.
#[derive(Debug, Clone)]
pub struct PerPageSink {
    http: HttpTarget,
}

impl PerPageSink {
    pub fn new(http: HttpTarget) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Sink for PerPageSink {
    fn name(&self) -> &str {
        "per-page"
    }

    fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::Pages
    }

    async fn send(&self, upload: &Upload) -> Result<Receipt, ScanError> {
        debug!(
            "Uploading page '{}' ({} bytes) to {}",
            upload.file_name,
            upload.bytes.len(),
            self.http.endpoint()
        );
        let form = multipart_form(upload)?;
        self.http.execute(self.http.post().multipart(form)).await
    }
}
