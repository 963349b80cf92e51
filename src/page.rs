//! The captured page: an immutable encoded image plus its metadata.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// One captured page waiting to be uploaded.
///
/// The payload is shared behind an `Arc<[u8]>`: cloning a page (for a queue
/// snapshot, for the store) never copies the image and never allows it to
/// change.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    id: u64,
    payload: Arc<[u8]>,
    document_type: Option<String>,
    captured_at: DateTime<Utc>,
}

impl Page {
    /// Build a page. Ids are normally handed out by
    /// [`crate::queue::PageQueue::append`]; this constructor is for restoring
    /// persisted pages and for tests.
    pub fn new(
        id: u64,
        payload: impl Into<Arc<[u8]>>,
        document_type: Option<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payload: payload.into(),
            document_type,
            captured_at,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Encoded image bytes (PNG or JPEG).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn document_type(&self) -> Option<&str> {
        self.document_type.as_deref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// MIME type sniffed from the payload's magic bytes.
    pub fn mime_type(&self) -> &'static str {
        match image::guess_format(&self.payload) {
            Ok(image::ImageFormat::Png) => "image/png",
            Ok(image::ImageFormat::Jpeg) => "image/jpeg",
            _ => "application/octet-stream",
        }
    }

    /// File extension matching [`Page::mime_type`].
    pub fn extension(&self) -> &'static str {
        match self.mime_type() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            _ => "bin",
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("payload", &format_args!("<{} bytes>", self.payload.len()))
            .field("document_type", &self.document_type)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// A page that has been captured but not yet queued (no id yet).
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub payload: Vec<u8>,
    pub document_type: Option<String>,
}

impl CapturedPage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            document_type: None,
        }
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }
}
