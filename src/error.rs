//! Error types for the edgequake-scan2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScanError`] — an operation (capture, flush, clear) could not complete.
//!   Returned as `Err(ScanError)` from [`crate::session::Session::dispatch`]
//!   and the flush entry points. No variant is fatal to the process: every
//!   one leaves the queue in a state the user can retry from.
//!
//! * [`PageError`] — **Non-fatal**: a single page of a per-page flush was not
//!   delivered, but the others were. Stored inside
//!   [`crate::output::FlushReport`] so callers can see exactly which pages are
//!   still queued.
//!
//! [`ScanError::class`] folds the variants onto the five-way taxonomy the
//! pipeline reasons about (validation, empty batch, recoverable transport,
//! terminal transport, storage).

use std::path::PathBuf;
use thiserror::Error;

/// All operation-level errors returned by the edgequake-scan2pdf library.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The upload identity is not exactly 13 digits.
    #[error("Invalid ID number '{input}': expected exactly 13 digits, got {digits}.\nPlease enter a valid 13-digit ID number.")]
    InvalidIdentity { input: String, digits: usize },

    /// The configuration requires an identity and none was supplied.
    #[error("An ID number is required before uploading.\nProvide it with --id <13 DIGITS>.")]
    IdentityRequired,

    // ── Batch errors ──────────────────────────────────────────────────────
    /// Nothing is queued. Flush entry points treat this as a silent no-op.
    #[error("No pages to upload")]
    EmptyBatch,

    /// Another flush is already in flight on this sink.
    #[error("A flush is already in progress on sink '{sink}'")]
    FlushInProgress { sink: String },

    // ── Transport errors (recoverable) ────────────────────────────────────
    /// The request never got a response (DNS, connect, reset).
    #[error("Network error uploading to '{endpoint}': {detail}\nThe pages stay queued; they will be sent when you retry or come back online.")]
    NetworkFailure { endpoint: String, detail: String },

    /// The request did not complete within the configured timeout.
    #[error("Upload timed out after {secs}s\nThe pages stay queued for a later retry.")]
    UploadTimeout { secs: u64 },

    /// The server answered with a transient status (5xx, 408, 429).
    #[error("Server at '{endpoint}' is unavailable (HTTP {status}): {detail}")]
    ServerUnavailable {
        endpoint: String,
        status: u16,
        detail: String,
    },

    /// The client is offline; the flush was deferred.
    #[error("You are offline. Pages will be uploaded when you are back online.")]
    Offline,

    // ── Transport errors (terminal) ───────────────────────────────────────
    /// The server explicitly refused the payload.
    #[error("Server rejected the upload: {message}")]
    UploadRejected {
        status: Option<u16>,
        message: String,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Local persistence failed; the operation was aborted.
    #[error("Local storage error at '{path}': {detail}")]
    Storage { path: PathBuf, detail: String },

    // ── Image / assembly errors ───────────────────────────────────────────
    /// A frame or payload could not be decoded or encoded.
    #[error("Image error on page {page}: {detail}")]
    Image { page: usize, detail: String },

    /// The PDF library failed to build the document.
    #[error("PDF assembly failed: {0}")]
    Assembly(String),

    /// A capture source could not read a frame.
    #[error("Could not read frame from '{path}': {detail}")]
    CaptureFailed { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a locally saved artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The coarse failure classes a flush distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorClass {
    /// Bad identity; flush blocked before any work.
    Validation,
    /// Nothing to do.
    Empty,
    /// Network-class failure; the queue is retry-eligible.
    Recoverable,
    /// The server refused the payload; no automatic retry.
    Terminal,
    /// Local persistence failed.
    Storage,
    /// Everything else (config, image decoding, internal).
    Other,
}

impl ScanError {
    /// Map this error onto the flush failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            ScanError::InvalidIdentity { .. } | ScanError::IdentityRequired => {
                ErrorClass::Validation
            }
            ScanError::EmptyBatch => ErrorClass::Empty,
            ScanError::NetworkFailure { .. }
            | ScanError::UploadTimeout { .. }
            | ScanError::ServerUnavailable { .. }
            | ScanError::Offline => ErrorClass::Recoverable,
            ScanError::UploadRejected { .. } => ErrorClass::Terminal,
            ScanError::Storage { .. } => ErrorClass::Storage,
            _ => ErrorClass::Other,
        }
    }

    /// True when retrying the same flush later may succeed.
    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        ScanError::Storage {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal error for a single page of a per-page flush.
///
/// The page stays queued; the rest of the run continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The request for this page failed in a way a retry may fix.
    #[error("Page {page} (id {id}): upload failed after {attempts} attempt(s): {detail}")]
    UploadFailed {
        page: usize,
        id: u64,
        attempts: u32,
        detail: String,
    },

    /// The server refused this page.
    #[error("Page {page} (id {id}): rejected by server: {detail}")]
    Rejected { page: usize, id: u64, detail: String },

    /// The page payload could not be prepared for upload.
    #[error("Page {page} (id {id}): could not be prepared: {detail}")]
    Unreadable { page: usize, id: u64, detail: String },
}

impl PageError {
    /// Queue id of the page that failed.
    pub fn page_id(&self) -> u64 {
        match self {
            PageError::UploadFailed { id, .. }
            | PageError::Rejected { id, .. }
            | PageError::Unreadable { id, .. } => *id,
        }
    }

    pub(crate) fn from_scan_error(page: usize, id: u64, attempts: u32, err: &ScanError) -> Self {
        match err.class() {
            ErrorClass::Terminal => PageError::Rejected {
                page,
                id,
                detail: err.to_string(),
            },
            ErrorClass::Recoverable => PageError::UploadFailed {
                page,
                id,
                attempts,
                detail: err.to_string(),
            },
            _ => PageError::Unreadable {
                page,
                id,
                detail: err.to_string(),
            },
        }
    }
}
