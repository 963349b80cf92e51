//! Configuration types for capture, assembly and upload.
//!
//! Every knob lives in [`CaptureConfig`], built via its
//! [`CaptureConfigBuilder`]. The builder clamps numeric setters into their
//! valid range; `build()` rejects combinations that cannot work (no endpoint
//! for an uploading sink, a non-HTTP endpoint, a zero timeout).

use crate::error::ScanError;
use crate::progress::FlushProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a capture session.
///
/// # Example
/// ```rust
/// use edgequake_scan2pdf::{CaptureConfig, SinkKind};
///
/// let config = CaptureConfig::builder()
///     .endpoint("https://uploads.example.com/scan")
///     .sink(SinkKind::PerPage)
///     .monochrome(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CaptureConfig {
    /// Upload endpoint (HTTP or HTTPS). Required for every uploading sink.
    pub endpoint: Option<String>,

    /// Which transport strategy flushes the queue. Default: [`SinkKind::Document`].
    pub sink: SinkKind,

    /// Block flushes until a valid 13-digit identity is supplied. Default: true.
    pub require_identity: bool,

    /// Document type attached to captures that do not carry their own.
    pub default_document_type: Option<String>,

    /// Convert captures to pure black and white before queueing. Default: false.
    pub monochrome: bool,

    /// Luma cut-off for the monochrome filter; pixels at or above it turn white. Default: 128.
    pub monochrome_threshold: u8,

    /// JPEG quality used for page images embedded in the PDF. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Page margin in millimetres around the image on the A4 page. Default: 10.
    pub margin_mm: f32,

    /// Date rendering in artifact file names. Default: [`DateStyle::DayMonthYear`].
    pub date_style: DateStyle,

    /// Per-request upload timeout in seconds. Default: 60.
    pub upload_timeout_secs: u64,

    /// What to do after a recoverable transport failure. Default: one attempt, no retry.
    pub retry: RetryPolicy,

    /// Interval between connectivity probes when waiting to come back online. Default: 15.
    pub probe_interval_secs: u64,

    /// Optional per-page progress events during a flush.
    pub progress_callback: Option<Arc<dyn FlushProgressCallback>>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            sink: SinkKind::default(),
            require_identity: true,
            default_document_type: None,
            monochrome: false,
            monochrome_threshold: 128,
            jpeg_quality: 90,
            margin_mm: 10.0,
            date_style: DateStyle::default(),
            upload_timeout_secs: 60,
            retry: RetryPolicy::default(),
            probe_interval_secs: 15,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("endpoint", &self.endpoint)
            .field("sink", &self.sink)
            .field("require_identity", &self.require_identity)
            .field("default_document_type", &self.default_document_type)
            .field("monochrome", &self.monochrome)
            .field("monochrome_threshold", &self.monochrome_threshold)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("margin_mm", &self.margin_mm)
            .field("date_style", &self.date_style)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("retry", &self.retry)
            .field("probe_interval_secs", &self.probe_interval_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn FlushProgressCallback>"),
            )
            .finish()
    }
}

impl CaptureConfig {
    /// Create a new builder for `CaptureConfig`.
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CaptureConfig`].
#[derive(Debug)]
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn sink(mut self, kind: SinkKind) -> Self {
        self.config.sink = kind;
        self
    }

    pub fn require_identity(mut self, v: bool) -> Self {
        self.config.require_identity = v;
        self
    }

    pub fn default_document_type(mut self, t: impl Into<String>) -> Self {
        self.config.default_document_type = Some(t.into());
        self
    }

    pub fn monochrome(mut self, v: bool) -> Self {
        self.config.monochrome = v;
        self
    }

    pub fn monochrome_threshold(mut self, t: u8) -> Self {
        self.config.monochrome_threshold = t;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn margin_mm(mut self, mm: f32) -> Self {
        self.config.margin_mm = mm.clamp(0.0, 50.0);
        self
    }

    pub fn date_style(mut self, style: DateStyle) -> Self {
        self.config.date_style = style;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn probe_interval_secs(mut self, secs: u64) -> Self {
        self.config.probe_interval_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn FlushProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CaptureConfig, ScanError> {
        let c = &self.config;
        if let Some(ref url) = c.endpoint {
            if !is_http_url(url) {
                return Err(ScanError::InvalidConfig(format!(
                    "Endpoint must be an HTTP or HTTPS URL, got '{url}'"
                )));
            }
        }
        if c.upload_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "Upload timeout must be ≥ 1 second".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(ScanError::InvalidConfig(
                "Retry policy needs at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Transport strategy used to flush the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SinkKind {
    /// One multipart request carrying the whole assembled PDF. (default)
    #[default]
    Document,
    /// One multipart request per page image; partial progress is kept.
    PerPage,
    /// The PDF as a base64 form field alongside the metadata fields.
    Fields(FieldEncoding),
}

/// Body encoding used by [`SinkKind::Fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldEncoding {
    /// `application/x-www-form-urlencoded` (default)
    #[default]
    UrlEncoded,
    /// A flat JSON object with the same keys.
    Json,
}

/// How the date part of an artifact name is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateStyle {
    /// `16-10-2026` (default)
    #[default]
    DayMonthYear,
    /// `2026-10-16`
    Iso,
}

/// Retry policy for recoverable transport failures.
///
/// The default makes a single attempt: recovery is left to a manual retry or
/// to the next offline → online transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first. Minimum 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further attempt.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    /// Delay to wait before `attempt` (0-based). Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> std::time::Duration {
        if attempt == 0 {
            return std::time::Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        std::time::Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}
