//! Flushing: snapshot → assemble → send → update the queue.
//!
//! A [`Flusher`] owns one sink and enforces the single-flight rule: while a
//! flush is outstanding a second one is rejected with
//! [`ScanError::FlushInProgress`] instead of sending the same snapshot
//! twice. Appends are never blocked.
//!
//! ## Queue effects
//!
//! | Sink layout | Success | Failure |
//! |-------------|---------|---------|
//! | Document | flushed pages removed | queue untouched |
//! | Pages | each delivered page removed | failed pages stay, in order |
//!
//! ## Retry Strategy
//!
//! Recoverable failures are retried per request according to
//! [`RetryPolicy`]: `backoff_ms * 2^(attempt-1)` between attempts. The
//! default policy makes one attempt. Each attempt is bounded by the upload
//! timeout; hitting it counts as a recoverable failure.

use crate::config::{CaptureConfig, RetryPolicy};
use crate::error::{PageError, ScanError};
use crate::output::{FlushOutcome, FlushReport};
use crate::pipeline::assemble::{BatchArtifact, BatchAssembler, Upload};
use crate::progress::ProgressCallback;
use crate::queue::PageQueue;
use crate::sink::{Receipt, Sink};
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Drives flushes of a [`PageQueue`] into one [`Sink`].
pub struct Flusher {
    sink: Arc<dyn Sink>,
    assembler: BatchAssembler,
    retry: RetryPolicy,
    timeout: Duration,
    progress: Option<ProgressCallback>,
    in_flight: AtomicBool,
}

/// Releases the in-flight flag on drop, including on early return.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Flusher {
    pub fn new(sink: Arc<dyn Sink>, config: &CaptureConfig) -> Self {
        Self {
            sink,
            assembler: BatchAssembler::from_config(config),
            retry: config.retry,
            timeout: Duration::from_secs(config.upload_timeout_secs),
            progress: config.progress_callback.clone(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// True while a flush is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Flush the current contents of `queue`.
    ///
    /// An empty queue is a no-op: `Ok` with [`FlushOutcome::Empty`] and no
    /// request.
    ///
    /// # Errors
    /// * [`ScanError::FlushInProgress`] — another flush is outstanding
    /// * validation errors — identity missing or malformed; queue untouched
    /// * transport errors — queue untouched (document sinks) or every page
    ///   failed (per-page sink)
    pub async fn flush(
        &self,
        queue: &PageQueue,
        identity: Option<&str>,
    ) -> Result<FlushReport, ScanError> {
        let _guard = InFlight::acquire(&self.in_flight).ok_or_else(|| {
            ScanError::FlushInProgress {
                sink: self.sink.name().to_string(),
            }
        })?;

        let start = Instant::now();
        let snapshot = queue.snapshot();
        if snapshot.is_empty() {
            info!("No pages to upload");
            return Ok(FlushReport::empty());
        }

        let artifact = match self.assembler.build(
            &snapshot,
            identity,
            self.sink.layout(),
            Local::now().naive_local(),
        ) {
            Ok(a) => a,
            Err(ScanError::EmptyBatch) => return Ok(FlushReport::empty()),
            Err(e) => return Err(e),
        };

        info!(
            "Flushing {} page(s) via '{}' sink",
            artifact.page_count(),
            self.sink.name()
        );

        let mut report = match artifact {
            BatchArtifact::Document(ref upload) => self.flush_document(queue, upload).await?,
            BatchArtifact::Pages(ref uploads) => self.flush_pages(queue, uploads).await?,
        };
        report.remaining = queue.len();
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Flush complete: {} page(s) delivered, {} still queued, {}ms",
            report.delivered_pages(),
            report.remaining,
            report.duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_flush_complete(report.delivered_pages(), report.remaining);
        }
        Ok(report)
    }

    async fn flush_document(
        &self,
        queue: &PageQueue,
        upload: &Upload,
    ) -> Result<FlushReport, ScanError> {
        if let Some(ref cb) = self.progress {
            cb.on_flush_start(1);
            cb.on_page_start(1, 1);
        }

        match self.send_with_retry(upload).await {
            Ok((receipt, attempts)) => {
                let removed = queue.clear_flushed(&upload.page_ids);
                info!(
                    "Uploaded '{}' in {} attempt(s); removed {} page(s) from queue",
                    upload.file_name, attempts, removed
                );
                if let Some(ref cb) = self.progress {
                    cb.on_page_complete(1, 1, upload.bytes.len());
                }
                Ok(FlushReport {
                    outcome: FlushOutcome::Delivered,
                    file_names: vec![upload.file_name.clone()],
                    delivered_ids: upload.page_ids.clone(),
                    failures: Vec::new(),
                    urls: receipt.url.into_iter().collect(),
                    remaining: 0,
                    duration_ms: 0,
                })
            }
            Err((e, attempts)) => {
                warn!(
                    "Upload of '{}' failed after {} attempt(s): {}",
                    upload.file_name, attempts, e
                );
                if let Some(ref cb) = self.progress {
                    cb.on_page_error(1, 1, &e.to_string());
                    cb.on_flush_complete(0, queue.len());
                }
                Err(e)
            }
        }
    }

    async fn flush_pages(
        &self,
        queue: &PageQueue,
        uploads: &[Upload],
    ) -> Result<FlushReport, ScanError> {
        let total = uploads.len();
        if let Some(ref cb) = self.progress {
            cb.on_flush_start(total);
        }

        let mut report = FlushReport {
            outcome: FlushOutcome::Delivered,
            ..FlushReport::empty()
        };
        let mut first_error: Option<ScanError> = None;

        for (i, upload) in uploads.iter().enumerate() {
            let ordinal = i + 1;
            if let Some(ref cb) = self.progress {
                cb.on_page_start(ordinal, total);
            }

            match self.send_with_retry(upload).await {
                Ok((receipt, attempts)) => {
                    debug!("'{}' delivered in {} attempt(s)", upload.file_name, attempts);
                    for &id in &upload.page_ids {
                        queue.remove_id(id);
                    }
                    report.delivered_ids.extend_from_slice(&upload.page_ids);
                    report.file_names.push(upload.file_name.clone());
                    report.urls.extend(receipt.url);
                    if let Some(ref cb) = self.progress {
                        cb.on_page_complete(ordinal, total, upload.bytes.len());
                    }
                }
                Err((e, attempts)) => {
                    warn!("Page {}/{} failed: {}", ordinal, total, e);
                    if let Some(ref cb) = self.progress {
                        cb.on_page_error(ordinal, total, &e.to_string());
                    }
                    for &id in &upload.page_ids {
                        report
                            .failures
                            .push(PageError::from_scan_error(ordinal, id, attempts, &e));
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if report.delivered_ids.is_empty() => {
                if let Some(ref cb) = self.progress {
                    cb.on_flush_complete(0, queue.len());
                }
                Err(e)
            }
            Some(_) => {
                report.outcome = FlushOutcome::Partial;
                Ok(report)
            }
            None => Ok(report),
        }
    }

    /// Send one upload, retrying recoverable failures per the policy.
    ///
    /// Returns the receipt or the last error, each with the number of
    /// attempts actually made.
    async fn send_with_retry(
        &self,
        upload: &Upload,
    ) -> Result<(Receipt, u32), (ScanError, u32)> {
        let mut last_err: Option<ScanError> = None;
        let mut made = 0;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let backoff = self.retry.delay_before(attempt);
                warn!(
                    "'{}': retry {}/{} after {}ms",
                    upload.file_name,
                    attempt,
                    self.retry.max_attempts - 1,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            made = attempt + 1;
            let result = match timeout(self.timeout, self.sink.send(upload)).await {
                Ok(r) => r,
                Err(_) => Err(ScanError::UploadTimeout {
                    secs: self.timeout.as_secs(),
                }),
            };

            match result {
                Ok(receipt) => return Ok((receipt, made)),
                Err(e) if e.is_recoverable() => last_err = Some(e),
                Err(e) => return Err((e, made)),
            }
        }

        let err =
            last_err.unwrap_or_else(|| ScanError::Internal("no upload attempt was made".into()));
        Err((err, made))
    }
}
