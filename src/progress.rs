//! Progress-callback trait for flush events.
//!
//! Inject an [`Arc<dyn FlushProgressCallback>`] via
//! [`crate::config::CaptureConfigBuilder::progress_callback`] to receive
//! events as the queue is flushed. Whole-document sinks report a single
//! "page" (the assembled document); the per-page sink reports each page.
//!
//! # Example
//!
//! ```rust
//! use edgequake_scan2pdf::{CaptureConfig, FlushProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     delivered: AtomicUsize,
//! }
//!
//! impl FlushProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _ordinal: usize, _total: usize, _bytes: usize) {
//!         self.delivered.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { delivered: AtomicUsize::new(0) });
//! let config = CaptureConfig::builder()
//!     .progress_callback(cb as Arc<dyn FlushProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the flusher as it transmits the queue.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait FlushProgressCallback: Send + Sync {
    /// Called once before the first request of a flush.
    fn on_flush_start(&self, total_uploads: usize) {
        let _ = total_uploads;
    }

    /// Called just before an upload is sent (1-based ordinal).
    fn on_page_start(&self, ordinal: usize, total: usize) {
        let _ = (ordinal, total);
    }

    /// Called when an upload is accepted by the server.
    fn on_page_complete(&self, ordinal: usize, total: usize, bytes: usize) {
        let _ = (ordinal, total, bytes);
    }

    /// Called when an upload fails after all attempts.
    fn on_page_error(&self, ordinal: usize, total: usize, error: &str) {
        let _ = (ordinal, total, error);
    }

    /// Called once after every upload of the flush has been attempted.
    ///
    /// # Arguments
    /// * `delivered` — uploads the server accepted
    /// * `remaining` — pages still queued afterwards
    fn on_flush_complete(&self, delivered: usize, remaining: usize) {
        let _ = (delivered, remaining);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl FlushProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CaptureConfig`].
pub type ProgressCallback = Arc<dyn FlushProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        remaining: AtomicUsize,
    }

    impl FlushProgressCallback for TrackingCallback {
        fn on_page_start(&self, _ordinal: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _ordinal: usize, _total: usize, _bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _ordinal: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_flush_complete(&self, _delivered: usize, remaining: usize) {
            self.remaining.store(remaining, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_flush_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 42);
        cb.on_page_error(2, 3, "reset");
        cb.on_flush_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback::default();
        t.on_page_start(1, 2);
        t.on_page_complete(1, 2, 10);
        t.on_page_start(2, 2);
        t.on_page_error(2, 2, "timeout");
        t.on_flush_complete(1, 1);

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.remaining.load(Ordering::SeqCst), 1);
    }
}
