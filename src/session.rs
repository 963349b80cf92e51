//! The capture session: one entry point for every event.
//!
//! A [`Session`] owns the page queue, the flusher for the configured sink,
//! the connectivity monitor and the local store. Hosts feed it [`Event`]s
//! through [`Session::dispatch`] and get back an [`EventOutcome`] or a
//! [`ScanError`]; nothing here is fatal, and every error leaves the queue in
//! a state that can be retried.
//!
//! ```text
//! PageCaptured ──► queue.append ──► store.put
//! FlushRequested ─► (offline? Deferred) ─► Flusher::flush ─► store.remove
//! ConnectivityChanged ─► monitor ─► Offline→Online && queued > 0 ─► flush once
//! ClearRequested ─► queue.clear ──► store.clear
//! ```

use crate::capture::Frame;
use crate::config::CaptureConfig;
use crate::error::ScanError;
use crate::flush::Flusher;
use crate::identity::{self, Identity};
use crate::monitor::{should_flush, Connectivity, ConnectivityMonitor};
use crate::output::{EventOutcome, FlushReport};
use crate::page::CapturedPage;
use crate::queue::PageQueue;
use crate::sink::Sink;
use crate::store::{MemoryStore, PageStore};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Everything a host can tell the session.
#[derive(Debug, Clone)]
pub enum Event {
    /// A frame was captured and encoded.
    PageCaptured(CapturedPage),
    /// The user asked to upload now.
    FlushRequested,
    /// The platform reported a connectivity reading.
    ConnectivityChanged(Connectivity),
    /// Drop every queued page and the local store ("clear cache and data").
    ClearRequested,
    /// The user typed an ID number. An empty string clears it.
    IdentityEntered(String),
}

/// A running capture session.
pub struct Session {
    queue: Arc<PageQueue>,
    flusher: Option<Flusher>,
    monitor: Mutex<ConnectivityMonitor>,
    store: Arc<dyn PageStore>,
    /// Last identity entry as typed.
    identity: Mutex<Option<String>>,
    default_document_type: Option<String>,
    monochrome: Option<u8>,
}

impl Session {
    /// A fresh session with an empty queue and an in-memory store.
    pub fn new(config: &CaptureConfig, sink: Arc<dyn Sink>) -> Self {
        Self::assemble(
            config,
            Some(sink),
            Arc::new(MemoryStore::new()),
            PageQueue::new(),
        )
    }

    /// Open a session backed by `store`, restoring any pages it holds.
    pub async fn open(
        config: &CaptureConfig,
        sink: Arc<dyn Sink>,
        store: Arc<dyn PageStore>,
    ) -> Result<Self, ScanError> {
        let queue = Self::restore(store.as_ref()).await?;
        Ok(Self::assemble(config, Some(sink), store, queue))
    }

    /// Open a session with no upload sink: pages are queued, persisted and
    /// saved locally, and flush requests fail with [`ScanError::InvalidConfig`].
    pub async fn open_local(
        config: &CaptureConfig,
        store: Arc<dyn PageStore>,
    ) -> Result<Self, ScanError> {
        let queue = Self::restore(store.as_ref()).await?;
        Ok(Self::assemble(config, None, store, queue))
    }

    async fn restore(store: &dyn PageStore) -> Result<PageQueue, ScanError> {
        let pages = store.load().await?;
        if !pages.is_empty() {
            info!("Resuming with {} queued page(s)", pages.len());
        }
        Ok(PageQueue::restore(pages))
    }

    fn assemble(
        config: &CaptureConfig,
        sink: Option<Arc<dyn Sink>>,
        store: Arc<dyn PageStore>,
        queue: PageQueue,
    ) -> Self {
        Self {
            queue: Arc::new(queue),
            flusher: sink.map(|sink| Flusher::new(sink, config)),
            monitor: Mutex::new(ConnectivityMonitor::default()),
            store,
            identity: Mutex::new(None),
            default_document_type: config.default_document_type.clone(),
            monochrome: config.monochrome.then_some(config.monochrome_threshold),
        }
    }

    fn monitor(&self) -> MutexGuard<'_, ConnectivityMonitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn identity_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn queue(&self) -> &Arc<PageQueue> {
        &self.queue
    }

    pub fn flusher(&self) -> Option<&Flusher> {
        self.flusher.as_ref()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.monitor().state()
    }

    /// The entered identity, if it is valid.
    pub fn identity(&self) -> Option<Identity> {
        self.identity_slot()
            .as_deref()
            .and_then(|raw| Identity::parse(raw).ok())
    }

    /// Handle one event.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome, ScanError> {
        match event {
            Event::PageCaptured(captured) => self.capture(captured).await,
            Event::FlushRequested => {
                if !self.monitor().is_online() {
                    let queued = self.queue.len();
                    info!("Offline; deferring upload of {} page(s)", queued);
                    return Ok(EventOutcome::Deferred { queued });
                }
                self.flush().await.map(EventOutcome::Flushed)
            }
            Event::ConnectivityChanged(reading) => {
                let transition = self.monitor().observe(reading);
                if self.flusher.is_some() && should_flush(transition, self.queue.len()) {
                    info!("Back online with {} queued page(s); flushing", self.queue.len());
                    return self.flush().await.map(EventOutcome::Flushed);
                }
                Ok(EventOutcome::ConnectivityNoted {
                    online: reading == Connectivity::Online,
                })
            }
            Event::ClearRequested => {
                let removed = self.clear().await?;
                Ok(EventOutcome::Cleared { removed })
            }
            Event::IdentityEntered(raw) => {
                let parsed = identity::resolve(Some(raw.as_str()), false);
                // latest entry wins, even when rejected
                *self.identity_slot() = Some(raw).filter(|r| !r.trim().is_empty());
                let grouped = parsed?.as_ref().map(Identity::grouped);
                Ok(EventOutcome::IdentitySet { grouped })
            }
        }
    }

    /// Convert a frame with the configured filter and queue it.
    pub async fn capture_frame(&self, frame: Frame) -> Result<EventOutcome, ScanError> {
        let captured = frame.into_page_payload(self.monochrome)?;
        self.dispatch(Event::PageCaptured(captured)).await
    }

    async fn capture(&self, mut captured: CapturedPage) -> Result<EventOutcome, ScanError> {
        if captured.document_type.is_none() {
            captured.document_type = self.default_document_type.clone();
        }
        let page = self.queue.append(captured);
        if let Err(e) = self.store.put(&page).await {
            // keep queue and store in step
            self.queue.remove_id(page.id());
            warn!("Could not persist page {}: {}", page.id(), e);
            return Err(e);
        }
        Ok(EventOutcome::Queued {
            page_id: page.id(),
            queued: self.queue.len(),
        })
    }

    /// Flush now, regardless of the recorded connectivity.
    pub async fn flush(&self) -> Result<FlushReport, ScanError> {
        let flusher = self
            .flusher
            .as_ref()
            .ok_or_else(|| ScanError::InvalidConfig("no upload sink configured".into()))?;
        let entered = self.identity_slot().clone();
        let report = flusher.flush(&self.queue, entered.as_deref()).await?;
        if !report.delivered_ids.is_empty() {
            self.store.remove(&report.delivered_ids).await?;
            debug!("Dropped {} delivered page(s) from the store", report.delivered_ids.len());
        }
        Ok(report)
    }

    /// Empty the queue and the local store. Returns how many pages were dropped.
    pub async fn clear(&self) -> Result<usize, ScanError> {
        let removed = self.queue.clear();
        self.store.clear().await?;
        info!("Cleared {} queued page(s)", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assemble::{ArtifactLayout, Upload};
    use crate::error::ErrorClass;
    use crate::page::Page;
    use crate::sink::Receipt;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records every upload and answers with a fixed result.
    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }
        fn layout(&self) -> ArtifactLayout {
            ArtifactLayout::Document
        }
        async fn send(&self, _upload: &Upload) -> Result<Receipt, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ScanError::NetworkFailure {
                    endpoint: "test".into(),
                    detail: "unreachable".into(),
                })
            } else {
                Ok(Receipt::default())
            }
        }
    }

    /// Store whose writes can be made to fail.
    #[derive(Default)]
    struct BrokenStore {
        fail_put: bool,
        fail_remove: bool,
    }

    #[async_trait]
    impl PageStore for BrokenStore {
        async fn load(&self) -> Result<Vec<Page>, ScanError> {
            Ok(Vec::new())
        }
        async fn put(&self, _page: &Page) -> Result<(), ScanError> {
            if self.fail_put {
                return Err(ScanError::storage("pages.json", "disk full"));
            }
            Ok(())
        }
        async fn remove(&self, _ids: &[u64]) -> Result<(), ScanError> {
            if self.fail_remove {
                return Err(ScanError::storage("pages.json", "read-only"));
            }
            Ok(())
        }
        async fn clear(&self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig::builder()
            .require_identity(false)
            .default_document_type("receipt")
            .build()
            .unwrap()
    }

    fn png() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        crate::pipeline::encode::encode_png(&img).unwrap()
    }

    #[tokio::test]
    async fn captured_pages_get_default_document_type() {
        let session = Session::new(&config(), CountingSink::new(false));
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();
        let tagged = CapturedPage::new(png()).with_document_type("invoice");
        let out = session.dispatch(Event::PageCaptured(tagged)).await.unwrap();
        assert!(matches!(out, EventOutcome::Queued { page_id: 2, queued: 2 }));

        let pages = session.queue().snapshot();
        assert_eq!(pages[0].document_type(), Some("receipt"));
        assert_eq!(pages[1].document_type(), Some("invoice"));
    }

    #[tokio::test]
    async fn flush_request_while_offline_is_deferred() {
        let sink = CountingSink::new(false);
        let session = Session::new(&config(), sink.clone());
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();
        session
            .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
            .await
            .unwrap();

        let out = session.dispatch(Event::FlushRequested).await.unwrap();
        assert!(matches!(out, EventOutcome::Deferred { queued: 1 }));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn coming_online_flushes_once_when_pages_wait() {
        let sink = CountingSink::new(false);
        let session = Session::new(&config(), sink.clone());
        session
            .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
            .await
            .unwrap();
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();

        let out = session
            .dispatch(Event::ConnectivityChanged(Connectivity::Online))
            .await
            .unwrap();
        assert!(matches!(out, EventOutcome::Flushed(_)));
        // a repeated Online reading is not a transition
        session
            .dispatch(Event::ConnectivityChanged(Connectivity::Online))
            .await
            .unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(session.queue().is_empty());
    }

    #[tokio::test]
    async fn coming_online_with_empty_queue_does_nothing() {
        let sink = CountingSink::new(false);
        let session = Session::new(&config(), sink.clone());
        session
            .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
            .await
            .unwrap();
        let out = session
            .dispatch(Event::ConnectivityChanged(Connectivity::Online))
            .await
            .unwrap();
        assert!(matches!(out, EventOutcome::ConnectivityNoted { online: true }));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_flush_keeps_pages_in_store() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::open(&config(), CountingSink::new(true), store.clone())
            .await
            .unwrap();
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();

        let err = session.dispatch(Event::FlushRequested).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(session.queue().len(), 1);
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn identity_entry_is_validated() {
        let session = Session::new(&config(), CountingSink::new(false));
        let err = session
            .dispatch(Event::IdentityEntered("12345".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidIdentity { .. }));
        assert!(session.identity().is_none());

        let out = session
            .dispatch(Event::IdentityEntered("1234567890123".into()))
            .await
            .unwrap();
        match out {
            EventOutcome::IdentitySet { grouped } => {
                assert_eq!(grouped.as_deref(), Some("123456 7890 12 3"))
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        session
            .dispatch(Event::IdentityEntered(String::new()))
            .await
            .unwrap();
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn clear_empties_queue_and_store() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::open(&config(), CountingSink::new(false), store.clone())
            .await
            .unwrap();
        for _ in 0..3 {
            session
                .dispatch(Event::PageCaptured(CapturedPage::new(png())))
                .await
                .unwrap();
        }
        let out = session.dispatch(Event::ClearRequested).await.unwrap();
        assert!(matches!(out, EventOutcome::Cleared { removed: 3 }));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_restores_queue_and_continues_ids() {
        let store = Arc::new(MemoryStore::new());
        {
            let session = Session::open(&config(), CountingSink::new(true), store.clone())
                .await
                .unwrap();
            for _ in 0..2 {
                session
                    .dispatch(Event::PageCaptured(CapturedPage::new(png())))
                    .await
                    .unwrap();
            }
        }
        let session = Session::open(&config(), CountingSink::new(false), store)
            .await
            .unwrap();
        assert_eq!(session.queue().len(), 2);
        let out = session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();
        assert!(matches!(out, EventOutcome::Queued { page_id: 3, .. }));
    }

    #[tokio::test]
    async fn rejected_identity_replaces_previous_one() {
        let sink = CountingSink::new(false);
        let session = Session::new(&config(), sink.clone());
        session
            .dispatch(Event::IdentityEntered("1234567890123".into()))
            .await
            .unwrap();
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();
        assert!(session
            .dispatch(Event::IdentityEntered("12345".into()))
            .await
            .is_err());
        assert!(session.identity().is_none());

        let err = session.dispatch(Event::FlushRequested).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.queue().len(), 1);
    }

    #[tokio::test]
    async fn failed_store_write_aborts_capture() {
        let store = Arc::new(BrokenStore {
            fail_put: true,
            ..Default::default()
        });
        let session = Session::open(&config(), CountingSink::new(false), store)
            .await
            .unwrap();

        let err = session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Storage);
        assert!(session.queue().is_empty());
    }

    #[tokio::test]
    async fn failed_store_cleanup_after_delivery_is_reported() {
        let store = Arc::new(BrokenStore {
            fail_remove: true,
            ..Default::default()
        });
        let sink = CountingSink::new(false);
        let session = Session::open(&config(), sink.clone(), store)
            .await
            .unwrap();
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();

        let err = session.dispatch(Event::FlushRequested).await.unwrap_err();
        assert!(matches!(err, ScanError::Storage { .. }));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        // the server has the page; only the local mirror is stale
        assert!(session.queue().is_empty());
    }

    #[tokio::test]
    async fn local_session_queues_but_cannot_flush() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::open_local(&config(), store.clone()).await.unwrap();
        session
            .dispatch(Event::PageCaptured(CapturedPage::new(png())))
            .await
            .unwrap();
        assert!(session.flusher().is_none());
        assert_eq!(store.load().await.unwrap().len(), 1);

        let err = session.dispatch(Event::FlushRequested).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
        session
            .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
            .await
            .unwrap();
        let out = session
            .dispatch(Event::ConnectivityChanged(Connectivity::Online))
            .await
            .unwrap();
        assert!(matches!(out, EventOutcome::ConnectivityNoted { online: true }));
        assert_eq!(session.queue().len(), 1);
    }
}
