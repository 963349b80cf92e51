//! Capture → queue → flush integration tests against in-process sinks.
//!
//! No network: every sink here is a scripted stand-in that records what it
//! was asked to send. Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_scan2pdf::pipeline::assemble::{ArtifactLayout, Upload};
use edgequake_scan2pdf::pipeline::naming;
use edgequake_scan2pdf::{
    CaptureConfig, CapturedPage, Connectivity, DateStyle, ErrorClass, Event, EventOutcome,
    FlushOutcome, FlushReport, Identity, JsonFileStore, PageError, PageStore, Receipt, ScanError,
    Session, Sink,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

type Reply = Box<dyn Fn(&Upload) -> Result<Receipt, ScanError> + Send + Sync>;

/// Sink that records every upload and answers with `reply`.
struct ScriptedSink {
    layout: ArtifactLayout,
    reply: Reply,
    sent: Mutex<Vec<Upload>>,
}

impl ScriptedSink {
    fn new(layout: ArtifactLayout, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            layout,
            reply,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn accepting(layout: ArtifactLayout) -> Arc<Self> {
        Self::new(layout, Box::new(|_| Ok(Receipt::default())))
    }

    fn unreachable(layout: ArtifactLayout) -> Arc<Self> {
        Self::new(
            layout,
            Box::new(|_| {
                Err(ScanError::NetworkFailure {
                    endpoint: "http://upload.test".into(),
                    detail: "connection refused".into(),
                })
            }),
        )
    }

    fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn sent(&self) -> Vec<Upload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    fn layout(&self) -> ArtifactLayout {
        self.layout
    }

    async fn send(&self, upload: &Upload) -> Result<Receipt, ScanError> {
        self.sent.lock().unwrap().push(upload.clone());
        (self.reply)(upload)
    }
}

/// Route library logs to the test harness (`RUST_LOG=debug cargo test`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// PNG whose width identifies the page.
fn page_of_width(w: u32) -> CapturedPage {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, 12, Rgb([30, 90, 200])));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    CapturedPage::new(bytes)
}

fn anonymous() -> CaptureConfig {
    CaptureConfig::builder()
        .require_identity(false)
        .build()
        .unwrap()
}

async fn capture(session: &Session, widths: &[u32]) {
    for &w in widths {
        session
            .dispatch(Event::PageCaptured(page_of_width(w)))
            .await
            .unwrap();
    }
}

async fn flush(session: &Session) -> Result<FlushReport, ScanError> {
    match session.dispatch(Event::FlushRequested).await? {
        EventOutcome::Flushed(report) => Ok(report),
        other => panic!("expected a flush, got {other:?}"),
    }
}

/// Width of the image on each PDF page, in page order.
fn pdf_image_widths(bytes: &[u8]) -> Vec<i64> {
    let doc = lopdf::Document::load_mem(bytes).expect("valid PDF");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image_id = xobjects.get(b"Im1").unwrap().as_reference().unwrap();
            let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
            stream.dict.get(b"Width").unwrap().as_i64().unwrap()
        })
        .collect()
}

// ── Whole-document flush ─────────────────────────────────────────────────────

#[tokio::test]
async fn document_flush_sends_every_page_in_order_and_empties_queue() {
    init_tracing();
    let sink = ScriptedSink::accepting(ArtifactLayout::Document);
    let session = Session::new(&anonymous(), sink.clone());
    capture(&session, &[10, 20, 30, 40]).await;

    let report = flush(&session).await.unwrap();

    assert_eq!(report.outcome, FlushOutcome::Delivered);
    assert_eq!(report.delivered_ids, vec![1, 2, 3, 4]);
    assert_eq!(report.remaining, 0);
    assert!(session.queue().is_empty());

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].mime_type, "application/pdf");
    assert_eq!(pdf_image_widths(&sent[0].bytes), vec![10, 20, 30, 40]);
}

#[tokio::test]
async fn empty_queue_flush_makes_no_request() {
    let sink = ScriptedSink::accepting(ArtifactLayout::Document);
    let session = Session::new(&anonymous(), sink.clone());

    let report = flush(&session).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(sink.calls(), 0);
    assert!(session.queue().is_empty());
}

#[tokio::test]
async fn recoverable_failure_leaves_queue_untouched() {
    let sink = ScriptedSink::unreachable(ArtifactLayout::Document);
    let session = Session::new(&anonymous(), sink.clone());
    capture(&session, &[10, 20]).await;
    let before: Vec<u64> = session.queue().snapshot().iter().map(|p| p.id()).collect();

    let err = assert_err!(flush(&session).await);

    assert_eq!(err.class(), ErrorClass::Recoverable);
    let after: Vec<u64> = session.queue().snapshot().iter().map(|p| p.id()).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn terminal_rejection_leaves_queue_untouched() {
    let sink = ScriptedSink::new(
        ArtifactLayout::Document,
        Box::new(|_| {
            Err(ScanError::UploadRejected {
                status: Some(200),
                message: "Error: folder not found".into(),
            })
        }),
    );
    let session = Session::new(&anonymous(), sink);
    capture(&session, &[10]).await;

    let err = flush(&session).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Terminal);
    assert_eq!(session.queue().len(), 1);
}

#[tokio::test]
async fn retry_policy_retries_recoverable_failures() {
    let attempts = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&attempts);
    let sink = ScriptedSink::new(
        ArtifactLayout::Document,
        Box::new(move |_| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 3 {
                Err(ScanError::ServerUnavailable {
                    endpoint: "http://upload.test".into(),
                    status: 503,
                    detail: "busy".into(),
                })
            } else {
                Ok(Receipt::default())
            }
        }),
    );
    let config = CaptureConfig::builder()
        .require_identity(false)
        .retry(edgequake_scan2pdf::RetryPolicy::new(3, 1))
        .build()
        .unwrap();
    let session = Session::new(&config, sink.clone());
    capture(&session, &[10]).await;

    let report = flush(&session).await.unwrap();

    assert_eq!(report.outcome, FlushOutcome::Delivered);
    assert_eq!(*attempts.lock().unwrap(), 3);
    assert!(session.queue().is_empty());
}

// ── Per-page flush ───────────────────────────────────────────────────────────

#[tokio::test]
async fn per_page_partial_failure_keeps_only_failed_page() {
    init_tracing();
    // A, B, C queued; only B (width 20) fails
    let sink = ScriptedSink::new(
        ArtifactLayout::Pages,
        Box::new(|upload| {
            let width = image::load_from_memory(&upload.bytes).unwrap().width();
            if width == 20 {
                Err(ScanError::NetworkFailure {
                    endpoint: "http://upload.test".into(),
                    detail: "reset".into(),
                })
            } else {
                Ok(Receipt::default())
            }
        }),
    );
    let session = Session::new(&anonymous(), sink.clone());
    capture(&session, &[10, 20, 30]).await;

    let report = assert_ok!(flush(&session).await);

    assert_eq!(report.outcome, FlushOutcome::Partial);
    assert_eq!(report.delivered_ids, vec![1, 3]);
    assert_eq!(report.remaining, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0],
        PageError::UploadFailed { page: 2, id: 2, .. }
    ));

    let left = session.queue().snapshot();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id(), 2);
    assert_eq!(sink.calls(), 3);
}

#[tokio::test]
async fn per_page_total_failure_is_an_error() {
    let sink = ScriptedSink::unreachable(ArtifactLayout::Pages);
    let session = Session::new(&anonymous(), sink.clone());
    capture(&session, &[10, 20]).await;

    let err = flush(&session).await.unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(session.queue().len(), 2);
    assert_eq!(sink.calls(), 2);
}

// ── Identity ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn short_identity_blocks_flush_and_valid_one_permits_it() {
    let sink = ScriptedSink::accepting(ArtifactLayout::Document);
    let session = Session::new(&CaptureConfig::default(), sink.clone());
    capture(&session, &[10]).await;

    let err = session
        .dispatch(Event::IdentityEntered("12345".into()))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    let err = flush(&session).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidIdentity { .. }));
    assert_eq!(sink.calls(), 0);
    assert_eq!(session.queue().len(), 1);

    session
        .dispatch(Event::IdentityEntered("1234567890123".into()))
        .await
        .unwrap();
    let report = flush(&session).await.unwrap();

    assert_eq!(report.outcome, FlushOutcome::Delivered);
    let sent = sink.sent();
    assert!(sent[0].file_name.starts_with("1234567890123_"));
    assert_eq!(
        sent[0].identity.as_ref().map(Identity::as_str),
        Some("1234567890123")
    );
}

// ── Connectivity ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn coming_online_with_pages_flushes_exactly_once() {
    let sink = ScriptedSink::accepting(ArtifactLayout::Document);
    let session = Session::new(&anonymous(), sink.clone());
    session
        .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
        .await
        .unwrap();
    capture(&session, &[10, 20]).await;

    // explicit requests while offline are deferred
    let deferred = session.dispatch(Event::FlushRequested).await.unwrap();
    assert!(matches!(deferred, EventOutcome::Deferred { queued: 2 }));
    assert_eq!(sink.calls(), 0);

    let outcome = session
        .dispatch(Event::ConnectivityChanged(Connectivity::Online))
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Flushed(_)));
    assert_eq!(sink.calls(), 1);
    assert!(session.queue().is_empty());
}

#[tokio::test]
async fn coming_online_with_empty_queue_makes_no_request() {
    let sink = ScriptedSink::accepting(ArtifactLayout::Document);
    let session = Session::new(&anonymous(), sink.clone());
    session
        .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
        .await
        .unwrap();
    session
        .dispatch(Event::ConnectivityChanged(Connectivity::Online))
        .await
        .unwrap();
    assert_eq!(sink.calls(), 0);
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn queue_survives_restart_and_drains_on_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    {
        let store = Arc::new(JsonFileStore::new(&path));
        let session = Session::open(
            &anonymous(),
            ScriptedSink::unreachable(ArtifactLayout::Document),
            store,
        )
        .await
        .unwrap();
        capture(&session, &[10, 20]).await;
        assert!(flush(&session).await.is_err());
    }

    let store = Arc::new(JsonFileStore::new(&path));
    let sink = ScriptedSink::accepting(ArtifactLayout::Document);
    let session = Session::open(&anonymous(), sink.clone(), store.clone())
        .await
        .unwrap();
    assert_eq!(session.queue().len(), 2);

    flush(&session).await.unwrap();

    assert_eq!(pdf_image_widths(&sink.sent()[0].bytes), vec![10, 20]);
    assert!(store.load().await.unwrap().is_empty());
}

// ── Naming ───────────────────────────────────────────────────────────────────

#[test]
fn file_name_derivation_is_pure() {
    let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    let id = Identity::parse("1234567890123").unwrap();
    let a = naming::artifact_name(Some(&id), at, DateStyle::DayMonthYear, "pdf");
    let b = naming::artifact_name(Some(&id), at, DateStyle::DayMonthYear, "pdf");
    assert_eq!(a, "1234567890123_05-03-2024.pdf");
    assert_eq!(a, b);
}
