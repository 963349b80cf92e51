//! # edgequake-scan2pdf
//!
//! Capture document pages, queue them locally, and upload them as one PDF
//! (or page by page) when the network allows.
//!
//! ## Why this crate?
//!
//! Field capture happens where connectivity is worst. Pages must never be
//! lost because an upload failed: this crate keeps every capture in an
//! ordered queue (optionally mirrored to disk), flushes it as a single
//! A4 PDF named after the subject's 13-digit ID number, and only forgets a
//! page once the server has confirmed it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! frame
//!  │
//!  ├─ 1. Capture   read a still frame (files stand in for a camera)
//!  ├─ 2. Filter    optional monochrome transform
//!  ├─ 3. Queue     append, persist to the page store
//!  ├─ 4. Assemble  snapshot → A4 PDF (lopdf) or one upload per page
//!  ├─ 5. Sink      multipart / form / JSON POST, response classified
//!  └─ 6. Settle    delivered pages leave the queue; failures stay queued
//! ```
//!
//! Flushes are triggered explicitly ([`Event::FlushRequested`]) or by the
//! connectivity monitor when the session comes back online with pages
//! waiting ([`Event::ConnectivityChanged`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scan2pdf::{sink, CaptureConfig, CapturedPage, Event, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaptureConfig::builder()
//!         .endpoint("https://uploads.example.com/scan")
//!         .build()?;
//!     let session = Session::new(&config, sink::from_config(&config)?);
//!
//!     session.dispatch(Event::IdentityEntered("1234567890123".into())).await?;
//!     session
//!         .dispatch(Event::PageCaptured(CapturedPage::new(std::fs::read("page1.png")?)))
//!         .await?;
//!     let outcome = session.dispatch(Event::FlushRequested).await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-scan2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod flush;
pub mod identity;
pub mod monitor;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod session;
pub mod sink;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capture::{CaptureSource, FileSource, Frame};
pub use config::{CaptureConfig, CaptureConfigBuilder, DateStyle, FieldEncoding, RetryPolicy, SinkKind};
pub use error::{ErrorClass, PageError, ScanError};
pub use export::{assemble_to_file, export_pages};
pub use flush::Flusher;
pub use identity::Identity;
pub use monitor::{Connectivity, ConnectivityMonitor, Transition};
pub use output::{EventOutcome, FlushOutcome, FlushReport};
pub use page::{CapturedPage, Page};
pub use progress::{FlushProgressCallback, NoopProgressCallback, ProgressCallback};
pub use queue::PageQueue;
pub use session::{Event, Session};
pub use sink::{Receipt, Sink};
pub use store::{JsonFileStore, MemoryStore, PageStore};
