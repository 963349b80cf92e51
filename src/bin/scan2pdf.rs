//! CLI binary for edgequake-scan2pdf.
//!
//! A thin shim over the library crate: image files play the part of camera
//! frames, flags map to `CaptureConfig`, and every action goes through a
//! `Session`.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_scan2pdf::{
    assemble_to_file, export_pages, monitor, sink, CaptureConfig, CaptureSource, Connectivity,
    DateStyle, Event, EventOutcome, FieldEncoding, FileSource, FlushOutcome,
    FlushProgressCallback, FlushReport, JsonFileStore, MemoryStore, Page, PageStore,
    ProgressCallback, RetryPolicy, ScanError, Session, SinkKind,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per flush, one log line per upload.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl FlushProgressCallback for CliProgressCallback {
    fn on_flush_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} uploads  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("Uploading");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Uploading {total} file(s)…"))
        ));
    }

    fn on_page_start(&self, ordinal: usize, _total: usize) {
        self.bar.set_message(format!("upload {ordinal}"));
    }

    fn on_page_complete(&self, ordinal: usize, total: usize, bytes: usize) {
        self.bar.println(format!(
            "  {} Upload {:>3}/{:<3}  {}",
            green("✓"),
            ordinal,
            total,
            dim(&format!("{:.1} KiB", bytes as f64 / 1024.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, ordinal: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(['…']).collect()
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} Upload {:>3}/{:<3}  {}",
            red("✗"),
            ordinal,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_flush_complete(&self, delivered: usize, remaining: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.swap(0, Ordering::SeqCst);
        if remaining == 0 {
            eprintln!(
                "{} {} page(s) delivered",
                green("✔"),
                bold(&delivered.to_string())
            );
        } else {
            eprintln!(
                "{} {} page(s) delivered, {} still queued  ({} failed upload(s))",
                if delivered == 0 { red("✘") } else { cyan("⚠") },
                bold(&delivered.to_string()),
                red(&remaining.to_string()),
                failed,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Capture three pages and upload them as one PDF
  scan2pdf --endpoint https://uploads.example.com/scan --id 1234567890123 p1.jpg p2.jpg p3.jpg

  # Upload each page separately, black and white
  scan2pdf --sink per-page --monochrome --endpoint https://… --id 1234567890123 *.png

  # Post base64 fields (fileName, fileData) like a web form
  scan2pdf --sink form --endpoint https://script.example.com/exec --id 1234567890123 page.jpg

  # Keep a durable queue; retry until the network is back
  scan2pdf --store ~/.cache/scan2pdf/queue.json --wait-online --endpoint https://… --id … page.jpg

  # No upload: just save the PDF locally
  scan2pdf --no-identity --output scan.pdf page1.png page2.png

  # Drop everything that is still queued
  scan2pdf --store ~/.cache/scan2pdf/queue.json --clear

SINKS:
  document   one multipart POST with the assembled PDF (default)
  per-page   one multipart POST per page; failed pages stay queued
  form       URL-encoded fields: fileName, fileData (base64), mimeType, …
  json       the same fields as a JSON body

SERVER RESPONSE:
  Plain text "Success" (or an empty 2xx body) means delivered. JSON replies
  of the form {"success": true, "url": "…"} are also understood. 408, 429
  and 5xx are treated as temporary; any other refusal is final.

ENVIRONMENT VARIABLES:
  SCAN2PDF_ENDPOINT   Upload endpoint
  SCAN2PDF_ID         13-digit ID number
  SCAN2PDF_STORE      Queue file path
  RUST_LOG            Override log filtering (e.g. RUST_LOG=edgequake_scan2pdf=debug)
"#;

/// Capture document pages and upload them as a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "scan2pdf",
    version,
    about = "Queue captured pages and upload them as a PDF when online",
    long_about = "Queue captured document pages (image files stand in for camera frames), \
assemble them into an A4 PDF named after a 13-digit ID number, and upload it. Pages stay \
queued until the server confirms delivery.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files to capture, in page order.
    images: Vec<PathBuf>,

    /// Upload endpoint (HTTP or HTTPS URL).
    #[arg(long, env = "SCAN2PDF_ENDPOINT")]
    endpoint: Option<String>,

    /// How the batch is transmitted.
    #[arg(long, env = "SCAN2PDF_SINK", value_enum, default_value = "document")]
    sink: SinkArg,

    /// 13-digit ID number naming the artifact (spaces and dashes allowed).
    #[arg(long, env = "SCAN2PDF_ID")]
    id: Option<String>,

    /// Do not require an ID number; artifacts get a timestamped name instead.
    #[arg(long, env = "SCAN2PDF_NO_IDENTITY")]
    no_identity: bool,

    /// Document type recorded with each captured page.
    #[arg(long, env = "SCAN2PDF_DOC_TYPE")]
    doc_type: Option<String>,

    /// Convert captures to black and white.
    #[arg(long, env = "SCAN2PDF_MONOCHROME")]
    monochrome: bool,

    /// Luma threshold for --monochrome (0–255).
    #[arg(long, env = "SCAN2PDF_THRESHOLD", default_value_t = 128)]
    threshold: u8,

    /// JPEG quality of pages embedded in the PDF (1–100).
    #[arg(long, env = "SCAN2PDF_JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Date format in file names: dmy (dd-mm-yyyy) or iso (yyyy-mm-dd).
    #[arg(long, env = "SCAN2PDF_DATE_STYLE", value_enum, default_value = "dmy")]
    date_style: DateStyleArg,

    /// Persist the queue to this JSON file so captures survive restarts.
    #[arg(long, env = "SCAN2PDF_STORE")]
    store: Option<PathBuf>,

    /// Also save the assembled PDF to this file (or directory).
    #[arg(short, long, env = "SCAN2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Also save each queued page as an image file in this directory.
    #[arg(long, env = "SCAN2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Empty the queue (and the store) before capturing.
    #[arg(long)]
    clear: bool,

    /// On a temporary failure, wait for connectivity and retry.
    #[arg(long, env = "SCAN2PDF_WAIT_ONLINE")]
    wait_online: bool,

    /// Seconds between connectivity probes with --wait-online.
    #[arg(long, env = "SCAN2PDF_PROBE_INTERVAL", default_value_t = 15)]
    probe_interval: u64,

    /// Per-request upload timeout in seconds.
    #[arg(long, env = "SCAN2PDF_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Attempts per request on temporary failures.
    #[arg(long, env = "SCAN2PDF_MAX_ATTEMPTS", default_value_t = 1)]
    max_attempts: u32,

    /// Initial backoff between attempts in milliseconds (doubles each retry).
    #[arg(long, env = "SCAN2PDF_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Output a structured JSON summary instead of text.
    #[arg(long, env = "SCAN2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SinkArg {
    Document,
    PerPage,
    Form,
    Json,
}

impl From<SinkArg> for SinkKind {
    fn from(v: SinkArg) -> Self {
        match v {
            SinkArg::Document => SinkKind::Document,
            SinkArg::PerPage => SinkKind::PerPage,
            SinkArg::Form => SinkKind::Fields(FieldEncoding::UrlEncoded),
            SinkArg::Json => SinkKind::Fields(FieldEncoding::Json),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DateStyleArg {
    Dmy,
    Iso,
}

impl From<DateStyleArg> for DateStyle {
    fn from(v: DateStyleArg) -> Self {
        match v {
            DateStyleArg::Dmy => DateStyle::DayMonthYear,
            DateStyleArg::Iso => DateStyle::Iso,
        }
    }
}

/// What one run did, for `--json`.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    captured: usize,
    cleared: usize,
    saved: Vec<PathBuf>,
    flush: Option<FlushReport>,
    queued: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn FlushProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let store: Arc<dyn PageStore> = match cli.store {
        Some(ref path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let summary = match config.endpoint {
        Some(_) => run_upload(&cli, &config, store).await?,
        None => {
            if cli.output.is_none() && cli.output_dir.is_none() && !cli.clear {
                anyhow::bail!(
                    "Nothing to do: give --endpoint to upload, or --output / --output-dir to save locally"
                );
            }
            run_local(&cli, &config, store).await?
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary, show_progress);
    }

    Ok(())
}

/// Capture, save and flush through a [`Session`].
async fn run_upload(
    cli: &Cli,
    config: &CaptureConfig,
    store: Arc<dyn PageStore>,
) -> Result<RunSummary> {
    let sink = sink::from_config(config).context("Invalid upload configuration")?;
    let session = Session::open(config, sink, store)
        .await
        .context("Failed to open the page queue")?;
    let mut summary = RunSummary::default();
    queue_inputs(cli, &session, &mut summary).await?;

    let identity = session.identity();
    let identity = identity.as_ref().map(|i| i.as_str());
    summary.saved = save_local(cli, config, &session.queue().snapshot(), identity).await?;

    if !session.queue().is_empty() {
        summary.flush = Some(flush_until_settled(cli, config, &session).await?);
    }
    summary.queued = session.queue().len();
    Ok(summary)
}

/// Flush once; with `--wait-online`, treat temporary failures as going
/// offline and let the probe stream bring the session back.
async fn flush_until_settled(
    cli: &Cli,
    config: &CaptureConfig,
    session: &Session,
) -> Result<FlushReport> {
    let first = session.dispatch(Event::FlushRequested).await;
    let err = match first {
        Ok(EventOutcome::Flushed(report)) => return Ok(report),
        Ok(other) => anyhow::bail!("Unexpected flush outcome: {other:?}"),
        Err(e) if e.is_recoverable() && cli.wait_online => e,
        Err(e) => return Err(e).context("Upload failed"),
    };

    let endpoint = config
        .endpoint
        .clone()
        .context("Upload endpoint missing")?;
    if !cli.quiet {
        eprintln!(
            "{} {}  {}",
            cyan("⏸"),
            bold("Waiting for the network…"),
            dim(&err.to_string().lines().next().unwrap_or_default().to_string()),
        );
    }
    session
        .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
        .await?;

    let probes = monitor::probe_stream(
        reqwest::Client::new(),
        endpoint,
        Duration::from_secs(config.probe_interval_secs),
    );
    futures::pin_mut!(probes);

    while let Some(reading) = probes.next().await {
        match session.dispatch(Event::ConnectivityChanged(reading)).await {
            Ok(EventOutcome::Flushed(report)) => return Ok(report),
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {
                warn!("Still unable to upload: {}", e);
                session
                    .dispatch(Event::ConnectivityChanged(Connectivity::Offline))
                    .await?;
            }
            Err(e) => return Err(e).context("Upload failed"),
        }
    }
    Err(ScanError::Offline).context("Connectivity probe stopped")
}

/// Capture and save without uploading.
async fn run_local(
    cli: &Cli,
    config: &CaptureConfig,
    store: Arc<dyn PageStore>,
) -> Result<RunSummary> {
    let session = Session::open_local(config, store)
        .await
        .context("Failed to open the page queue")?;
    let mut summary = RunSummary::default();
    queue_inputs(cli, &session, &mut summary).await?;

    let identity = session.identity();
    let identity = identity.as_ref().map(|i| i.as_str());
    summary.saved = save_local(cli, config, &session.queue().snapshot(), identity).await?;
    summary.queued = session.queue().len();
    Ok(summary)
}

/// Apply `--clear` and `--id`, then queue every input image.
async fn queue_inputs(cli: &Cli, session: &Session, summary: &mut RunSummary) -> Result<()> {
    if cli.clear {
        if let EventOutcome::Cleared { removed } = session
            .dispatch(Event::ClearRequested)
            .await
            .context("Failed to clear the queue")?
        {
            summary.cleared = removed;
        }
    }
    if let Some(ref id) = cli.id {
        session
            .dispatch(Event::IdentityEntered(id.clone()))
            .await
            .context("Invalid ID number")?;
    }

    let mut source = FileSource::new(cli.images.clone());
    while let Some(frame) = source.next_frame().context("Capture failed")? {
        session
            .capture_frame(frame)
            .await
            .context("Failed to queue page")?;
        summary.captured += 1;
    }
    Ok(())
}

/// Honour `--output` and `--output-dir`.
async fn save_local(
    cli: &Cli,
    config: &CaptureConfig,
    pages: &[Page],
    identity: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::new();
    if pages.is_empty() {
        return Ok(saved);
    }
    if let Some(ref output) = cli.output {
        saved.push(
            assemble_to_file(pages, identity, output, config)
                .await
                .context("Failed to save PDF")?,
        );
    }
    if let Some(ref dir) = cli.output_dir {
        saved.extend(
            export_pages(pages, identity, dir, config)
                .await
                .context("Failed to save page images")?,
        );
    }
    Ok(saved)
}

fn print_summary(summary: &RunSummary, show_progress: bool) {
    if summary.cleared > 0 {
        eprintln!("{} cleared {} queued page(s)", dim("•"), summary.cleared);
    }
    for path in &summary.saved {
        eprintln!("{} saved  →  {}", green("✔"), bold(&path.display().to_string()));
    }
    if let Some(ref report) = summary.flush {
        // the progress callback already printed the per-upload lines
        if !show_progress {
            match report.outcome {
                FlushOutcome::Empty => eprintln!("No pages to upload"),
                FlushOutcome::Delivered => eprintln!(
                    "Delivered {} page(s) in {}ms",
                    report.delivered_pages(),
                    report.duration_ms
                ),
                FlushOutcome::Partial => eprintln!(
                    "Delivered {} page(s); {} failed and stay queued",
                    report.delivered_pages(),
                    report.failures.len()
                ),
            }
        }
        for name in &report.file_names {
            eprintln!("   {}", dim(name));
        }
        for url in &report.urls {
            eprintln!("   {}", cyan(url));
        }
        for failure in &report.failures {
            eprintln!("   {} {}", red("✗"), failure);
        }
    }
    if summary.queued > 0 {
        eprintln!("{} {} page(s) queued", cyan("◆"), summary.queued);
    }
}

/// Map CLI args to `CaptureConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CaptureConfig> {
    let mut builder = CaptureConfig::builder()
        .sink(cli.sink.into())
        .require_identity(!cli.no_identity)
        .monochrome(cli.monochrome)
        .monochrome_threshold(cli.threshold)
        .jpeg_quality(cli.jpeg_quality)
        .date_style(cli.date_style.into())
        .upload_timeout_secs(cli.timeout)
        .retry(RetryPolicy::new(cli.max_attempts, cli.retry_backoff_ms))
        .probe_interval_secs(cli.probe_interval);

    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(ref doc_type) = cli.doc_type {
        builder = builder.default_document_type(doc_type.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
