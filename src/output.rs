//! Result types returned by flushes and event dispatch.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// How a flush ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushOutcome {
    /// Nothing was queued; no request was made.
    Empty,
    /// Every page of the snapshot was delivered.
    Delivered,
    /// Some pages were delivered; the failed ones are still queued.
    Partial,
}

/// Summary of one flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushReport {
    pub outcome: FlushOutcome,
    /// Name of every file the server accepted.
    pub file_names: Vec<String>,
    /// Queue ids that left the queue because they were delivered.
    pub delivered_ids: Vec<u64>,
    /// Pages that were not delivered (per-page sink only).
    pub failures: Vec<PageError>,
    /// Locations reported by the server, in upload order.
    pub urls: Vec<String>,
    /// Pages still queued after the flush.
    pub remaining: usize,
    pub duration_ms: u64,
}

impl FlushReport {
    /// Report for a flush that found nothing to send.
    pub fn empty() -> Self {
        Self {
            outcome: FlushOutcome::Empty,
            file_names: Vec::new(),
            delivered_ids: Vec::new(),
            failures: Vec::new(),
            urls: Vec::new(),
            remaining: 0,
            duration_ms: 0,
        }
    }

    pub fn delivered_pages(&self) -> usize {
        self.delivered_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcome == FlushOutcome::Empty
    }
}

/// What [`crate::session::Session::dispatch`] did with an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventOutcome {
    /// The page was appended; `queued` is the new queue length.
    Queued { page_id: u64, queued: usize },
    /// A flush ran.
    Flushed(FlushReport),
    /// The flush request arrived while offline; nothing was sent.
    Deferred { queued: usize },
    /// The queue (and local store) was emptied.
    Cleared { removed: usize },
    /// Connectivity was recorded; no flush was triggered.
    ConnectivityNoted { online: bool },
    /// The upload identity was accepted (`None` = cleared), shown grouped.
    IdentitySet { grouped: Option<String> },
}
