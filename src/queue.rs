//! The page queue: ordered pages awaiting transmission.
//!
//! Insertion order is page order in the uploaded document, so the queue only
//! ever grows at the back. Pages leave it through:
//!
//! * [`PageQueue::clear`] — explicit user clear, idempotent;
//! * [`PageQueue::clear_flushed`] — the pages a successful whole-document
//!   flush carried (captures appended during the flight are kept);
//! * [`PageQueue::remove_id`] — one page, after its own per-page upload
//!   succeeded;
//! * [`PageQueue::remove_at`] — one page by position.
//!
//! All mutation goes through one `Mutex`, so appends racing an in-flight
//! flush can neither reorder pages nor lose updates.

use crate::page::{CapturedPage, Page};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Ordered, thread-safe collection of captured pages.
#[derive(Debug)]
pub struct PageQueue {
    pages: Mutex<Vec<Page>>,
    next_id: AtomicU64,
}

impl Default for PageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PageQueue {
    /// An empty queue whose first page gets id 1.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Rebuild a queue from persisted pages, keeping their order and ids.
    ///
    /// New ids continue after the largest restored one.
    pub fn restore(pages: Vec<Page>) -> Self {
        let next = pages.iter().map(Page::id).max().unwrap_or(0) + 1;
        Self {
            pages: Mutex::new(pages),
            next_id: AtomicU64::new(next),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Page>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a captured page to the back of the queue and return it.
    pub fn append(&self, captured: CapturedPage) -> Page {
        // id handed out under the lock so id order == queue order
        let mut pages = self.lock();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let page = Page::new(id, captured.payload, captured.document_type, Utc::now());
        pages.push(page.clone());
        debug!("Queued page id={} (queue length {})", id, pages.len());
        page
    }

    /// Current contents, in order, without mutating the queue.
    pub fn snapshot(&self) -> Vec<Page> {
        self.lock().clone()
    }

    /// Remove every page. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut pages = self.lock();
        let n = pages.len();
        pages.clear();
        n
    }

    /// Remove the page with the given id, wherever it now sits.
    ///
    /// Positions shift as earlier pages leave, so the per-page flush resolves
    /// the ordinal under the same lock it removes with.
    pub fn remove_id(&self, id: u64) -> Option<Page> {
        let mut pages = self.lock();
        let ordinal = pages.iter().position(|p| p.id() == id)?;
        Some(pages.remove(ordinal))
    }

    /// Remove the page at `ordinal` (0-based position).
    pub fn remove_at(&self, ordinal: usize) -> Option<Page> {
        let mut pages = self.lock();
        (ordinal < pages.len()).then(|| pages.remove(ordinal))
    }

    /// Current position of the page with the given id.
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.lock().iter().position(|p| p.id() == id)
    }

    /// Remove exactly the pages a successful flush carried.
    ///
    /// When nothing was appended during the flight this empties the queue.
    pub fn clear_flushed(&self, ids: &[u64]) -> usize {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        let mut pages = self.lock();
        let before = pages.len();
        pages.retain(|p| !ids.contains(&p.id()));
        before - pages.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(tag: &str) -> CapturedPage {
        CapturedPage::new(tag.as_bytes().to_vec())
    }

    fn payloads(q: &PageQueue) -> Vec<String> {
        q.snapshot()
            .iter()
            .map(|p| String::from_utf8_lossy(p.payload()).into_owned())
            .collect()
    }

    #[test]
    fn append_preserves_order_and_assigns_ids() {
        let q = PageQueue::new();
        let a = q.append(page("A"));
        let b = q.append(page("B"));
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(payloads(&q), vec!["A", "B"]);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let q = PageQueue::new();
        q.append(page("A"));
        let snap = q.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let q = PageQueue::new();
        q.append(page("A"));
        q.append(page("B"));
        assert_eq!(q.clear(), 2);
        assert_eq!(q.clear(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_id_tracks_shifting_positions() {
        let q = PageQueue::new();
        let a = q.append(page("A"));
        let b = q.append(page("B"));
        let c = q.append(page("C"));
        assert_eq!(q.position_of(c.id()), Some(2));
        assert!(q.remove_id(a.id()).is_some());
        assert_eq!(q.position_of(c.id()), Some(1));
        assert!(q.remove_id(c.id()).is_some());
        assert_eq!(payloads(&q), vec!["B"]);
        assert!(q.remove_id(a.id()).is_none());
        assert_eq!(q.position_of(a.id()), None);
        assert_eq!(q.position_of(b.id()), Some(0));
    }

    #[test]
    fn remove_at_takes_one_page_by_position() {
        let q = PageQueue::new();
        q.append(page("A"));
        q.append(page("B"));
        q.append(page("C"));
        assert!(q.remove_at(3).is_none());
        assert_eq!(q.remove_at(1).map(|p| p.id()), Some(2));
        assert_eq!(payloads(&q), vec!["A", "C"]);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn clear_flushed_keeps_late_captures() {
        let q = PageQueue::new();
        let a = q.append(page("A"));
        let b = q.append(page("B"));
        // captured while the flush of A+B was in flight
        q.append(page("C"));
        assert_eq!(q.clear_flushed(&[a.id(), b.id()]), 2);
        assert_eq!(payloads(&q), vec!["C"]);
    }

    #[test]
    fn restore_continues_id_sequence() {
        let restored = vec![
            Page::new(4, b"A".to_vec(), None, Utc::now()),
            Page::new(9, b"B".to_vec(), None, Utc::now()),
        ];
        let q = PageQueue::restore(restored);
        let next = q.append(page("C"));
        assert_eq!(next.id(), 10);
        assert_eq!(payloads(&q), vec!["A", "B", "C"]);
    }
}
