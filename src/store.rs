//! Local persistence of queued pages.
//!
//! The queue itself lives in memory; a [`PageStore`] mirrors it so captures
//! survive a restart. Records have the shape `{ id, documentType, image }`,
//! keyed by the queue's auto-incrementing id. The store is emptied of pages
//! as soon as they are confirmed delivered.
//!
//! [`JsonFileStore`] keeps every record in one JSON file and rewrites it
//! atomically (temp file + rename) on each change, so a crash mid-write never
//! leaves a truncated queue behind.

use crate::error::ScanError;
use crate::page::Page;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Persistent mirror of the page queue.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Every stored page, ordered by id.
    async fn load(&self) -> Result<Vec<Page>, ScanError>;

    /// Store a newly queued page.
    async fn put(&self, page: &Page) -> Result<(), ScanError>;

    /// Forget delivered pages.
    async fn remove(&self, ids: &[u64]) -> Result<(), ScanError>;

    /// Forget everything.
    async fn clear(&self) -> Result<(), ScanError>;
}

/// One persisted page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPage {
    pub id: u64,
    #[serde(default)]
    pub document_type: Option<String>,
    /// Base64 of the encoded image.
    pub image: String,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl StoredPage {
    pub fn from_page(page: &Page) -> Self {
        Self {
            id: page.id(),
            document_type: page.document_type().map(str::to_string),
            image: STANDARD.encode(page.payload()),
            captured_at: page.captured_at(),
        }
    }

    pub fn into_page(self) -> Result<Page, base64::DecodeError> {
        let payload = STANDARD.decode(self.image.as_bytes())?;
        Ok(Page::new(
            self.id,
            payload,
            self.document_type,
            self.captured_at,
        ))
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Store that lives only as long as the process. The default.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: Mutex<Vec<Page>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Vec<Page>) -> R) -> R {
        let mut guard = self
            .pages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Page>, ScanError> {
        Ok(self.with(|pages| pages.clone()))
    }

    async fn put(&self, page: &Page) -> Result<(), ScanError> {
        self.with(|pages| pages.push(page.clone()));
        Ok(())
    }

    async fn remove(&self, ids: &[u64]) -> Result<(), ScanError> {
        self.with(|pages| pages.retain(|p| !ids.contains(&p.id())));
        Ok(())
    }

    async fn clear(&self) -> Result<(), ScanError> {
        self.with(Vec::clear);
        Ok(())
    }
}

// ── JSON file store ──────────────────────────────────────────────────────

/// Store backed by a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // serialises read-modify-write cycles
    lock: AsyncMutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: AsyncMutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<StoredPage>, ScanError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| ScanError::storage(&self.path, e))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ScanError::storage(&self.path, e)),
        }
    }

    async fn write_records(&self, records: &[StoredPage]) -> Result<(), ScanError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScanError::storage(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(records).map_err(|e| ScanError::storage(&self.path, e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| ScanError::storage(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ScanError::storage(&self.path, e))?;
        debug!("Persisted {} page(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl PageStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Page>, ScanError> {
        let _held = self.lock.lock().await;
        let mut records = self.read_records().await?;
        records.sort_by_key(|r| r.id);
        let pages = records
            .into_iter()
            .map(|r| {
                let id = r.id;
                r.into_page().map_err(|e| {
                    ScanError::storage(&self.path, format!("record {id}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!("Restored {} queued page(s) from {}", pages.len(), self.path.display());
        Ok(pages)
    }

    async fn put(&self, page: &Page) -> Result<(), ScanError> {
        let _held = self.lock.lock().await;
        let mut records = self.read_records().await?;
        records.retain(|r| r.id != page.id());
        records.push(StoredPage::from_page(page));
        self.write_records(&records).await
    }

    async fn remove(&self, ids: &[u64]) -> Result<(), ScanError> {
        let _held = self.lock.lock().await;
        let mut records = self.read_records().await?;
        records.retain(|r| !ids.contains(&r.id));
        self.write_records(&records).await
    }

    async fn clear(&self) -> Result<(), ScanError> {
        let _held = self.lock.lock().await;
        self.write_records(&[]).await
    }
}
