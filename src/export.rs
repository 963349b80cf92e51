//! Saving batches locally instead of (or as well as) uploading them.
//!
//! Both entry points assemble exactly what a flush would send, then write it
//! with an atomic temp-file + rename so a crash never leaves half a PDF
//! behind. Neither touches the queue.

use crate::config::CaptureConfig;
use crate::error::ScanError;
use crate::page::Page;
use crate::pipeline::assemble::{ArtifactLayout, BatchArtifact, BatchAssembler, Upload};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

/// Assemble `pages` into one PDF and write it to `output`.
///
/// If `output` is an existing directory the derived file name
/// (`{id}_{date}.pdf`) is used inside it. Returns the written path.
///
/// # Errors
/// * [`ScanError::EmptyBatch`] — `pages` is empty
/// * identity and encoding errors, as for a flush
/// * [`ScanError::OutputWriteFailed`] — the file could not be written
pub async fn assemble_to_file(
    pages: &[Page],
    identity: Option<&str>,
    output: impl AsRef<Path>,
    config: &CaptureConfig,
) -> Result<PathBuf, ScanError> {
    let artifact = BatchAssembler::from_config(config).build(
        pages,
        identity,
        ArtifactLayout::Document,
        Local::now().naive_local(),
    )?;
    let upload = match artifact {
        BatchArtifact::Document(upload) => upload,
        BatchArtifact::Pages(_) => {
            return Err(ScanError::Internal("expected a single document".into()))
        }
    };

    let output = output.as_ref();
    let path = if tokio::fs::metadata(output)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        output.join(&upload.file_name)
    } else {
        output.to_path_buf()
    };

    write_atomic(&path, &upload.bytes).await?;
    info!("Saved {} page(s) to {}", pages.len(), path.display());
    Ok(path)
}

/// Write every page as its own image file under `dir`.
///
/// File names follow the per-page upload naming (`{id}_{date}_{n}.{ext}`).
pub async fn export_pages(
    pages: &[Page],
    identity: Option<&str>,
    dir: impl AsRef<Path>,
    config: &CaptureConfig,
) -> Result<Vec<PathBuf>, ScanError> {
    let artifact = BatchAssembler::from_config(config).build(
        pages,
        identity,
        ArtifactLayout::Pages,
        Local::now().naive_local(),
    )?;

    let dir = dir.as_ref();
    let mut written = Vec::with_capacity(artifact.page_count());
    for Upload {
        file_name, bytes, ..
    } in artifact.uploads()
    {
        let path = dir.join(file_name);
        write_atomic(&path, bytes).await?;
        written.push(path);
    }
    info!("Saved {} page image(s) under {}", written.len(), dir.display());
    Ok(written)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScanError> {
    let fail = |source| ScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
