//! Capture sources: where page frames come from.
//!
//! A camera driver is out of scope; the pipeline only needs "give me the
//! next still frame". [`FileSource`] plays that role for image files on
//! disk, in the order given (choosing the files is the device selection).

use crate::error::ScanError;
use crate::page::CapturedPage;
use crate::pipeline::{encode, filter};
use image::DynamicImage;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::debug;

/// One still frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub document_type: Option<String>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            document_type: None,
        }
    }

    /// Apply the optional monochrome transform and encode for the queue.
    ///
    /// `monochrome` is the luma threshold to apply, if any.
    pub fn into_page_payload(self, monochrome: Option<u8>) -> Result<CapturedPage, ScanError> {
        let image = match monochrome {
            Some(threshold) => filter::monochrome(&self.image, threshold),
            None => self.image,
        };
        let payload = encode::encode_png(&image).map_err(|e| ScanError::Image {
            page: 0,
            detail: e.to_string(),
        })?;
        Ok(CapturedPage {
            payload,
            document_type: self.document_type,
        })
    }
}

/// Supplies frames one at a time.
pub trait CaptureSource {
    /// The next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, ScanError>;
}

/// Frames read from image files, in order.
#[derive(Debug)]
pub struct FileSource {
    paths: VecDeque<PathBuf>,
    document_type: Option<String>,
}

impl FileSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            document_type: None,
        }
    }

    /// Tag every frame from this source with a document type.
    pub fn with_document_type(mut self, document_type: Option<String>) -> Self {
        self.document_type = document_type;
        self
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl CaptureSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path).map_err(|e| ScanError::CaptureFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        debug!(
            "Captured {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Some(Frame {
            image,
            document_type: self.document_type.clone(),
        }))
    }
}
