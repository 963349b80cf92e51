//! Batch assembly: queue snapshot → transmissible artifact.
//!
//! The assembler never touches the queue. It receives a snapshot, checks it
//! (empty → [`ScanError::EmptyBatch`], bad identity → validation error, both
//! before any encoding work) and produces either one PDF or one upload per
//! page, always in queue order.
//!
//! ## Page geometry
//!
//! Every page is A4 portrait. The image is placed at the top-left margin,
//! scaled to the full printable width and shrunk further only if it would
//! run off the bottom of the page, preserving its aspect ratio.

use crate::config::{CaptureConfig, DateStyle, SinkKind};
use crate::error::ScanError;
use crate::identity::{self, Identity};
use crate::page::Page;
use crate::pipeline::encode::{self, JpegPage};
use crate::pipeline::naming;
use chrono::NaiveDateTime;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::{debug, info};

/// A4 width in PDF points.
pub const A4_WIDTH_PT: f32 = 595.28;
/// A4 height in PDF points.
pub const A4_HEIGHT_PT: f32 = 841.89;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// One request's worth of payload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub identity: Option<Identity>,
    pub document_type: Option<String>,
    /// Queue ids of the pages this upload carries, in page order.
    pub page_ids: Vec<u64>,
}

/// What a flush transmits.
#[derive(Debug, Clone)]
pub enum BatchArtifact {
    /// All pages in one PDF.
    Document(Upload),
    /// One upload per page, in queue order.
    Pages(Vec<Upload>),
}

impl BatchArtifact {
    /// Every upload in transmission order.
    pub fn uploads(&self) -> &[Upload] {
        match self {
            BatchArtifact::Document(u) => std::slice::from_ref(u),
            BatchArtifact::Pages(us) => us,
        }
    }

    /// Queue ids of every page carried, in page order.
    pub fn page_ids(&self) -> Vec<u64> {
        self.uploads()
            .iter()
            .flat_map(|u| u.page_ids.iter().copied())
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.uploads().iter().map(|u| u.page_ids.len()).sum()
    }
}

/// Shape of the artifact to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLayout {
    /// A single multi-page PDF.
    Document,
    /// The raw page images, one upload each.
    Pages,
}

impl From<SinkKind> for ArtifactLayout {
    fn from(kind: SinkKind) -> Self {
        match kind {
            SinkKind::PerPage => ArtifactLayout::Pages,
            SinkKind::Document | SinkKind::Fields(_) => ArtifactLayout::Document,
        }
    }
}

/// Builds [`BatchArtifact`]s from queue snapshots.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    jpeg_quality: u8,
    margin_mm: f32,
    date_style: DateStyle,
    require_identity: bool,
}

impl Default for BatchAssembler {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

impl BatchAssembler {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            margin_mm: config.margin_mm,
            date_style: config.date_style,
            require_identity: config.require_identity,
        }
    }

    /// Assemble `snapshot` into an artifact.
    ///
    /// Deterministic for the same snapshot, identity, layout and `at`.
    ///
    /// # Errors
    /// * [`ScanError::EmptyBatch`] — the snapshot is empty
    /// * [`ScanError::InvalidIdentity`] / [`ScanError::IdentityRequired`]
    /// * [`ScanError::Image`] / [`ScanError::Assembly`] — encoding failed
    pub fn build(
        &self,
        snapshot: &[Page],
        identity_input: Option<&str>,
        layout: ArtifactLayout,
        at: NaiveDateTime,
    ) -> Result<BatchArtifact, ScanError> {
        if snapshot.is_empty() {
            return Err(ScanError::EmptyBatch);
        }
        let identity = identity::resolve(identity_input, self.require_identity)?;

        match layout {
            ArtifactLayout::Document => self
                .build_document(snapshot, identity, at)
                .map(BatchArtifact::Document),
            ArtifactLayout::Pages => Ok(BatchArtifact::Pages(
                self.build_pages(snapshot, identity.as_ref(), at),
            )),
        }
    }

    fn build_document(
        &self,
        snapshot: &[Page],
        identity: Option<Identity>,
        at: NaiveDateTime,
    ) -> Result<Upload, ScanError> {
        let mut jpegs = Vec::with_capacity(snapshot.len());
        for (i, page) in snapshot.iter().enumerate() {
            debug!("Adding page {} (id {}) to PDF", i + 1, page.id());
            let jpeg = encode::payload_to_jpeg(page.payload(), self.jpeg_quality).map_err(|e| {
                ScanError::Image {
                    page: i + 1,
                    detail: e.to_string(),
                }
            })?;
            jpegs.push(jpeg);
        }

        let bytes = build_pdf(&jpegs, self.margin_mm)?;
        let file_name = naming::artifact_name(identity.as_ref(), at, self.date_style, "pdf");
        info!(
            "Assembled {} pages into '{}' ({} bytes)",
            snapshot.len(),
            file_name,
            bytes.len()
        );

        Ok(Upload {
            file_name,
            mime_type: "application/pdf",
            bytes,
            identity,
            document_type: combined_document_type(snapshot),
            page_ids: snapshot.iter().map(Page::id).collect(),
        })
    }

    fn build_pages(
        &self,
        snapshot: &[Page],
        identity: Option<&Identity>,
        at: NaiveDateTime,
    ) -> Vec<Upload> {
        snapshot
            .iter()
            .enumerate()
            .map(|(i, page)| Upload {
                file_name: naming::page_name(identity, at, self.date_style, i + 1, page.extension()),
                mime_type: page.mime_type(),
                bytes: page.payload().to_vec(),
                identity: identity.cloned(),
                document_type: page.document_type().map(str::to_string),
                page_ids: vec![page.id()],
            })
            .collect()
    }
}

/// Distinct document types of the snapshot, in first-seen order, comma-joined.
fn combined_document_type(snapshot: &[Page]) -> Option<String> {
    let mut seen: Vec<&str> = Vec::new();
    for t in snapshot.iter().filter_map(Page::document_type) {
        if !seen.contains(&t) {
            seen.push(t);
        }
    }
    if seen.is_empty() {
        None
    } else {
        Some(seen.join(","))
    }
}

/// Placement of an image on an A4 page: `(x, y, width, height)` in points.
pub fn place_on_a4(img_w: u32, img_h: u32, margin_mm: f32) -> (f32, f32, f32, f32) {
    let margin = margin_mm * PT_PER_MM;
    let avail_w = A4_WIDTH_PT - 2.0 * margin;
    let avail_h = A4_HEIGHT_PT - 2.0 * margin;
    let (iw, ih) = (img_w.max(1) as f32, img_h.max(1) as f32);
    let scale = (avail_w / iw).min(avail_h / ih);
    let (w, h) = (iw * scale, ih * scale);
    (margin, A4_HEIGHT_PT - margin - h, w, h)
}

/// Write a PDF with one A4 page per image.
fn build_pdf(pages: &[JpegPage], margin_mm: f32) -> Result<Vec<u8>, ScanError> {
    let assembly = |e: lopdf::Error| ScanError::Assembly(e.to_string());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for jpeg in pages {
        let color_space = if jpeg.grayscale { "DeviceGray" } else { "DeviceRGB" };
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => jpeg.width as i64,
                "Height" => jpeg.height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.bytes.clone(),
        ));

        let (x, y, w, h) = place_on_a4(jpeg.width, jpeg.height, margin_mm);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().map_err(assembly)?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), A4_WIDTH_PT.into(), A4_HEIGHT_PT.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| ScanError::Assembly(e.to_string()))?;
    Ok(buf)
}
