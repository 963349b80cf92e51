//! Image encoding for the two places pixels leave memory.
//!
//! * Queue payloads are PNG: lossless, so a page can be re-encoded later
//!   without generational loss.
//! * Pages embedded in the PDF are JPEG: PDF readers decode `DCTDecode`
//!   streams natively, so the JPEG bytes go into the file unchanged.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a frame as PNG bytes for the page queue.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} frame → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// A page image ready to be embedded as a PDF XObject.
#[derive(Debug, Clone)]
pub struct JpegPage {
    pub width: u32,
    pub height: u32,
    /// `DeviceGray` pages are written as single-channel JPEGs.
    pub grayscale: bool,
    pub bytes: Vec<u8>,
}

/// Decode a queued payload and re-encode it as baseline JPEG.
pub fn payload_to_jpeg(payload: &[u8], quality: u8) -> Result<JpegPage, image::ImageError> {
    let img = image::load_from_memory(payload)?;
    let grayscale = !img.color().has_color();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    if grayscale {
        encoder.encode_image(&img.to_luma8())?;
    } else {
        encoder.encode_image(&img.to_rgb8())?;
    }
    Ok(JpegPage {
        width: img.width(),
        height: img.height(),
        grayscale,
        bytes,
    })
}

/// Base64 (standard alphabet, padded) for form-field transports.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
