//! Monochrome filter: collapse a colour frame to pure black and white.
//!
//! Phone photos of paper carry shadows and a colour cast. Thresholding the
//! luma channel gives a crisp, small "photocopy" look that compresses far
//! better than the colour original.

use image::{DynamicImage, GrayImage, Luma};

/// Convert `img` to black and white.
///
/// Pixels whose luma is at or above `threshold` become white, the rest black.
pub fn monochrome(img: &DynamicImage, threshold: u8) -> DynamicImage {
    let gray: GrayImage = img.to_luma8();
    let (w, h) = gray.dimensions();
    let bw = GrayImage::from_fn(w, h, |x, y| {
        let Luma([l]) = *gray.get_pixel(x, y);
        if l >= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    DynamicImage::ImageLuma8(bw)
}
