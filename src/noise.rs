//! Optional pixel noise over the finished image.
//!
//! Each pixel gets one random offset in `[-level, level]` applied to all
//! three channels, which makes the stamp harder to lift cleanly.

use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbImage};
use rand::Rng;

use crate::error::{Error, Result};

/// Shift every pixel by a random offset in `[-level, level]`, clamped to `0..=255`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn add_noise<R: Rng + ?Sized>(img: &mut RgbImage, level: u8, rng: &mut R) {
    if level == 0 {
        return;
    }
    let level = i16::from(level);
    for pixel in img.pixels_mut() {
        let offset = rng.gen_range(-level..=level);
        for c in &mut pixel.0 {
            *c = (i16::from(*c) + offset).clamp(0, 255) as u8;
        }
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    let dyn_img = DynamicImage::ImageRgb8(img.clone());

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 92);
            encoder.encode_image(&dyn_img)?;
        }
        ImageFormat::Png
        | ImageFormat::WebP
        | ImageFormat::Bmp
        | ImageFormat::Tiff
        | ImageFormat::Gif => {
            dyn_img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}
