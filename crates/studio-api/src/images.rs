use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use studio_types::models::ImageMime;

/// Longest edge allowed for stored artifacts.
pub const MAX_DIMENSION: u32 = 1920;

/// JPEG quality used when re-encoding artifacts.
pub const JPEG_QUALITY: u8 = 90;

/// Decode an upload, shrink it to fit inside `MAX_DIMENSION` on both axes
/// and re-encode it as JPEG.
///
/// Returns an error if the bytes do not decode as the declared format.
pub fn normalize(data: &[u8], mime: ImageMime) -> Result<Vec<u8>> {
    let format = match mime {
        ImageMime::Jpeg => ImageFormat::Jpeg,
        ImageMime::Png => ImageFormat::Png,
    };
    let img = image::load_from_memory_with_format(data, format)
        .context("Failed to decode image")?;

    let resized = fit_within(img, MAX_DIMENSION);

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .context("Failed to encode JPEG")?;

    Ok(out.into_inner())
}

/// Aspect-preserving downscale. Images already within bounds are returned untouched.
fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img;
    }
    img.resize(max, max, FilterType::Lanczos3)
}
