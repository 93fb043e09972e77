//! Pixel plumbing shared by detection and preprocessing

use anyhow::{Context, Result};
use image::metadata::Orientation;
use image::{imageops, DynamicImage, GrayImage, ImageBuffer, ImageDecoder, ImageReader, Luma};
use std::io::Cursor;

/// Decode an uploaded JPEG or PNG and apply its EXIF orientation, so camera
/// photos reach the detector upright.
pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to read uploaded image")?
        .into_decoder()
        .context("Unsupported image format")?;

    let orientation = decoder.orientation().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "ignoring unreadable orientation tag");
        Orientation::NoTransforms
    });

    let mut image = DynamicImage::from_decoder(decoder).context("Failed to decode uploaded image")?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Luma with ITU-R BT.601 weights, rounded to the nearest level.
/// Alpha is discarded.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Bilinear resize with half-pixel centres and edge clamping, the sampling
/// OpenCV's `INTER_LINEAR` uses. Shrinking does not low-pass the source.
pub fn resize_linear(gray: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (src_width, src_height) = gray.dimensions();
    if (src_width, src_height) == (width, height) {
        return gray.clone();
    }
    if src_width == 0 || src_height == 0 {
        return GrayImage::new(width, height);
    }

    // Sample in f32 so rounding happens once, at the end
    let src: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(src_width, src_height, |x, y| Luma([gray.get_pixel(x, y)[0] as f32]));

    GrayImage::from_fn(width, height, |x, y| {
        let u = (x as f32 + 0.5) / width as f32;
        let v = (y as f32 + 0.5) / height as f32;
        let value = imageops::sample_bilinear(&src, u, v).map_or(0.0, |p| p[0]);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}
