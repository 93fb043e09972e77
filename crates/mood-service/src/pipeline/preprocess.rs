use crate::detection::FaceRegion;
use crate::imaging::resize_linear;
use anyhow::{bail, Result};
use image::{imageops, GrayImage};

/// Side length of the classifier input
pub const FACE_SIZE: u32 = 48;

/// 48x48 face crop scaled to `[0, 1]`, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFace {
    pixels: Vec<f32>,
}

impl NormalizedFace {
    /// Crop `region` (clamped to the frame), resize it bilinearly and scale
    /// intensities by 1/255.
    pub fn from_region(gray: &GrayImage, region: &FaceRegion) -> Result<Self> {
        let (width, height) = gray.dimensions();
        let x = region.x.min(width);
        let y = region.y.min(height);
        let w = region.width.min(width - x);
        let h = region.height.min(height - y);

        if w == 0 || h == 0 {
            bail!(
                "face region {:?} lies outside the {}x{} frame",
                region,
                width,
                height
            );
        }

        let crop = imageops::crop_imm(gray, x, y, w, h).to_image();
        let resized = resize_linear(&crop, FACE_SIZE, FACE_SIZE);

        Ok(Self {
            pixels: resized.pixels().map(|p| p[0] as f32 / 255.0).collect(),
        })
    }

    pub fn from_pixels(pixels: Vec<f32>) -> Result<Self> {
        let expected = (FACE_SIZE * FACE_SIZE) as usize;
        if pixels.len() != expected {
            bail!("expected {} face pixels, got {}", expected, pixels.len());
        }
        Ok(Self { pixels })
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_normalized_face_shape_and_range() {
        let gray = GrayImage::from_fn(100, 80, |x, _| Luma([(x * 2) as u8]));
        let region = FaceRegion {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };

        let face = NormalizedFace::from_region(&gray, &region).unwrap();
        assert_eq!(face.pixels().len(), 48 * 48);
        assert!(face.pixels().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_uniform_crop_normalizes_exactly() {
        let gray = GrayImage::from_pixel(64, 64, Luma([255]));
        let region = FaceRegion {
            x: 0,
            y: 0,
            width: 64,
            height: 64,
        };

        let face = NormalizedFace::from_region(&gray, &region).unwrap();
        assert!(face.pixels().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_face_is_resampled_without_smoothing() {
        // Two-pixel stripes halve to alternating 0 and 200 columns, as with
        // cv2.resize; a widened filter would blend neighbouring stripes
        let gray = GrayImage::from_fn(96, 96, |x, _| if x % 4 < 2 { Luma([0]) } else { Luma([200]) });
        let region = FaceRegion {
            x: 0,
            y: 0,
            width: 96,
            height: 96,
        };

        let face = NormalizedFace::from_region(&gray, &region).unwrap();
        let first_row = &face.pixels()[..48];
        for (x, &v) in first_row.iter().enumerate() {
            let expected = if x % 2 == 0 { 0.0 } else { 200.0 / 255.0 };
            assert!((v - expected).abs() < 1e-6, "column {} was {}", x, v);
        }
    }

    #[test]
    fn test_region_is_clamped_to_frame() {
        let gray = GrayImage::from_pixel(40, 40, Luma([51]));
        let region = FaceRegion {
            x: 30,
            y: 30,
            width: 50,
            height: 50,
        };

        let face = NormalizedFace::from_region(&gray, &region).unwrap();
        assert!(face.pixels().iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_region_outside_frame_fails() {
        let gray = GrayImage::new(20, 20);
        let region = FaceRegion {
            x: 20,
            y: 5,
            width: 10,
            height: 10,
        };
        assert!(NormalizedFace::from_region(&gray, &region).is_err());
    }

    #[test]
    fn test_from_pixels_checks_length() {
        assert!(NormalizedFace::from_pixels(vec![0.0; 10]).is_err());
        assert!(NormalizedFace::from_pixels(vec![0.5; 48 * 48]).is_ok());
    }
}
