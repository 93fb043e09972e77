//! Face localization

mod cascade;
mod grouping;

pub use cascade::{DetectionParams, HaarCascade};

use anyhow::Result;
use image::GrayImage;
use std::path::Path;

/// Pyramid step used for `/predict`
pub const SCALE_FACTOR: f64 = 1.3;

/// Neighbor count a detection cluster must exceed
pub const MIN_NEIGHBORS: usize = 5;

/// Axis-aligned face box in source image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

/// Finds the face to classify in a grayscale frame
pub trait FaceLocator: Send + Sync {
    /// First face in detection order, or `None` when there is none.
    fn locate(&self, gray: &GrayImage) -> Result<Option<FaceRegion>>;
}

/// Frontal-face locator backed by a Haar cascade
pub struct HaarFaceLocator {
    cascade: HaarCascade,
    params: DetectionParams,
}

impl HaarFaceLocator {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let cascade = HaarCascade::load(path)?;
        tracing::info!(
            stages = cascade.stage_count(),
            features = cascade.feature_count(),
            window = ?cascade.window_size(),
            "Face cascade loaded"
        );
        Ok(Self::new(cascade))
    }

    pub fn new(cascade: HaarCascade) -> Self {
        Self {
            cascade,
            params: DetectionParams {
                scale_factor: SCALE_FACTOR,
                min_neighbors: MIN_NEIGHBORS,
                min_size: (0, 0),
            },
        }
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }
}

impl FaceLocator for HaarFaceLocator {
    fn locate(&self, gray: &GrayImage) -> Result<Option<FaceRegion>> {
        let faces = self.cascade.detect_multi_scale(gray, &self.params);
        tracing::debug!(faces = faces.len(), "face detection finished");
        Ok(faces.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::cascade::tests::bright_below_xml;
    use super::*;
    use image::Luma;

    fn locator(min_neighbors: usize) -> HaarFaceLocator {
        let cascade = HaarCascade::from_xml(&bright_below_xml(6)).unwrap();
        HaarFaceLocator::new(cascade).with_params(DetectionParams {
            scale_factor: SCALE_FACTOR,
            min_neighbors,
            min_size: (0, 0),
        })
    }

    #[test]
    fn test_locate_returns_first_detection() {
        let frame = GrayImage::from_fn(40, 7, |x, y| {
            if x < 20 && y >= 3 {
                Luma([255])
            } else if x < 20 {
                Luma([0])
            } else {
                Luma([128])
            }
        });

        let face = locator(0).locate(&frame).unwrap();
        assert_eq!(
            face,
            Some(FaceRegion {
                x: 0,
                y: 0,
                width: 6,
                height: 6
            })
        );
    }

    #[test]
    fn test_default_locator_returns_averaged_cluster() {
        // A 24x24 window fits a 30x30 frame only at scale 1, at origins
        // 0, 2, 4 and 6 on each axis. All 16 windows straddle the edge at
        // row 15 and merge into one cluster.
        let cascade = HaarCascade::from_xml(&bright_below_xml(24)).unwrap();
        let frame = GrayImage::from_fn(30, 30, |_, y| if y < 15 { Luma([0]) } else { Luma([255]) });

        let face = HaarFaceLocator::new(cascade).locate(&frame).unwrap();
        assert_eq!(
            face,
            Some(FaceRegion {
                x: 3,
                y: 3,
                width: 24,
                height: 24
            })
        );
    }

    #[test]
    fn test_default_locator_needs_more_than_five_neighbors() {
        // Only origins 0 and 2 fit horizontally and one vertically: two hits
        let cascade = HaarCascade::from_xml(&bright_below_xml(24)).unwrap();
        let frame = GrayImage::from_fn(26, 24, |_, y| if y < 12 { Luma([0]) } else { Luma([255]) });

        assert_eq!(HaarFaceLocator::new(cascade).locate(&frame).unwrap(), None);
    }

    #[test]
    fn test_locate_flat_frame_finds_nothing() {
        let frame = GrayImage::from_pixel(64, 64, Luma([90]));
        assert_eq!(locator(MIN_NEIGHBORS).locate(&frame).unwrap(), None);
    }

    #[test]
    fn test_region_edges() {
        let region = FaceRegion {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        assert_eq!(region.right(), 40);
        assert_eq!(region.bottom(), 60);
    }
}
