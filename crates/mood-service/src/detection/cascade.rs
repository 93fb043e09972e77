//! Boosted Haar cascade in the OpenCV `opencv-cascade-classifier` XML format
//! (the format of `haarcascade_frontalface_default.xml`).
//!
//! Evaluation follows OpenCV's `detectMultiScale`: the image is scanned as a
//! pyramid, each window is variance normalized over its inner region and has
//! to pass every stage. Candidate windows are merged by [`group_rectangles`].

use super::grouping::group_rectangles;
use super::FaceRegion;
use crate::imaging::resize_linear;
use anyhow::{anyhow, bail, Context, Result};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use serde::Deserialize;
use std::path::Path;

/// OpenCV lowers every stage threshold by this amount when loading
const THRESHOLD_EPS: f64 = 1e-5;

/// Relative tolerance used when clustering candidate windows
pub const GROUPING_EPS: f64 = 0.2;

// ============================================================================
// XML schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct StorageXml {
    cascade: CascadeXml,
}

#[derive(Debug, Deserialize)]
struct CascadeXml {
    #[serde(rename = "stageType")]
    stage_type: String,
    #[serde(rename = "featureType")]
    feature_type: String,
    height: u32,
    width: u32,
    stages: ListXml<StageXml>,
    features: ListXml<FeatureXml>,
}

/// OpenCV stores sequences as repeated `<_>` children
#[derive(Debug, Deserialize)]
struct ListXml<T> {
    #[serde(rename = "_", default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StageXml {
    #[serde(rename = "stageThreshold")]
    stage_threshold: f64,
    #[serde(rename = "weakClassifiers")]
    weak_classifiers: ListXml<WeakClassifierXml>,
}

#[derive(Debug, Deserialize)]
struct WeakClassifierXml {
    #[serde(rename = "internalNodes")]
    internal_nodes: String,
    #[serde(rename = "leafValues")]
    leaf_values: String,
}

#[derive(Debug, Deserialize)]
struct FeatureXml {
    rects: ListXml<String>,
    #[serde(default)]
    tilted: Option<u8>,
}

// ============================================================================
// Cascade model
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<Node>,
    leaves: Vec<f64>,
}

impl WeakClassifier {
    /// Walk the tree; children `<= 0` are leaf indices negated.
    fn predict<F: Fn(usize) -> f64>(&self, feature_value: &F) -> f64 {
        let mut idx = 0i32;
        loop {
            let node = &self.nodes[idx as usize];
            idx = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return self.leaves[(-idx) as usize];
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

/// Parameters of one `detect_multi_scale` pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Pyramid step between scales, > 1
    pub scale_factor: f64,
    /// Candidates a cluster needs beyond this count to be reported
    pub min_neighbors: usize,
    /// Smallest reported window (width, height); (0, 0) means the cascade window
    pub min_size: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cascade {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("Invalid cascade {}", path.display()))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let storage: StorageXml =
            quick_xml::de::from_str(xml).context("Failed to parse cascade XML")?;
        let cascade = storage.cascade;

        if cascade.stage_type != "BOOST" {
            bail!("Unsupported stage type '{}'", cascade.stage_type);
        }
        if cascade.feature_type != "HAAR" {
            bail!("Unsupported feature type '{}'", cascade.feature_type);
        }
        if cascade.width < 3 || cascade.height < 3 {
            bail!(
                "Cascade window {}x{} is too small",
                cascade.width,
                cascade.height
            );
        }

        let features = cascade
            .features
            .items
            .iter()
            .enumerate()
            .map(|(i, feature)| {
                parse_feature(feature, cascade.width, cascade.height)
                    .with_context(|| format!("feature {}", i))
            })
            .collect::<Result<Vec<_>>>()?;

        let stages = cascade
            .stages
            .items
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                parse_stage(stage, features.len()).with_context(|| format!("stage {}", i))
            })
            .collect::<Result<Vec<_>>>()?;

        if stages.is_empty() {
            bail!("Cascade has no stages");
        }

        Ok(Self {
            window_width: cascade.width,
            window_height: cascade.height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Detect objects at every pyramid scale and merge overlapping hits.
    /// Output order is the grouping's cluster order.
    pub fn detect_multi_scale(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<FaceRegion> {
        let candidates = self.scan_pyramid(gray, params);
        group_rectangles(candidates, params.min_neighbors, GROUPING_EPS)
    }

    fn scan_pyramid(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<FaceRegion> {
        let (image_width, image_height) = gray.dimensions();
        let (ww, wh) = (self.window_width, self.window_height);
        let min_size = (params.min_size.0.max(ww), params.min_size.1.max(wh));
        let mut candidates = Vec::new();

        if params.scale_factor <= 1.0 {
            tracing::warn!(scale_factor = params.scale_factor, "scale factor must exceed 1");
            return candidates;
        }

        let mut factor = 1.0f64;
        loop {
            let window = (
                (ww as f64 * factor).round() as u32,
                (wh as f64 * factor).round() as u32,
            );
            if window.0 > image_width || window.1 > image_height {
                break;
            }

            if window.0 >= min_size.0 && window.1 >= min_size.1 {
                let scaled = (
                    (image_width as f64 / factor).round() as u32,
                    (image_height as f64 / factor).round() as u32,
                );
                // Origins whose window lies fully inside the level, last one included
                let positions = ((scaled.0 + 1).saturating_sub(ww), (scaled.1 + 1).saturating_sub(wh));

                if positions.0 > 0 && positions.1 > 0 {
                    let resized;
                    let level = if scaled == (image_width, image_height) {
                        gray
                    } else {
                        resized = resize_linear(gray, scaled.0, scaled.1);
                        &resized
                    };

                    let integral = IntegralFrame::new(level);
                    let step = if factor >= 2.0 { 1 } else { 2 };

                    for y in (0..positions.1).step_by(step as usize) {
                        let mut x = 0;
                        while x < positions.0 {
                            match self.rejecting_stage(&integral, x, y) {
                                None => candidates.push(FaceRegion {
                                    x: (x as f64 * factor).round() as u32,
                                    y: (y as f64 * factor).round() as u32,
                                    width: window.0,
                                    height: window.1,
                                }),
                                // Failing the first stage also skips the next origin
                                Some(0) => x += step,
                                Some(_) => {}
                            }
                            x += step;
                        }
                    }
                }
            }

            factor *= params.scale_factor;
        }

        candidates
    }

    /// Index of the first stage that rejects the window at `(x, y)`, or
    /// `None` when every stage accepts it.
    fn rejecting_stage(&self, integral: &IntegralFrame, x: u32, y: u32) -> Option<usize> {
        // Variance normalization over the window shrunk by one pixel per side
        let (nw, nh) = (self.window_width - 2, self.window_height - 2);
        let area = (nw * nh) as f64;
        let sum = integral.sum(x + 1, y + 1, nw, nh) as f64;
        let sq_sum = integral.squared_sum(x + 1, y + 1, nw, nh) as f64;
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        let feature_value = |idx: usize| {
            let raw: f64 = self.features[idx]
                .rects
                .iter()
                .map(|r| r.weight * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64)
                .sum();
            raw / norm
        };

        self.stages.iter().position(|stage| {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|weak| weak.predict(&feature_value))
                .sum();
            score < stage.threshold
        })
    }
}

fn parse_numbers<T: std::str::FromStr>(text: &str, what: &str) -> Result<Vec<T>> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| anyhow!("invalid {} value '{}'", what, token))
        })
        .collect()
}

fn parse_feature(feature: &FeatureXml, width: u32, height: u32) -> Result<HaarFeature> {
    if feature.tilted.unwrap_or(0) != 0 {
        bail!("tilted features are not supported");
    }
    if feature.rects.items.is_empty() || feature.rects.items.len() > 3 {
        bail!("expected 1 to 3 rects, found {}", feature.rects.items.len());
    }

    let rects = feature
        .rects
        .items
        .iter()
        .map(|text| {
            let values: Vec<f64> = parse_numbers(text, "rect")?;
            let [x, y, w, h, weight] = values[..] else {
                bail!("rect needs 5 values, found {}", values.len());
            };
            if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
                bail!("rect '{}' has negative origin or empty extent", text.trim());
            }
            let rect = WeightedRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight,
            };
            if rect.x + rect.width > width || rect.y + rect.height > height {
                bail!("rect '{}' exceeds the {}x{} window", text.trim(), width, height);
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(HaarFeature { rects })
}

fn parse_stage(stage: &StageXml, feature_count: usize) -> Result<Stage> {
    let classifiers = stage
        .weak_classifiers
        .items
        .iter()
        .map(|weak| parse_weak_classifier(weak, feature_count))
        .collect::<Result<Vec<_>>>()?;

    if classifiers.is_empty() {
        bail!("stage has no weak classifiers");
    }

    Ok(Stage {
        threshold: stage.stage_threshold - THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak_classifier(weak: &WeakClassifierXml, feature_count: usize) -> Result<WeakClassifier> {
    let raw: Vec<f64> = parse_numbers(&weak.internal_nodes, "internal node")?;
    let leaves: Vec<f64> = parse_numbers(&weak.leaf_values, "leaf")?;

    if raw.is_empty() || raw.len() % 4 != 0 {
        bail!("internal nodes must come in groups of 4, found {} values", raw.len());
    }

    let nodes: Vec<Node> = raw
        .chunks_exact(4)
        .map(|chunk| Node {
            left: chunk[0] as i32,
            right: chunk[1] as i32,
            feature: chunk[2] as usize,
            threshold: chunk[3],
        })
        .collect();

    for node in &nodes {
        if node.feature >= feature_count {
            bail!("feature index {} out of range ({} features)", node.feature, feature_count);
        }
        for child in [node.left, node.right] {
            let in_range = if child > 0 {
                (child as usize) < nodes.len()
            } else {
                ((-child) as usize) < leaves.len()
            };
            if !in_range {
                bail!("child reference {} out of range", child);
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

/// Summed-area tables of a pyramid level
struct IntegralFrame {
    sum: ImageBuffer<Luma<u64>, Vec<u64>>,
    squared: ImageBuffer<Luma<u64>, Vec<u64>>,
}

impl IntegralFrame {
    fn new(gray: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(gray),
            squared: integral_squared_image::<_, u64>(gray),
        }
    }

    fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        rect_sum(&self.sum, x, y, width, height)
    }

    fn squared_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        rect_sum(&self.squared, x, y, width, height)
    }
}

/// Integral images carry a leading zero row and column.
fn rect_sum(table: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32, width: u32, height: u32) -> u64 {
    let at = |px: u32, py: u32| table.get_pixel(px, py)[0];
    let (x2, y2) = (x + width, y + height);
    (at(x2, y2) + at(x, y)) - (at(x2, y) + at(x, y2))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One-stage cascade on a `side` x `side` window firing when the lower
    /// half is brighter than the upper half
    pub(crate) fn bright_below_xml(side: u32) -> String {
        let half = side / 2;
        format!(
            r#"<?xml version="1.0"?>
<!-- synthetic cascade -->
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>{side}</height>
  <width>{side}</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 1.0000000000000000e-02</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 {side} {half} -1.</_>
        <_>
          0 {half} {side} {half} 1.</_></rects></_></features></cascade>
</opencv_storage>
"#
        )
    }

    fn bright_below_cascade() -> HaarCascade {
        HaarCascade::from_xml(&bright_below_xml(6)).unwrap()
    }

    /// 40x7 frame: left 20 columns dark above bright, right side flat gray.
    /// Only one pyramid level fits a 6x6 window.
    fn split_frame() -> GrayImage {
        GrayImage::from_fn(40, 7, |x, y| {
            if x >= 20 {
                Luma([128])
            } else if y < 3 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_parse_synthetic_cascade() {
        let cascade = bright_below_cascade();
        assert_eq!(cascade.window_size(), (6, 6));
        assert_eq!(cascade.stage_count(), 1);
        assert_eq!(cascade.feature_count(), 1);
        assert!((cascade.stages[0].threshold + THRESHOLD_EPS).abs() < 1e-12);
    }

    #[test]
    fn test_reject_tilted_features() {
        let xml = bright_below_xml(6).replace("</rects></_></features>", "</rects><tilted>1</tilted></_></features>");
        let err = HaarCascade::from_xml(&xml).unwrap_err();
        assert!(format!("{:#}", err).contains("tilted"));
    }

    #[test]
    fn test_reject_lbp_cascade() {
        let xml = bright_below_xml(6).replace("<featureType>HAAR", "<featureType>LBP");
        assert!(HaarCascade::from_xml(&xml).is_err());
    }

    #[test]
    fn test_reject_out_of_range_feature() {
        let xml = bright_below_xml(6).replace("0 -1 0 1.0000000000000000e-02", "0 -1 3 1.0000000000000000e-02");
        let err = HaarCascade::from_xml(&xml).unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"));
    }

    #[test]
    fn test_reject_rect_outside_window() {
        let xml = bright_below_xml(6).replace("0 3 6 3 1.", "0 4 6 3 1.");
        assert!(HaarCascade::from_xml(&xml).is_err());
    }

    #[test]
    fn test_reject_malformed_xml() {
        assert!(HaarCascade::from_xml("<opencv_storage><cascade>").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(HaarCascade::load("/nonexistent/cascade.xml").is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cascade.xml");
        std::fs::write(&path, bright_below_xml(6)).unwrap();

        let cascade = HaarCascade::load(&path).unwrap();
        assert_eq!(cascade.stage_count(), 1);
    }

    #[test]
    fn test_rect_sum_matches_pixels() {
        let frame = split_frame();
        let integral = IntegralFrame::new(&frame);
        assert_eq!(integral.sum(0, 0, 20, 3), 0);
        assert_eq!(integral.sum(0, 3, 2, 2), 4 * 255);
        assert_eq!(integral.sum(20, 0, 2, 1), 2 * 128);
        assert_eq!(integral.squared_sum(0, 3, 1, 1), 255 * 255);
    }

    #[test]
    fn test_rejecting_stage() {
        let cascade = bright_below_cascade();
        let integral = IntegralFrame::new(&split_frame());

        assert_eq!(cascade.rejecting_stage(&integral, 0, 0), None);
        // Flat region scores zero and falls below the node threshold
        assert_eq!(cascade.rejecting_stage(&integral, 24, 0), Some(0));
    }

    #[test]
    fn test_inverted_pattern_is_rejected() {
        let cascade = bright_below_cascade();
        let inverted = GrayImage::from_fn(12, 7, |_, y| if y < 3 { Luma([255]) } else { Luma([0]) });
        let integral = IntegralFrame::new(&inverted);
        assert_eq!(cascade.rejecting_stage(&integral, 0, 0), Some(0));
    }

    #[test]
    fn test_detect_without_grouping_returns_every_hit() {
        let cascade = bright_below_cascade();
        let params = DetectionParams {
            scale_factor: 1.3,
            min_neighbors: 0,
            min_size: (0, 0),
        };

        let hits = cascade.detect_multi_scale(&split_frame(), &params);
        let xs: Vec<u32> = hits.iter().map(|r| r.x).collect();
        assert_eq!(xs, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
        assert!(hits.iter().all(|r| r.y == 0 && r.width == 6 && r.height == 6));
    }

    #[test]
    fn test_detect_drops_isolated_hits() {
        let cascade = bright_below_cascade();
        let params = DetectionParams {
            scale_factor: 1.3,
            min_neighbors: 5,
            min_size: (0, 0),
        };

        assert!(cascade.detect_multi_scale(&split_frame(), &params).is_empty());
    }

    #[test]
    fn test_detect_on_tiny_frame() {
        let cascade = bright_below_cascade();
        let params = DetectionParams {
            scale_factor: 1.3,
            min_neighbors: 0,
            min_size: (0, 0),
        };

        let tiny = GrayImage::new(6, 6);
        assert!(cascade.detect_multi_scale(&tiny, &params).is_empty());
    }

    fn unfiltered() -> DetectionParams {
        DetectionParams {
            scale_factor: 1.3,
            min_neighbors: 0,
            min_size: (0, 0),
        }
    }

    fn origins(hits: &[FaceRegion]) -> Vec<(u32, u32)> {
        hits.iter().map(|r| (r.x, r.y)).collect()
    }

    #[test]
    fn test_window_filling_the_frame_is_scanned() {
        let cascade = bright_below_cascade();
        let frame = GrayImage::from_fn(6, 6, |_, y| if y < 3 { Luma([0]) } else { Luma([255]) });

        let hits = cascade.detect_multi_scale(&frame, &unfiltered());
        assert_eq!(
            hits,
            vec![FaceRegion {
                x: 0,
                y: 0,
                width: 6,
                height: 6
            }]
        );
    }

    #[test]
    fn test_last_window_origin_is_scanned() {
        let cascade = bright_below_cascade();
        let frame = GrayImage::from_fn(8, 6, |_, y| if y < 3 { Luma([0]) } else { Luma([255]) });

        let hits = cascade.detect_multi_scale(&frame, &unfiltered());
        assert_eq!(origins(&hits), vec![(0, 0), (2, 0)]);
    }

    #[test]
    fn test_first_stage_rejection_skips_next_origin() {
        let cascade = bright_below_cascade();
        // Flat on columns 0..6, dark above bright from column 6 on. The
        // window at x = 2 would pass but follows a rejection at x = 0.
        let frame = GrayImage::from_fn(12, 6, |x, y| match (x < 6, y < 3) {
            (true, _) => Luma([128]),
            (false, true) => Luma([0]),
            (false, false) => Luma([255]),
        });

        let integral = IntegralFrame::new(&frame);
        assert_eq!(cascade.rejecting_stage(&integral, 2, 0), None);

        let hits = cascade.detect_multi_scale(&frame, &unfiltered());
        assert_eq!(origins(&hits), vec![(4, 0), (6, 0)]);
    }

    #[test]
    fn test_later_stage_rejection_does_not_skip() {
        // Second stage wants the right half brighter than the left
        let xml = bright_below_xml(6)
            .replace(
                "</_></stages>",
                r#"</_>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 1 1.0000000000000000e-02</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>"#,
            )
            .replace(
                "</_></features>",
                r#"</_>
    <_>
      <rects>
        <_>
          0 0 3 6 -1.</_>
        <_>
          3 0 3 6 1.</_></rects></_></features>"#,
            );
        let cascade = HaarCascade::from_xml(&xml).unwrap();
        assert_eq!(cascade.stage_count(), 2);
        assert_eq!(cascade.feature_count(), 2);

        // Dark above bright everywhere; columns 3 and 4 are 40 levels darker
        let frame = GrayImage::from_fn(12, 6, |x, y| {
            let offset = if x == 3 || x == 4 { 0 } else { 40 };
            Luma([offset + if y < 3 { 0 } else { 200 }])
        });
        let integral = IntegralFrame::new(&frame);
        assert_eq!(cascade.rejecting_stage(&integral, 0, 0), Some(1));
        assert_eq!(cascade.rejecting_stage(&integral, 2, 0), None);
        assert_eq!(cascade.rejecting_stage(&integral, 6, 0), Some(1));

        let hits = cascade.detect_multi_scale(&frame, &unfiltered());
        assert_eq!(origins(&hits), vec![(2, 0), (4, 0)]);
    }
}
