//! Upload bytes to prediction: decode, locate, normalize, classify, compose.

mod classifier;
mod composer;
mod preprocess;

pub use classifier::{build_input, EmotionClassifier, OnnxEmotionClassifier};
pub use composer::ResponseComposer;
pub use preprocess::{NormalizedFace, FACE_SIZE};

use crate::detection::FaceLocator;
use crate::error::PredictError;
use crate::imaging::{decode_upload, to_grayscale};
use anyhow::anyhow;
use common::PredictionResult;
use rand::RngCore;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use telemetry::metrics::{MOOD_SERVICE_EMOTIONS, MOOD_SERVICE_STAGE_LATENCY};

/// Runs one prediction end to end. Every stage is synchronous; callers on an
/// async runtime should run [`InferencePipeline::predict`] on a blocking thread.
pub struct InferencePipeline {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    composer: ResponseComposer,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl InferencePipeline {
    pub fn new(
        locator: Arc<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        composer: ResponseComposer,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            locator,
            classifier,
            composer,
            rng: Mutex::new(rng),
        }
    }

    pub fn composer(&self) -> &ResponseComposer {
        &self.composer
    }

    pub fn execution_provider(&self) -> &str {
        self.classifier.execution_provider()
    }

    pub fn predict(&self, upload: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = timed("decode", || decode_upload(upload))?;
        let gray = to_grayscale(&image);

        let region = timed("detect", || self.locator.locate(&gray))?
            .ok_or(PredictError::NoFaceDetected)?;
        tracing::debug!(?region, "face located");

        let face = NormalizedFace::from_region(&gray, &region)?;
        let scores = timed("classify", || self.classifier.classify(&face))?;
        let (emotion, confidence) = scores.top();
        tracing::debug!(%emotion, confidence, "emotion classified");

        MOOD_SERVICE_EMOTIONS
            .with_label_values(&[emotion.as_str()])
            .inc();

        let mut rng = self
            .rng
            .lock()
            .map_err(|e| anyhow!("Failed to lock random source: {}", e))?;
        self.composer.compose(emotion.as_str(), &mut **rng)
    }
}

fn timed<T>(stage: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    MOOD_SERVICE_STAGE_LATENCY
        .with_label_values(&[stage])
        .observe(start.elapsed().as_secs_f64());
    out
}
