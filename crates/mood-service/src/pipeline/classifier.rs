use super::preprocess::{NormalizedFace, FACE_SIZE};
use crate::config::{ClassifierConfig, ExecutionProvider, InputLayout};
use anyhow::{anyhow, Context, Result};
use common::EmotionScores;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use std::sync::Mutex;
use std::time::Instant;

/// Scores a normalized face over the seven emotion labels
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, face: &NormalizedFace) -> Result<EmotionScores>;

    /// Execution provider actually in use, for metrics
    fn execution_provider(&self) -> &str;
}

/// mini-Xception (FER2013) exported to ONNX
pub struct OnnxEmotionClassifier {
    session: Mutex<Session>,
    layout: InputLayout,
    output_name: String,
    provider: String,
}

impl OnnxEmotionClassifier {
    pub fn load(config: &ClassifierConfig) -> Result<Self> {
        if !config.model_path.is_file() {
            return Err(anyhow!(
                "Emotion model not found at {}",
                config.model_path.display()
            ));
        }

        let (session, provider) = match config.execution_provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Attempting to use CUDA execution provider");
                match cuda_session(config) {
                    Ok(session) => {
                        tracing::info!("Successfully configured CUDA execution provider");
                        (session, "CUDA")
                    }
                    Err(e) => {
                        tracing::warn!("Failed with CUDA, using CPU: {}", e);
                        (cpu_session(config)?, "CPU")
                    }
                }
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Using CPU execution provider");
                (cpu_session(config)?, "CPU")
            }
        };

        let output_name = match &config.output_name {
            Some(name) => name.clone(),
            None => session
                .outputs
                .first()
                .context("Emotion model has no outputs")?
                .name
                .clone(),
        };

        tracing::info!(
            model = %config.model_path.display(),
            provider,
            layout = ?config.layout,
            output = %output_name,
            "Initialized emotion classifier"
        );

        Ok(Self {
            session: Mutex::new(session),
            layout: config.layout,
            output_name,
            provider: provider.to_string(),
        })
    }
}

fn cuda_session(config: &ClassifierConfig) -> Result<Session> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads)?
        .with_execution_providers([
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])?
        .commit_from_file(&config.model_path)?)
}

fn cpu_session(config: &ClassifierConfig) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads)?
        .commit_from_file(&config.model_path)
        .with_context(|| format!("Failed to load emotion model {}", config.model_path.display()))
}

/// Model input tensor for one face in the requested layout
pub fn build_input(face: &NormalizedFace, layout: InputLayout) -> Result<Array<f32, IxDyn>> {
    let side = FACE_SIZE as usize;
    let shape = match layout {
        InputLayout::Nhwc => [1, side, side, 1],
        InputLayout::Nchw => [1, 1, side, side],
    };
    // With a single channel both layouts share the row-major pixel order
    Ok(Array::from_shape_vec(IxDyn(&shape), face.pixels().to_vec())?)
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&self, face: &NormalizedFace) -> Result<EmotionScores> {
        let input_tensor = Value::from_array(build_input(face, self.layout)?)?;

        let inference_start = Instant::now();
        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let inference_time = inference_start.elapsed();

        let output_value = outputs
            .get(self.output_name.as_str())
            .with_context(|| format!("No output tensor named '{}'", self.output_name))?;
        let (_shape, data) = output_value.try_extract_tensor::<f32>()?;

        let scores = EmotionScores::try_from(data)?;

        telemetry::metrics::MOOD_SERVICE_INFERENCE_TIME
            .with_label_values(&[&self.provider])
            .observe(inference_time.as_secs_f64());

        Ok(scores)
    }

    fn execution_provider(&self) -> &str {
        &self.provider
    }
}
