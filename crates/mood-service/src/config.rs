use anyhow::{anyhow, Context, Result};
use common::validation::{
    validate_range, validate_upload_limit, DEFAULT_MAX_UPLOAD_BYTES, MAX_INTRA_THREADS,
};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Tensor layout expected by the emotion model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputLayout {
    /// `[1, 48, 48, 1]`, the Keras export default
    #[default]
    Nhwc,
    /// `[1, 1, 48, 48]`
    Nchw,
}

impl FromStr for InputLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nhwc" => Ok(Self::Nhwc),
            "nchw" => Ok(Self::Nchw),
            other => Err(anyhow!("unknown tensor layout '{}', expected nhwc or nchw", other)),
        }
    }
}

/// ONNX Runtime execution provider preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    /// CUDA with CPU fallback
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CPU" => Ok(Self::Cpu),
            "CUDA" => Ok(Self::Cuda),
            other => Err(anyhow!("unknown execution provider '{}', expected CPU or CUDA", other)),
        }
    }
}

/// Settings for the emotion classifier session
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub layout: InputLayout,
    /// Output tensor to read; the model's first output when unset
    pub output_name: Option<String>,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/fer2013_mini_XCEPTION.onnx"),
            layout: InputLayout::default(),
            output_name: None,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MoodServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,

    /// Node ID for this service instance
    pub node_id: String,

    pub classifier: ClassifierConfig,

    /// OpenCV-format Haar cascade for frontal faces
    pub cascade_path: PathBuf,

    /// JSON mood map (emotion -> quotes and songs)
    pub mood_map_path: PathBuf,

    /// Request body cap for uploads
    pub max_upload_bytes: usize,
}

impl MoodServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("MOOD_SERVICE_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse()
            .context("invalid MOOD_SERVICE_ADDR")?;

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "mood-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let defaults = ClassifierConfig::default();
        let classifier = ClassifierConfig {
            model_path: env::var("EMOTION_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            layout: env::var("EMOTION_MODEL_LAYOUT")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("invalid EMOTION_MODEL_LAYOUT")?
                .unwrap_or(defaults.layout),
            output_name: env::var("EMOTION_MODEL_OUTPUT").ok().filter(|v| !v.is_empty()),
            execution_provider: env::var("EXECUTION_PROVIDER")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("invalid EXECUTION_PROVIDER")?
                .unwrap_or(defaults.execution_provider),
            intra_threads: env::var("INTRA_THREADS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("invalid INTRA_THREADS")?
                .unwrap_or(defaults.intra_threads),
        };
        validate_range(classifier.intra_threads, 1, MAX_INTRA_THREADS, "INTRA_THREADS")?;

        let cascade_path = env::var("FACE_CASCADE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models/haarcascade_frontalface_default.xml"));

        let mood_map_path = env::var("MOOD_MAP_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("emotion_map.json"));

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("invalid MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        validate_upload_limit(max_upload_bytes)?;

        Ok(Self {
            bind_addr,
            node_id,
            classifier,
            cascade_path,
            mood_map_path,
            max_upload_bytes,
        })
    }
}
