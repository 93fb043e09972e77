use serde::{Deserialize, Serialize};

/// Successful `/predict` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Classified emotion label
    pub emotion: String,

    /// One English quote from the resolved mood entry
    pub quote: String,

    /// One song from the resolved mood entry, string or object
    pub song: serde_json::Value,
}

/// Error response body shared by every failure kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
