use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::ErrorResponse;
use thiserror::Error;

/// Terminal failure of a `/predict` request
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No file provided")]
    MissingFile,

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Missing quote or song data")]
    IncompleteMoodData,

    /// Detail stays in the server log; clients see a generic message.
    #[error("Server error")]
    Internal(anyhow::Error),
}

impl PredictError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingFile | PredictError::NoFaceDetected => StatusCode::BAD_REQUEST,
            PredictError::IncompleteMoodData | PredictError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Metric label for the outcome
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::MissingFile => "missing_file",
            PredictError::NoFaceDetected => "no_face",
            PredictError::IncompleteMoodData => "incomplete_mood_data",
            PredictError::Internal(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for PredictError {
    fn from(err: anyhow::Error) -> Self {
        PredictError::Internal(err)
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        if let PredictError::Internal(err) = &self {
            tracing::error!(error = ?err, "prediction failed");
        }

        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
