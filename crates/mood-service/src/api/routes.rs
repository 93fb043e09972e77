use crate::error::PredictError;
use crate::state::MoodServiceState;
use anyhow::anyhow;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use common::PredictionResult;
use serde_json::json;
use telemetry::metrics::{MOOD_SERVICE_IN_FLIGHT, MOOD_SERVICE_PREDICTIONS};
use telemetry::CorrelationId;

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// Classify the face in an uploaded image and answer with a matching quote and song
pub async fn predict(
    State(state): State<MoodServiceState>,
    correlation_id: Option<Extension<CorrelationId>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, PredictError> {
    let in_flight = InFlight::enter();
    let result = run_prediction(&state, multipart).await;
    drop(in_flight);

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    MOOD_SERVICE_PREDICTIONS.with_label_values(&[outcome]).inc();

    let correlation_id = correlation_id.map(|Extension(id)| id.0).unwrap_or_default();
    match &result {
        Ok(prediction) => tracing::info!(
            correlation_id = %correlation_id,
            node_id = %state.node_id(),
            emotion = %prediction.emotion,
            "prediction served"
        ),
        Err(e) => tracing::info!(
            correlation_id = %correlation_id,
            node_id = %state.node_id(),
            outcome,
            "prediction rejected: {}",
            e
        ),
    }

    result.map(Json)
}

/// Holds one unit of the in-flight gauge; released on drop so a cancelled
/// request (client gone mid-upload) still gives it back.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        MOOD_SERVICE_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        MOOD_SERVICE_IN_FLIGHT.dec();
    }
}

async fn run_prediction(
    state: &MoodServiceState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResult, PredictError> {
    let upload = read_upload(multipart).await?;
    let pipeline = state.pipeline();

    tokio::task::spawn_blocking(move || pipeline.predict(&upload))
        .await
        .map_err(|e| PredictError::internal(anyhow!("prediction task failed: {}", e)))?
}

/// Bytes of the first `file` field; absent, empty and unreadable uploads all
/// count as missing.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, PredictError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "request is not multipart");
        PredictError::MissingFile
    })?;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!(error = %e, "malformed multipart body");
        PredictError::MissingFile
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let data = field.bytes().await.map_err(|e| {
            tracing::debug!(error = %e, "failed to read upload");
            PredictError::MissingFile
        })?;

        if data.is_empty() {
            return Err(PredictError::MissingFile);
        }
        return Ok(data);
    }

    Err(PredictError::MissingFile)
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "mood-service"
        })),
    )
}

/// Readiness check endpoint; the service only starts once every resource loaded
pub async fn readyz(State(state): State<MoodServiceState>) -> impl IntoResponse {
    let pipeline = state.pipeline();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "node_id": state.node_id(),
            "mood_entries": pipeline.composer().table().len(),
            "execution_provider": pipeline.execution_provider()
        })),
    )
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Only test in this crate touching the gauge, so the readings are stable
    #[tokio::test]
    async fn test_in_flight_released_on_completion_and_cancellation() {
        let before = MOOD_SERVICE_IN_FLIGHT.get();

        {
            let _guard = InFlight::enter();
            assert_eq!(MOOD_SERVICE_IN_FLIGHT.get(), before + 1);
        }
        assert_eq!(MOOD_SERVICE_IN_FLIGHT.get(), before);

        // A request future dropped while awaiting, as hyper does on disconnect
        let stalled = async {
            let _guard = InFlight::enter();
            std::future::pending::<()>().await;
        };
        let timed_out = tokio::time::timeout(Duration::from_millis(20), stalled).await;
        assert!(timed_out.is_err());
        assert_eq!(MOOD_SERVICE_IN_FLIGHT.get(), before);
    }
}
