use anyhow::{Context, Result};
use common::validation::validate_resource_file;
use common::MoodTable;
use mood_service::{
    api,
    config::MoodServiceConfig,
    detection::HaarFaceLocator,
    pipeline::{InferencePipeline, OnnxEmotionClassifier, ResponseComposer},
    MoodServiceState,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Held until exit so buffered file logs are flushed
    let _log_guard = telemetry::init_with_service("mood-service");

    info!("Starting Mood Service...");

    let config = MoodServiceConfig::from_env()?;
    info!(
        "Mood Service configuration: bind={}, node_id={}, provider={:?}",
        config.bind_addr, config.node_id, config.classifier.execution_provider
    );

    validate_resource_file(&config.mood_map_path, "MOOD_MAP_PATH")?;
    validate_resource_file(&config.cascade_path, "FACE_CASCADE_PATH")?;
    validate_resource_file(&config.classifier.model_path, "EMOTION_MODEL_PATH")?;

    let table = MoodTable::load(&config.mood_map_path).context("Failed to load mood map")?;
    info!("Loaded {} mood entries", table.len());

    let locator = HaarFaceLocator::load(&config.cascade_path)?;
    let classifier = OnnxEmotionClassifier::load(&config.classifier)?;

    let pipeline = InferencePipeline::new(
        Arc::new(locator),
        Arc::new(classifier),
        ResponseComposer::new(table),
        Box::new(StdRng::from_entropy()),
    );
    let state = MoodServiceState::new(config.node_id.clone(), pipeline, config.max_upload_bytes);

    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Mood Service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Mood Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
