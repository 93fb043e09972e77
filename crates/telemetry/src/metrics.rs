use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests by terminal outcome (success, missing_file, no_face, incomplete_mood_data, internal_error)
    pub static ref MOOD_SERVICE_PREDICTIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "mood_service_predictions_total",
                "Total number of prediction requests by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref MOOD_SERVICE_EMOTIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "mood_service_emotions_total",
                "Total number of classified emotions by label",
            ),
            &["emotion"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref MOOD_SERVICE_STAGE_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "mood_service_stage_latency_seconds",
                "Duration of each inference pipeline stage",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref MOOD_SERVICE_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "mood_service_inference_time_seconds",
                "Emotion model inference time by execution provider",
            )
            .buckets(vec![0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5]),
            &["execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref MOOD_SERVICE_IN_FLIGHT: IntGauge = {
        let metric = IntGauge::new(
            "mood_service_in_flight_predictions",
            "Number of predictions currently running on the blocking pool",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
