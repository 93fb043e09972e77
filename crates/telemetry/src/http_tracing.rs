use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

use crate::correlation::{extract_or_generate_correlation_id, CorrelationId, X_CORRELATION_ID, X_REQUEST_ID};

/// Axum middleware for HTTP request tracing
pub async fn trace_http_request(mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let correlation_id = extract_or_generate_correlation_id(req.headers());
    req.extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        uri = %uri,
        correlation_id = %correlation_id,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let mut response = next.run(req).instrument(span.clone()).await;

    let latency_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();
    span.record("status", status);
    span.record("latency_ms", latency_ms);

    span.in_scope(|| match status {
        400..=499 => warn!(
            method = %method,
            uri = %uri,
            status,
            latency_ms = %latency_ms,
            "HTTP request failed (client error)"
        ),
        500..=599 => error!(
            method = %method,
            uri = %uri,
            status,
            latency_ms = %latency_ms,
            "HTTP request failed (server error)"
        ),
        _ => info!(
            method = %method,
            uri = %uri,
            status,
            latency_ms = %latency_ms,
            "HTTP request completed"
        ),
    });

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(X_CORRELATION_ID, value);
    }

    response
}

/// HTTP client identifying itself as this workspace
pub fn create_traced_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("moodcast/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Helper to add correlation ID to outgoing HTTP requests
pub fn add_correlation_id_header(
    request: reqwest::RequestBuilder,
    correlation_id: &str,
) -> reqwest::RequestBuilder {
    request
        .header(X_CORRELATION_ID, correlation_id)
        .header(X_REQUEST_ID, correlation_id)
}
