use uuid::Uuid;

/// HTTP header name for correlation ID
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// HTTP header name for request ID (same as correlation ID)
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generate a new correlation ID
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Extract correlation ID from HTTP headers or generate a new one
pub fn extract_or_generate_correlation_id(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(X_CORRELATION_ID)
        .or_else(|| headers.get(X_REQUEST_ID))
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_correlation_id)
}

/// Correlation ID stored in request extensions by the tracing middleware
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_generate_correlation_id() {
        let id = generate_correlation_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_extract_correlation_id_from_x_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("request-456"));

        assert_eq!(extract_or_generate_correlation_id(&headers), "request-456");
    }

    #[test]
    fn test_extract_correlation_id_prefers_x_correlation_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static("correlation-123"));
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("request-456"));

        assert_eq!(extract_or_generate_correlation_id(&headers), "correlation-123");
    }

    #[test]
    fn test_empty_header_generates_new_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static(""));

        let id = extract_or_generate_correlation_id(&headers);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_correlation_id_wrapper() {
        let id = CorrelationId("test-id".to_string());
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }
}
