use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// HTTP header name for trace ID
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Middleware that assigns a unique trace ID to each request
///
/// The trace ID is stored in the request extensions, attached to the tracing
/// span so all log entries for the request carry it, and echoed in the
/// response headers. Error responses include the same ID so a caller-reported
/// failure can be matched to the server-side log line.
pub async fn trace_id_middleware(request: Request, next: Next) -> Response {
    let trace_id = Uuid::new_v4().to_string();

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        uri = %uri,
    );

    let mut request = request;
    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let response = async move {
        let response = next.run(request).await;
        tracing::info!(status = %response.status(), "Request completed");
        response
    }
    .instrument(span)
    .await;

    let (mut parts, body) = response.into_parts();
    parts.headers.insert(
        TRACE_ID_HEADER,
        HeaderValue::from_str(&trace_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
    );

    Response::from_parts(parts, body)
}

/// Extension type for storing trace ID in request extensions
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
