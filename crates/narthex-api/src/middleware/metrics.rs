//! # Request Metrics
//!
//! Records every request through the `metrics` facade:
//!
//! - `narthex_http_requests_total{method, status}`: counter.
//! - `narthex_http_request_duration_seconds{method}`: histogram.
//!
//! The `method` label is one of the standard methods or `other`; arbitrary
//! extension tokens never become label values.
//!
//! Without an installed recorder (no `--metrics-addr`) these are no-ops.
//! Registration outcomes are counted separately by the registrar.

use std::time::Instant;

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

/// Label value for `method`.
pub fn method_label(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "GET",
        "PUT" => "PUT",
        "POST" => "POST",
        "HEAD" => "HEAD",
        "DELETE" => "DELETE",
        "OPTIONS" => "OPTIONS",
        "PATCH" => "PATCH",
        _ => "other",
    }
}

/// Middleware that counts requests and records their latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = method_label(request.method());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    ::metrics::counter!(
        "narthex_http_requests_total",
        "method" => method,
        "status" => status
    )
    .increment(1);
    ::metrics::histogram!("narthex_http_request_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());

    response
}
