//! # Virtual Host Filtering
//!
//! When a domain is configured, the registration API only answers requests
//! addressed to it. Anything else gets a bodiless 404, as if the route did
//! not exist. Health probes are mounted outside this middleware.
//!
//! The host is taken from the `Host` header, falling back to the request
//! URI authority (HTTP/2). Comparison ignores ASCII case, the port, and a
//! trailing dot.

use axum::extract::Request;
use axum::http::header::HOST;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

/// The domain requests must be addressed to, if any.
#[derive(Debug, Clone, Default)]
pub struct VirtualHost {
    domain: Option<String>,
}

impl VirtualHost {
    pub fn new(domain: Option<&str>) -> Self {
        Self {
            domain: domain.map(normalize),
        }
    }

    /// Whether a request for `host` should be served.
    pub fn accepts(&self, host: Option<&str>) -> bool {
        match (&self.domain, host) {
            (None, _) => true,
            (Some(domain), Some(host)) => normalize(strip_port(host)) == *domain,
            (Some(_), None) => false,
        }
    }
}

fn normalize(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// `example.com:8192` → `example.com`, `[::1]:8192` → `[::1]`.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Middleware that rejects requests for other hosts with 404.
pub async fn virtual_host_middleware(request: Request, next: Next) -> Response {
    let vhost = request.extensions().get::<VirtualHost>().cloned();

    if let Some(vhost) = vhost {
        let host = request
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().authority().map(|a| a.as_str()));

        if !vhost.accepts(host) {
            return AppError::NotFound(format!("request for unserved host {host:?}"))
                .into_response();
        }
    }

    next.run(request).await
}
