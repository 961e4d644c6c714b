//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`tracing_layer`]: request/response tracing with `TraceLayer`.
//! - [`metrics`]: request counters and latency through the `metrics` facade.
//! - [`host`]: virtual-host filtering on the `Host` header.

pub mod host;
pub mod metrics;
pub mod tracing_layer;
