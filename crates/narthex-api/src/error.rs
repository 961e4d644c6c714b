//! # API Error Types
//!
//! Errors raised by the serving layer itself, around the registrar: request
//! bodies that cannot be buffered, requests for another virtual host, and a
//! registration task that died. Every response is status-only; the reason is
//! logged server-side and never sent to the caller.

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// No resource here for this request (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request body could not be buffered (413 when over the limit).
    #[error("request body rejected ({status}): {reason}")]
    BodyRejected { status: StatusCode, reason: String },

    /// Internal server error (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BodyRejected { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        Self::BodyRejected {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::BodyRejected { .. } => tracing::info!(error = %self, "request body rejected"),
            Self::NotFound(_) => tracing::debug!(error = %self, "not found"),
        }

        status.into_response()
    }
}
