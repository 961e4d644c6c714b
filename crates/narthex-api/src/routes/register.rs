//! # Key Registration
//!
//! - `PUT /register/{id}`: register the request body under `id`.
//!
//! Every method on the path reaches [`register_key`] so the registrar makes
//! the method decision itself (405 for anything but PUT). The body limit
//! applies to PUT only; a non-PUT request is answered 405 even when its body
//! would have been rejected.
//!
//! The registrar does blocking filesystem I/O and runs on Tokio's blocking
//! pool; a client that disconnects does not cancel a registration already in
//! progress.
//!
//! Responses carry only a status code.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::any;
use axum::Router;
use narthex_core::Outcome;

use crate::error::AppError;
use crate::state::AppState;

/// Route pattern for registrations.
pub const REGISTER_ROUTE: &str = "/register/{id}";

/// Build the registration router.
pub fn router() -> Router<AppState> {
    Router::new().route(REGISTER_ROUTE, any(register_key))
}

/// Map a registration outcome to its HTTP status.
pub fn status_for(outcome: Outcome) -> StatusCode {
    match outcome {
        Outcome::Created => StatusCode::CREATED,
        Outcome::BadRequest => StatusCode::BAD_REQUEST,
        Outcome::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        Outcome::Conflict => StatusCode::CONFLICT,
        Outcome::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// PUT /register/{id}: first-come-first-served key registration.
async fn register_key(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, AppError> {
    // Body rejections only apply to PUT; the registrar answers 405 otherwise.
    let body = match body {
        Ok(body) => body,
        Err(rejection) if method == Method::PUT => return Err(rejection.into()),
        Err(_) => Bytes::new(),
    };
    let registrar = state.registrar.clone();
    let path = uri.path().to_owned();

    let outcome =
        tokio::task::spawn_blocking(move || registrar.handle(method.as_str(), &path, &body))
            .await
            .map_err(|e| AppError::Internal(format!("registration task failed: {e}")))?;

    Ok(status_for(outcome))
}
