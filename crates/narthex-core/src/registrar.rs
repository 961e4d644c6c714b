//! # Registration Handler
//!
//! Turns one parsed request (method, path, body) into an [`Outcome`]:
//!
//! ```text
//! method == PUT ──no──▶ MethodNotAllowed
//!      │
//! KeyId::from_path ──err──▶ BadRequest
//!      │
//! KeyStore::claim ──exists──▶ Conflict
//!      │            └─other──▶ InternalError
//! Claim::persist ──err──▶ InternalError (artifact removed)
//!      │
//!   Created
//! ```
//!
//! The registrar keeps no state between calls. Two requests for the same
//! identifier are ordered only by the exclusive create inside
//! [`KeyStore::claim`], so it is safe to call [`Registrar::handle`] from any
//! number of threads at once.
//!
//! Client errors and conflicts are logged at debug level. Server faults are
//! logged with the artifact name and cause; the caller only ever sees the
//! status code.

use crate::identity::KeyId;
use crate::store::KeyStore;

/// The only method that registers a key.
pub const REGISTER_METHOD: &str = "PUT";

/// Result of one registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The identifier was free and the body is fully persisted.
    Created,
    /// The identifier segment is missing or not a 32-bit hex value.
    BadRequest,
    /// The request did not use [`REGISTER_METHOD`].
    MethodNotAllowed,
    /// The identifier is already registered.
    Conflict,
    /// Storage failed; details are in the server log only.
    InternalError,
}

impl Outcome {
    /// HTTP status code for this outcome.
    pub const fn status_code(self) -> u16 {
        match self {
            Self::Created => 201,
            Self::BadRequest => 400,
            Self::MethodNotAllowed => 405,
            Self::Conflict => 409,
            Self::InternalError => 500,
        }
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::BadRequest => "bad_request",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Conflict => "conflict",
            Self::InternalError => "internal_error",
        }
    }
}

/// First-come-first-served key registration over a [`KeyStore`].
#[derive(Debug, Clone)]
pub struct Registrar {
    store: KeyStore,
}

impl Registrar {
    pub fn new(store: KeyStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Register `body` under the identifier at the end of `path`.
    ///
    /// Blocks on filesystem I/O.
    pub fn handle(&self, method: &str, path: &str, body: &[u8]) -> Outcome {
        let outcome = self.register(method, path, body);
        metrics::counter!("narthex_registrations_total", "outcome" => outcome.as_str())
            .increment(1);
        outcome
    }

    fn register(&self, method: &str, path: &str, body: &[u8]) -> Outcome {
        if method != REGISTER_METHOD {
            tracing::debug!(%method, %path, "rejected non-PUT registration");
            return Outcome::MethodNotAllowed;
        }

        let id = match KeyId::from_path(path) {
            Ok(id) => id,
            Err(error) => {
                tracing::debug!(%path, %error, "rejected identifier");
                return Outcome::BadRequest;
            }
        };

        let claim = match self.store.claim(id) {
            Ok(claim) => claim,
            Err(error) if error.is_conflict() => {
                tracing::debug!(key = %id, "identifier already registered");
                return Outcome::Conflict;
            }
            Err(error) => {
                tracing::warn!(key = %id.file_name(), %error, "failed to claim key artifact");
                return Outcome::InternalError;
            }
        };

        match claim.persist(body) {
            Ok(()) => {
                tracing::info!(key = %id.file_name(), bytes = body.len(), "registered key");
                Outcome::Created
            }
            Err(error) => {
                tracing::warn!(%error, "failed to write key artifact");
                Outcome::InternalError
            }
        }
    }
}
