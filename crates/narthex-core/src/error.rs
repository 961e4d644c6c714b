//! # Error Types
//!
//! `KeyIdError` covers client-caused identifier failures (surfaced as 400).
//! `StoreError` covers everything that can go wrong once the registrar
//! touches storage; only [`StoreError::AlreadyClaimed`] is an expected
//! outcome, the rest are server faults.

use thiserror::Error;

/// An identifier path segment that cannot be turned into a [`crate::KeyId`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyIdError {
    /// The request path has no `/` separating the identifier.
    #[error("request path has no identifier segment: {0:?}")]
    MissingSegment(String),

    /// The segment, or the part after its `0x` prefix, is empty.
    #[error("identifier is empty")]
    Empty,

    /// The segment contains a character outside `[0-9a-fA-F]`.
    #[error("identifier contains non-hex character {found:?} at offset {offset}")]
    InvalidDigit { found: char, offset: usize },

    /// The value does not fit in 32 bits.
    #[error("identifier exceeds 32-bit range: {0}")]
    OutOfRange(String),
}

/// Failures while claiming or persisting a key artifact.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An artifact with this name already exists.
    #[error("{name} is already registered")]
    AlreadyClaimed { name: String },

    /// The artifact path would exceed [`crate::MAX_ARTIFACT_PATH`] bytes.
    #[error("artifact path for {name} is {len} bytes (max {max})")]
    PathTooLong { name: String, len: usize, max: usize },

    /// Exclusive create failed for a reason other than the name existing.
    #[error("failed to create {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the body failed outright.
    #[error("failed to write {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The handle stopped accepting bytes before the whole body was written.
    #[error("short write to {name}: {written} of {expected} bytes")]
    ShortWrite {
        name: String,
        written: usize,
        expected: usize,
    },
}

impl StoreError {
    /// Whether this error is the expected "identifier already taken" outcome.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyClaimed { .. })
    }
}
