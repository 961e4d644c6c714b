//! # narthex-core: Write-Once Key Registry
//!
//! First-come-first-served registration of opaque key blobs under a 32-bit
//! identifier. A registration either claims the identifier forever or leaves
//! no trace; concurrent registrations for the same identifier are serialized
//! by the filesystem, not by locks held in this process.
//!
//! ## Modules
//!
//! - [`identity`]: [`KeyId`] parsing from request paths and the canonical
//!   `0x<hex>.key` artifact name.
//! - [`store`]: exclusive-create claims over a [`KeyBackend`], with release
//!   of partially written artifacts.
//! - [`registrar`]: the registration handler mapping a parsed request to an
//!   [`Outcome`].
//! - [`error`]: error types for the above.
//!
//! ## Crate Policy
//!
//! - No HTTP types. The host serving layer owns request parsing and maps
//!   [`Outcome`] to a response.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod registrar;
pub mod store;

pub use error::{KeyIdError, StoreError};
pub use identity::KeyId;
pub use registrar::{Outcome, Registrar};
pub use store::{Claim, DirBackend, KeyBackend, KeyHandle, KeyStore, MAX_ARTIFACT_PATH};
