//! # API Route Modules
//!
//! - `register`: `PUT /register/{id}`, write-once key registration.

pub mod register;
