//! # Application State
//!
//! [`ServerConfig`] is the process-wide configuration, built once by the
//! binary (see [`crate::bootstrap`]) and shared read-only. [`AppState`] is
//! what handlers receive through the `State` extractor: the registrar and
//! the config. Neither holds mutable state; the key directory is the only
//! shared resource and the filesystem arbitrates access to it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use narthex_core::{KeyStore, Registrar};
use serde::Deserialize;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8192;

/// Default maximum request body. Registered keys are 32-byte blobs.
pub const DEFAULT_BODY_LIMIT: usize = 32;

/// Default listen address (all interfaces).
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind_ip: IpAddr,
    /// Port to bind the listener to.
    pub port: u16,
    /// Directory key artifacts are written to.
    pub key_dir: PathBuf,
    /// Only serve requests whose `Host` matches, when set.
    pub domain: Option<String>,
    /// Largest accepted request body in bytes.
    pub body_limit: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the key directory.
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP,
            port: DEFAULT_PORT,
            key_dir: key_dir.into(),
            domain: None,
            body_limit: DEFAULT_BODY_LIMIT,
            log_format: LogFormat::default(),
        }
    }

    /// Socket address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registrar: Registrar,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// State writing artifacts to `config.key_dir`.
    pub fn new(config: ServerConfig) -> Self {
        let store = KeyStore::open_dir(&config.key_dir);
        Self::with_store(config, store)
    }

    /// State over an explicit store (tests inject faulty backends here).
    pub fn with_store(config: ServerConfig, store: KeyStore) -> Self {
        Self {
            registrar: Registrar::new(store),
            config: Arc::new(config),
        }
    }
}
