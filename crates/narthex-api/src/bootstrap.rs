//! # Server Bootstrap
//!
//! Resolves the server configuration and prepares the application state.
//!
//! ## Bootstrap Sequence
//!
//! 1. **Layer configuration**: command-line flags (and their `NARTHEX_*`
//!    environment variables) over an optional YAML file over defaults.
//! 2. **Check the key directory**: it must exist and be a directory. It is
//!    never created here; a typo in `--root` should fail loudly rather than
//!    silently start a fresh, empty registry.
//! 3. **Build state**: registrar over the key directory.

use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::state::{AppState, LogFormat, ServerConfig, DEFAULT_BIND_IP, DEFAULT_BODY_LIMIT, DEFAULT_PORT};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors during server bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    ReadConfig { path: PathBuf, source: io::Error },

    /// Config file is not valid YAML for [`ConfigLayer`].
    #[error("invalid config file {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// No key directory in any layer.
    #[error("no key directory configured (set --root or `root:` in the config file)")]
    MissingKeyDir,

    /// Key directory could not be inspected.
    #[error("key directory {} is not accessible: {source}", path.display())]
    KeyDirUnavailable { path: PathBuf, source: io::Error },

    /// Key directory path exists but is not a directory.
    #[error("key directory {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Configuration layers
// ---------------------------------------------------------------------------

/// One layer of partial configuration. Used for the YAML file and for the
/// command line alike; unset fields fall through to the next layer.
///
/// ```yaml
/// ip: 127.0.0.1
/// port: 8192
/// root: /var/lib/narthex/keys
/// domain: keys.example.com
/// body_max: 32
/// log_format: json
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub domain: Option<String>,
    pub body_max: Option<usize>,
    pub log_format: Option<LogFormat>,
}

impl ConfigLayer {
    /// Parse a YAML document. An empty document is an empty layer.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Read and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, BootstrapError> {
        let text = fs::read_to_string(path).map_err(|source| BootstrapError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| BootstrapError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill unset fields of `self` from `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            ip: self.ip.or(lower.ip),
            port: self.port.or(lower.port),
            root: self.root.or(lower.root),
            domain: self.domain.or(lower.domain),
            body_max: self.body_max.or(lower.body_max),
            log_format: self.log_format.or(lower.log_format),
        }
    }

    /// Apply defaults. Fails only when no key directory was given.
    pub fn into_server_config(self) -> Result<ServerConfig, BootstrapError> {
        let key_dir = self.root.ok_or(BootstrapError::MissingKeyDir)?;
        Ok(ServerConfig {
            bind_ip: self.ip.unwrap_or(DEFAULT_BIND_IP),
            port: self.port.unwrap_or(DEFAULT_PORT),
            key_dir,
            domain: self.domain.filter(|d| !d.trim().is_empty()),
            body_limit: self.body_max.unwrap_or(DEFAULT_BODY_LIMIT),
            log_format: self.log_format.unwrap_or_default(),
        })
    }
}

/// Resolve the final configuration from command-line overrides and an
/// optional config file.
pub fn resolve_config(
    overrides: ConfigLayer,
    config_file: Option<&Path>,
) -> Result<ServerConfig, BootstrapError> {
    let file = match config_file {
        Some(path) => ConfigLayer::load(path)?,
        None => ConfigLayer::default(),
    };
    overrides.or(file).into_server_config()
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Validate the key directory and build the application state.
pub fn bootstrap(config: ServerConfig) -> Result<AppState, BootstrapError> {
    check_key_dir(&config.key_dir)?;

    tracing::info!(
        key_dir = %config.key_dir.display(),
        domain = config.domain.as_deref().unwrap_or("*"),
        body_limit = config.body_limit,
        "narthex configured"
    );

    Ok(AppState::new(config))
}

fn check_key_dir(path: &Path) -> Result<(), BootstrapError> {
    let meta = fs::metadata(path).map_err(|source| BootstrapError::KeyDirUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(BootstrapError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
