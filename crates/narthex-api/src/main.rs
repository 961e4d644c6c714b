//! # narthex: Binary Entry Point
//!
//! Starts the key registration server. Configuration comes from flags,
//! `NARTHEX_*` environment variables, and an optional YAML file.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use narthex_api::bootstrap::{self, ConfigLayer};
use narthex_api::state::LogFormat;
use tracing_subscriber::EnvFilter;

/// narthex: first-come-first-served key registration over HTTP.
///
/// Accepts `PUT /register/0x<hex>` and stores the body as a write-once key
/// artifact in the key directory.
#[derive(Parser, Debug)]
#[command(name = "narthex", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// YAML config file; flags take precedence over its values.
    #[arg(long, env = "NARTHEX_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on [default: 0.0.0.0].
    #[arg(short, long, env = "NARTHEX_IP")]
    ip: Option<IpAddr>,

    /// Port to listen on [default: 8192].
    #[arg(short, long, env = "NARTHEX_PORT")]
    port: Option<u16>,

    /// Directory key artifacts are written to.
    #[arg(short, long, env = "NARTHEX_ROOT")]
    root: Option<PathBuf>,

    /// Only answer registrations addressed to this host name.
    #[arg(short, long, env = "NARTHEX_DOMAIN")]
    domain: Option<String>,

    /// Largest accepted request body in bytes [default: 32].
    #[arg(long, env = "NARTHEX_BODY_MAX")]
    body_max: Option<usize>,

    /// Log output format [default: text].
    #[arg(long, value_enum, env = "NARTHEX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "NARTHEX_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            ip: self.ip,
            port: self.port,
            root: self.root.clone(),
            domain: self.domain.clone(),
            body_max: self.body_max,
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = bootstrap::resolve_config(cli.overrides(), cli.config.as_deref())?;

    init_tracing(cli.verbose, config.log_format);

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
        tracing::info!(%addr, "prometheus metrics exporter listening");
    }

    let addr = config.listen_addr();
    let state = bootstrap::bootstrap(config).map_err(|e| {
        tracing::error!(error = %e, "bootstrap failed");
        e
    })?;

    let app = narthex_api::app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("narthex listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("narthex stopped");
    Ok(())
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
}
