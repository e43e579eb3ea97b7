//! drawlink server: entry point.
//!
//! Accepts client connections and rebuilds every client's scenes in memory.
//!
//! # Usage
//!
//! ```text
//! drawlink-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>               TOML config file [default: drawlink-server.toml]
//!   --bind-address <IP>           Listen address (overrides the file)
//!   --port <PORT>                 Listen port (overrides the file)
//!   --max-payload-bytes <BYTES>   Largest accepted begin/add payload
//!   --log-level <LEVEL>           Used when RUST_LOG is not set
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                      | Overrides                    |
//! |-------------------------------|------------------------------|
//! | `DRAWLINK_SERVER_CONFIG`      | `--config`                   |
//! | `DRAWLINK_BIND_ADDRESS`       | `[network] bind_address`     |
//! | `DRAWLINK_PORT`               | `[network] port`             |
//! | `DRAWLINK_MAX_PAYLOAD_BYTES`  | `[server] max_payload_bytes` |
//! | `DRAWLINK_LOG_LEVEL`          | `[server] log_level`         |
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the config file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drawlink_server::application::scene_registry::SceneRegistry;
use drawlink_server::infrastructure::network::connection_manager::{Server, ServerOptions};
use drawlink_server::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// drawlink scene server.
#[derive(Debug, Parser)]
#[command(
    name = "drawlink-server",
    about = "Rebuilds client scene graphs sent over TCP",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means all defaults.
    #[arg(long, default_value = "drawlink-server.toml", env = "DRAWLINK_SERVER_CONFIG")]
    config: PathBuf,

    /// IP address to listen on.
    #[arg(long, env = "DRAWLINK_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "DRAWLINK_PORT")]
    port: Option<u16>,

    /// Largest `begin`/`add` payload accepted, in bytes.
    #[arg(long, env = "DRAWLINK_MAX_PAYLOAD_BYTES")]
    max_payload_bytes: Option<usize>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "DRAWLINK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`.
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(addr) = &self.bind_address {
            config.network.bind_address = addr.clone();
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(max) = self.max_payload_bytes {
            config.server.max_payload_bytes = max;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        config
    }
}

/// Converts the effective configuration into [`ServerOptions`].
///
/// # Errors
///
/// Returns an error if the bind address and port do not form a valid socket
/// address.
fn server_options(config: &AppConfig) -> anyhow::Result<ServerOptions> {
    let bind_address: SocketAddr =
        format!("{}:{}", config.network.bind_address, config.network.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid bind address: '{}:{}'",
                    config.network.bind_address, config.network.port
                )
            })?;

    Ok(ServerOptions {
        bind_address,
        max_payload_bytes: config.server.max_payload_bytes,
        event_queue: config.server.event_queue,
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let config = cli.apply(file_config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let options = server_options(&config)?;
    info!(
        "drawlink server starting (max payload {} bytes)",
        options.max_payload_bytes
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    let server = Server::bind(options, SceneRegistry::new()).await?;
    let registry = server.run(running).await;

    info!("drawlink server stopped ({} client(s) left)", registry.client_count());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
