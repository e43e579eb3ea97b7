//! drawlink client: entry point.
//!
//! Connects to a drawlink server, draws a small demo scene (an axes triad, a
//! ring, a filled triangle, and a label), flushes it, and disconnects.
//!
//! # Usage
//!
//! ```text
//! drawlink-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML config file [default: drawlink-client.toml]
//!   --server-address <ADDR>    host:port of the server (overrides the file)
//!   --packet-size <BYTES>      Flush batching threshold (overrides the file)
//!   --scene <NAME>             Name of the demo scene [default: demo]
//!   --ring-segments <N>        Vertices in the demo ring [default: 64]
//! ```

use std::f64::consts::TAU;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use glam::DVec3;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drawlink_client::application::session::Session;
use drawlink_client::infrastructure::network::TcpFrameSink;
use drawlink_client::infrastructure::storage::config::{load_config, AppConfig};
use drawlink_core::gp::{Brush, Fill, Font, RefFrame};
use drawlink_core::Handle;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// drawlink demo client.
#[derive(Debug, Parser)]
#[command(
    name = "drawlink-client",
    about = "Draws a demo scene on a drawlink server",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means all defaults.
    #[arg(long, default_value = "drawlink-client.toml", env = "DRAWLINK_CLIENT_CONFIG")]
    config: PathBuf,

    /// `host:port` of the server.
    #[arg(long, env = "DRAWLINK_SERVER_ADDRESS")]
    server_address: Option<String>,

    /// Flush batching threshold in bytes.
    #[arg(long, env = "DRAWLINK_PACKET_SIZE")]
    packet_size: Option<usize>,

    /// Name of the demo scene.
    #[arg(long, default_value = "demo")]
    scene: String,

    /// Number of vertices in the demo ring.
    #[arg(long, default_value_t = 64)]
    ring_segments: usize,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`.
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(addr) = &self.server_address {
            config.network.server_address = addr.clone();
        }
        if let Some(size) = self.packet_size {
            config.session.optimal_packet_size = size;
        }
        config
    }
}

/// Points on a circle of `radius` in the XY plane.
fn ring(radius: f64, segments: usize) -> Vec<DVec3> {
    let segments = segments.max(3);
    (0..=segments)
        .map(|i| {
            let angle = TAU * i as f64 / segments as f64;
            DVec3::new(radius * angle.cos(), radius * angle.sin(), 0.0)
        })
        .collect()
}

/// Draws the demo content into the selected scene.
fn draw_demo(session: &mut Session<TcpFrameSink>, ring_segments: usize) -> anyhow::Result<()> {
    let root = session.group("demo", Handle::NONE)?;
    session.frame(1.0, root)?;

    session.brush_set(Brush {
        color: [0.2, 0.6, 1.0, 1.0],
        width: 2.0,
        ..Brush::default()
    });
    session.polyline(ring(2.0, ring_segments), root)?;

    session.fill_set(Fill {
        color: [1.0, 0.5, 0.0, 0.8],
        enabled: true,
    });
    session.transform_set(RefFrame::translation(DVec3::new(0.0, 0.0, 0.5)));
    session.polygon(
        vec![
            DVec3::new(-0.5, -0.5, 0.0),
            DVec3::new(0.5, -0.5, 0.0),
            DVec3::new(0.0, 0.5, 0.0),
        ],
        true,
        root,
    )?;

    session.transform_set(RefFrame::default());
    session.font_set(Font {
        family: "mono".to_string(),
        size: 14.0,
    });
    session.text(DVec3::new(0.0, -2.5, 0.0), "drawlink", root)?;
    session.point(DVec3::ZERO, 0.05, root)?;
    Ok(())
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
                .unwrap_or_else(|_| EnvFilter::new(&config.session.log_level)),
        )
        .init();

    let server: SocketAddr = config
        .network
        .server_address
        .parse()
        .with_context(|| format!("invalid server address: '{}'", config.network.server_address))?;

    let sink = TcpFrameSink::connect(server).await?;
    let mut session = Session::new(config.session.optimal_packet_size);
    session.open(sink);

    let scene = session.scene_begin(&cli.scene).await?;
    draw_demo(&mut session, cli.ring_segments)?;
    let sent = session.scene_flush().await?;
    info!(%scene, "flushed {sent} entities");

    session.scene_close(scene).await?;
    session.close().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
