//! Network infrastructure for the client.
//!
//! [`TcpFrameSink`] is the production [`FrameSink`]: one TCP connection to
//! the server, written to in whole packets.  The server never writes back,
//! so the read half is left idle until the connection is dropped.

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::application::session::FrameSink;

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientNetworkError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A [`FrameSink`] over a TCP connection.
#[derive(Debug)]
pub struct TcpFrameSink {
    stream: TcpStream,
    peer: SocketAddr,
    local: SocketAddr,
}

impl TcpFrameSink {
    /// Connects to the server at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientNetworkError::ConnectFailed`] if the server is not
    /// reachable, or [`ClientNetworkError::Io`] if the socket cannot be
    /// configured.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientNetworkError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientNetworkError::ConnectFailed { addr, source })?;
        // Frames are already batched into packets; don't let Nagle delay them.
        stream.set_nodelay(true)?;
        let local = stream.local_addr()?;
        info!("connected to server at {addr} from {local}");
        Ok(Self {
            stream,
            peer: addr,
            local,
        })
    }

    /// The server's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// This side's address: the identity the server files our scenes under.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

#[async_trait]
impl FrameSink for TcpFrameSink {
    async fn send(&mut self, packet: &[u8]) -> Result<(), String> {
        self.stream
            .write_all(packet)
            .await
            .map_err(|e| format!("write to {} failed: {e}", self.peer))?;
        debug!("sent {} bytes to {}", packet.len(), self.peer);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
