//! Connection manager: the accept loop, the connection table, and the
//! per-connection read tasks.
//!
//! # Task layout
//!
//! ```text
//!  TcpListener ──accept──► Server::run (one task)
//!                              │ owns: connection table, ApplicationLoop
//!                              ▲
//!          mpsc<ConnectionEvent>│          mpsc<ServerQuery>
//!     ┌────────────┬───────────┘                ▲
//!  read task   read task  ...                ServerHandle
//!  (one per connection: decode frames)
//! ```
//!
//! Read tasks never touch a scene.  They decode frames and forward them, so
//! every scene has exactly one writer: the server loop.
//!
//! # Connection lifecycle
//!
//! A record starts `Open`.  `exit` moves it to `Closed`; a socket failure, an
//! oversize frame, or EOF without `exit` moves it to `Error`.  Either way the
//! record stays in the table until the next cleanup pass, which aborts the
//! read task and releases the client's scenes through
//! [`ApplicationLoop::cmd_client_del`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use drawlink_core::{Command, Handle, ProtocolError, Scene};
use thiserror::Error;
use tokio::io::{AsyncRead, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::dispatch::{dispatch, ApplicationLoop, ClientId, DispatchOutcome};

use super::frame_reader::{read_command, FrameReadError};

/// How often the server loop re-checks the shutdown flag when idle.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Capacity of the query channel behind [`ServerHandle`].
const QUERY_QUEUE: usize = 16;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for server start-up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

// ── Types ─────────────────────────────────────────────────────────────────────

/// Runtime settings of the server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind_address: SocketAddr,
    /// Largest `begin`/`add` payload accepted from a client.
    pub max_payload_bytes: usize,
    /// Capacity of the channel between read tasks and the server loop.
    pub event_queue: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 27190)),
            max_payload_bytes: 64 * 1024 * 1024,
            event_queue: 1024,
        }
    }
}

/// State of one connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    /// The client sent `exit`.
    Closed,
    /// The socket failed or the stream became unreadable.
    Error,
}

#[derive(Debug)]
struct ConnectionRecord {
    status: ConnectionStatus,
    task: JoinHandle<()>,
}

/// Events emitted by read tasks to the server loop.
#[derive(Debug)]
pub enum ConnectionEvent {
    Command {
        client: ClientId,
        command: Command,
    },
    /// A frame was rejected but the stream is still aligned.
    ProtocolViolation {
        client: ClientId,
        error: ProtocolError,
    },
    /// The read task hit an unrecoverable error and stopped.
    Failed {
        client: ClientId,
        error: String,
    },
    /// The peer closed the stream between frames.
    Disconnected {
        client: ClientId,
    },
}

/// Read-only requests answered by the server loop.
#[derive(Debug)]
pub enum ServerQuery {
    Snapshot {
        client: ClientId,
        scene: Handle,
        reply: oneshot::Sender<Option<Scene>>,
    },
    Clients {
        reply: oneshot::Sender<Vec<(ClientId, ConnectionStatus)>>,
    },
}

/// Cloneable handle for querying a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    queries: mpsc::Sender<ServerQuery>,
}

impl ServerHandle {
    /// A copy of `scene` as currently held for `client`.
    ///
    /// Returns `None` if the scene does not exist or the server has stopped.
    pub async fn snapshot(&self, client: &str, scene: Handle) -> Option<Scene> {
        let (reply, rx) = oneshot::channel();
        self.queries
            .send(ServerQuery::Snapshot {
                client: client.to_string(),
                scene,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Every connection record with its status, sorted by client id.
    ///
    /// Empty if the server has stopped.
    pub async fn clients(&self) -> Vec<(ClientId, ConnectionStatus)> {
        let (reply, rx) = oneshot::channel();
        if self.queries.send(ServerQuery::Clients { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// The listening server: owns the connection table and the application loop.
pub struct Server<A> {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: ServerOptions,
    app: A,
    connections: HashMap<ClientId, ConnectionRecord>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: mpsc::Receiver<ConnectionEvent>,
    queries_tx: mpsc::Sender<ServerQuery>,
    queries_rx: mpsc::Receiver<ServerQuery>,
}

/// What woke the server loop.
enum Step {
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Event(ConnectionEvent),
    Query(ServerQuery),
    Tick,
}

impl<A: ApplicationLoop> Server<A> {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the address is in use or not
    /// permitted.
    pub async fn bind(options: ServerOptions, app: A) -> Result<Self, ServerError> {
        let bind_failed = |source| ServerError::BindFailed {
            addr: options.bind_address,
            source,
        };
        let listener = TcpListener::bind(options.bind_address)
            .await
            .map_err(bind_failed)?;
        let local_addr = listener.local_addr().map_err(bind_failed)?;

        let (events_tx, events_rx) = mpsc::channel(options.event_queue.max(1));
        let (queries_tx, queries_rx) = mpsc::channel(QUERY_QUEUE);
        Ok(Self {
            listener,
            local_addr,
            options,
            app,
            connections: HashMap::new(),
            events_tx,
            events_rx,
            queries_tx,
            queries_rx,
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            queries: self.queries_tx.clone(),
        }
    }

    /// Serves connections until `running` is cleared, then tears down every
    /// connection and returns the application loop.
    pub async fn run(mut self, running: Arc<AtomicBool>) -> A {
        info!(addr = %self.local_addr, "server listening");

        while running.load(Ordering::Relaxed) {
            self.clean();

            let step = tokio::select! {
                accepted = self.listener.accept() => Step::Accepted(accepted),
                Some(event) = self.events_rx.recv() => Step::Event(event),
                Some(query) = self.queries_rx.recv() => Step::Query(query),
                () = tokio::time::sleep(POLL_INTERVAL) => Step::Tick,
            };

            match step {
                Step::Accepted(Ok((stream, addr))) => self.listen(stream, addr),
                // Transient (e.g. out of file descriptors); keep serving.
                Step::Accepted(Err(e)) => error!("accept error: {e}"),
                Step::Event(event) => self.handle_event(event),
                Step::Query(query) => self.answer(query),
                Step::Tick => {}
            }
        }

        info!("shutdown flag set; closing {} connection(s)", self.connections.len());
        for (client, record) in self.connections.drain() {
            record.task.abort();
            self.app.cmd_client_del(&client);
        }
        self.app
    }

    /// Registers a freshly accepted connection and spawns its read task.
    fn listen(&mut self, stream: TcpStream, addr: SocketAddr) {
        let client: ClientId = addr.to_string();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%client, "set_nodelay failed: {e}");
        }

        let task = tokio::spawn(read_connection(
            BufReader::new(stream),
            client.clone(),
            self.options.max_payload_bytes,
            self.events_tx.clone(),
        ));
        self.connections.insert(
            client.clone(),
            ConnectionRecord {
                status: ConnectionStatus::Open,
                task,
            },
        );
        info!(%client, "client connected");
        self.app.cmd_client_add(&client);
    }

    /// Removes every record that is no longer open.
    fn clean(&mut self) {
        let finished: Vec<ClientId> = self
            .connections
            .iter()
            .filter(|(_, r)| r.status != ConnectionStatus::Open)
            .map(|(c, _)| c.clone())
            .collect();

        for client in finished {
            if let Some(record) = self.connections.remove(&client) {
                record.task.abort();
                info!(%client, status = ?record.status, "connection removed");
                self.app.cmd_client_del(&client);
            }
        }
    }

    fn set_status(&mut self, client: &str, status: ConnectionStatus) {
        if let Some(record) = self.connections.get_mut(client) {
            // A clean exit followed by the peer hanging up stays Closed.
            if record.status == ConnectionStatus::Open {
                record.status = status;
            }
        }
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Command { client, command } => {
                match self.connections.get(&client).map(|r| r.status) {
                    Some(ConnectionStatus::Open) => {}
                    _ => {
                        debug!(%client, kind = ?command.kind(), "command from inactive connection dropped");
                        return;
                    }
                }
                match dispatch(&mut self.app, &client, command) {
                    Ok(DispatchOutcome::Exit) => {
                        info!(%client, "client requested exit");
                        self.set_status(&client, ConnectionStatus::Closed);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("{e}"),
                }
            }
            ConnectionEvent::ProtocolViolation { client, error } => {
                warn!(%client, "frame skipped: {error}");
            }
            ConnectionEvent::Failed { client, error } => {
                warn!(%client, "connection failed: {error}");
                self.set_status(&client, ConnectionStatus::Error);
            }
            ConnectionEvent::Disconnected { client } => {
                debug!(%client, "peer closed the stream");
                self.set_status(&client, ConnectionStatus::Error);
            }
        }
    }

    fn answer(&self, query: ServerQuery) {
        // A dropped receiver only means the asker stopped waiting.
        match query {
            ServerQuery::Snapshot {
                client,
                scene,
                reply,
            } => {
                let _ = reply.send(self.app.scene_snapshot(&client, scene));
            }
            ServerQuery::Clients { reply } => {
                let mut clients: Vec<_> = self
                    .connections
                    .iter()
                    .map(|(c, r)| (c.clone(), r.status))
                    .collect();
                clients.sort_by(|a, b| a.0.cmp(&b.0));
                let _ = reply.send(clients);
            }
        }
    }
}

// ── Per-connection read task ──────────────────────────────────────────────────

/// Reads frames from one connection and forwards them to the server loop.
///
/// Ends after the first fatal error, on EOF, or when the server loop has gone
/// away.
async fn read_connection<R>(
    mut reader: R,
    client: ClientId,
    max_payload: usize,
    events: mpsc::Sender<ConnectionEvent>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let (event, last) = match read_command(&mut reader, max_payload).await {
            Ok(Some(command)) => (
                ConnectionEvent::Command {
                    client: client.clone(),
                    command,
                },
                false,
            ),
            Ok(None) => (
                ConnectionEvent::Disconnected {
                    client: client.clone(),
                },
                true,
            ),
            Err(e) if e.is_fatal() => (
                ConnectionEvent::Failed {
                    client: client.clone(),
                    error: e.to_string(),
                },
                true,
            ),
            Err(FrameReadError::Protocol(error)) => (
                ConnectionEvent::ProtocolViolation {
                    client: client.clone(),
                    error,
                },
                false,
            ),
            Err(e @ FrameReadError::Io(_)) => (
                ConnectionEvent::Failed {
                    client: client.clone(),
                    error: e.to_string(),
                },
                true,
            ),
        };

        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::MockApplicationLoop;
    use drawlink_core::encode_frame;
    use tokio::io::AsyncWriteExt;
    use tokio_test::io::Builder;

    const PEER: &str = "10.0.0.1:5000";

    /// Polls the connection table until `done` holds, for up to two seconds.
    async fn wait_for(
        handle: &ServerHandle,
        done: impl Fn(&[(ClientId, ConnectionStatus)]) -> bool,
    ) -> bool {
        for _ in 0..200 {
            if done(&handle.clients().await) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn collect_events(bytes: &[u8], max_payload: usize) -> Vec<ConnectionEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        let mock = Builder::new().read(bytes).build();
        read_connection(mock, PEER.to_string(), max_payload, tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_read_task_forwards_commands_then_disconnect() {
        // Arrange
        let mut bytes = encode_frame(&Command::Wait);
        bytes.extend(encode_frame(&Command::Exit));

        // Act
        let events = collect_events(&bytes, 1024).await;

        // Assert
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ConnectionEvent::Command { command: Command::Wait, .. }));
        assert!(matches!(&events[1], ConnectionEvent::Command { command: Command::Exit, .. }));
        assert!(matches!(&events[2], ConnectionEvent::Disconnected { client } if client == PEER));
    }

    #[tokio::test]
    async fn test_read_task_reports_violation_and_continues() {
        let mut bytes = Vec::new();
        for field in [99u64, 0, 0, 0] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes.extend(encode_frame(&Command::Dummy));

        let events = collect_events(&bytes, 1024).await;

        assert!(matches!(
            &events[0],
            ConnectionEvent::ProtocolViolation { error: ProtocolError::UnknownCommand(99), .. }
        ));
        assert!(matches!(&events[1], ConnectionEvent::Command { command: Command::Dummy, .. }));
    }

    #[tokio::test]
    async fn test_read_task_stops_on_oversize_payload() {
        let frame = encode_frame(&Command::Add { scene: Handle(1), payload: vec![0; 64] });
        // Only the header: the task must stop before asking for the payload.
        let events = collect_events(&frame[..32], 16).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ConnectionEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_server_registers_and_releases_client_on_exit() {
        // Arrange
        let mut app = MockApplicationLoop::new();
        app.expect_cmd_client_add().times(1).return_const(());
        app.expect_cmd_client_del().times(1).return_const(());
        let options = ServerOptions {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..ServerOptions::default()
        };
        let server = Server::bind(options, app).await.unwrap();
        let addr = server.local_addr();
        let handle = server.handle();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(server.run(Arc::clone(&running)));

        // Act
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let registered = wait_for(&handle, |c| c.len() == 1).await;
        stream.write_all(&encode_frame(&Command::Exit)).await.unwrap();
        let released = wait_for(&handle, |c| c.is_empty()).await;
        running.store(false, Ordering::Relaxed);
        let app = task.await.unwrap();

        // Assert: call counts are verified when the mock is dropped.
        assert!(registered, "connection was never registered");
        assert!(released, "connection was never released");
        drop(app);
    }

    #[tokio::test]
    async fn test_server_drops_connections_on_shutdown() {
        let mut app = MockApplicationLoop::new();
        app.expect_cmd_client_add().times(1).return_const(());
        app.expect_cmd_client_del().times(1).return_const(());
        let options = ServerOptions {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..ServerOptions::default()
        };
        let server = Server::bind(options, app).await.unwrap();
        let addr = server.local_addr();
        let handle = server.handle();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(server.run(Arc::clone(&running)));

        let _stream = TcpStream::connect(addr).await.unwrap();
        assert!(wait_for(&handle, |c| c.len() == 1).await);
        running.store(false, Ordering::Relaxed);

        drop(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_bind_to_address_in_use_fails() {
        let first = Server::bind(
            ServerOptions {
                bind_address: "127.0.0.1:0".parse().unwrap(),
                ..ServerOptions::default()
            },
            MockApplicationLoop::new(),
        )
        .await
        .unwrap();

        let second = Server::bind(
            ServerOptions {
                bind_address: first.local_addr(),
                ..ServerOptions::default()
            },
            MockApplicationLoop::new(),
        )
        .await;

        assert!(matches!(second, Err(ServerError::BindFailed { .. })));
    }
}
