//! Command dispatch: maps each decoded command onto an [`ApplicationLoop`]
//! callback.
//!
//! # Failure semantics
//!
//! A failed callback is returned as a [`DispatchError`] so the caller can
//! report it; it never closes the connection.  `exit` is not applied here at
//! all: it is returned as [`DispatchOutcome::Exit`] and the connection table
//! defers the teardown to its next cleanup pass.

use drawlink_core::{Command, Handle, Scene, SceneError};
use thiserror::Error;
use tracing::{debug, warn};

/// Identity of a connected client: its remote address, e.g. `"10.0.0.7:51234"`.
pub type ClientId = String;

/// The component that owns the authoritative server-side scenes.
///
/// All calls arrive from a single task, one command at a time, in the order
/// each client sent them.
#[cfg_attr(test, mockall::automock)]
pub trait ApplicationLoop: Send {
    /// A client connected.
    fn cmd_client_add(&mut self, client: &str);

    /// A client's connection was torn down; release everything it owned.
    fn cmd_client_del(&mut self, client: &str);

    /// Creates a scene from a serialized empty-scene shell and returns the
    /// handle allocated for it.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError`] if the shell cannot be decoded.
    fn cmd_scene_begin(&mut self, client: &str, payload: &[u8]) -> Result<Handle, SceneError>;

    /// Adds one serialized entity to `scene`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError`] if the scene is unknown or the entity cannot be
    /// decoded or placed.
    fn cmd_scene_add_gp(
        &mut self,
        client: &str,
        scene: Handle,
        payload: &[u8],
    ) -> Result<Handle, SceneError>;

    /// Closes `scene` and drops its contents.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError`] if the scene is unknown.
    fn cmd_scene_close(&mut self, client: &str, scene: Handle) -> Result<(), SceneError>;

    /// A copy of one scene, for renderers and tests.
    fn scene_snapshot(&self, client: &str, scene: Handle) -> Option<Scene>;
}

/// What the connection table should do after a command was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The command reached the application loop.
    Applied,
    /// The command is accepted on the wire but has no server-side effect.
    Ignored,
    /// The client asked to close the connection.
    Exit,
}

/// A callback rejected a command.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("begin from {client} failed: {source}")]
    Begin {
        client: ClientId,
        #[source]
        source: SceneError,
    },

    #[error("add to scene {scene} from {client} failed: {source}")]
    Add {
        client: ClientId,
        scene: Handle,
        #[source]
        source: SceneError,
    },

    #[error("close of scene {scene} from {client} failed: {source}")]
    Close {
        client: ClientId,
        scene: Handle,
        #[source]
        source: SceneError,
    },
}

/// Applies one command from `client` to `app`.
///
/// # Errors
///
/// Returns [`DispatchError`] if the application loop rejected the command;
/// the command is then treated as not applied.
pub fn dispatch<A: ApplicationLoop + ?Sized>(
    app: &mut A,
    client: &str,
    command: Command,
) -> Result<DispatchOutcome, DispatchError> {
    match command {
        Command::Begin { scene, payload } => {
            let allocated = app
                .cmd_scene_begin(client, &payload)
                .map_err(|source| DispatchError::Begin {
                    client: client.to_string(),
                    source,
                })?;
            if allocated != scene {
                warn!(
                    %client, announced = %scene, %allocated,
                    "client and server disagree on scene handle"
                );
            }
            Ok(DispatchOutcome::Applied)
        }
        Command::Add { scene, payload } => {
            app.cmd_scene_add_gp(client, scene, &payload)
                .map_err(|source| DispatchError::Add {
                    client: client.to_string(),
                    scene,
                    source,
                })?;
            Ok(DispatchOutcome::Applied)
        }
        Command::Close { scene } => {
            app.cmd_scene_close(client, scene)
                .map_err(|source| DispatchError::Close {
                    client: client.to_string(),
                    scene,
                    source,
                })?;
            Ok(DispatchOutcome::Applied)
        }
        Command::Exit => Ok(DispatchOutcome::Exit),
        Command::Clear { scene } => {
            debug!(%client, %scene, "clear ignored");
            Ok(DispatchOutcome::Ignored)
        }
        Command::Wait | Command::Dummy => {
            debug!(%client, "no-op command");
            Ok(DispatchOutcome::Ignored)
        }
    }
}
