//! Application layer of the server.
//!
//! Nothing here touches sockets.  The network layer hands decoded
//! [`drawlink_core::Command`]s to [`dispatch::dispatch`], which turns each one
//! into a call on an [`dispatch::ApplicationLoop`]: the component that owns
//! the authoritative scenes.
//!
//! # Sub-modules
//!
//! - **`dispatch`** – The `ApplicationLoop` trait and the command-to-callback
//!   mapping, including which failures are reported and which are ignored.
//!
//! - **`scene_registry`** – An in-memory `ApplicationLoop` keeping every
//!   client's scenes in a map, used by the binary and by tests.

pub mod dispatch;
pub mod scene_registry;
