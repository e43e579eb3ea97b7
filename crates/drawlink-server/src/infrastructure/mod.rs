//! Infrastructure layer for the server.
//!
//! Contains the OS-facing adapters: the TCP listener with its per-connection
//! read tasks, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `drawlink_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
