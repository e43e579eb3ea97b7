//! drawlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the client do?
//!
//! The client is the side that draws.  A [`application::session::Session`]
//! holds the scenes being drawn and a tool state (brush, fill, font, active
//! transform) that is stamped onto every entity it creates.  Drawing is
//! local; `scene_flush` sends only the entities the server has not seen yet,
//! batched into packets of roughly the configured size.

/// Application layer: the drawing session.
pub mod application;

/// Infrastructure layer: TCP transport and configuration storage.
pub mod infrastructure;
