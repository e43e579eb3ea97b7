//! Application layer use cases for the client.
//!
//! - **`session`** – The drawing session: owned scenes, the current tool
//!   state, and the flush that turns unsent entities into `add` frames.  The
//!   transport is injected as a [`session::FrameSink`], so the session is
//!   unit-testable without sockets.

pub mod session;
