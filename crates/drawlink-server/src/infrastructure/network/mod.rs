//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`frame_reader`** – Reads one command frame at a time from an async
//!   byte stream, enforcing the payload size limit before allocating.
//!
//! - **`connection_manager`** – The accept loop and the connection table.
//!   Each connection gets its own read task; decoded commands travel over an
//!   `mpsc` channel to the single task that owns the application loop.

pub mod connection_manager;
pub mod frame_reader;
