//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the server's TOML file, falling back to
//! defaults when the file does not exist, and can write it back.

pub mod config;
