//! # drawlink-core
//!
//! Shared library for drawlink containing the binary codec, the graphic
//! primitive (GP) entity model, the scene container, and the command-frame
//! protocol.
//!
//! This crate is used by both the server and client applications.
//! It has no dependencies on sockets, rendering, or windowing.
//!
//! # Architecture overview
//!
//! drawlink lets a client issue immediate-mode 3D drawing calls that a server
//! rebuilds into an identical scene graph.  The client creates entities
//! locally, then flushes only the ones the server has not seen yet.
//!
//! - **`codec`** – Length-prefixed little-endian encoding of scalars, strings,
//!   vectors and geometry records.  Every entity describes its fields once
//!   through [`codec::Codec::rw`], which serves both directions.
//!
//! - **`gp`** – The drawable entities: a shared [`gp::GpBase`] (handle, name,
//!   family links, flags, appearance) plus one struct per variant, gathered in
//!   the closed [`gp::Gp`] enum and rebuilt from a type tag by
//!   [`gp::build`].
//!
//! - **`scene`** – [`Scene`], the owning handle-indexed table of GPs, with
//!   cascade delete, hierarchical visibility, and the flush cursor used for
//!   incremental transfer.
//!
//! - **`protocol`** – The 32-byte command frame (`begin`, `add`, `close`,
//!   `exit`, ...) that carries serialized scenes and entities over TCP.

pub mod codec;
pub mod gp;
pub mod protocol;
pub mod scene;

pub use codec::CodecError;
pub use gp::{FactoryError, Gp, GpBase, GpType, Handle, ToolState};
pub use protocol::{decode_frame, encode_frame, Command, CommandKind, ProtocolError};
pub use scene::{OwnershipError, Scene, SceneError};
