//! Protocol module containing command frames and their codec.

pub mod commands;
pub mod frame;

pub use commands::{Command, CommandKind, FrameHeader, FRAME_HEADER_SIZE};
pub use frame::{
    command_from_parts, decode_frame, encode_frame, frame_len, write_frame, ProtocolError,
};
