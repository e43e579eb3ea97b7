//! Command kinds and decoded command frames.

use crate::codec::{ByteReader, CodecError, Wire};
use crate::gp::Handle;

/// Size in bytes of every frame header: four little-endian `u64`s.
pub const FRAME_HEADER_SIZE: usize = 32;

/// Discriminant carried in the first header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum CommandKind {
    Clear = 0,
    Begin = 1,
    Add = 2,
    Close = 3,
    Wait = 4,
    Dummy = 5,
    Exit = 6,
}

impl CommandKind {
    /// Only `begin` and `add` are followed by `arg3` payload bytes.
    pub fn carries_payload(self) -> bool {
        matches!(self, CommandKind::Begin | CommandKind::Add)
    }
}

impl TryFrom<u64> for CommandKind {
    type Error = ();

    fn try_from(value: u64) -> Result<Self, ()> {
        match value {
            0 => Ok(CommandKind::Clear),
            1 => Ok(CommandKind::Begin),
            2 => Ok(CommandKind::Add),
            3 => Ok(CommandKind::Close),
            4 => Ok(CommandKind::Wait),
            5 => Ok(CommandKind::Dummy),
            6 => Ok(CommandKind::Exit),
            _ => Err(()),
        }
    }
}

/// The fixed 32-byte prefix of every frame, before any validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: u64,
    pub arg1: u64,
    pub arg2: u64,
    /// Payload length in bytes for `begin`/`add`.
    pub arg3: u64,
}

impl FrameHeader {
    /// Parses a header from exactly [`FRAME_HEADER_SIZE`] bytes.
    pub fn from_array(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let field = |i: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_le_bytes(raw)
        };
        Self {
            kind: field(0),
            arg1: field(1),
            arg2: field(2),
            arg3: field(3),
        }
    }

    pub fn command_kind(&self) -> Option<CommandKind> {
        CommandKind::try_from(self.kind).ok()
    }
}

impl Wire for FrameHeader {
    fn write(&self, out: &mut Vec<u8>) {
        self.kind.write(out);
        self.arg1.write(out);
        self.arg2.write(out);
        self.arg3.write(out);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        reader
            .take_array::<FRAME_HEADER_SIZE>()
            .map(|raw| Self::from_array(&raw))
    }
}

/// One decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clear a scene's contents.  `scene` is the target scene handle.
    Clear { scene: Handle },
    /// Start a new scene; `payload` is the serialized empty scene shell.
    /// `scene` is the client's handle for it and is informational only.
    Begin { scene: Handle, payload: Vec<u8> },
    /// Add one serialized entity to `scene`.
    Add { scene: Handle, payload: Vec<u8> },
    Close { scene: Handle },
    Wait,
    Dummy,
    /// Connection teardown request.
    Exit,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Clear { .. } => CommandKind::Clear,
            Command::Begin { .. } => CommandKind::Begin,
            Command::Add { .. } => CommandKind::Add,
            Command::Close { .. } => CommandKind::Close,
            Command::Wait => CommandKind::Wait,
            Command::Dummy => CommandKind::Dummy,
            Command::Exit => CommandKind::Exit,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Command::Begin { payload, .. } | Command::Add { payload, .. } => payload,
            _ => &[],
        }
    }

    /// The header that precedes this command on the wire.
    pub fn header(&self) -> FrameHeader {
        let arg1 = match self {
            Command::Clear { scene }
            | Command::Begin { scene, .. }
            | Command::Add { scene, .. }
            | Command::Close { scene } => scene.0,
            Command::Wait | Command::Dummy | Command::Exit => 0,
        };
        FrameHeader {
            kind: self.kind() as u64,
            arg1,
            arg2: 0,
            arg3: self.payload().len() as u64,
        }
    }
}
