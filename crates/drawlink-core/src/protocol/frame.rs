//! Encoding and decoding of command frames.
//!
//! Wire format:
//! ```text
//! [kind:8][arg1:8][arg2:8][arg3:8][payload:arg3]
//! ```
//! Total header size: 32 bytes. All fields are little-endian. Only `begin`
//! and `add` carry a payload.

use thiserror::Error;

use crate::codec::Wire;
use crate::gp::Handle;

use super::commands::{Command, CommandKind, FrameHeader, FRAME_HEADER_SIZE};

/// Errors raised while decoding a command frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes yet for the header or the declared payload.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The header's kind field is not a known command.
    #[error("unknown command kind: {0}")]
    UnknownCommand(u64),

    /// A payload-less command declared a non-zero payload length.
    #[error("{kind:?} carries no payload but declared {len} bytes")]
    UnexpectedPayload { kind: CommandKind, len: u64 },

    /// The declared payload length exceeds what the receiver accepts.
    #[error("payload of {declared} bytes exceeds limit of {limit}")]
    PayloadTooLarge { declared: u64, limit: usize },
}

/// Appends the frame for `cmd` (header then payload) to `out`.
pub fn write_frame(out: &mut Vec<u8>, cmd: &Command) {
    cmd.header().write(out);
    out.extend_from_slice(cmd.payload());
}

/// Encodes `cmd` into a fresh buffer.
///
/// # Examples
///
/// ```rust
/// use drawlink_core::gp::Handle;
/// use drawlink_core::protocol::{decode_frame, encode_frame, Command};
///
/// let cmd = Command::Close { scene: Handle(1) };
/// let bytes = encode_frame(&cmd);
/// let (decoded, n) = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, cmd);
/// assert_eq!(n, 32);
/// ```
pub fn encode_frame(cmd: &Command) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + cmd.payload().len());
    write_frame(&mut out, cmd);
    out
}

/// Size of the frame [`encode_frame`] would produce for `cmd`.
pub fn frame_len(cmd: &Command) -> usize {
    FRAME_HEADER_SIZE + cmd.payload().len()
}

/// Validates `header` and pairs it with its payload.
///
/// # Errors
///
/// - [`ProtocolError::UnknownCommand`] for an unrecognised kind.
/// - [`ProtocolError::UnexpectedPayload`] if a payload-less kind declares
///   `arg3 != 0`.
pub fn command_from_parts(header: FrameHeader, payload: Vec<u8>) -> Result<Command, ProtocolError> {
    let kind = header
        .command_kind()
        .ok_or(ProtocolError::UnknownCommand(header.kind))?;

    if !kind.carries_payload() && header.arg3 != 0 {
        return Err(ProtocolError::UnexpectedPayload {
            kind,
            len: header.arg3,
        });
    }

    let scene = Handle(header.arg1);
    Ok(match kind {
        CommandKind::Clear => Command::Clear { scene },
        CommandKind::Begin => Command::Begin { scene, payload },
        CommandKind::Add => Command::Add { scene, payload },
        CommandKind::Close => Command::Close { scene },
        CommandKind::Wait => Command::Wait,
        CommandKind::Dummy => Command::Dummy,
        CommandKind::Exit => Command::Exit,
    })
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the command and the number of bytes consumed, so the caller can
/// advance its read cursor.
///
/// # Errors
///
/// [`ProtocolError::InsufficientData`] means "nothing complete available
/// yet"; the other variants mean the frame itself is invalid.
pub fn decode_frame(bytes: &[u8]) -> Result<(Command, usize), ProtocolError> {
    let Some(raw) = bytes
        .get(..FRAME_HEADER_SIZE)
        .and_then(|head| <&[u8; FRAME_HEADER_SIZE]>::try_from(head).ok())
    else {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    };
    let header = FrameHeader::from_array(raw);

    let declared = usize::try_from(header.arg3).map_err(|_| ProtocolError::PayloadTooLarge {
        declared: header.arg3,
        limit: usize::MAX,
    })?;
    let total = FRAME_HEADER_SIZE.saturating_add(declared);

    // Validate the kind before waiting on a payload that may never be legal.
    if header.command_kind().is_none() {
        return Err(ProtocolError::UnknownCommand(header.kind));
    }
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = bytes[FRAME_HEADER_SIZE..total].to_vec();
    let cmd = command_from_parts(header, payload)?;
    Ok((cmd, total))
}
