//! Reads command frames from an async byte stream.
//!
//! TCP delivers a byte stream, not messages, so a frame may arrive split over
//! several reads or several frames may arrive in one.  [`read_command`] reads
//! exactly one 32-byte header, then exactly the payload length it declares.

use drawlink_core::protocol::{command_from_parts, FrameHeader, FRAME_HEADER_SIZE};
use drawlink_core::{Command, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Failure while reading one frame.
#[derive(Debug, Error)]
pub enum FrameReadError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl FrameReadError {
    /// Whether the stream is no longer positioned at a frame boundary (or no
    /// longer usable at all), so the connection must be dropped.
    ///
    /// Unknown kinds and unexpected payloads are not fatal: the whole frame
    /// was consumed and the next read starts at the following header.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameReadError::Io(_) | FrameReadError::Protocol(ProtocolError::PayloadTooLarge { .. })
        )
    }
}

/// Reads the next command from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
///
/// # Errors
///
/// - [`FrameReadError::Io`] on a socket error or EOF inside a frame.
/// - [`ProtocolError::PayloadTooLarge`] if the header declares more than
///   `max_payload` bytes; the payload is not read.
/// - [`ProtocolError::UnknownCommand`] / [`ProtocolError::UnexpectedPayload`]
///   after the frame's payload has been consumed and discarded.
pub async fn read_command<R>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Option<Command>, FrameReadError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        let n = reader.read(&mut raw[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended after {filled} of {FRAME_HEADER_SIZE} header bytes"),
            )
            .into());
        }
        filled += n;
    }
    let header = FrameHeader::from_array(&raw);

    let len = match usize::try_from(header.arg3) {
        Ok(len) if len <= max_payload => len,
        _ => {
            return Err(ProtocolError::PayloadTooLarge {
                declared: header.arg3,
                limit: max_payload,
            }
            .into())
        }
    };

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(command_from_parts(header, payload)?))
}
