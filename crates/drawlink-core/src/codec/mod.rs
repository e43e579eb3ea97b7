//! Binary codec shared by every streamed entity.
//!
//! Wire format:
//! ```text
//! scalar  : raw little-endian bytes (bool = 1 byte, 0 or 1)
//! string  : [len:8][utf-8 bytes:len]          (no terminator)
//! vec<T>  : [count:8][T]*count
//! ```
//! The format is not self-describing beyond these length prefixes: a reader
//! must already know the exact field sequence, which is supplied by the
//! entity's own `stream` routine. Schema evolution is handled by the
//! type/version check in [`crate::gp`], not here.
//!
//! # One call site for both directions
//!
//! [`Codec::rw`] either appends `value` to the output buffer or overwrites
//! `value` with the next decoded item, depending on which mode the codec was
//! created in.  Entities describe their field order exactly once:
//!
//! ```rust
//! use drawlink_core::codec::{Codec, CodecError};
//!
//! #[derive(Default, PartialEq, Debug)]
//! struct Marker { id: u64, label: String }
//!
//! impl Marker {
//!     fn stream(&mut self, c: &mut Codec<'_>) -> Result<(), CodecError> {
//!         c.rw(&mut self.id)?;
//!         c.rw(&mut self.label)
//!     }
//! }
//!
//! let mut original = Marker { id: 7, label: "tip".to_string() };
//! let mut bytes = Vec::new();
//! original.stream(&mut Codec::writer(&mut bytes)).unwrap();
//!
//! let mut decoded = Marker::default();
//! decoded.stream(&mut Codec::reader(&bytes)).unwrap();
//! assert_eq!(decoded, original);
//! ```

mod wire;

pub use wire::Wire;

use thiserror::Error;

/// Size in bytes of every length / count prefix.
pub const LEN_PREFIX_SIZE: usize = 8;

/// Errors raised while encoding or decoding streamed data (the "format" class).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    /// Fewer bytes remain in the buffer than the next field requires.
    #[error("insufficient data at offset {offset}: need {needed} bytes, {available} available")]
    InsufficientData {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A boolean field held something other than 0 or 1.
    #[error("invalid boolean byte: 0x{0:02X}")]
    InvalidBool(u8),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(String),

    /// The streamed type tag differs from the receiving instance's tag.
    #[error("type mismatch: expected tag {expected}, found {found}")]
    TypeMismatch { expected: u32, found: u32 },

    /// The streamed schema version differs from the receiving instance's version.
    #[error("version mismatch for type tag {type_tag}: expected {expected}, found {found}")]
    VersionMismatch {
        type_tag: u32,
        expected: u32,
        found: u32,
    },

    /// A field carried a value outside its valid domain.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Forward-only cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InsufficientData`] without advancing if fewer than
    /// `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::InsufficientData {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let buf: &'a [u8] = self.buf;
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consumes exactly `N` bytes into a fixed array.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InsufficientData`] if fewer than `N` bytes remain.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a little-endian `u32` without advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InsufficientData`] if fewer than 4 bytes remain.
    pub fn peek_u32(&self) -> Result<u32, CodecError> {
        self.clone().take_array::<4>().map(u32::from_le_bytes)
    }

    /// Reads a length prefix and checks it against the bytes still available.
    ///
    /// Every item this codec knows is at least one byte wide, so a count larger
    /// than the remaining buffer can never be satisfied.  Failing here keeps a
    /// corrupt prefix from triggering a huge allocation.
    pub(crate) fn take_len(&mut self) -> Result<usize, CodecError> {
        let offset = self.pos;
        let raw = u64::from_le_bytes(self.take_array::<LEN_PREFIX_SIZE>()?);
        let available = self.remaining();
        match usize::try_from(raw) {
            Ok(len) if len <= available => Ok(len),
            _ => Err(CodecError::InsufficientData {
                offset,
                needed: usize::try_from(raw).unwrap_or(usize::MAX),
                available,
            }),
        }
    }
}

// ── Bidirectional codec ───────────────────────────────────────────────────────

/// Deepest container nesting [`Codec::nested`] admits, in either direction.
pub const MAX_NESTING_DEPTH: usize = 64;

enum Mode<'a> {
    Write(&'a mut Vec<u8>),
    Read(ByteReader<'a>),
}

/// A codec that either writes into a growable buffer or reads from a slice.
///
/// It also tracks how many containers deep the current field sits, so a
/// stream of nested scenes cannot recurse without bound.
pub struct Codec<'a> {
    mode: Mode<'a>,
    depth: usize,
}

impl<'a> Codec<'a> {
    /// Creates a codec that appends to `out`.
    pub fn writer(out: &'a mut Vec<u8>) -> Self {
        Self {
            mode: Mode::Write(out),
            depth: 0,
        }
    }

    /// Creates a codec that decodes from the start of `buf`.
    pub fn reader(buf: &'a [u8]) -> Self {
        Self {
            mode: Mode::Read(ByteReader::new(buf)),
            depth: 0,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self.mode, Mode::Read(_))
    }

    /// Current container nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Writes `value` (write mode) or replaces it with the next decoded item
    /// (read mode).
    ///
    /// # Errors
    ///
    /// In read mode, returns a [`CodecError`] if the buffer is short or the
    /// bytes are not a valid encoding of `T`.  Writing never fails.
    pub fn rw<T: Wire>(&mut self, value: &mut T) -> Result<(), CodecError> {
        match &mut self.mode {
            Mode::Write(out) => {
                value.write(out);
                Ok(())
            }
            Mode::Read(reader) => {
                *value = T::read(reader)?;
                Ok(())
            }
        }
    }

    /// Runs `f` one container level deeper.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidValue`] without calling `f` if the codec is
    /// already [`MAX_NESTING_DEPTH`] levels deep; otherwise whatever `f`
    /// returns.
    pub fn nested<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<CodecError>,
    {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CodecError::InvalidValue(format!(
                "nesting deeper than {MAX_NESTING_DEPTH} levels"
            ))
            .into());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Bytes consumed (read mode) or total buffer length (write mode).
    pub fn position(&self) -> usize {
        match &self.mode {
            Mode::Write(out) => out.len(),
            Mode::Read(reader) => reader.position(),
        }
    }

    /// Peeks the next `u32` in read mode; `None` in write mode.
    pub fn peek_u32(&self) -> Option<Result<u32, CodecError>> {
        match &self.mode {
            Mode::Write(_) => None,
            Mode::Read(reader) => Some(reader.peek_u32()),
        }
    }
}

/// Appends `value` to `out`.
pub fn write<T: Wire>(out: &mut Vec<u8>, value: &T) {
    value.write(out);
}

/// Decodes one `T` from `reader`, advancing it.
///
/// # Errors
///
/// Returns [`CodecError`] if the remaining bytes do not hold a valid `T`.
pub fn read<T: Wire>(reader: &mut ByteReader<'_>) -> Result<T, CodecError> {
    T::read(reader)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
