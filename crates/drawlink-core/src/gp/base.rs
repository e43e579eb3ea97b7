//! Fields shared by every GP variant.

use crate::codec::{ByteReader, Codec, CodecError, Wire};

use super::appearance::{Appearance, RefFrame};
use super::Handle;

/// Display/interaction mode bits of a GP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeFlags(pub u32);

impl ModeFlags {
    pub const VISIBLE: u32 = 1 << 0;
    pub const WIREFRAME: u32 = 1 << 1;
    pub const FROZEN: u32 = 1 << 2;
    pub const SELECTED: u32 = 1 << 3;
    pub const PARSED: u32 = 1 << 4;
    pub const EXPANDED: u32 = 1 << 5;
    pub const NEED_REDRAW: u32 = 1 << 6;

    /// Returns `true` if every bit of `flag` is set.
    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u32, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

impl Default for ModeFlags {
    /// New GPs are visible and waiting for their first draw.
    fn default() -> Self {
        ModeFlags(Self::VISIBLE | Self::NEED_REDRAW)
    }
}

/// Which attributes a GP takes from its parent rather than from itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InheritFlags(pub u32);

impl InheritFlags {
    pub const APPEARANCE: u32 = 1 << 0;
    pub const VISIBLE: u32 = 1 << 1;
    pub const ALPHA: u32 = 1 << 2;
    pub const WIREFRAME: u32 = 1 << 3;
    pub const REFERENCE: u32 = 1 << 4;
    pub const ALL: u32 =
        Self::APPEARANCE | Self::VISIBLE | Self::ALPHA | Self::WIREFRAME | Self::REFERENCE;

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u32, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    /// `true` when visibility is taken from the parent.
    pub fn inherits_visibility(&self) -> bool {
        self.contains(Self::APPEARANCE | Self::VISIBLE)
    }
}

impl Default for InheritFlags {
    fn default() -> Self {
        InheritFlags(Self::ALL)
    }
}

impl Wire for ModeFlags {
    fn write(&self, out: &mut Vec<u8>) {
        self.0.write(out);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        u32::read(reader).map(ModeFlags)
    }
}

impl Wire for InheritFlags {
    fn write(&self, out: &mut Vec<u8>) {
        self.0.write(out);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        u32::read(reader).map(InheritFlags)
    }
}

/// The base-entity layer of every GP.
///
/// `parent` and `children` are relational links resolved through the owning
/// scene, never ownership.  `children` is not streamed: receivers rebuild it
/// from the `parent` handles they decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpBase {
    pub handle: Handle,
    pub name: String,
    pub info: String,
    pub parent: Handle,
    pub children: Vec<Handle>,
    pub mode: ModeFlags,
    pub inherit: InheritFlags,
    pub appearance: Appearance,
    pub frame: RefFrame,
}

impl GpBase {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Streams the base fields in their fixed order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on short or invalid input (read mode only).
    pub fn stream(&mut self, c: &mut Codec<'_>) -> Result<(), CodecError> {
        c.rw(&mut self.handle)?;
        c.rw(&mut self.name)?;
        c.rw(&mut self.info)?;
        c.rw(&mut self.parent)?;
        c.rw(&mut self.mode)?;
        c.rw(&mut self.inherit)?;
        self.appearance.stream(c)?;
        self.frame.stream(c)
    }

    pub fn is_visible(&self) -> bool {
        self.mode.contains(ModeFlags::VISIBLE)
    }

    pub fn is_selected(&self) -> bool {
        self.mode.contains(ModeFlags::SELECTED)
    }

    pub fn needs_redraw(&self) -> bool {
        self.mode.contains(ModeFlags::NEED_REDRAW)
    }
}
