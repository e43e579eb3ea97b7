//! Appearance records and the tool state that stamps them onto new GPs.
//!
//! The tool state works like the "current colour" register of an
//! immediate-mode graphics API: it is set once and applied to every GP created
//! afterwards until it is changed again.

use glam::{DQuat, DVec3};

use crate::codec::{Codec, CodecError};

use super::base::{GpBase, InheritFlags};

/// RGBA colour, components in `0.0..=1.0`.
pub type Rgba = [f32; 4];

/// Stroke settings for lines and outlines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub color: Rgba,
    pub width: f32,
    /// 16-bit stipple pattern; `0xFFFF` is a solid line.
    pub pattern: u16,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            width: 1.0,
            pattern: 0xFFFF,
        }
    }
}

/// Interior fill settings for closed shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub color: Rgba,
    pub enabled: bool,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            color: [0.5, 0.5, 0.5, 1.0],
            enabled: false,
        }
    }
}

/// Phong-style surface material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub ambient: Rgba,
    pub diffuse: Rgba,
    pub specular: Rgba,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [0.2, 0.2, 0.2, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.0, 0.0, 0.0, 1.0],
            shininess: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub size: f32,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: "sans".to_string(),
            size: 12.0,
        }
    }
}

/// Everything a GP draws with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Appearance {
    pub brush: Brush,
    pub fill: Fill,
    pub material: Material,
    pub font: Font,
}

/// Reference frame a GP is expressed in: origin plus orientation.
///
/// Opaque to the protocol layer; only concrete variants and renderers
/// interpret it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefFrame {
    pub origin: DVec3,
    pub orientation: DQuat,
}

impl RefFrame {
    pub fn translation(origin: DVec3) -> Self {
        Self {
            origin,
            orientation: DQuat::IDENTITY,
        }
    }

    /// Maps a point from this frame into its parent frame.
    pub fn to_parent(&self, local: DVec3) -> DVec3 {
        self.origin + self.orientation * local
    }

    pub fn stream(&mut self, c: &mut Codec<'_>) -> Result<(), CodecError> {
        c.rw(&mut self.origin)?;
        c.rw(&mut self.orientation)
    }
}

impl Appearance {
    /// Streams brush, fill, material, and font in that order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on short or invalid input (read mode only).
    pub fn stream(&mut self, c: &mut Codec<'_>) -> Result<(), CodecError> {
        c.rw(&mut self.brush.color)?;
        c.rw(&mut self.brush.width)?;
        c.rw(&mut self.brush.pattern)?;

        c.rw(&mut self.fill.color)?;
        c.rw(&mut self.fill.enabled)?;

        c.rw(&mut self.material.ambient)?;
        c.rw(&mut self.material.diffuse)?;
        c.rw(&mut self.material.specular)?;
        c.rw(&mut self.material.shininess)?;

        c.rw(&mut self.font.family)?;
        c.rw(&mut self.font.size)
    }
}

/// The current drawing state of a client session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolState {
    pub appearance: Appearance,
    pub inherit: InheritFlags,
    /// Active transform applied as the reference frame of new GPs.
    pub transform: RefFrame,
}

impl ToolState {
    /// Copies the tool state onto a freshly created GP.
    pub fn stamp(&self, base: &mut GpBase) {
        base.appearance = self.appearance.clone();
        base.inherit = self.inherit;
        base.frame = self.transform;
    }
}
