//! Concrete GP variants.
//!
//! Each variant owns a [`GpBase`] and adds only its geometry.  Geometry is in
//! the variant's own reference frame (`base.frame`).

use glam::DVec3;

use crate::codec::Codec;
use crate::scene::SceneError;

use super::{GpBase, GpType, Primitive};

/// Implements the accessor half of [`Primitive`] for a struct with a `base`
/// field; the caller supplies tag, version, and field streaming.
macro_rules! primitive_base {
    () => {
        fn base(&self) -> &GpBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut GpBase {
            &mut self.base
        }
    };
}

// ── Point ─────────────────────────────────────────────────────────────────────

/// A single marker drawn at `vertex`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    pub base: GpBase,
    pub vertex: DVec3,
    /// Marker radius in scene units; `0.0` draws a single pixel.
    pub radius: f64,
}

impl Point {
    pub fn new(vertex: DVec3) -> Self {
        Self {
            vertex,
            ..Self::default()
        }
    }
}

impl Primitive for Point {
    const TYPE: GpType = GpType::Point;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        c.rw(&mut self.vertex)?;
        c.rw(&mut self.radius)?;
        Ok(())
    }
}

// ── Line ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub base: GpBase,
    pub start: DVec3,
    pub end: DVec3,
}

impl Line {
    pub fn new(start: DVec3, end: DVec3) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }
}

impl Primitive for Line {
    const TYPE: GpType = GpType::Line;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        c.rw(&mut self.start)?;
        c.rw(&mut self.end)?;
        Ok(())
    }
}

// ── Polyline ──────────────────────────────────────────────────────────────────

/// An open chain of segments through `vertices`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polyline {
    pub base: GpBase,
    pub vertices: Vec<DVec3>,
}

impl Polyline {
    pub fn new(vertices: Vec<DVec3>) -> Self {
        Self {
            vertices,
            ..Self::default()
        }
    }
}

impl Primitive for Polyline {
    const TYPE: GpType = GpType::Polyline;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        c.rw(&mut self.vertices)?;
        Ok(())
    }
}

// ── Polygon ───────────────────────────────────────────────────────────────────

/// A closed outline; the last vertex connects back to the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    pub base: GpBase,
    pub vertices: Vec<DVec3>,
    /// Fill the interior with the fill colour in addition to the outline.
    pub filled: bool,
}

impl Polygon {
    pub fn new(vertices: Vec<DVec3>, filled: bool) -> Self {
        Self {
            vertices,
            filled,
            ..Self::default()
        }
    }
}

impl Primitive for Polygon {
    const TYPE: GpType = GpType::Polygon;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        c.rw(&mut self.vertices)?;
        c.rw(&mut self.filled)?;
        Ok(())
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// A coordinate-axes triad drawn at the origin of `base.frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub base: GpBase,
    pub axis_length: f64,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            base: GpBase::default(),
            axis_length: 1.0,
        }
    }
}

impl Frame {
    pub fn new(axis_length: f64) -> Self {
        Self {
            axis_length,
            ..Self::default()
        }
    }
}

impl Primitive for Frame {
    const TYPE: GpType = GpType::Frame;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        c.rw(&mut self.axis_length)?;
        Ok(())
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

/// A text label anchored at a point, drawn with the base font.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Text {
    pub base: GpBase,
    pub anchor: DVec3,
    pub text: String,
}

impl Text {
    pub fn new(anchor: DVec3, text: impl Into<String>) -> Self {
        Self {
            anchor,
            text: text.into(),
            ..Self::default()
        }
    }
}

impl Primitive for Text {
    const TYPE: GpType = GpType::Text;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        c.rw(&mut self.anchor)?;
        c.rw(&mut self.text)?;
        Ok(())
    }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// A geometry-less container used to parent other GPs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub base: GpBase,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Primitive for Group {
    const TYPE: GpType = GpType::Group;
    const VERSION: u32 = 1;

    primitive_base!();

    fn stream_fields(&mut self, _c: &mut Codec<'_>) -> Result<(), SceneError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::stream_primitive;

    #[test]
    fn test_polygon_fields_follow_base() {
        let mut polygon = Polygon::new(vec![DVec3::X, DVec3::Y], true);
        let mut bytes = Vec::new();
        stream_primitive(&mut polygon, &mut Codec::writer(&mut bytes)).unwrap();

        // Variant fields are the tail: vertex count, 2 × 24 bytes, fill flag.
        let tail = &bytes[bytes.len() - (8 + 48 + 1)..];
        assert_eq!(&tail[..8], &2u64.to_le_bytes());
        assert_eq!(*tail.last().unwrap(), 1);
    }

    #[test]
    fn test_group_adds_no_fields() {
        let mut group = Group::new();
        let mut base_only = Vec::new();
        group.base.stream(&mut Codec::writer(&mut base_only)).unwrap();

        let mut full = Vec::new();
        stream_primitive(&mut group, &mut Codec::writer(&mut full)).unwrap();

        assert_eq!(full.len(), 8 + base_only.len());
    }

    #[test]
    fn test_line_length() {
        let line = Line::new(DVec3::ZERO, DVec3::new(3.0, 4.0, 0.0));
        assert_eq!(line.length(), 5.0);
    }

    #[test]
    fn test_frame_default_axis_length_is_one() {
        assert_eq!(Frame::default().axis_length, 1.0);
    }
}
