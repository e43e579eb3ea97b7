//! Graphic primitives (GPs): the nodes of a replicated scene graph.
//!
//! Every GP carries a [`GpBase`] (handle, name, family links, mode and
//! inheritance flags, appearance) plus the fields of its concrete variant.
//! Variants form the closed [`Gp`] enum, so adding a type means adding one enum
//! arm, one [`GpType`] tag, and one arm in [`factory::build`]; the compiler
//! flags every match that forgot it.
//!
//! # Stream layout of one GP
//!
//! ```text
//! [type:4][version:4][base fields][variant fields]
//! ```
//! When reading, `type` and `version` are checked against the receiving
//! instance before anything else is decoded.

pub mod appearance;
pub mod base;
pub mod factory;
pub mod primitives;

use std::fmt;

use crate::codec::{ByteReader, Codec, CodecError, Wire};
use crate::scene::{Scene, SceneError};

pub use appearance::{Appearance, Brush, Fill, Font, Material, RefFrame, ToolState};
pub use base::{GpBase, InheritFlags, ModeFlags};
pub use factory::{build, FactoryError};
pub use primitives::{Frame, Group, Line, Point, Polygon, Polyline, Text};

// ── Handle ────────────────────────────────────────────────────────────────────

/// Identifier of an entity within its owning [`Scene`].
///
/// Handles are allocated monotonically and never reused within one scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u64);

impl Handle {
    /// The reserved "no object" handle.
    pub const NONE: Handle = Handle(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl From<u64> for Handle {
    fn from(value: u64) -> Self {
        Handle(value)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Wire for Handle {
    fn write(&self, out: &mut Vec<u8>) {
        self.0.write(out);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        u64::read(reader).map(Handle)
    }
}

// ── Type tags ─────────────────────────────────────────────────────────────────

/// Stable type tag of every GP variant, used for factory dispatch and for the
/// compatibility check on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GpType {
    Scene = 1,
    Point = 2,
    Line = 3,
    Polyline = 4,
    Polygon = 5,
    Frame = 6,
    Text = 7,
    Group = 8,
}

impl GpType {
    /// Stem used to auto-name unnamed entities (`"{stem} {handle}"`).
    pub fn stem(self) -> &'static str {
        match self {
            GpType::Scene => "Scene",
            GpType::Point => "Point",
            GpType::Line => "Line",
            GpType::Polyline => "Polyline",
            GpType::Polygon => "Polygon",
            GpType::Frame => "Frame",
            GpType::Text => "Text",
            GpType::Group => "Group",
        }
    }
}

impl TryFrom<u32> for GpType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            1 => Ok(GpType::Scene),
            2 => Ok(GpType::Point),
            3 => Ok(GpType::Line),
            4 => Ok(GpType::Polyline),
            5 => Ok(GpType::Polygon),
            6 => Ok(GpType::Frame),
            7 => Ok(GpType::Text),
            8 => Ok(GpType::Group),
            _ => Err(()),
        }
    }
}

// ── Primitive trait ───────────────────────────────────────────────────────────

/// Behaviour shared by every concrete GP variant.
pub trait Primitive {
    /// Tag written ahead of this variant on the wire.
    const TYPE: GpType;
    /// Schema version of this variant's field layout.
    const VERSION: u32;

    fn base(&self) -> &GpBase;
    fn base_mut(&mut self) -> &mut GpBase;

    /// Streams the variant's own fields (everything after the base fields).
    ///
    /// # Errors
    ///
    /// Returns [`SceneError`] if decoding fails.
    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError>;
}

/// Streams a complete tagged GP: `(type, version)`, base fields, variant fields.
///
/// # Errors
///
/// On read, returns [`CodecError::TypeMismatch`] or
/// [`CodecError::VersionMismatch`] if the header does not match `P`, or any
/// decoding error raised by the fields.
pub fn stream_primitive<P: Primitive>(p: &mut P, c: &mut Codec<'_>) -> Result<(), SceneError> {
    let mut tag = P::TYPE as u32;
    let mut version = P::VERSION;
    c.rw(&mut tag)?;
    c.rw(&mut version)?;

    if c.is_read() {
        if tag != P::TYPE as u32 {
            return Err(CodecError::TypeMismatch {
                expected: P::TYPE as u32,
                found: tag,
            }
            .into());
        }
        if version != P::VERSION {
            return Err(CodecError::VersionMismatch {
                type_tag: tag,
                expected: P::VERSION,
                found: version,
            }
            .into());
        }
    }

    p.base_mut().stream(c)?;
    p.stream_fields(c)
}

// ── The closed set of variants ────────────────────────────────────────────────

/// Any graphic primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Gp {
    Scene(Box<Scene>),
    Point(Point),
    Line(Line),
    Polyline(Polyline),
    Polygon(Polygon),
    Frame(Frame),
    Text(Text),
    Group(Group),
}

macro_rules! each_variant {
    ($value:expr, $p:ident => $body:expr) => {
        match $value {
            Gp::Scene($p) => $body,
            Gp::Point($p) => $body,
            Gp::Line($p) => $body,
            Gp::Polyline($p) => $body,
            Gp::Polygon($p) => $body,
            Gp::Frame($p) => $body,
            Gp::Text($p) => $body,
            Gp::Group($p) => $body,
        }
    };
}

impl Gp {
    pub fn gp_type(&self) -> GpType {
        match self {
            Gp::Scene(_) => Scene::TYPE,
            Gp::Point(_) => Point::TYPE,
            Gp::Line(_) => Line::TYPE,
            Gp::Polyline(_) => Polyline::TYPE,
            Gp::Polygon(_) => Polygon::TYPE,
            Gp::Frame(_) => Frame::TYPE,
            Gp::Text(_) => Text::TYPE,
            Gp::Group(_) => Group::TYPE,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Gp::Scene(_) => Scene::VERSION,
            Gp::Point(_) => Point::VERSION,
            Gp::Line(_) => Line::VERSION,
            Gp::Polyline(_) => Polyline::VERSION,
            Gp::Polygon(_) => Polygon::VERSION,
            Gp::Frame(_) => Frame::VERSION,
            Gp::Text(_) => Text::VERSION,
            Gp::Group(_) => Group::VERSION,
        }
    }

    pub fn base(&self) -> &GpBase {
        each_variant!(self, p => p.base())
    }

    pub fn base_mut(&mut self) -> &mut GpBase {
        each_variant!(self, p => p.base_mut())
    }

    pub fn handle(&self) -> Handle {
        self.base().handle
    }

    /// Streams this GP in the direction of `c`.
    ///
    /// # Errors
    ///
    /// See [`stream_primitive`].
    pub fn stream(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        match self {
            Gp::Scene(p) => stream_primitive(p.as_mut(), c),
            Gp::Point(p) => stream_primitive(p, c),
            Gp::Line(p) => stream_primitive(p, c),
            Gp::Polyline(p) => stream_primitive(p, c),
            Gp::Polygon(p) => stream_primitive(p, c),
            Gp::Frame(p) => stream_primitive(p, c),
            Gp::Text(p) => stream_primitive(p, c),
            Gp::Group(p) => stream_primitive(p, c),
        }
    }

    /// Serializes this GP.
    ///
    /// Writing leaves `self` unchanged; the `&mut` comes from the shared
    /// read/write path in [`Gp::stream`].
    ///
    /// # Errors
    ///
    /// Only propagates errors from nested streams; a well-formed GP always
    /// encodes.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, SceneError> {
        let mut out = Vec::new();
        self.stream(&mut Codec::writer(&mut out))?;
        Ok(out)
    }

    /// Reconstructs a GP whose concrete type is known only from the stream.
    ///
    /// Peeks the type tag, builds a default instance of the matching variant,
    /// then lets it consume the bytes (re-reading the tag as part of its own
    /// header).
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::UnknownType`] for an unregistered tag, a format
    /// error for short or mismatched data, or [`CodecError::InvalidValue`] if
    /// bytes remain after the entity.
    pub fn from_bytes(bytes: &[u8]) -> Result<Gp, SceneError> {
        let mut c = Codec::reader(bytes);
        let tag = c.peek_u32().unwrap_or(Ok(0))?;
        let mut gp = build(tag)?;
        gp.stream(&mut c)?;

        let consumed = c.position();
        if consumed != bytes.len() {
            return Err(CodecError::InvalidValue(format!(
                "{} trailing bytes after {} entity",
                bytes.len() - consumed,
                gp.gp_type().stem()
            ))
            .into());
        }
        Ok(gp)
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Gp {
                fn from(p: $variant) -> Self {
                    Gp::$variant(p)
                }
            }
        )*
    };
}

impl_from_variant!(Point, Line, Polyline, Polygon, Frame, Text, Group);

impl From<Scene> for Gp {
    fn from(scene: Scene) -> Self {
        Gp::Scene(Box::new(scene))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DQuat, DVec3};

    fn round_trip(gp: &Gp) -> Gp {
        let mut original = gp.clone();
        let bytes = original.to_bytes().expect("encode");
        Gp::from_bytes(&bytes).expect("decode")
    }

    fn styled_base(name: &str) -> GpBase {
        let mut base = GpBase::default();
        base.handle = Handle(9);
        base.parent = Handle(3);
        base.name = name.to_string();
        base.info = "built by a test".to_string();
        base.mode.set(ModeFlags::WIREFRAME, true);
        base.inherit.set(InheritFlags::ALPHA, false);
        base.appearance.brush.color = [1.0, 0.0, 0.0, 1.0];
        base.appearance.font.size = 18.0;
        base.frame = RefFrame {
            origin: DVec3::new(1.0, 1.0, 0.0),
            orientation: DQuat::from_rotation_z(0.5),
        };
        base
    }

    #[test]
    fn test_every_variant_round_trips() {
        let variants: Vec<Gp> = vec![
            Point { base: styled_base("p"), vertex: DVec3::new(1.0, 2.0, 3.0), radius: 0.5 }.into(),
            Line { base: styled_base("l"), start: DVec3::ZERO, end: DVec3::Y }.into(),
            Polyline {
                base: styled_base("pl"),
                vertices: vec![DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0)],
            }
            .into(),
            Polygon { base: styled_base("pg"), vertices: vec![DVec3::X, DVec3::Y, DVec3::Z], filled: true }.into(),
            Frame { base: styled_base("f"), axis_length: 2.5 }.into(),
            Text { base: styled_base("t"), anchor: DVec3::Z, text: "origin ✓".to_string() }.into(),
            Group { base: styled_base("g") }.into(),
        ];

        for gp in &variants {
            assert_eq!(&round_trip(gp), gp, "{:?} must survive a round trip", gp.gp_type());
        }
    }

    #[test]
    fn test_stream_starts_with_type_and_version() {
        let mut gp: Gp = Line::default().into();
        let bytes = gp.to_bytes().unwrap();

        assert_eq!(&bytes[0..4], &(GpType::Line as u32).to_le_bytes());
        assert_eq!(&bytes[4..8], &Line::VERSION.to_le_bytes());
    }

    #[test]
    fn test_type_mismatch_fails_the_load() {
        let mut point: Gp = Point::default().into();
        let bytes = point.to_bytes().unwrap();

        let mut line: Gp = Line::default().into();
        let result = line.stream(&mut Codec::reader(&bytes));

        assert_eq!(
            result,
            Err(SceneError::Format(CodecError::TypeMismatch {
                expected: GpType::Line as u32,
                found: GpType::Point as u32,
            }))
        );
    }

    #[test]
    fn test_version_mismatch_fails_the_load() {
        let mut point: Gp = Point::default().into();
        let mut bytes = point.to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&(Point::VERSION + 1).to_le_bytes());

        let result = Gp::from_bytes(&bytes);

        assert!(matches!(
            result,
            Err(SceneError::Format(CodecError::VersionMismatch { .. }))
        ));
    }

    #[test]
    fn test_unknown_tag_is_a_factory_error() {
        let mut bytes = 999u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());

        assert_eq!(
            Gp::from_bytes(&bytes),
            Err(SceneError::Factory(FactoryError::UnknownType(999)))
        );
    }

    #[test]
    fn test_truncated_entity_is_a_format_error() {
        let mut gp: Gp = Text { text: "hello".to_string(), ..Default::default() }.into();
        let bytes = gp.to_bytes().unwrap();

        let result = Gp::from_bytes(&bytes[..bytes.len() - 2]);

        assert!(matches!(result, Err(SceneError::Format(CodecError::InsufficientData { .. }))));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut gp: Gp = Group::default().into();
        let mut bytes = gp.to_bytes().unwrap();
        bytes.push(0);

        assert!(matches!(
            Gp::from_bytes(&bytes),
            Err(SceneError::Format(CodecError::InvalidValue(_)))
        ));
    }

    #[test]
    fn test_children_are_not_streamed() {
        let mut group = Group::default();
        group.base.children = vec![Handle(4), Handle(5)];
        let mut gp: Gp = group.into();

        let decoded = Gp::from_bytes(&gp.to_bytes().unwrap()).unwrap();

        assert!(decoded.base().children.is_empty());
    }

    #[test]
    fn test_gp_type_tags_are_stable() {
        assert_eq!(GpType::Scene as u32, 1);
        assert_eq!(GpType::Point as u32, 2);
        assert_eq!(GpType::Group as u32, 8);
        assert_eq!(GpType::try_from(6), Ok(GpType::Frame));
        assert_eq!(GpType::try_from(0), Err(()));
    }
}
