//! Builds default GP instances from a streamed type tag.

use thiserror::Error;

use crate::scene::Scene;

use super::{Frame, Gp, GpType, Group, Line, Point, Polygon, Polyline, Text};

/// Errors raised by [`build`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FactoryError {
    /// The stream carries a tag no variant is registered for.
    #[error("unknown GP type tag {0}")]
    UnknownType(u32),
}

/// Creates a default-initialised GP for `tag`, ready to be streamed into.
///
/// # Errors
///
/// Returns [`FactoryError::UnknownType`] if `tag` is not a known [`GpType`].
pub fn build(tag: u32) -> Result<Gp, FactoryError> {
    let gp_type = GpType::try_from(tag).map_err(|()| FactoryError::UnknownType(tag))?;

    Ok(match gp_type {
        GpType::Scene => Scene::default().into(),
        GpType::Point => Point::default().into(),
        GpType::Line => Line::default().into(),
        GpType::Polyline => Polyline::default().into(),
        GpType::Polygon => Polygon::default().into(),
        GpType::Frame => Frame::default().into(),
        GpType::Text => Text::default().into(),
        GpType::Group => Group::default().into(),
    })
}
