//! The scene container: an owning, handle-indexed table of GPs.
//!
//! A [`Scene`] is itself a GP (tag 1) and may be nested inside another scene.
//! It exclusively owns every entity it holds; parent/child links between
//! entities are plain [`Handle`]s resolved through the scene, so no entity
//! ever holds a reference to another.
//!
//! # Handle allocation
//!
//! Handle 0 is the permanent "no object" sentinel.  [`Scene::add`] hands out
//! the next handle in sequence and never reuses one, even after a delete, so a
//! peer that replays the same adds allocates identical handles.  A parent link
//! is only recorded when the parent is live *and* has a lower handle than the
//! child, which keeps the graph acyclic and lets subtree walks run in a single
//! forward pass.
//!
//! # Whole-scene stream layout
//!
//! ```text
//! [type:4][version:4][base fields][count:8]{ [tag:4][gp stream] }*count
//! ```

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::codec::{Codec, CodecError};
use crate::gp::{
    build, stream_primitive, FactoryError, Gp, GpBase, GpType, Handle, ModeFlags, Primitive,
};

// ── Errors ────────────────────────────────────────────────────────────────────

/// A handle or relation did not refer to something the caller owns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("no live entity with handle {0}")]
    NoSuchHandle(Handle),

    #[error("entity {child} is not a recorded child of {parent}")]
    NotAChild { parent: Handle, child: Handle },

    /// A streamed entity carried a handle that is already live.
    #[error("handle {0} is already in use")]
    HandleInUse(Handle),

    /// A streamed entity carried a handle that can never be allocated.
    #[error("handle {0} is reserved")]
    ReservedHandle(Handle),

    #[error("no scene is selected")]
    NoSceneSelected,

    #[error("unknown scene {0}")]
    UnknownScene(Handle),
}

/// Any failure while building, loading, or editing a scene.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SceneError {
    #[error("format error: {0}")]
    Format(#[from] CodecError),

    #[error("factory error: {0}")]
    Factory(#[from] FactoryError),

    #[error("ownership error: {0}")]
    Ownership(#[from] OwnershipError),
}

// ── Scene ─────────────────────────────────────────────────────────────────────

/// An owning table of GPs plus the flush cursor used for incremental transfer.
#[derive(Debug, Clone)]
pub struct Scene {
    pub base: GpBase,
    entities: BTreeMap<Handle, Gp>,
    /// Next handle [`Scene::add`] will allocate.
    next: u64,
    /// First handle not yet transmitted to a peer.
    cursor: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            base: GpBase::default(),
            entities: BTreeMap::new(),
            next: 1,
            cursor: 1,
        }
    }
}

/// Scenes compare by content: base fields and live entities.  The flush
/// cursor and allocation counter are transfer bookkeeping and are ignored.
impl PartialEq for Scene {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base && self.entities == other.entities
    }
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: GpBase::named(name),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn live_count(&self) -> usize {
        self.entities.len()
    }

    /// The handle the next [`Scene::add`] will return.
    pub fn next_handle(&self) -> Handle {
        Handle(self.next)
    }

    pub fn flush_cursor(&self) -> Handle {
        Handle(self.cursor)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entities.contains_key(&handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&Gp> {
        self.entities.get(&handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Gp> {
        self.entities.get_mut(&handle)
    }

    /// Live entities in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Gp> {
        self.entities.values()
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.entities.keys().copied().collect()
    }

    /// First live entity (in handle order) whose name is `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Gp> {
        self.iter().find(|gp| gp.base().name == name)
    }

    /// Recorded children of `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn children(&self, handle: Handle) -> Result<&[Handle], OwnershipError> {
        self.base_of(handle).map(|b| b.children.as_slice())
    }

    /// `handle` followed by every live entity whose parent chain reaches it,
    /// in handle order.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn descendants(&self, handle: Handle) -> Result<Vec<Handle>, OwnershipError> {
        self.base_of(handle)?;
        let mut found = vec![handle];
        // Parents always precede children, so `found` stays sorted.
        for (h, gp) in self.entities.range(Handle(handle.0 + 1)..) {
            if found.binary_search(&gp.base().parent).is_ok() {
                found.push(*h);
            }
        }
        Ok(found)
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Adds `gp` under `parent` (or as a root if `parent` is not live) and
    /// returns its freshly allocated handle.
    ///
    /// An unnamed entity is named `"{stem} {handle}"`.
    pub fn add(&mut self, gp: impl Into<Gp>, parent: Handle) -> Handle {
        let mut gp = gp.into();
        let handle = Handle(self.next);
        self.next += 1;

        let stem = gp.gp_type().stem();
        let base = gp.base_mut();
        base.handle = handle;
        base.parent = parent;
        if base.name.is_empty() {
            base.name = format!("{stem} {handle}");
        }

        self.insert_linked(gp);
        debug!(%handle, %parent, scene = %self.base.name, "entity added");
        handle
    }

    /// Decodes one tagged entity and places it at the handle it carries.
    ///
    /// Decoding completes before the scene is touched, so a failure never
    /// leaves a partially linked entity behind.
    ///
    /// # Errors
    ///
    /// - [`SceneError::Factory`] for an unregistered type tag.
    /// - [`SceneError::Format`] for malformed or trailing bytes.
    /// - [`OwnershipError::ReservedHandle`] / [`OwnershipError::HandleInUse`]
    ///   if the carried handle cannot be placed.
    pub fn add_from_stream(&mut self, bytes: &[u8]) -> Result<Handle, SceneError> {
        let gp = Gp::from_bytes(bytes)?;
        let handle = self.check_placeable(gp.handle())?;

        self.next = self.next.max(handle.0 + 1);
        self.insert_linked(gp);
        debug!(%handle, scene = %self.base.name, "entity placed from stream");
        Ok(handle)
    }

    /// Removes `handle` and every entity below it; returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn del(&mut self, handle: Handle) -> Result<usize, OwnershipError> {
        let doomed = self.descendants(handle)?;
        let parent = self.base_of(handle)?.parent;

        if let Some(p) = self.entities.get_mut(&parent) {
            p.base_mut().children.retain(|&c| c != handle);
        }
        for h in &doomed {
            self.entities.remove(h);
        }

        self.mark_parent_redraw(parent);
        debug!(%handle, removed = doomed.len(), "entity deleted");
        Ok(doomed.len())
    }

    /// Deletes every live entity.  Handles are still never reused.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.cursor = self.next;
        self.base.mode.set(ModeFlags::NEED_REDRAW, true);
    }

    /// Records `child` as a child of `parent`.  The child's own parent field is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if either handle is not live.
    pub fn child_add(&mut self, parent: Handle, child: Handle) -> Result<(), OwnershipError> {
        self.base_of(child)?;
        let children = &mut self.base_of_mut(parent)?.children;
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    /// Forgets `child` as a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `parent` is not live, or
    /// [`OwnershipError::NotAChild`] if `child` is not recorded under it.
    pub fn child_del(&mut self, parent: Handle, child: Handle) -> Result<(), OwnershipError> {
        let children = &mut self.base_of_mut(parent)?.children;
        let pos = children
            .iter()
            .position(|&c| c == child)
            .ok_or(OwnershipError::NotAChild { parent, child })?;
        children.remove(pos);
        Ok(())
    }

    // ── Mode flags ────────────────────────────────────────────────────────────

    /// Effective visibility of `handle`, taking inheritance into account.
    ///
    /// A root entity inherits from the scene's own visible flag.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn mode_visible(&self, handle: Handle) -> Result<bool, OwnershipError> {
        let mut cur = handle;
        let mut base = self.base_of(handle)?;
        loop {
            if !base.is_visible() {
                return Ok(false);
            }
            if !base.inherit.inherits_visibility() {
                return Ok(true);
            }
            match self.entities.get(&base.parent) {
                Some(parent) if base.parent < cur => {
                    cur = base.parent;
                    base = parent.base();
                }
                _ => return Ok(self.base.is_visible()),
            }
        }
    }

    /// Sets or clears the own visible flag of `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn set_visible(&mut self, handle: Handle, visible: bool) -> Result<(), OwnershipError> {
        self.base_of_mut(handle)?
            .mode
            .set(ModeFlags::VISIBLE, visible);
        self.mark_redraw(handle)
    }

    /// Sets or clears the selected flag of `handle` and its whole subtree.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn set_selected(&mut self, handle: Handle, selected: bool) -> Result<(), OwnershipError> {
        for h in self.descendants(handle)? {
            if let Some(gp) = self.entities.get_mut(&h) {
                gp.base_mut().mode.set(ModeFlags::SELECTED, selected);
            }
        }
        self.mark_redraw(handle)
    }

    /// Flags `handle` for redraw and propagates the flag up to the scene.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSuchHandle`] if `handle` is not live.
    pub fn mark_redraw(&mut self, handle: Handle) -> Result<(), OwnershipError> {
        self.base_of(handle)?;
        self.mark_parent_redraw(handle);
        Ok(())
    }

    /// Whether anything in the scene changed since the last [`Scene::clear_redraw`].
    pub fn needs_redraw(&self) -> bool {
        self.base.needs_redraw()
    }

    /// Resets every redraw flag after a draw pass.
    pub fn clear_redraw(&mut self) {
        self.base.mode.set(ModeFlags::NEED_REDRAW, false);
        for gp in self.entities.values_mut() {
            gp.base_mut().mode.set(ModeFlags::NEED_REDRAW, false);
        }
    }

    // ── Incremental transfer ──────────────────────────────────────────────────

    /// Live entities at or after the flush cursor, in handle order.
    pub fn unsent(&self) -> impl Iterator<Item = &Gp> {
        self.entities.range(Handle(self.cursor)..).map(|(_, gp)| gp)
    }

    /// Mutable variant of [`Scene::unsent`], needed to stream entities out.
    pub fn unsent_mut(&mut self) -> impl Iterator<Item = &mut Gp> {
        self.entities
            .range_mut(Handle(self.cursor)..)
            .map(|(_, gp)| gp)
    }

    /// Moves the flush cursor past every handle allocated so far.
    pub fn mark_flushed(&mut self) {
        self.cursor = self.next;
    }

    // ── Whole-scene stream ────────────────────────────────────────────────────

    /// Serializes the scene and every live entity.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidValue`] if scenes are nested deeper than
    /// [`crate::codec::MAX_NESTING_DEPTH`]; anything shallower always encodes.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, SceneError> {
        let mut out = Vec::new();
        stream_primitive(self, &mut Codec::writer(&mut out))?;
        Ok(out)
    }

    /// Rebuilds a scene from [`Scene::to_bytes`] output.
    ///
    /// # Errors
    ///
    /// Any entity failure aborts the whole load.  Trailing bytes are a
    /// [`CodecError::InvalidValue`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Scene, SceneError> {
        let mut scene = Scene::default();
        let mut c = Codec::reader(bytes);
        stream_primitive(&mut scene, &mut c)?;

        let consumed = c.position();
        if consumed != bytes.len() {
            return Err(CodecError::InvalidValue(format!(
                "{} trailing bytes after scene",
                bytes.len() - consumed
            ))
            .into());
        }
        Ok(scene)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn base_of(&self, handle: Handle) -> Result<&GpBase, OwnershipError> {
        self.entities
            .get(&handle)
            .map(Gp::base)
            .ok_or(OwnershipError::NoSuchHandle(handle))
    }

    fn base_of_mut(&mut self, handle: Handle) -> Result<&mut GpBase, OwnershipError> {
        self.entities
            .get_mut(&handle)
            .map(Gp::base_mut)
            .ok_or(OwnershipError::NoSuchHandle(handle))
    }

    fn check_placeable(&self, handle: Handle) -> Result<Handle, OwnershipError> {
        if handle.is_none() || handle.0 == u64::MAX {
            return Err(OwnershipError::ReservedHandle(handle));
        }
        if self.contains(handle) {
            return Err(OwnershipError::HandleInUse(handle));
        }
        Ok(handle)
    }

    /// Inserts an entity whose handle is already set, then links it below its
    /// parent (or demotes it to a root) and flags the change for redraw.
    fn insert_linked(&mut self, mut gp: Gp) {
        let handle = gp.handle();
        let base = gp.base_mut();
        base.children.clear();
        let parent = base.parent;

        let linked = parent < handle && self.contains(parent);
        if !linked {
            gp.base_mut().parent = Handle::NONE;
        }
        self.entities.insert(handle, gp);
        if linked {
            if let Some(p) = self.entities.get_mut(&parent) {
                p.base_mut().children.push(handle);
            }
        }
        self.mark_parent_redraw(handle);
    }

    /// Rebuilds every child list from the parent handles.
    fn relink(&mut self) {
        for gp in self.entities.values_mut() {
            gp.base_mut().children.clear();
        }
        let links: Vec<(Handle, Handle)> = self
            .entities
            .iter()
            .map(|(&h, gp)| (h, gp.base().parent))
            .collect();

        for (child, parent) in links {
            let linked = parent < child && self.contains(parent);
            if linked {
                if let Some(p) = self.entities.get_mut(&parent) {
                    p.base_mut().children.push(child);
                }
            } else if let Some(c) = self.entities.get_mut(&child) {
                c.base_mut().parent = Handle::NONE;
            }
        }
    }

    /// Sets the redraw flag on `handle` (if live) and every ancestor, then on
    /// the scene itself.
    fn mark_parent_redraw(&mut self, handle: Handle) {
        let mut cur = handle;
        while let Some(gp) = self.entities.get_mut(&cur) {
            let base = gp.base_mut();
            base.mode.set(ModeFlags::NEED_REDRAW, true);
            if base.parent >= cur {
                break;
            }
            cur = base.parent;
        }
        self.base.mode.set(ModeFlags::NEED_REDRAW, true);
    }
}

impl Primitive for Scene {
    const TYPE: GpType = GpType::Scene;
    const VERSION: u32 = 1;

    fn base(&self) -> &GpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut GpBase {
        &mut self.base
    }

    fn stream_fields(&mut self, c: &mut Codec<'_>) -> Result<(), SceneError> {
        let mut count = self.entities.len() as u64;
        c.rw(&mut count)?;

        if !c.is_read() {
            return c.nested(|c| {
                for gp in self.entities.values_mut() {
                    let mut tag = gp.gp_type() as u32;
                    c.rw(&mut tag)?;
                    gp.stream(c)?;
                }
                Ok(())
            });
        }

        self.entities.clear();
        c.nested(|c| {
            for _ in 0..count {
                let mut tag = 0u32;
                c.rw(&mut tag)?;
                let mut gp = build(tag)?;
                gp.stream(c)?;

                let handle = self.check_placeable(gp.handle())?;
                self.entities.insert(handle, gp);
            }
            Ok::<_, SceneError>(())
        })?;

        self.next = self
            .entities
            .keys()
            .next_back()
            .map_or(1, |h| h.0 + 1);
        self.cursor = 1;
        self.relink();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
