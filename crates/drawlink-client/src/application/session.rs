//! Session: the client-side drawing context.
//!
//! A [`Session`] owns the scenes being drawn, remembers which one is
//! selected, and carries the [`ToolState`] stamped onto every new entity.
//! Drawing calls only touch local state; the server hears about entities when
//! [`Session::scene_flush`] runs.
//!
//! # Flush batching
//!
//! ```text
//! packet = [add frame][add frame]...   (≤ optimal_packet_size, unless one
//!                                        frame is larger on its own)
//! ```
//!
//! Each flush sends every live entity past the scene's flush cursor, in
//! handle order, then advances the cursor.  A second flush with nothing new
//! sends nothing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use drawlink_core::gp::{
    Brush, Fill, Font, Frame, Group, InheritFlags, Line, Material, Point, Polygon, Polyline,
    RefFrame, Text,
};
use drawlink_core::protocol::write_frame;
use drawlink_core::{encode_frame, Command, Gp, Handle, OwnershipError, Scene, SceneError, ToolState};
use glam::DVec3;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    /// The session has no usable connection.
    #[error("session is not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    Send(String),
}

/// Connection status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Open,
    /// A send failed; the connection must be reopened.
    Error,
}

/// Outbound byte transport.
///
/// The TCP implementation lives in the infrastructure layer; tests record
/// packets instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one packet of whole frames.
    async fn send(&mut self, packet: &[u8]) -> Result<(), String>;
}

/// Default batching threshold for [`Session::scene_flush`].
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// A drawing session over one connection.
pub struct Session<S> {
    sink: Option<S>,
    status: SessionStatus,
    optimal_packet_size: usize,
    tool: ToolState,
    scenes: BTreeMap<Handle, Scene>,
    /// Next scene handle; matches the server's per-client allocation.
    next_scene: u64,
    selected: Option<Handle>,
}

impl<S: FrameSink> Default for Session<S> {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_SIZE)
    }
}

impl<S: FrameSink> Session<S> {
    /// Creates a closed session.  `optimal_packet_size` is clamped to at
    /// least one byte.
    pub fn new(optimal_packet_size: usize) -> Self {
        Self {
            sink: None,
            status: SessionStatus::Closed,
            optimal_packet_size: optimal_packet_size.max(1),
            tool: ToolState::default(),
            scenes: BTreeMap::new(),
            next_scene: 1,
            selected: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn optimal_packet_size(&self) -> usize {
        self.optimal_packet_size
    }

    pub fn selected_scene(&self) -> Option<Handle> {
        self.selected
    }

    pub fn scene(&self, handle: Handle) -> Option<&Scene> {
        self.scenes.get(&handle)
    }

    /// Handles of every locally owned scene, ascending.
    pub fn scene_handles(&self) -> Vec<Handle> {
        self.scenes.keys().copied().collect()
    }

    /// The transport, while one is attached.
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Attaches a connected transport and marks the session open.
    ///
    /// Scene handles restart at 1, matching a fresh server connection.
    pub fn open(&mut self, sink: S) {
        if self.sink.is_some() {
            warn!("session reopened; dropping previous connection");
        }
        if !self.scenes.is_empty() {
            warn!(scenes = self.scenes.len(), "dropping scenes from previous connection");
            self.scenes.clear();
            self.selected = None;
        }
        self.sink = Some(sink);
        self.next_scene = 1;
        self.status = SessionStatus::Open;
        info!("session open");
    }

    /// Sends `exit`, detaches the transport, and drops every scene.
    ///
    /// The session ends up `Closed` even if the `exit` frame could not be
    /// sent; the send error is still returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Send`] if the `exit` frame failed.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        let result = if self.status == SessionStatus::Open {
            self.send(&encode_frame(&Command::Exit)).await
        } else {
            Ok(())
        };

        self.sink = None;
        self.scenes.clear();
        self.selected = None;
        self.status = SessionStatus::Closed;
        info!("session closed");
        result
    }

    /// Sends one packet, flipping the session to `Error` on failure.
    async fn send(&mut self, packet: &[u8]) -> Result<(), SessionError> {
        if self.status != SessionStatus::Open {
            return Err(SessionError::NotConnected);
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        if let Err(e) = sink.send(packet).await {
            warn!("send of {} bytes failed: {e}", packet.len());
            self.status = SessionStatus::Error;
            return Err(SessionError::Send(e));
        }
        Ok(())
    }

    // ── Scene lifecycle ───────────────────────────────────────────────────────

    /// Creates a scene, selects it, and sends its empty shell in a `begin`
    /// frame straight away.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] or [`SessionError::Send`]; the
    /// scene is not created in either case.
    pub async fn scene_begin(&mut self, name: &str) -> Result<Handle, SessionError> {
        if self.status != SessionStatus::Open {
            return Err(SessionError::NotConnected);
        }

        let handle = Handle(self.next_scene);
        let mut scene = Scene::new(name);
        let frame = encode_frame(&Command::Begin {
            scene: handle,
            payload: scene.to_bytes()?,
        });
        self.send(&frame).await?;

        self.next_scene += 1;
        self.scenes.insert(handle, scene);
        self.selected = Some(handle);
        info!(%handle, name, "scene begun");
        Ok(handle)
    }

    /// Makes `handle` the target of subsequent drawing calls.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::UnknownScene`] if the session does not own
    /// that scene.
    pub fn scene_select(&mut self, handle: Handle) -> Result<(), OwnershipError> {
        if !self.scenes.contains_key(&handle) {
            return Err(OwnershipError::UnknownScene(handle));
        }
        self.selected = Some(handle);
        Ok(())
    }

    /// Sends `close` for `handle` and drops the local scene.
    ///
    /// The local scene is dropped even if the send fails.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::UnknownScene`] for a scene the session does
    /// not own, or a send error.
    pub async fn scene_close(&mut self, handle: Handle) -> Result<(), SessionError> {
        if self.scenes.remove(&handle).is_none() {
            return Err(OwnershipError::UnknownScene(handle).into());
        }
        if self.selected == Some(handle) {
            self.selected = None;
        }
        info!(%handle, "scene closed");
        self.send(&encode_frame(&Command::Close { scene: handle })).await
    }

    /// Sends every unsent entity of the selected scene as `add` frames and
    /// returns how many were sent.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError::NoSceneSelected`] without a selected scene,
    /// or a send error.  After a send error the flush cursor is left where it
    /// was.
    pub async fn scene_flush(&mut self) -> Result<usize, SessionError> {
        let handle = self.selected.ok_or(OwnershipError::NoSceneSelected)?;
        if self.status != SessionStatus::Open {
            return Err(SessionError::NotConnected);
        }
        let scene = self
            .scenes
            .get_mut(&handle)
            .ok_or(OwnershipError::UnknownScene(handle))?;

        let mut packets = Vec::new();
        let mut packet = Vec::new();
        let mut frames = 0;
        for gp in scene.unsent_mut() {
            let add = Command::Add {
                scene: handle,
                payload: gp.to_bytes()?,
            };
            let mut frame = Vec::new();
            write_frame(&mut frame, &add);

            if !packet.is_empty() && packet.len() + frame.len() > self.optimal_packet_size {
                packets.push(std::mem::take(&mut packet));
            }
            packet.extend_from_slice(&frame);
            frames += 1;
        }
        if !packet.is_empty() {
            packets.push(packet);
        }

        for packet in &packets {
            self.send(packet).await?;
        }
        if let Some(scene) = self.scenes.get_mut(&handle) {
            scene.mark_flushed();
        }
        debug!(%handle, frames, packets = packets.len(), "scene flushed");
        Ok(frames)
    }

    // ── Tool state ────────────────────────────────────────────────────────────

    pub fn tool_state(&self) -> &ToolState {
        &self.tool
    }

    /// Replaces the whole tool state, e.g. to restore a saved snapshot.
    pub fn set_tool_state(&mut self, tool: ToolState) {
        self.tool = tool;
    }

    pub fn brush_set(&mut self, brush: Brush) {
        self.tool.appearance.brush = brush;
    }

    pub fn fill_set(&mut self, fill: Fill) {
        self.tool.appearance.fill = fill;
    }

    pub fn material_set(&mut self, material: Material) {
        self.tool.appearance.material = material;
    }

    pub fn inherit_set(&mut self, inherit: InheritFlags) {
        self.tool.inherit = inherit;
    }

    pub fn font_set(&mut self, font: Font) {
        self.tool.appearance.font = font;
    }

    /// Sets the reference frame new entities are expressed in.
    pub fn transform_set(&mut self, transform: RefFrame) {
        self.tool.transform = transform;
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn selected_scene_mut(&mut self) -> Result<&mut Scene, OwnershipError> {
        let handle = self.selected.ok_or(OwnershipError::NoSceneSelected)?;
        self.scenes
            .get_mut(&handle)
            .ok_or(OwnershipError::UnknownScene(handle))
    }

    /// Stamps the tool state onto `gp` and adds it to the selected scene.
    fn add_gp(&mut self, gp: impl Into<Gp>, parent: Handle) -> Result<Handle, OwnershipError> {
        let mut gp = gp.into();
        self.tool.stamp(gp.base_mut());
        let scene = self.selected_scene_mut()?;
        Ok(scene.add(gp, parent))
    }

    /// # Errors
    ///
    /// [`OwnershipError::NoSceneSelected`] without a selected scene; the same
    /// holds for every drawing call.
    pub fn point(
        &mut self,
        vertex: DVec3,
        radius: f64,
        parent: Handle,
    ) -> Result<Handle, OwnershipError> {
        let mut point = Point::new(vertex);
        point.radius = radius;
        self.add_gp(point, parent)
    }

    pub fn line(
        &mut self,
        start: DVec3,
        end: DVec3,
        parent: Handle,
    ) -> Result<Handle, OwnershipError> {
        self.add_gp(Line::new(start, end), parent)
    }

    pub fn polyline(
        &mut self,
        vertices: Vec<DVec3>,
        parent: Handle,
    ) -> Result<Handle, OwnershipError> {
        self.add_gp(Polyline::new(vertices), parent)
    }

    pub fn polygon(
        &mut self,
        vertices: Vec<DVec3>,
        filled: bool,
        parent: Handle,
    ) -> Result<Handle, OwnershipError> {
        self.add_gp(Polygon::new(vertices, filled), parent)
    }

    /// Adds an axes triad at the origin of the active transform.
    pub fn frame(&mut self, axis_length: f64, parent: Handle) -> Result<Handle, OwnershipError> {
        self.add_gp(Frame::new(axis_length), parent)
    }

    pub fn text(
        &mut self,
        anchor: DVec3,
        text: &str,
        parent: Handle,
    ) -> Result<Handle, OwnershipError> {
        self.add_gp(Text::new(anchor, text), parent)
    }

    /// Adds a geometry-less parent node.  An empty `name` gets the
    /// automatic `"Group {handle}"` name.
    pub fn group(&mut self, name: &str, parent: Handle) -> Result<Handle, OwnershipError> {
        let mut group = Group::new();
        group.base.name = name.to_string();
        self.add_gp(group, parent)
    }

    // ── Editing ───────────────────────────────────────────────────────────────

    /// Deletes `handle` and its subtree from the selected scene; returns the
    /// number of entities removed.
    ///
    /// Deletes are local; the server keeps what it was already sent.
    pub fn delete(&mut self, handle: Handle) -> Result<usize, OwnershipError> {
        self.selected_scene_mut()?.del(handle)
    }

    pub fn set_selected(&mut self, handle: Handle, selected: bool) -> Result<(), OwnershipError> {
        self.selected_scene_mut()?.set_selected(handle, selected)
    }

    pub fn set_visible(&mut self, handle: Handle, visible: bool) -> Result<(), OwnershipError> {
        self.selected_scene_mut()?.set_visible(handle, visible)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use drawlink_core::{decode_frame, CommandKind};
    use std::sync::{Arc, Mutex};

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default, Clone)]
    struct RecordingSink {
        packets: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&mut self, packet: &[u8]) -> Result<(), String> {
            self.packets.lock().unwrap().push(packet.to_vec());
            Ok(())
        }
    }

    impl RecordingSink {
        fn packets(&self) -> Vec<Vec<u8>> {
            self.packets.lock().unwrap().clone()
        }

        /// Every frame sent so far, in order, across packet boundaries.
        fn commands(&self) -> Vec<Command> {
            let mut out = Vec::new();
            for packet in self.packets() {
                let mut rest = packet.as_slice();
                while !rest.is_empty() {
                    let (cmd, used) = decode_frame(rest).unwrap();
                    out.push(cmd);
                    rest = &rest[used..];
                }
            }
            out
        }
    }

    fn open_session(packet_size: usize) -> (Session<RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        let mut session = Session::new(packet_size);
        session.open(sink.clone());
        (session, sink)
    }

    fn adds(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, Command::Add { .. }))
            .count()
    }

    // ── Scene lifecycle ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_scene_begin_sends_shell_immediately_and_selects() {
        // Arrange
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);

        // Act
        let handle = session.scene_begin("S1").await.unwrap();

        // Assert
        assert_eq!(handle, Handle(1));
        assert_eq!(session.selected_scene(), Some(handle));
        let commands = sink.commands();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::Begin { scene, payload } => {
                assert_eq!(*scene, handle);
                assert_eq!(Scene::from_bytes(payload).unwrap().name(), "S1");
            }
            other => panic!("expected begin, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scene_begin_requires_open_session() {
        let mut session: Session<RecordingSink> = Session::default();

        let result = session.scene_begin("S1").await;

        assert!(matches!(result, Err(SessionError::NotConnected)));
        assert!(session.scene_handles().is_empty());
    }

    #[tokio::test]
    async fn test_scene_handles_are_allocated_in_begin_order() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);

        let a = session.scene_begin("a").await.unwrap();
        let b = session.scene_begin("b").await.unwrap();

        assert_eq!((a, b), (Handle(1), Handle(2)));
        assert_eq!(session.selected_scene(), Some(b));
    }

    #[tokio::test]
    async fn test_scene_select_unknown_scene_is_ownership_error() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);
        session.scene_begin("a").await.unwrap();

        assert_eq!(
            session.scene_select(Handle(7)),
            Err(OwnershipError::UnknownScene(Handle(7)))
        );
        assert_eq!(session.scene_select(Handle(1)), Ok(()));
    }

    #[tokio::test]
    async fn test_scene_close_sends_close_and_deselects() {
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);
        let s = session.scene_begin("S1").await.unwrap();

        session.scene_close(s).await.unwrap();

        assert_eq!(sink.commands().last(), Some(&Command::Close { scene: s }));
        assert!(session.scene(s).is_none());
        assert_eq!(session.selected_scene(), None);
        assert!(matches!(
            session.point(DVec3::ZERO, 1.0, Handle::NONE),
            Err(OwnershipError::NoSceneSelected)
        ));
    }

    #[tokio::test]
    async fn test_scene_close_unknown_scene_sends_nothing() {
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);

        let result = session.scene_close(Handle(3)).await;

        assert!(matches!(
            result,
            Err(SessionError::Ownership(OwnershipError::UnknownScene(Handle(3))))
        ));
        assert!(sink.packets().is_empty());
    }

    // ── Drawing and tool state ────────────────────────────────────────────────

    #[test]
    fn test_drawing_without_selected_scene_fails() {
        let mut session: Session<RecordingSink> = Session::default();

        assert_eq!(
            session.line(DVec3::ZERO, DVec3::X, Handle::NONE),
            Err(OwnershipError::NoSceneSelected)
        );
    }

    #[tokio::test]
    async fn test_tool_state_is_stamped_and_persists_until_changed() {
        // Arrange
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);
        let s = session.scene_begin("S1").await.unwrap();
        let red = Brush { color: [1.0, 0.0, 0.0, 1.0], ..Brush::default() };
        session.brush_set(red);
        session.transform_set(RefFrame::translation(DVec3::new(0.0, 0.0, 5.0)));

        // Act
        let first = session.point(DVec3::ZERO, 1.0, Handle::NONE).unwrap();
        let second = session.line(DVec3::ZERO, DVec3::Y, Handle::NONE).unwrap();
        session.brush_set(Brush::default());
        let third = session.text(DVec3::ZERO, "label", Handle::NONE).unwrap();

        // Assert
        let scene = session.scene(s).unwrap();
        let brush = |h| scene.get(h).unwrap().base().appearance.brush;
        assert_eq!(brush(first), red);
        assert_eq!(brush(second), red);
        assert_eq!(brush(third), Brush::default());
        assert_eq!(
            scene.get(third).unwrap().base().frame.origin,
            DVec3::new(0.0, 0.0, 5.0)
        );
    }

    #[tokio::test]
    async fn test_tool_state_snapshot_and_restore() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);
        let saved = session.tool_state().clone();
        session.fill_set(Fill { color: [0.0, 0.0, 1.0, 1.0], enabled: true });
        session.font_set(Font { family: "mono".to_string(), size: 9.0 });
        session.inherit_set(InheritFlags(0));

        session.set_tool_state(saved.clone());

        assert_eq!(session.tool_state(), &saved);
    }

    #[tokio::test]
    async fn test_every_primitive_call_returns_next_handle() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);
        let s = session.scene_begin("S1").await.unwrap();

        let group = session.group("axes", Handle::NONE).unwrap();
        let handles = [
            session.point(DVec3::ONE, 0.5, group).unwrap(),
            session.line(DVec3::ZERO, DVec3::X, group).unwrap(),
            session.polyline(vec![DVec3::ZERO, DVec3::X, DVec3::Y], group).unwrap(),
            session.polygon(vec![DVec3::ZERO, DVec3::X, DVec3::Y], true, group).unwrap(),
            session.frame(2.0, group).unwrap(),
            session.text(DVec3::Z, "z", group).unwrap(),
        ];

        assert_eq!(group, Handle(1));
        assert_eq!(handles.map(|h| h.0), [2, 3, 4, 5, 6, 7]);
        let scene = session.scene(s).unwrap();
        assert_eq!(scene.children(group).unwrap().len(), 6);
        assert_eq!(scene.get(group).unwrap().base().name, "axes");
    }

    #[tokio::test]
    async fn test_delete_set_selected_and_set_visible_act_on_selected_scene() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);
        let s = session.scene_begin("S1").await.unwrap();
        let group = session.group("", Handle::NONE).unwrap();
        let child = session.point(DVec3::ZERO, 1.0, group).unwrap();

        session.set_selected(group, true).unwrap();
        session.set_visible(child, false).unwrap();
        let scene = session.scene(s).unwrap();
        assert!(scene.get(child).unwrap().base().is_selected());
        assert!(!scene.mode_visible(child).unwrap());

        assert_eq!(session.delete(group), Ok(2));
        assert_eq!(session.scene(s).unwrap().live_count(), 0);
        assert_eq!(session.delete(group), Err(OwnershipError::NoSuchHandle(group)));
    }

    // ── Flush ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_flush_sends_each_entity_once_in_handle_order() {
        // Arrange
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);
        let s = session.scene_begin("S1").await.unwrap();
        for i in 0..3 {
            session.point(DVec3::splat(f64::from(i)), 1.0, Handle::NONE).unwrap();
        }

        // Act
        let sent = session.scene_flush().await.unwrap();
        let again = session.scene_flush().await.unwrap();

        // Assert
        assert_eq!((sent, again), (3, 0));
        let handles: Vec<u64> = sink
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Add { scene, payload } => {
                    assert_eq!(*scene, s);
                    Some(Gp::from_bytes(payload).unwrap().handle().0)
                }
                _ => None,
            })
            .collect();
        assert_eq!(handles, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_flush_sends_only_entities_added_since_last_flush() {
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);
        session.scene_begin("S1").await.unwrap();
        session.point(DVec3::ZERO, 1.0, Handle::NONE).unwrap();
        session.scene_flush().await.unwrap();

        session.point(DVec3::ONE, 1.0, Handle::NONE).unwrap();
        let sent = session.scene_flush().await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(adds(&sink.commands()), 2);
    }

    #[tokio::test]
    async fn test_flush_batches_frames_into_packets() {
        // Arrange: a tiny threshold forces one frame per packet.
        let (mut session, sink) = open_session(1);
        session.scene_begin("S1").await.unwrap();
        for _ in 0..4 {
            session.group("", Handle::NONE).unwrap();
        }

        // Act
        session.scene_flush().await.unwrap();

        // Assert: one begin packet plus four add packets.
        assert_eq!(sink.packets().len(), 5);
    }

    #[tokio::test]
    async fn test_flush_with_large_threshold_sends_single_packet() {
        let (mut session, sink) = open_session(1 << 20);
        session.scene_begin("S1").await.unwrap();
        for _ in 0..10 {
            session.group("", Handle::NONE).unwrap();
        }

        session.scene_flush().await.unwrap();

        let packets = sink.packets();
        assert_eq!(packets.len(), 2);
        assert!(packets[1].len() <= 1 << 20);
        assert_eq!(adds(&sink.commands()), 10);
    }

    #[tokio::test]
    async fn test_flush_without_selected_scene_fails() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);

        let result = session.scene_flush().await;

        assert!(matches!(
            result,
            Err(SessionError::Ownership(OwnershipError::NoSceneSelected))
        ));
    }

    #[tokio::test]
    async fn test_flush_after_delete_skips_dead_entities() {
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);
        session.scene_begin("S1").await.unwrap();
        let a = session.point(DVec3::ZERO, 1.0, Handle::NONE).unwrap();
        session.point(DVec3::ONE, 1.0, Handle::NONE).unwrap();
        session.delete(a).unwrap();

        assert_eq!(session.scene_flush().await.unwrap(), 1);
        assert_eq!(adds(&sink.commands()), 1);
    }

    // ── Status ────────────────────────────────────────────────────────────────

    fn starts_with(packet: &[u8], kind: CommandKind) -> bool {
        decode_frame(packet).map_or(false, |(cmd, _)| cmd.kind() == kind)
    }

    #[tokio::test]
    async fn test_send_failure_flips_status_to_error() {
        // Arrange
        let mut sink = MockFrameSink::new();
        sink.expect_send()
            .times(1)
            .returning(|_| Err("connection reset".to_string()));
        let mut session = Session::new(DEFAULT_PACKET_SIZE);
        session.open(sink);

        // Act
        let result = session.scene_begin("S1").await;

        // Assert: no scene kept, and nothing more reaches the sink.
        assert!(matches!(result, Err(SessionError::Send(_))));
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.scene_handles().is_empty());
        assert!(matches!(session.scene_begin("S2").await, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_entities_unsent() {
        // Arrange: the shell goes out, the add packet does not.
        let mut sink = MockFrameSink::new();
        sink.expect_send()
            .withf(|packet| starts_with(packet, CommandKind::Begin))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_send()
            .withf(|packet| starts_with(packet, CommandKind::Add))
            .times(1)
            .returning(|_| Err("broken pipe".to_string()));
        let mut session = Session::new(DEFAULT_PACKET_SIZE);
        session.open(sink);
        let s = session.scene_begin("S1").await.unwrap();
        session.point(DVec3::ONE, 1.0, Handle::NONE).unwrap();

        // Act
        let result = session.scene_flush().await;

        // Assert
        assert!(matches!(result, Err(SessionError::Send(_))));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.scene(s).unwrap().unsent().count(), 1);
    }

    #[tokio::test]
    async fn test_close_sends_exit_and_drops_scenes() {
        let (mut session, sink) = open_session(DEFAULT_PACKET_SIZE);
        session.scene_begin("a").await.unwrap();
        session.scene_begin("b").await.unwrap();

        session.close().await.unwrap();

        assert_eq!(sink.commands().last(), Some(&Command::Exit));
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(session.scene_handles().is_empty());
        assert!(session.sink().is_none());
    }

    #[tokio::test]
    async fn test_reopen_restarts_scene_handles() {
        let (mut session, _sink) = open_session(DEFAULT_PACKET_SIZE);
        session.scene_begin("a").await.unwrap();
        session.close().await.unwrap();

        session.open(RecordingSink::default());

        assert_eq!(session.scene_begin("b").await.unwrap(), Handle(1));
    }
}
