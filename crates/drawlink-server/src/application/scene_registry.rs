//! In-memory [`ApplicationLoop`] that keeps every client's scenes in a map.
//!
//! Scene handles are allocated per client starting at 1, in `begin` order,
//! which is the same sequence the client session uses.  Closing a scene or
//! disconnecting drops the scenes; nothing is persisted.

use std::collections::{BTreeMap, HashMap};

use drawlink_core::{Handle, OwnershipError, Scene, SceneError};
use tracing::{debug, info, warn};

use super::dispatch::{ApplicationLoop, ClientId};

/// Scenes owned by one connected client.
#[derive(Debug)]
struct ClientScenes {
    scenes: BTreeMap<Handle, Scene>,
    /// Next scene handle to allocate.
    next: u64,
}

impl Default for ClientScenes {
    fn default() -> Self {
        Self {
            scenes: BTreeMap::new(),
            next: 1,
        }
    }
}

/// Authoritative scenes of all connected clients.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    clients: HashMap<ClientId, ClientScenes>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of open scenes owned by `client`, `0` for an unknown client.
    pub fn scene_count(&self, client: &str) -> usize {
        self.clients.get(client).map_or(0, |c| c.scenes.len())
    }

    pub fn scene(&self, client: &str, scene: Handle) -> Option<&Scene> {
        self.clients.get(client)?.scenes.get(&scene)
    }

    fn scene_mut(&mut self, client: &str, scene: Handle) -> Result<&mut Scene, OwnershipError> {
        self.clients
            .get_mut(client)
            .and_then(|c| c.scenes.get_mut(&scene))
            .ok_or(OwnershipError::UnknownScene(scene))
    }
}

impl ApplicationLoop for SceneRegistry {
    fn cmd_client_add(&mut self, client: &str) {
        if self.clients.contains_key(client) {
            warn!(%client, "client registered twice; keeping existing scenes");
            return;
        }
        self.clients.insert(client.to_string(), ClientScenes::default());
        info!(%client, "client registered");
    }

    fn cmd_client_del(&mut self, client: &str) {
        match self.clients.remove(client) {
            Some(owned) => info!(%client, scenes = owned.scenes.len(), "client released"),
            None => debug!(%client, "release of unknown client"),
        }
    }

    fn cmd_scene_begin(&mut self, client: &str, payload: &[u8]) -> Result<Handle, SceneError> {
        // Decode before allocating so a bad shell does not consume a handle.
        let scene = Scene::from_bytes(payload)?;
        let owned = self.clients.entry(client.to_string()).or_default();
        let handle = Handle(owned.next);
        owned.next += 1;
        info!(%client, %handle, name = scene.name(), "scene opened");
        owned.scenes.insert(handle, scene);
        Ok(handle)
    }

    fn cmd_scene_add_gp(
        &mut self,
        client: &str,
        scene: Handle,
        payload: &[u8],
    ) -> Result<Handle, SceneError> {
        let target = self.scene_mut(client, scene)?;
        let handle = target.add_from_stream(payload)?;
        debug!(%client, %scene, %handle, "entity added");
        Ok(handle)
    }

    fn cmd_scene_close(&mut self, client: &str, scene: Handle) -> Result<(), SceneError> {
        let removed = self
            .clients
            .get_mut(client)
            .and_then(|c| c.scenes.remove(&scene))
            .ok_or(OwnershipError::UnknownScene(scene))?;
        info!(%client, %scene, entities = removed.live_count(), "scene closed");
        Ok(())
    }

    fn scene_snapshot(&self, client: &str, scene: Handle) -> Option<Scene> {
        self.scene(client, scene).cloned()
    }
}
