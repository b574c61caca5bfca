//! Host scene-graph boundary.
//!
//! The core never draws. Each frame it tells the host which tiles joined
//! and left the render set; the host adds or removes them from its own
//! scene graph.

use std::collections::HashMap;

use crate::coordinate::TileCoordinate;
use crate::node::NodeId;
use crate::tree::RenderTile;

/// Receives render set changes from a [`MapView`](crate::MapView).
///
/// Within one frame every attach is delivered before any detach, so a
/// parent is only removed after the children replacing it were added.
pub trait Scene {
    /// Add a tile to the scene, replacing any tile with the same id.
    fn attach(&mut self, tile: &RenderTile);

    /// Remove a tile from the scene. Unknown ids are ignored.
    fn detach(&mut self, id: NodeId);
}

/// A scene that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScene;

impl Scene for NullScene {
    fn attach(&mut self, _tile: &RenderTile) {}

    fn detach(&mut self, _id: NodeId) {}
}

/// One call received by a [`RecordingScene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    /// A tile was attached.
    Attached(NodeId, TileCoordinate),
    /// A tile was detached.
    Detached(NodeId),
}

/// A scene that keeps the attached tiles and a log of calls.
///
/// Useful for headless hosts and tests.
#[derive(Debug, Default)]
pub struct RecordingScene {
    tiles: HashMap<NodeId, RenderTile>,
    events: Vec<SceneEvent>,
}

impl RecordingScene {
    /// An empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles currently attached.
    pub fn tiles(&self) -> impl Iterator<Item = &RenderTile> + '_ {
        self.tiles.values()
    }

    /// Number of attached tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether no tiles are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Whether `id` is attached.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.tiles.contains_key(&id)
    }

    /// Calls received so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    /// Forget the call log, keeping the attached tiles.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

impl Scene for RecordingScene {
    fn attach(&mut self, tile: &RenderTile) {
        self.events.push(SceneEvent::Attached(tile.id, tile.coordinate));
        self.tiles.insert(tile.id, tile.clone());
    }

    fn detach(&mut self, id: NodeId) {
        self.events.push(SceneEvent::Detached(id));
        self.tiles.remove(&id);
    }
}
