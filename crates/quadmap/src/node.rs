//! Quadtree nodes and their lifecycle state.

use std::{fmt, sync::Arc};

use quadmap_geometry::{BoundingSphere, HeightGrid, TileImage};

use crate::coordinate::TileCoordinate;
use crate::error::Error;
use crate::task::{CancellationToken, TaskHandle};
use crate::variant::TileGeometry;

/// Handle to a node in a [`NodeTree`](crate::NodeTree).
///
/// Handles are generational: once a node is destroyed its handle never
/// resolves again, even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Lifecycle state of a node.
///
/// ```text
/// Created --content--> Ready <--render set--> Active
///    |                   |                      |
///    | error             +------subdivide-------+--> Subdivided --simplify--> Ready
///    v
/// Failed --retry--> Created
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Content requested, nothing displayable yet.
    Created,
    /// Content loaded, not currently rendered.
    Ready,
    /// Content loaded and in the render set.
    Active,
    /// Has four children; renders only as a stand-in until they settle.
    Subdivided,
    /// The last content request failed.
    Failed,
}

/// Content delivered by a provider for one tile.
#[derive(Debug, Clone, Default)]
pub struct FetchedContent {
    /// Colour image; `None` for a blank tile.
    pub image: Option<TileImage>,
    /// Elevation samples for the height variants.
    pub elevation: Option<HeightGrid>,
}

/// Loaded content of a node: imagery, elevation and derived geometry.
#[derive(Debug, Clone)]
pub struct TileContent {
    /// Colour image; `None` for a blank tile.
    pub image: Option<Arc<TileImage>>,
    /// Elevation samples, when the variant uses them.
    pub elevation: Option<Arc<HeightGrid>>,
    /// Geometry built from the coordinate and elevation.
    pub geometry: Arc<TileGeometry>,
}

/// Progress of a node's content request.
#[derive(Debug, Default)]
pub(crate) enum FetchState {
    #[default]
    Idle,
    Queued,
    InFlight {
        serial: u64,
        token: CancellationToken,
        task: Option<TaskHandle>,
    },
}

impl FetchState {
    /// Cancel an in-flight request and reset to idle.
    pub(crate) fn cancel(&mut self) {
        if let FetchState::InFlight { token, task, .. } = std::mem::take(self) {
            token.cancel();
            if let Some(task) = task {
                task.cancel();
            }
        }
    }
}

/// One quadtree cell.
#[derive(Debug)]
pub struct MapNode {
    pub(crate) coordinate: TileCoordinate,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Option<[NodeId; 4]>,
    pub(crate) state: NodeState,
    pub(crate) content: Option<TileContent>,
    pub(crate) fetch: FetchState,
    pub(crate) attempts: u32,
    pub(crate) last_error: Option<Error>,
    pub(crate) bounds: BoundingSphere,
    pub(crate) tile_size: f64,
    /// Bumped whenever `content` changes, so the render set can re-attach.
    pub(crate) revision: u64,
}

impl MapNode {
    pub(crate) fn new(
        coordinate: TileCoordinate,
        parent: Option<NodeId>,
        bounds: BoundingSphere,
        tile_size: f64,
    ) -> Self {
        Self {
            coordinate,
            parent,
            children: None,
            state: NodeState::Created,
            content: None,
            fetch: FetchState::Idle,
            attempts: 0,
            last_error: None,
            bounds,
            tile_size,
            revision: 0,
        }
    }

    /// The tile this node covers.
    #[must_use]
    pub fn coordinate(&self) -> TileCoordinate {
        self.coordinate
    }

    /// Parent handle, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child handles in [`Quadrant`](crate::Quadrant) order, if subdivided.
    #[must_use]
    pub fn children(&self) -> Option<[NodeId; 4]> {
        self.children
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Loaded content, if any.
    #[must_use]
    pub fn content(&self) -> Option<&TileContent> {
        self.content.as_ref()
    }

    /// Whether the image, any required elevation and the geometry are all present.
    #[must_use]
    pub fn is_content_ready(&self) -> bool {
        self.content.is_some()
    }

    /// Whether a content request is queued or in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        !matches!(self.fetch, FetchState::Idle)
    }

    /// Number of content requests issued since the node was created or cleared.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Error of the most recent failed request.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// World-space bounds, refined once geometry is built.
    #[must_use]
    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    /// World-space edge length of the tile.
    #[must_use]
    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Whether the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// The last request failed and nothing is pending.
    pub(crate) fn has_failed(&self) -> bool {
        self.content.is_none() && self.last_error.is_some() && !self.is_loading()
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    fn node() -> MapNode {
        MapNode::new(
            TileCoordinate::ROOT,
            None,
            BoundingSphere::new(DVec3::ZERO, 1.0),
            1.0,
        )
    }

    #[test]
    fn test_new_node_is_created_leaf() {
        let node = node();
        assert_eq!(node.state(), NodeState::Created);
        assert!(node.is_leaf());
        assert!(!node.is_content_ready());
        assert!(!node.is_loading());
        assert!(!node.has_failed());
    }

    #[test]
    fn test_cancel_in_flight_fetch() {
        let mut node = node();
        let token = CancellationToken::new();
        node.fetch = FetchState::InFlight {
            serial: 7,
            token: token.clone(),
            task: None,
        };
        assert!(node.is_loading());
        node.fetch.cancel();
        assert!(token.is_cancelled());
        assert!(!node.is_loading());
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId {
            index: 3,
            generation: 2,
        };
        assert_eq!(id.to_string(), "#3v2");
    }
}
