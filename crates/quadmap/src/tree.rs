//! Arena-backed quadtree of [`MapNode`]s.
//!
//! Nodes live in a slot arena addressed by generational [`NodeId`]s. Parents
//! own their children's handles, children keep a non-owning parent handle,
//! and destroying a subtree frees its slots in one pass. A completion for a
//! destroyed node simply fails to resolve its handle.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use glam::DVec2;
use quadmap_geometry::{HeightGrid, TileImage};

use crate::config::FailurePolicy;
use crate::coordinate::TileCoordinate;
use crate::error::{Error, Result};
use crate::node::{FetchState, FetchedContent, MapNode, NodeId, NodeState, TileContent};
use crate::task::{CancellationToken, TaskHandle};
use crate::variant::{NodeVariant, TileGeometry};

/// A content request taken from the queue, ready to be spawned.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    /// Requesting node.
    pub node: NodeId,
    /// Tile to fetch.
    pub coordinate: TileCoordinate,
    /// Identifies this request among the node's requests.
    pub serial: u64,
    /// Cancelled when the node is destroyed or its request superseded.
    pub token: CancellationToken,
}

/// Result of applying a finished request to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The content was stored and the node is ready.
    Applied,
    /// The request failed; the node is marked failed.
    Failed,
    /// The node was destroyed or the request superseded. Nothing changed.
    Stale,
}

/// Everything a renderer needs to draw one node.
#[derive(Debug, Clone)]
pub struct RenderTile {
    /// Node being drawn.
    pub id: NodeId,
    /// Tile covered by the node.
    pub coordinate: TileCoordinate,
    /// Geometry to draw.
    pub geometry: Arc<TileGeometry>,
    /// Image to texture with, possibly borrowed from an ancestor.
    pub image: Option<Arc<TileImage>>,
    /// Offset of this tile inside `image`, in UV units.
    pub uv_offset: DVec2,
    /// Scale of this tile inside `image`, in UV units.
    pub uv_scale: f64,
    /// Whether `image` comes from a coarser ancestor.
    pub fallback: bool,
}

/// Changes to the render set since the previous refresh.
///
/// Apply `attached` before `detached` so a parent is only removed once its
/// replacement children are in the scene. A node never appears in both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderDiff {
    /// Nodes that started rendering, or whose content changed.
    pub attached: Vec<NodeId>,
    /// Nodes that stopped rendering or were destroyed.
    pub detached: Vec<NodeId>,
}

impl RenderDiff {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<MapNode>,
}

/// The node hierarchy of one map.
#[derive(Debug)]
pub struct NodeTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    variant: NodeVariant,
    failure_policy: FailurePolicy,
    queue: VecDeque<NodeId>,
    in_flight: HashSet<NodeId>,
    next_serial: u64,
    /// Rendered nodes and the content revision they were attached with.
    rendered: HashMap<NodeId, u64>,
    /// Rendered nodes destroyed since the last refresh.
    destroyed_rendered: Vec<NodeId>,
    /// Flat elevation used for geometry of tiles without their own.
    flat: Arc<HeightGrid>,
}

impl NodeTree {
    /// An empty tree whose nodes use `variant`.
    #[must_use]
    pub fn new(variant: NodeVariant, failure_policy: FailurePolicy) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            variant,
            failure_policy,
            queue: VecDeque::new(),
            in_flight: HashSet::new(),
            next_serial: 0,
            rendered: HashMap::new(),
            destroyed_rendered: Vec::new(),
            flat: Arc::new(HeightGrid::flat(2, 2, 0.0)),
        }
    }

    /// The variant shared by every node.
    #[must_use]
    pub fn variant(&self) -> &NodeVariant {
        &self.variant
    }

    /// How failed requests are handled.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// The root node, if the tree has one.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of queued requests (including entries for nodes destroyed since).
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Resolve a handle.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&MapNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut MapNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Whether `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over live nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &MapNode)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|node| {
                #[allow(clippy::cast_possible_truncation)]
                let id = NodeId {
                    index: index as u32,
                    generation: slot.generation,
                };
                (id, node)
            })
        })
    }

    /// Nodes currently in the render set.
    pub fn rendered(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.rendered.keys().copied()
    }

    /// Whether `id` is in the render set.
    #[must_use]
    pub fn is_rendered(&self, id: NodeId) -> bool {
        self.rendered.contains_key(&id)
    }

    fn allocate(&mut self, node: MapNode) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Create a node and queue its content request.
    fn create(&mut self, parent: Option<NodeId>, coordinate: TileCoordinate) -> NodeId {
        let node = MapNode::new(
            coordinate,
            parent,
            self.variant.bounds(&coordinate),
            self.variant.tile_size(&coordinate),
        );
        let id = self.allocate(node);
        self.enqueue(id);
        tracing::trace!(%coordinate, node = %id, "created node");
        id
    }

    fn enqueue(&mut self, id: NodeId) {
        if let Some(node) = self.get_mut(id) {
            node.fetch = FetchState::Queued;
            self.queue.push_back(id);
        }
    }

    /// Discard any existing tree and create a root node at `(0, 0, 0)`.
    pub fn create_root(&mut self) -> NodeId {
        self.destroy_all();
        let root = self.create(None, TileCoordinate::ROOT);
        self.root = Some(root);
        root
    }

    /// Split a node into four children.
    ///
    /// The node keeps rendering until all four children have settled.
    ///
    /// # Errors
    ///
    /// - [`Error::ContentNotReady`] if the node's content has not arrived
    /// - [`Error::InvalidTransition`] if the node is already subdivided or failed
    /// - [`Error::MaxDepth`] if the node is at `max_depth`
    pub fn subdivide(&mut self, id: NodeId, max_depth: u8) -> Result<[NodeId; 4]> {
        let node = self.get(id).ok_or(Error::UnknownNode)?;
        let coordinate = node.coordinate;
        match node.state {
            NodeState::Ready | NodeState::Active => {}
            NodeState::Created => return Err(Error::ContentNotReady { coordinate }),
            state @ (NodeState::Subdivided | NodeState::Failed) => {
                return Err(Error::InvalidTransition {
                    coordinate,
                    state,
                    operation: "subdivide",
                });
            }
        }
        if !node.is_content_ready() {
            return Err(Error::ContentNotReady { coordinate });
        }
        let children = coordinate
            .children()
            .filter(|_| coordinate.level() < max_depth)
            .ok_or(Error::MaxDepth {
                coordinate,
                max_depth,
            })?;

        let children = children.map(|child| self.create(Some(id), child));
        if let Some(node) = self.get_mut(id) {
            node.children = Some(children);
            node.state = NodeState::Subdivided;
        }
        tracing::debug!(%coordinate, "subdivided");
        Ok(children)
    }

    /// Collapse a subdivided node back into a leaf.
    ///
    /// Destroys every descendant, cancelling their requests. Returns `false`
    /// without changing anything if the node has no children.
    pub fn simplify(&mut self, id: NodeId) -> Result<bool> {
        let rendered = self.rendered.contains_key(&id);
        let node = self.get_mut(id).ok_or(Error::UnknownNode)?;
        let Some(children) = node.children.take() else {
            return Ok(false);
        };
        node.state = match (&node.content, node.last_error.is_some()) {
            (Some(_), _) if rendered => NodeState::Active,
            (Some(_), _) => NodeState::Ready,
            (None, true) if !node.is_loading() => NodeState::Failed,
            (None, _) => NodeState::Created,
        };
        let coordinate = node.coordinate;

        for child in children {
            self.destroy_subtree(child);
        }
        tracing::debug!(%coordinate, "simplified");
        Ok(true)
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(slot) = self
                .slots
                .get_mut(id.index as usize)
                .filter(|slot| slot.generation == id.generation)
            else {
                continue;
            };
            let Some(mut node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);

            node.fetch.cancel();
            self.in_flight.remove(&id);
            if self.rendered.remove(&id).is_some() {
                self.destroyed_rendered.push(id);
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    /// Destroy every node, cancelling all requests.
    ///
    /// Returns the nodes that were rendered; they must be detached.
    pub fn destroy_all(&mut self) -> Vec<NodeId> {
        if let Some(root) = self.root.take() {
            self.destroy_subtree(root);
        }
        self.queue.clear();
        self.in_flight.clear();
        std::mem::take(&mut self.destroyed_rendered)
    }

    /// Drop the content of every node and queue fresh requests, keeping the
    /// tree shape. Coarse levels are queued first.
    pub fn clear_content(&mut self) {
        self.queue.clear();
        let Some(root) = self.root else {
            return;
        };
        let mut pending = VecDeque::from([root]);
        while let Some(id) = pending.pop_front() {
            let Some(node) = self.get_mut(id) else {
                continue;
            };
            node.fetch.cancel();
            node.content = None;
            node.revision += 1;
            node.attempts = 0;
            node.last_error = None;
            node.state = if node.children.is_some() {
                NodeState::Subdivided
            } else {
                NodeState::Created
            };
            let children = node.children;
            self.in_flight.remove(&id);
            self.enqueue(id);
            pending.extend(children.into_iter().flatten());
        }
    }

    /// Take up to `limit` queued requests and mark them in flight.
    pub fn take_queued(&mut self, limit: usize) -> Vec<FetchTicket> {
        let mut tickets = Vec::new();
        while tickets.len() < limit {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            let serial = self.next_serial;
            let Some(node) = self.get_mut(id) else {
                continue;
            };
            if !matches!(node.fetch, FetchState::Queued) {
                continue;
            }
            let token = CancellationToken::new();
            node.fetch = FetchState::InFlight {
                serial,
                token: token.clone(),
                task: None,
            };
            node.attempts += 1;
            let coordinate = node.coordinate;
            self.next_serial += 1;
            self.in_flight.insert(id);
            tickets.push(FetchTicket {
                node: id,
                coordinate,
                serial,
                token,
            });
        }
        tickets
    }

    /// Attach the spawned task to its in-flight request so it can be aborted.
    pub fn set_task(&mut self, id: NodeId, serial: u64, handle: TaskHandle) {
        match self.get_mut(id).map(|node| &mut node.fetch) {
            Some(FetchState::InFlight {
                serial: current,
                task,
                ..
            }) if *current == serial => *task = Some(handle),
            _ => handle.cancel(),
        }
    }

    /// Apply a finished request.
    ///
    /// Completions for destroyed nodes or superseded requests are discarded
    /// and reported as [`CompletionOutcome::Stale`].
    pub fn apply_completion(
        &mut self,
        id: NodeId,
        serial: u64,
        result: Result<FetchedContent>,
    ) -> CompletionOutcome {
        let current = self.get(id).is_some_and(
            |node| matches!(&node.fetch, FetchState::InFlight { serial: s, .. } if *s == serial),
        );
        if !current {
            return CompletionOutcome::Stale;
        }
        self.in_flight.remove(&id);

        match result.and_then(|content| self.build_content(id, content)) {
            Ok(content) => {
                let Some(node) = self.get_mut(id) else {
                    return CompletionOutcome::Stale;
                };
                node.fetch = FetchState::Idle;
                node.bounds = content.geometry.bounds;
                node.content = Some(content);
                node.revision += 1;
                node.last_error = None;
                if matches!(node.state, NodeState::Created | NodeState::Failed) {
                    node.state = NodeState::Ready;
                }
                tracing::trace!(coordinate = %node.coordinate, "content ready");
                CompletionOutcome::Applied
            }
            Err(error) => {
                let policy = self.failure_policy;
                let Some(node) = self.get_mut(id) else {
                    return CompletionOutcome::Stale;
                };
                node.fetch = FetchState::Idle;
                if node.children.is_none() {
                    node.state = NodeState::Failed;
                }
                tracing::warn!(
                    coordinate = %node.coordinate,
                    attempts = node.attempts,
                    retry = policy.allows_retry(node.attempts),
                    "tile request failed: {error}"
                );
                node.last_error = Some(error);
                CompletionOutcome::Failed
            }
        }
    }

    fn build_content(&self, id: NodeId, content: FetchedContent) -> Result<TileContent> {
        let node = self.get(id).ok_or(Error::UnknownNode)?;
        let elevation = content.elevation.map(Arc::new);
        let geometry = self
            .variant
            .compute_world_geometry(&node.coordinate, elevation.as_ref())?;
        Ok(TileContent {
            image: content.image.map(Arc::new),
            elevation,
            geometry: Arc::new(geometry),
        })
    }

    /// Give a queued node blank content without contacting a provider.
    ///
    /// Used for levels the provider does not serve.
    pub fn fill_blank(&mut self, id: NodeId) -> Result<()> {
        let node = self.get_mut(id).ok_or(Error::UnknownNode)?;
        node.fetch.cancel();
        self.in_flight.remove(&id);

        let serial = self.next_serial;
        self.next_serial += 1;
        if let Some(node) = self.get_mut(id) {
            node.fetch = FetchState::InFlight {
                serial,
                token: CancellationToken::new(),
                task: None,
            };
        }
        self.in_flight.insert(id);
        let elevation = self
            .variant
            .needs_elevation()
            .then(|| HeightGrid::clone(&self.flat));
        match self.apply_completion(
            id,
            serial,
            Ok(FetchedContent {
                image: None,
                elevation,
            }),
        ) {
            CompletionOutcome::Applied => Ok(()),
            _ => Err(Error::UnknownNode),
        }
    }

    /// Whether a failed node may request its content again.
    #[must_use]
    pub fn can_retry(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|node| node.has_failed() && self.failure_policy.allows_retry(node.attempts))
    }

    /// Whether a node failed and will not be retried.
    #[must_use]
    pub fn is_permanently_failed(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|node| node.has_failed() && !self.failure_policy.allows_retry(node.attempts))
    }

    /// Queue another request for a failed node. Returns whether it was queued.
    pub fn retry(&mut self, id: NodeId) -> bool {
        if !self.can_retry(id) {
            return false;
        }
        if let Some(node) = self.get_mut(id)
            && node.state == NodeState::Failed
        {
            node.state = NodeState::Created;
        }
        self.enqueue(id);
        true
    }

    /// Whether a node can stand in for its area: it has content or will
    /// never get any.
    #[must_use]
    pub fn is_settled(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|node| node.is_content_ready()) || self.is_permanently_failed(id)
    }

    fn collect_render_set(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        match node.children {
            None => {
                if self.is_settled(id) {
                    out.push(id);
                }
            }
            Some(children) => {
                let swap = children.iter().all(|&child| self.is_settled(child));
                if swap || !node.is_content_ready() {
                    for child in children {
                        self.collect_render_set(child, out);
                    }
                } else {
                    out.push(id);
                }
            }
        }
    }

    /// Recompute which nodes render and report the difference.
    ///
    /// Leaves render once settled. A subdivided node keeps rendering until
    /// all four children have settled; then they replace it in one step.
    pub fn refresh_render_set(&mut self) -> RenderDiff {
        let mut desired = Vec::new();
        if let Some(root) = self.root {
            self.collect_render_set(root, &mut desired);
        }

        let mut diff = RenderDiff {
            attached: Vec::new(),
            detached: std::mem::take(&mut self.destroyed_rendered),
        };
        let mut next = HashMap::with_capacity(desired.len());
        for id in desired {
            let revision = self.get(id).map_or(0, |node| node.revision);
            match self.rendered.get(&id) {
                Some(&previous) if previous == revision => {}
                _ => diff.attached.push(id),
            }
            next.insert(id, revision);
        }
        for &id in self.rendered.keys() {
            if !next.contains_key(&id) {
                diff.detached.push(id);
            }
        }
        self.rendered = next;

        for (id, node) in self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let id = NodeId {
                index: index as u32,
                generation: slot.generation,
            };
            slot.node.as_mut().map(|node| (id, node))
        }) {
            let rendered = self.rendered.contains_key(&id);
            node.state = match node.state {
                NodeState::Ready if rendered => NodeState::Active,
                NodeState::Active if !rendered => NodeState::Ready,
                state => state,
            };
        }
        diff
    }

    /// Build the draw description of a node.
    ///
    /// Nodes without their own image borrow the nearest ancestor's, with the
    /// UV transform selecting their part of it.
    pub fn render_tile(&self, id: NodeId) -> Result<RenderTile> {
        let node = self.get(id).ok_or(Error::UnknownNode)?;
        let coordinate = node.coordinate;

        let geometry = match &node.content {
            Some(content) => Arc::clone(&content.geometry),
            None => {
                let elevation = self.variant.needs_elevation().then_some(&self.flat);
                Arc::new(self.variant.compute_world_geometry(&coordinate, elevation)?)
            }
        };

        if let Some(image) = node.content.as_ref().and_then(|c| c.image.clone()) {
            return Ok(RenderTile {
                id,
                coordinate,
                geometry,
                image: Some(image),
                uv_offset: DVec2::ZERO,
                uv_scale: 1.0,
                fallback: false,
            });
        }

        let mut ancestor = node.parent;
        while let Some(parent_id) = ancestor {
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            if let Some(image) = parent.content.as_ref().and_then(|c| c.image.clone()) {
                let (uv_offset, uv_scale) = sub_tile_uv(&parent.coordinate, &coordinate);
                return Ok(RenderTile {
                    id,
                    coordinate,
                    geometry,
                    image: Some(image),
                    uv_offset,
                    uv_scale,
                    fallback: true,
                });
            }
            ancestor = parent.parent;
        }

        Ok(RenderTile {
            id,
            coordinate,
            geometry,
            image: None,
            uv_offset: DVec2::ZERO,
            uv_scale: 1.0,
            fallback: false,
        })
    }
}

/// UV offset and scale of `tile` inside the image of its ancestor.
fn sub_tile_uv(ancestor: &TileCoordinate, tile: &TileCoordinate) -> (DVec2, f64) {
    let depth = tile.level() - ancestor.level();
    let span = f64::from(1u32 << depth);
    let x = f64::from(tile.x()) - f64::from(ancestor.x()) * span;
    let y = f64::from(tile.y()) - f64::from(ancestor.y()) * span;
    (DVec2::new(x / span, y / span), 1.0 / span)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> NodeTree {
        NodeTree::new(NodeVariant::planar(2), FailurePolicy::default())
    }

    fn image() -> FetchedContent {
        FetchedContent {
            image: Some(TileImage::solid(2, 2, [9, 9, 9, 255])),
            elevation: None,
        }
    }

    fn failure() -> Error {
        Error::HttpStatus {
            url: "http://tiles/x".to_string(),
            status: 500,
        }
    }

    /// Start and complete every queued request.
    fn load_all(tree: &mut NodeTree) {
        for ticket in tree.take_queued(usize::MAX) {
            assert_eq!(
                tree.apply_completion(ticket.node, ticket.serial, Ok(image())),
                CompletionOutcome::Applied
            );
        }
    }

    #[test]
    fn test_root_lifecycle() {
        let mut tree = tree();
        let root = tree.create_root();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Created);
        assert!(tree.get(root).unwrap().is_loading());

        load_all(&mut tree);
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Ready);
        let diff = tree.refresh_render_set();
        assert_eq!(diff.attached, vec![root]);
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Active);
    }

    #[test]
    fn test_subdivide_requires_content() {
        let mut tree = tree();
        let root = tree.create_root();
        assert!(matches!(
            tree.subdivide(root, 10),
            Err(Error::ContentNotReady { .. })
        ));
        assert!(tree.get(root).unwrap().children().is_none());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_subdivide_rejections() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        assert!(matches!(tree.subdivide(root, 0), Err(Error::MaxDepth { .. })));
        tree.subdivide(root, 1).unwrap();
        assert!(matches!(
            tree.subdivide(root, 1),
            Err(Error::InvalidTransition {
                state: NodeState::Subdivided,
                ..
            })
        ));
    }

    #[test]
    fn test_children_swap_in_as_batch() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        tree.refresh_render_set();

        let children = tree.subdivide(root, 5).unwrap();
        let tickets = tree.take_queued(usize::MAX);
        assert_eq!(tickets.len(), 4);

        // Three of four children ready: the parent still stands in.
        for ticket in &tickets[..3] {
            tree.apply_completion(ticket.node, ticket.serial, Ok(image()));
        }
        assert!(tree.refresh_render_set().is_empty());
        assert!(tree.is_rendered(root));

        tree.apply_completion(tickets[3].node, tickets[3].serial, Ok(image()));
        let diff = tree.refresh_render_set();
        assert_eq!(diff.attached.len(), 4);
        assert_eq!(diff.detached, vec![root]);
        for child in children {
            assert!(tree.is_rendered(child));
            assert_eq!(tree.get(child).unwrap().state(), NodeState::Active);
        }
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Subdivided);
    }

    #[test]
    fn test_simplify_round_trip() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        tree.refresh_render_set();
        let children = tree.subdivide(root, 5).unwrap();
        load_all(&mut tree);
        tree.refresh_render_set();

        assert!(tree.simplify(root).unwrap());
        assert_eq!(tree.len(), 1);
        assert!(tree.get(root).unwrap().children().is_none());
        assert!(matches!(
            tree.get(root).unwrap().state(),
            NodeState::Ready | NodeState::Active
        ));
        for child in children {
            assert!(!tree.contains(child));
        }

        let diff = tree.refresh_render_set();
        assert_eq!(diff.attached, vec![root]);
        assert_eq!(diff.detached.len(), 4);
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Active);

        // Idempotent.
        assert!(!tree.simplify(root).unwrap());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_stale_completion_after_simplify() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        let children = tree.subdivide(root, 5).unwrap();
        let tickets = tree.take_queued(usize::MAX);
        assert_eq!(tree.in_flight(), 4);

        tree.simplify(root).unwrap();
        assert_eq!(tree.in_flight(), 0);
        assert!(tickets.iter().all(|t| t.token.is_cancelled()));

        // Reuse the freed slots so stale handles point at live slots.
        tree.subdivide(root, 5).unwrap();
        for ticket in &tickets {
            assert_eq!(
                tree.apply_completion(ticket.node, ticket.serial, Ok(image())),
                CompletionOutcome::Stale
            );
        }
        for child in children {
            assert!(tree.get(child).is_none());
        }
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_failure_and_retry() {
        let mut tree = NodeTree::new(NodeVariant::planar(2), FailurePolicy::Retry { max_attempts: 2 });
        let root = tree.create_root();

        let ticket = tree.take_queued(1).remove(0);
        assert_eq!(
            tree.apply_completion(ticket.node, ticket.serial, Err(failure())),
            CompletionOutcome::Failed
        );
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Failed);
        assert!(tree.can_retry(root));
        assert!(!tree.is_settled(root));
        assert!(tree.subdivide(root, 5).is_err());

        assert!(tree.retry(root));
        let ticket = tree.take_queued(1).remove(0);
        tree.apply_completion(ticket.node, ticket.serial, Err(failure()));
        assert!(!tree.can_retry(root));
        assert!(tree.is_permanently_failed(root));
        assert!(tree.is_settled(root));

        // Settled failures render blank.
        let diff = tree.refresh_render_set();
        assert_eq!(diff.attached, vec![root]);
        let tile = tree.render_tile(root).unwrap();
        assert!(tile.image.is_none());
    }

    #[test]
    fn test_failed_child_borrows_parent_image() {
        let mut tree = NodeTree::new(NodeVariant::planar(2), FailurePolicy::Blank);
        let root = tree.create_root();
        load_all(&mut tree);
        let children = tree.subdivide(root, 5).unwrap();
        for ticket in tree.take_queued(usize::MAX) {
            let result = if ticket.node == children[3] {
                Err(failure())
            } else {
                Ok(image())
            };
            tree.apply_completion(ticket.node, ticket.serial, result);
        }

        let diff = tree.refresh_render_set();
        assert_eq!(diff.attached.len(), 4);
        let tile = tree.render_tile(children[3]).unwrap();
        assert!(tile.fallback);
        assert!(tile.image.is_some());
        assert_eq!(tile.uv_offset, DVec2::new(0.5, 0.5));
        assert!((tile.uv_scale - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_content_keeps_shape() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        let children = tree.subdivide(root, 5).unwrap();
        load_all(&mut tree);
        tree.refresh_render_set();

        tree.clear_content();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.get(root).unwrap().state(), NodeState::Subdivided);
        assert_eq!(tree.get(root).unwrap().children(), Some(children));
        assert!(tree.iter().all(|(_, node)| !node.is_content_ready()));
        assert_eq!(tree.queued(), 5);

        // Root first, then children.
        let tickets = tree.take_queued(usize::MAX);
        assert_eq!(tickets[0].node, root);
        let diff = tree.refresh_render_set();
        assert_eq!(diff.detached.len(), 4);
        assert!(diff.attached.is_empty());
    }

    #[test]
    fn test_reloaded_content_reattaches() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        tree.refresh_render_set();
        tree.clear_content();
        load_all(&mut tree);
        let diff = tree.refresh_render_set();
        assert_eq!(diff.attached, vec![root]);
        assert!(diff.detached.is_empty());
    }

    #[test]
    fn test_destroy_all_reports_rendered() {
        let mut tree = tree();
        let root = tree.create_root();
        load_all(&mut tree);
        tree.refresh_render_set();
        assert_eq!(tree.destroy_all(), vec![root]);
        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        assert!(tree.refresh_render_set().is_empty());
    }

    #[test]
    fn test_fill_blank() {
        let mut tree = NodeTree::new(NodeVariant::height_cpu(2, 1.0), FailurePolicy::default());
        let root = tree.create_root();
        tree.fill_blank(root).unwrap();
        let node = tree.get(root).unwrap();
        assert!(node.is_content_ready());
        assert!(node.content().unwrap().image.is_none());
        assert!(!node.is_loading());
        assert_eq!(tree.in_flight(), 0);
    }

    #[test]
    fn test_set_task_for_superseded_request_cancels() {
        let mut tree = tree();
        let root = tree.create_root();
        let ticket = tree.take_queued(1).remove(0);
        tree.clear_content();

        let cancelled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        tree.set_task(
            root,
            ticket.serial,
            TaskHandle::new(move || flag.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        assert!(cancelled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_sub_tile_uv() {
        let ancestor = TileCoordinate::new(1, 1, 0).unwrap();
        let tile = TileCoordinate::new(3, 5, 2).unwrap();
        let (offset, scale) = sub_tile_uv(&ancestor, &tile);
        assert_eq!(offset, DVec2::new(0.25, 0.5));
        assert!((scale - 0.25).abs() < f64::EPSILON);
    }
}
