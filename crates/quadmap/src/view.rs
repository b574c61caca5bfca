//! The map orchestrator.
//!
//! [`MapView`] owns the node tree, the LOD control and the provider
//! bindings. The host calls [`MapView::update`] once per frame; everything
//! else happens inside that call or in spawned fetch tasks whose results
//! come back through a channel and are applied at the start of the next
//! update.

use std::sync::Arc;

use crate::camera::Camera;
use crate::config::{DistanceLodConfig, MapConfig};
use crate::error::{Error, Result};
use crate::lod::{DistanceLod, FrameContext, LodControl, LodHeuristic, LodReport};
use crate::node::{FetchedContent, NodeId, NodeState};
use crate::provider::{ProviderMetadata, TileProvider};
use crate::scene::Scene;
use crate::task::Spawner;
use crate::tree::{CompletionOutcome, FetchTicket, NodeTree, RenderDiff};
use crate::variant::{MapMode, ModeRegistry};

/// A finished content request on its way back to the tree.
struct Completion {
    /// The tree generation the request was issued in.
    epoch: u64,
    node: NodeId,
    serial: u64,
    result: Result<FetchedContent>,
}

/// Provider metadata tagged with the binding it was requested for.
struct MetadataReply {
    binding: u64,
    result: Result<ProviderMetadata>,
}

/// What one [`MapView::update`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame: u64,
    /// Results of the LOD pass.
    pub lod: LodReport,
    /// Completions that updated a node.
    pub completions: usize,
    /// Completions discarded because their node was gone.
    pub stale: usize,
    /// Requests started this frame.
    pub fetches_started: usize,
    /// Tiles attached to the scene.
    pub attached: usize,
    /// Tiles detached from the scene.
    pub detached: usize,
}

/// Counters describing the current tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStats {
    /// Live nodes.
    pub resident: usize,
    /// Nodes waiting for content.
    pub loading: usize,
    /// Leaves with content, not rendered.
    pub ready: usize,
    /// Rendered leaves.
    pub active: usize,
    /// Nodes with children.
    pub subdivided: usize,
    /// Nodes whose last request failed.
    pub failed: usize,
    /// Requests in flight.
    pub in_flight: usize,
    /// Nodes in the render set.
    pub rendered: usize,
    /// Deepest live level.
    pub max_level: u8,
    /// Completions discarded since the view was created.
    pub stale_completions: u64,
}

/// Owns a map's tree, providers and LOD control.
pub struct MapView<S: Scene> {
    registry: Arc<ModeRegistry>,
    config: MapConfig,
    mode: MapMode,
    tree: NodeTree,
    lod: LodControl,
    provider: Arc<dyn TileProvider>,
    height_provider: Option<Arc<dyn TileProvider>>,
    metadata: Option<ProviderMetadata>,
    /// Bumped on every provider change so old metadata replies are ignored.
    binding: u64,
    /// Bumped whenever the tree is rebuilt. Node ids and serials restart with
    /// a new tree, so results from an older tree are matched on this first.
    epoch: u64,
    spawner: Arc<dyn Spawner>,
    scene: S,
    completion_tx: async_channel::Sender<Completion>,
    completion_rx: async_channel::Receiver<Completion>,
    metadata_tx: async_channel::Sender<MetadataReply>,
    metadata_rx: async_channel::Receiver<MetadataReply>,
    frame: u64,
    stale_completions: u64,
}

impl<S: Scene> MapView<S> {
    /// Create a view in `mode` and request the root tile.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid or `mode` is not
    /// in `registry`.
    pub fn new(
        registry: Arc<ModeRegistry>,
        mode: MapMode,
        provider: Arc<dyn TileProvider>,
        spawner: Arc<dyn Spawner>,
        scene: S,
        config: MapConfig,
    ) -> Result<Self> {
        config.validate()?;
        let variant = registry.create(mode, &config)?;
        let lod = LodControl::new(
            Box::new(DistanceLod::new(DistanceLodConfig::default())?),
            &config,
        );
        let (completion_tx, completion_rx) = async_channel::unbounded();
        let (metadata_tx, metadata_rx) = async_channel::unbounded();

        let mut view = Self {
            registry,
            tree: NodeTree::new(variant, config.failure_policy),
            config,
            mode,
            lod,
            provider,
            height_provider: None,
            metadata: None,
            binding: 0,
            epoch: 0,
            spawner,
            scene,
            completion_tx,
            completion_rx,
            metadata_tx,
            metadata_rx,
            frame: 0,
            stale_completions: 0,
        };
        view.tree.create_root();
        view.dispatch_fetches();
        tracing::info!(%mode, provider = view.provider.name(), "map view created");
        Ok(view)
    }

    /// Current projection mode.
    #[must_use]
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// The configuration the view was built with.
    #[must_use]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// The node tree.
    #[must_use]
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// The host scene.
    #[must_use]
    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Mutable access to the host scene.
    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// The colour provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn TileProvider> {
        &self.provider
    }

    /// The elevation provider, if one is bound.
    #[must_use]
    pub fn height_provider(&self) -> Option<&Arc<dyn TileProvider>> {
        self.height_provider.as_ref()
    }

    /// Metadata of the current provider, once fetched.
    #[must_use]
    pub fn metadata(&self) -> Option<&ProviderMetadata> {
        self.metadata.as_ref()
    }

    /// Deepest level the LOD pass currently allows.
    #[must_use]
    pub fn max_depth(&self) -> u8 {
        self.lod.max_depth()
    }

    /// The LOD control.
    #[must_use]
    pub fn lod(&self) -> &LodControl {
        &self.lod
    }

    /// Swap the LOD heuristic. The tree is kept.
    pub fn set_lod(&mut self, heuristic: Box<dyn LodHeuristic>) {
        tracing::info!(heuristic = heuristic.name(), "lod heuristic changed");
        self.lod.set_heuristic(heuristic);
    }

    /// Discard the tree and start a new one in `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredMode`] if `mode` has no factory; the
    /// current tree is kept in that case.
    pub fn set_root(&mut self, mode: MapMode) -> Result<()> {
        let variant = self.registry.create(mode, &self.config)?;
        self.detach_all();
        self.tree = NodeTree::new(variant, self.config.failure_policy);
        self.epoch += 1;
        self.mode = mode;
        self.tree.create_root();
        self.dispatch_fetches();
        tracing::info!(%mode, "map root replaced");
        Ok(())
    }

    /// Bind a new colour provider. The whole tree is rebuilt.
    pub fn set_provider(&mut self, provider: Arc<dyn TileProvider>) {
        tracing::info!(
            old = self.provider.name(),
            new = provider.name(),
            "tile provider changed"
        );
        self.provider = provider;
        self.rebind();
    }

    /// Bind (or unbind) the elevation provider. The whole tree is rebuilt.
    ///
    /// Without an elevation provider the height modes ask the colour provider.
    pub fn set_height_provider(&mut self, provider: Option<Arc<dyn TileProvider>>) {
        tracing::info!(
            provider = provider.as_ref().map(|p| p.name()),
            "height provider changed"
        );
        self.height_provider = provider;
        self.rebind();
    }

    fn rebind(&mut self) {
        self.binding += 1;
        self.epoch += 1;
        self.metadata = None;
        self.lod.set_max_depth(self.config.max_depth);
        self.detach_all();
        self.tree.create_root();
        self.dispatch_fetches();
    }

    fn detach_all(&mut self) {
        for id in self.tree.destroy_all() {
            self.scene.detach(id);
        }
    }

    /// Drop every node's content and request it again, keeping the tree shape.
    ///
    /// Rendered tiles leave the scene on the next frame and come back as
    /// their reloads arrive.
    pub fn clear(&mut self) {
        tracing::info!(nodes = self.tree.len(), "clearing tile content");
        self.tree.clear_content();
        self.dispatch_fetches();
    }

    /// Ask the provider for its metadata.
    ///
    /// When it arrives, the depth limit drops to the provider's maximum zoom
    /// and levels below its minimum zoom get blank content.
    pub fn request_metadata(&mut self) {
        let provider = Arc::clone(&self.provider);
        let tx = self.metadata_tx.clone();
        let binding = self.binding;
        // Detached: a reply for an old binding is discarded on arrival.
        let _ = self.spawner.spawn(Box::pin(async move {
            let result = provider.metadata().await;
            let _ = tx.send(MetadataReply { binding, result }).await;
        }));
    }

    /// Apply results that arrived since the last call.
    ///
    /// Returns `(applied, stale)` tile completion counts.
    pub fn poll_completions(&mut self) -> (usize, usize) {
        while let Ok(reply) = self.metadata_rx.try_recv() {
            if reply.binding != self.binding {
                continue;
            }
            match reply.result {
                Ok(metadata) => {
                    let max_depth = self.config.max_depth.min(metadata.max_zoom);
                    tracing::info!(
                        provider = %metadata.name,
                        min_zoom = metadata.min_zoom,
                        max_zoom = metadata.max_zoom,
                        "provider metadata loaded"
                    );
                    self.lod.set_max_depth(max_depth);
                    self.metadata = Some(metadata);
                }
                Err(e) => tracing::warn!("provider metadata request failed: {e}"),
            }
        }

        let (mut applied, mut stale) = (0, 0);
        while let Ok(completion) = self.completion_rx.try_recv() {
            if completion.epoch != self.epoch {
                tracing::trace!(
                    node = %completion.node,
                    "discarded completion from a replaced tree"
                );
                stale += 1;
                continue;
            }
            match self
                .tree
                .apply_completion(completion.node, completion.serial, completion.result)
            {
                CompletionOutcome::Applied | CompletionOutcome::Failed => applied += 1,
                CompletionOutcome::Stale => {
                    tracing::trace!(node = %completion.node, "discarded stale completion");
                    stale += 1;
                }
            }
        }
        self.stale_completions += stale as u64;
        (applied, stale)
    }

    /// Run one frame: apply finished requests, run the LOD pass, start new
    /// requests and push render set changes to the scene.
    pub fn update(&mut self, camera: &Camera) -> FrameReport {
        let frame = FrameContext::new(self.frame, *camera);
        let (completions, stale) = self.poll_completions();
        let lod = self.lod.update_lod(&mut self.tree, &frame);
        let fetches_started = self.dispatch_fetches();
        let diff = self.sync_scene();

        let report = FrameReport {
            frame: self.frame,
            lod,
            completions,
            stale,
            fetches_started,
            attached: diff.attached.len(),
            detached: diff.detached.len(),
        };
        self.frame += 1;
        report
    }

    fn sync_scene(&mut self) -> RenderDiff {
        let diff = self.tree.refresh_render_set();
        for &id in &diff.attached {
            match self.tree.render_tile(id) {
                Ok(tile) => self.scene.attach(&tile),
                Err(e) => tracing::warn!(node = %id, "cannot build render tile: {e}"),
            }
        }
        for &id in &diff.detached {
            self.scene.detach(id);
        }
        diff
    }

    /// Start queued requests up to the concurrency limit.
    fn dispatch_fetches(&mut self) -> usize {
        let limit = self
            .config
            .max_concurrent_fetches
            .saturating_sub(self.tree.in_flight());
        let tickets = self.tree.take_queued(limit);
        let mut started = 0;
        for ticket in tickets {
            let below_min_zoom = self
                .metadata
                .as_ref()
                .is_some_and(|m| ticket.coordinate.level() < m.min_zoom);
            if below_min_zoom {
                if let Err(e) = self.tree.fill_blank(ticket.node) {
                    tracing::warn!(coordinate = %ticket.coordinate, "cannot fill blank tile: {e}");
                }
                continue;
            }
            self.spawn_fetch(ticket);
            started += 1;
        }
        started
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        let FetchTicket {
            node,
            coordinate,
            serial,
            token,
        } = ticket;
        let provider = Arc::clone(&self.provider);
        let elevation = self.tree.variant().needs_elevation().then(|| {
            self.height_provider
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.provider))
        });
        let tx = self.completion_tx.clone();
        let epoch = self.epoch;
        let task_token = token.clone();

        tracing::debug!(%coordinate, provider = provider.name(), "requesting tile");
        let handle = self.spawner.spawn(Box::pin(async move {
            let result = async {
                let image = provider.fetch_tile(coordinate).await?;
                let elevation = match &elevation {
                    Some(source) => Some(source.fetch_elevation(coordinate).await?),
                    None => None,
                };
                Ok::<_, Error>(FetchedContent {
                    image: Some(image),
                    elevation,
                })
            }
            .await;

            // The node was destroyed or its request superseded.
            if task_token.is_cancelled() {
                return;
            }
            let _ = tx
                .send(Completion {
                    epoch,
                    node,
                    serial,
                    result,
                })
                .await;
        }));
        self.tree.set_task(node, serial, handle);
    }

    /// Counters describing the current tree.
    #[must_use]
    pub fn stats(&self) -> ViewStats {
        let mut stats = ViewStats {
            resident: self.tree.len(),
            in_flight: self.tree.in_flight(),
            stale_completions: self.stale_completions,
            ..ViewStats::default()
        };
        for (id, node) in self.tree.iter() {
            if node.is_loading() {
                stats.loading += 1;
            }
            match node.state() {
                NodeState::Created => {}
                NodeState::Ready => stats.ready += 1,
                NodeState::Active => stats.active += 1,
                NodeState::Subdivided => stats.subdivided += 1,
                NodeState::Failed => stats.failed += 1,
            }
            if self.tree.is_rendered(id) {
                stats.rendered += 1;
            }
            stats.max_level = stats.max_level.max(node.coordinate().level());
        }
        stats
    }
}

impl<S: Scene> Drop for MapView<S> {
    fn drop(&mut self) {
        // Abort outstanding requests; the scene keeps whatever it holds.
        let _ = self.tree.destroy_all();
    }
}

impl<S: Scene + std::fmt::Debug> std::fmt::Debug for MapView<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("mode", &self.mode)
            .field("provider", &self.provider.name())
            .field("frame", &self.frame)
            .field("nodes", &self.tree.len())
            .field("scene", &self.scene)
            .finish_non_exhaustive()
    }
}
