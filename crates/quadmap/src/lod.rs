//! Per-frame level-of-detail control.
//!
//! [`LodControl::update_lod`] walks the active frontier of a [`NodeTree`]
//! breadth-first and asks a [`LodHeuristic`] how much detail each node needs.
//! Heuristics only produce a scalar; the subdivide/simplify decision and its
//! hysteresis band are shared.

use std::collections::VecDeque;

use glam::DVec3;
use quadmap_geometry::BoundingSphere;

use crate::camera::{Camera, Frustum};
use crate::config::{DistanceLodConfig, MapConfig, ScreenSpaceLodConfig};
use crate::coordinate::TileCoordinate;
use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::tree::NodeTree;

/// Per-frame inputs to the LOD pass.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Frame counter.
    pub frame: u64,
    /// Camera for this frame.
    pub camera: Camera,
    /// View frustum of `camera`.
    pub frustum: Frustum,
    /// Pixels per meter at unit distance.
    pub pixels_per_meter: f64,
}

impl FrameContext {
    /// Derive the frame inputs from a camera.
    #[must_use]
    pub fn new(frame: u64, camera: Camera) -> Self {
        Self {
            frame,
            camera,
            frustum: camera.frustum(),
            pixels_per_meter: camera.pixels_per_meter(),
        }
    }
}

/// What a heuristic knows about a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeSample {
    /// Tile address.
    pub coordinate: TileCoordinate,
    /// World-space bounds.
    pub bounds: BoundingSphere,
    /// World-space edge length.
    pub tile_size: f64,
}

/// Subdivide and simplify thresholds on the detail need scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    subdivide: f64,
    simplify: f64,
}

impl Hysteresis {
    /// Thresholds with `subdivide > simplify`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the band is empty or inverted.
    pub fn new(subdivide: f64, simplify: f64) -> Result<Self> {
        if subdivide.is_finite() && simplify.is_finite() && subdivide > simplify && simplify >= 0.0 {
            Ok(Self {
                subdivide,
                simplify,
            })
        } else {
            Err(Error::InvalidConfig {
                context: "lod hysteresis",
                detail: format!("subdivide {subdivide} must exceed simplify {simplify}"),
            })
        }
    }

    /// A leaf whose need exceeds this subdivides.
    #[must_use]
    pub fn subdivide(&self) -> f64 {
        self.subdivide
    }

    /// A subdivided node collapses once every child's need is below this.
    #[must_use]
    pub fn simplify(&self) -> f64 {
        self.simplify
    }
}

/// A detail-need function.
pub trait LodHeuristic: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// How much more detail the node needs; larger means closer or bigger.
    fn detail_need(&self, node: &NodeSample, frame: &FrameContext) -> f64;

    /// Thresholds for `detail_need`.
    fn hysteresis(&self) -> Hysteresis;
}

/// Compares camera distance to tile size.
///
/// Detail need is `tile_size / distance`. With the default factors a tile
/// subdivides within four tile sizes of the camera and its children collapse
/// beyond nine of their own sizes. The gap keeps freshly created children
/// from collapsing at the distance that created them, and keeps converged
/// neighbouring leaves within one level of each other.
#[derive(Debug, Clone, Copy)]
pub struct DistanceLod {
    config: DistanceLodConfig,
    hysteresis: Hysteresis,
}

impl DistanceLod {
    /// Build from validated factors.
    pub fn new(config: DistanceLodConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hysteresis: Hysteresis::new(1.0 / config.subdivide_factor, 1.0 / config.simplify_factor)?,
        })
    }

    /// Camera distance below which a tile of `tile_size` subdivides.
    #[must_use]
    pub fn subdivide_distance(&self, tile_size: f64) -> f64 {
        self.config.subdivide_factor * tile_size
    }

    /// Camera distance beyond which a tile of `tile_size` stops holding its parent subdivided.
    #[must_use]
    pub fn simplify_distance(&self, tile_size: f64) -> f64 {
        self.config.simplify_factor * tile_size
    }

    fn need(node: &NodeSample, eye: DVec3) -> f64 {
        let distance = eye.distance(node.bounds.center);
        if distance <= f64::EPSILON {
            f64::INFINITY
        } else {
            node.tile_size / distance
        }
    }
}

impl Default for DistanceLod {
    fn default() -> Self {
        Self {
            config: DistanceLodConfig::default(),
            hysteresis: Hysteresis {
                subdivide: 0.25,
                simplify: 1.0 / 9.0,
            },
        }
    }
}

impl LodHeuristic for DistanceLod {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn detail_need(&self, node: &NodeSample, frame: &FrameContext) -> f64 {
        Self::need(node, frame.camera.position)
    }

    fn hysteresis(&self) -> Hysteresis {
        self.hysteresis
    }
}

/// [`DistanceLod`] that gives up detail for tiles outside the view frustum.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrustumLod {
    distance: DistanceLod,
}

impl FrustumLod {
    /// Build from validated factors.
    pub fn new(config: DistanceLodConfig) -> Result<Self> {
        Ok(Self {
            distance: DistanceLod::new(config)?,
        })
    }
}

impl LodHeuristic for FrustumLod {
    fn name(&self) -> &'static str {
        "frustum"
    }

    fn detail_need(&self, node: &NodeSample, frame: &FrameContext) -> f64 {
        if frame.frustum.intersects_sphere(&node.bounds) {
            self.distance.detail_need(node, frame)
        } else {
            0.0
        }
    }

    fn hysteresis(&self) -> Hysteresis {
        self.distance.hysteresis
    }
}

/// Projected screen size of a tile in pixels.
///
/// `need = tile_size * pixels_per_meter / d`, where `d` is the distance from
/// the eye to the tile's bounding sphere, so the camera inside a tile's
/// bounds always asks for more detail.
#[derive(Debug, Clone, Copy)]
pub struct ScreenSpaceLod {
    config: ScreenSpaceLodConfig,
    hysteresis: Hysteresis,
}

impl ScreenSpaceLod {
    /// Build from validated thresholds.
    pub fn new(config: ScreenSpaceLodConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hysteresis: Hysteresis::new(config.subdivide_pixels, config.simplify_pixels)?,
        })
    }

    /// Projected size in pixels, ignoring the frustum.
    #[must_use]
    pub fn projected_pixels(node: &NodeSample, frame: &FrameContext) -> f64 {
        let distance = node.bounds.surface_distance(frame.camera.position);
        if distance <= f64::EPSILON {
            f64::INFINITY
        } else {
            node.tile_size * frame.pixels_per_meter / distance
        }
    }
}

impl LodHeuristic for ScreenSpaceLod {
    fn name(&self) -> &'static str {
        "screen-space"
    }

    fn detail_need(&self, node: &NodeSample, frame: &FrameContext) -> f64 {
        if self.config.frustum_culling && !frame.frustum.intersects_sphere(&node.bounds) {
            return 0.0;
        }
        Self::projected_pixels(node, frame)
    }

    fn hysteresis(&self) -> Hysteresis {
        self.hysteresis
    }
}

/// What one LOD pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LodReport {
    /// Nodes inspected.
    pub visited: usize,
    /// Nodes split.
    pub subdivided: usize,
    /// Nodes collapsed.
    pub simplified: usize,
    /// Splits postponed because content was not ready.
    pub deferred: usize,
    /// Failed nodes queued for another request.
    pub retried: usize,
    /// The visit budget ran out before the frontier was exhausted.
    pub budget_exhausted: bool,
}

/// The LOD policy engine.
pub struct LodControl {
    heuristic: Box<dyn LodHeuristic>,
    min_depth: u8,
    max_depth: u8,
    visit_budget: usize,
}

impl LodControl {
    /// Control with `heuristic` and the depth limits and budget from `config`.
    #[must_use]
    pub fn new(heuristic: Box<dyn LodHeuristic>, config: &MapConfig) -> Self {
        Self {
            heuristic,
            min_depth: config.min_depth,
            max_depth: config.max_depth,
            visit_budget: config.visit_budget.max(1),
        }
    }

    /// The active heuristic.
    #[must_use]
    pub fn heuristic(&self) -> &dyn LodHeuristic {
        self.heuristic.as_ref()
    }

    /// Swap the heuristic.
    pub fn set_heuristic(&mut self, heuristic: Box<dyn LodHeuristic>) {
        self.heuristic = heuristic;
    }

    /// Deepest level nodes may subdivide to.
    #[must_use]
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Change the deepest level. Deeper subtrees collapse on later passes.
    pub fn set_max_depth(&mut self, max_depth: u8) {
        self.max_depth = max_depth;
    }

    fn sample(tree: &NodeTree, id: NodeId) -> Option<NodeSample> {
        tree.get(id).map(|node| NodeSample {
            coordinate: node.coordinate(),
            bounds: node.bounds(),
            tile_size: node.tile_size(),
        })
    }

    /// Run one pass over the frontier of `tree`.
    ///
    /// Subdivided nodes collapse when all children need less than the
    /// simplify threshold, or when they sit at the depth limit; otherwise the
    /// pass descends into them. Leaves split when their need exceeds the
    /// subdivide threshold and their content is ready. Failed nodes with
    /// attempts left are queued again.
    pub fn update_lod(&self, tree: &mut NodeTree, frame: &FrameContext) -> LodReport {
        let mut report = LodReport::default();
        let hysteresis = self.heuristic.hysteresis();
        let min_depth = self.min_depth.min(self.max_depth);
        let mut frontier: VecDeque<NodeId> = tree.root().into_iter().collect();

        while let Some(id) = frontier.pop_front() {
            if report.visited >= self.visit_budget {
                report.budget_exhausted = true;
                break;
            }
            let (Some(sample), Some(node)) = (Self::sample(tree, id), tree.get(id)) else {
                continue;
            };
            report.visited += 1;
            let level = sample.coordinate.level();
            let children = node.children();

            // Subdivided nodes whose reload failed are retried too.
            let retried = tree.can_retry(id) && tree.retry(id);
            if retried {
                report.retried += 1;
            }

            if let Some(children) = children {
                let collapse = level >= self.max_depth
                    || (level >= min_depth
                        && children.iter().all(|&child| {
                            Self::sample(tree, child).is_none_or(|child| {
                                self.heuristic.detail_need(&child, frame) < hysteresis.simplify()
                            })
                        }));
                if collapse {
                    if let Ok(true) = tree.simplify(id) {
                        report.simplified += 1;
                    }
                } else {
                    frontier.extend(children);
                }
                continue;
            }

            if retried {
                continue;
            }

            let wants_detail = level < min_depth
                || self.heuristic.detail_need(&sample, frame) > hysteresis.subdivide();
            if !wants_detail || level >= self.max_depth {
                continue;
            }
            match tree.subdivide(id, self.max_depth) {
                Ok(_) => report.subdivided += 1,
                Err(Error::ContentNotReady { .. }) => report.deferred += 1,
                Err(e) => tracing::trace!(coordinate = %sample.coordinate, "not subdivided: {e}"),
            }
        }

        if report.subdivided + report.simplified > 0 {
            tracing::debug!(
                frame = frame.frame,
                heuristic = self.heuristic.name(),
                visited = report.visited,
                subdivided = report.subdivided,
                simplified = report.simplified,
                deferred = report.deferred,
                "lod pass"
            );
        }
        report
    }
}

impl std::fmt::Debug for LodControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LodControl")
            .field("heuristic", &self.heuristic.name())
            .field("min_depth", &self.min_depth)
            .field("max_depth", &self.max_depth)
            .field("visit_budget", &self.visit_budget)
            .finish()
    }
}
