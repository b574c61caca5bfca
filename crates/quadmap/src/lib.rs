//! Quadtree level-of-detail engine for tiled maps.
//!
//! A map is a quadtree of tiles rooted at `0/0/0`. Every frame the host hands
//! the [`MapView`] a [`Camera`]; the view applies finished tile requests,
//! lets its [`LodControl`] split or collapse nodes, starts new requests and
//! tells the host [`Scene`] which tiles to attach and detach.
//!
//! # Design principles
//!
//! - **Arena-owned tree**: Nodes live in a [`NodeTree`] and refer to each
//!   other through generational [`NodeId`] handles
//! - **Closed projection set**: Map projections are [`NodeVariant`] cases,
//!   created through an explicit [`ModeRegistry`]
//! - **Executor-agnostic**: Requests run on any [`Spawner`]; results come
//!   back through a channel drained on the render thread
//! - **No visual holes**: A parent keeps rendering until all four children
//!   have content
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quadmap::{Camera, DebugProvider, LocalSpawner, MapConfig, MapMode, MapView,
//!     ModeRegistry, NullScene};
//!
//! let spawner = LocalSpawner::new();
//! let mut view = MapView::new(
//!     Arc::new(ModeRegistry::with_defaults()),
//!     MapMode::Planar,
//!     Arc::new(DebugProvider::new()),
//!     Arc::new(spawner.clone()),
//!     NullScene,
//!     MapConfig::default(),
//! )?;
//!
//! loop {
//!     spawner.run_until_stalled();
//!     view.update(&camera);
//! }
//! ```

pub mod cache;
mod camera;
pub mod config;
mod coordinate;
mod error;
pub mod lod;
mod node;
pub mod provider;
mod scene;
pub mod task;
mod tree;
pub mod variant;
mod view;

pub use cache::{Cache, MemoryCache, NoCache};
pub use camera::{Camera, Frustum};
pub use config::{DistanceLodConfig, FailurePolicy, MapConfig, ScreenSpaceLodConfig};
pub use coordinate::{MAX_LEVEL, Quadrant, TileCoordinate};
pub use error::{Error, Result};
pub use lod::{
    DistanceLod, FrameContext, FrustumLod, Hysteresis, LodControl, LodHeuristic, LodReport,
    NodeSample, ScreenSpaceLod,
};
pub use node::{FetchedContent, MapNode, NodeId, NodeState, TileContent};
#[cfg(not(target_family = "wasm"))]
pub use provider::HttpProvider;
pub use provider::{
    DebugProvider, HeightDebugProvider, ProviderFuture, ProviderMetadata, TileProvider,
    TilingScheme,
};
pub use scene::{NullScene, RecordingScene, Scene, SceneEvent};
#[cfg(not(target_family = "wasm"))]
pub use task::TokioSpawner;
pub use task::{CancellationToken, LocalSpawner, Spawner, TaskHandle};
pub use tree::{CompletionOutcome, FetchTicket, NodeTree, RenderDiff, RenderTile};
pub use variant::{DisplacementMap, MapMode, ModeRegistry, NodeFactory, NodeVariant, TileGeometry};
pub use view::{FrameReport, MapView, ViewStats};

// Re-export geometry types that appear in public signatures.
pub use quadmap_geometry::{BoundingSphere, HeightGrid, TileImage, TileMesh};
