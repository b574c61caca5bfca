//! A scene that keeps per-tile summaries instead of GPU resources.

use std::collections::HashMap;

use quadmap::{NodeId, RenderTile, Scene, TileCoordinate};

#[derive(Debug)]
struct TileSummary {
    coordinate: TileCoordinate,
    triangles: usize,
    fallback: bool,
}

/// Tracks what a renderer would be drawing.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    tiles: HashMap<NodeId, TileSummary>,
}

impl HeadlessScene {
    /// Attached tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles drawn with an ancestor's image.
    pub fn fallback_tiles(&self) -> usize {
        self.tiles.values().filter(|tile| tile.fallback).count()
    }

    /// Triangles across all attached tiles.
    pub fn triangles(&self) -> usize {
        self.tiles.values().map(|tile| tile.triangles).sum()
    }
}

impl Scene for HeadlessScene {
    fn attach(&mut self, tile: &RenderTile) {
        let summary = TileSummary {
            coordinate: tile.coordinate,
            triangles: tile.geometry.mesh.indices.len() / 3,
            fallback: tile.fallback,
        };
        if let Some(previous) = self.tiles.insert(tile.id, summary) {
            tracing::trace!(coordinate = %previous.coordinate, "tile content replaced");
        }
    }

    fn detach(&mut self, id: NodeId) {
        self.tiles.remove(&id);
    }
}
