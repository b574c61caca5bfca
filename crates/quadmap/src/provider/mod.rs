//! Tile content providers.
//!
//! A provider turns a [`TileCoordinate`] into imagery and, for the height
//! variants, elevation samples. Providers are shared read-only by every node
//! of a tree; the tree never mutates them.

mod debug;
#[cfg(not(target_family = "wasm"))]
mod http;

use std::{future::Future, pin::Pin};

use quadmap_geometry::{HeightGrid, TileImage};
use serde::{Deserialize, Serialize};

use crate::coordinate::{MAX_LEVEL, TileCoordinate};
use crate::error::{Error, Result};

pub use debug::{DebugProvider, HeightDebugProvider};
#[cfg(not(target_family = "wasm"))]
pub use http::HttpProvider;

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// How tile rows are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TilingScheme {
    /// Web-mercator XYZ: row 0 is the northernmost row.
    #[default]
    Xyz,
    /// Tile Map Service: row 0 is the southernmost row.
    Tms,
}

impl TilingScheme {
    /// Row index of `coordinate` as the server expects it.
    #[must_use]
    pub fn row(self, coordinate: &TileCoordinate) -> u32 {
        match self {
            TilingScheme::Xyz => coordinate.y(),
            TilingScheme::Tms => {
                TileCoordinate::tiles_per_axis(coordinate.level()) - 1 - coordinate.y()
            }
        }
    }
}

/// Capabilities advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Human readable provider name.
    pub name: String,
    /// Shallowest level the provider serves.
    pub min_zoom: u8,
    /// Deepest level the provider serves.
    pub max_zoom: u8,
    /// Row numbering used by the provider.
    pub tiling_scheme: TilingScheme,
}

impl ProviderMetadata {
    /// Metadata covering every level.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_zoom: 0,
            max_zoom: MAX_LEVEL,
            tiling_scheme: TilingScheme::Xyz,
        }
    }

    /// Restrict the served zoom range.
    #[must_use]
    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self
    }

    /// Whether the provider has content for `level`.
    #[must_use]
    pub fn serves_level(&self, level: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&level)
    }
}

/// Source of tile imagery and elevation.
pub trait TileProvider: Send + Sync {
    /// Short name used in logs and metadata.
    fn name(&self) -> &str;

    /// Fetch the colour image for a tile.
    fn fetch_tile(&self, coordinate: TileCoordinate) -> ProviderFuture<'_, TileImage>;

    /// Fetch elevation samples for a tile.
    ///
    /// Providers that only serve imagery keep the default, which reports the
    /// operation as unsupported.
    fn fetch_elevation(&self, _coordinate: TileCoordinate) -> ProviderFuture<'_, HeightGrid> {
        let provider = self.name().to_string();
        Box::pin(async move {
            Err(Error::Unsupported {
                provider,
                operation: "elevation",
            })
        })
    }

    /// Fetch the provider's capabilities.
    fn metadata(&self) -> ProviderFuture<'_, ProviderMetadata> {
        let metadata = ProviderMetadata::new(self.name());
        Box::pin(async move { Ok(metadata) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tms_row_flip() {
        let c = TileCoordinate::new(2, 1, 0).unwrap();
        assert_eq!(TilingScheme::Xyz.row(&c), 0);
        assert_eq!(TilingScheme::Tms.row(&c), 3);
        assert_eq!(TilingScheme::Tms.row(&TileCoordinate::ROOT), 0);
    }

    #[test]
    fn test_metadata_zoom_range() {
        let metadata = ProviderMetadata::new("osm").with_zoom_range(2, 19);
        assert!(!metadata.serves_level(1));
        assert!(metadata.serves_level(2));
        assert!(metadata.serves_level(19));
        assert!(!metadata.serves_level(20));

        let clamped = ProviderMetadata::new("odd").with_zoom_range(5, 3);
        assert_eq!(clamped.max_zoom, 5);
    }
}
