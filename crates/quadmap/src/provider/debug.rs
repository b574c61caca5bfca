//! Procedural providers for tests and offline demos.

use quadmap_geometry::{
    HeightGrid, TileImage, decode_terrain_rgb, encode_terrain_rgb,
    units::{tile_column_longitude, tile_row_latitude},
};

use super::{ProviderFuture, ProviderMetadata, TileProvider};
use crate::coordinate::TileCoordinate;

/// Colours a tile by its level, with a checkerboard so neighbours differ.
#[derive(Debug, Clone)]
pub struct DebugProvider {
    image_size: u32,
    metadata: ProviderMetadata,
}

impl Default for DebugProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugProvider {
    /// A provider serving 16x16 tiles at every level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            image_size: 16,
            metadata: ProviderMetadata::new("debug"),
        }
    }

    /// Override the provider name, so two debug providers can be told apart.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Restrict the advertised zoom range.
    #[must_use]
    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.metadata = self.metadata.with_zoom_range(min_zoom, max_zoom);
        self
    }

    /// Colour for a tile: hue walks with the level, odd checker squares darker.
    #[must_use]
    pub fn tile_colour(coordinate: &TileCoordinate) -> [u8; 4] {
        const PALETTE: [[u8; 3]; 6] = [
            [230, 57, 70],
            [244, 162, 97],
            [233, 196, 106],
            [42, 157, 143],
            [69, 123, 157],
            [131, 56, 236],
        ];
        let [r, g, b] = PALETTE[usize::from(coordinate.level()) % PALETTE.len()];
        if (coordinate.x() + coordinate.y()) % 2 == 1 {
            [r / 4 * 3, g / 4 * 3, b / 4 * 3, 255]
        } else {
            [r, g, b, 255]
        }
    }
}

impl TileProvider for DebugProvider {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn fetch_tile(&self, coordinate: TileCoordinate) -> ProviderFuture<'_, TileImage> {
        let image = TileImage::solid(
            self.image_size,
            self.image_size,
            Self::tile_colour(&coordinate),
        );
        Box::pin(async move { Ok(image) })
    }

    fn metadata(&self) -> ProviderFuture<'_, ProviderMetadata> {
        let metadata = self.metadata.clone();
        Box::pin(async move { Ok(metadata) })
    }
}

/// Serves a smooth procedural elevation field covering the whole globe.
///
/// Heights go through the Terrain-RGB quantization so they match what an
/// HTTP Terrain-RGB source would deliver. Samples include both tile edges,
/// so neighbouring tiles agree along their shared border.
#[derive(Debug, Clone)]
pub struct HeightDebugProvider {
    resolution: u32,
    amplitude: f64,
    metadata: ProviderMetadata,
}

impl Default for HeightDebugProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HeightDebugProvider {
    /// 33x33 samples per tile with peaks of up to 4 km.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolution: 33,
            amplitude: 4000.0,
            metadata: ProviderMetadata::new("height-debug"),
        }
    }

    /// Set the samples per tile side (at least 2).
    #[must_use]
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution.max(2);
        self
    }

    /// Set the peak height in meters.
    #[must_use]
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Height in meters at a latitude/longitude in degrees.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn height_at(&self, lat: f64, lon: f64) -> f32 {
        let (lat, lon) = (lat.to_radians(), lon.to_radians());
        let ridges = (lon * 3.0).sin() * (lat * 2.0).cos();
        let detail = 0.25 * (lon * 17.0).sin() * (lat * 13.0).sin();
        let [r, g, b] = encode_terrain_rgb((self.amplitude * (ridges + detail)) as f32);
        decode_terrain_rgb(r, g, b)
    }

    #[allow(clippy::cast_precision_loss)]
    fn grid(&self, coordinate: &TileCoordinate) -> HeightGrid {
        let n = self.resolution;
        let tiles = f64::from(TileCoordinate::tiles_per_axis(coordinate.level()));
        let step = 1.0 / f64::from(n - 1);
        let mut samples = Vec::with_capacity(n as usize * n as usize);
        for row in 0..n {
            let lat = tile_row_latitude(f64::from(coordinate.y()) + f64::from(row) * step, tiles);
            for col in 0..n {
                let lon =
                    tile_column_longitude(f64::from(coordinate.x()) + f64::from(col) * step, tiles);
                samples.push(self.height_at(lat, lon));
            }
        }
        HeightGrid::new(n, n, samples).unwrap_or_else(|_| HeightGrid::flat(n, n, 0.0))
    }

    fn tint(height: f32) -> [u8; 4] {
        match height {
            h if h < 0.0 => [38, 70, 120, 255],
            h if h < 1000.0 => [86, 140, 70, 255],
            h if h < 2500.0 => [150, 120, 80, 255],
            _ => [240, 240, 240, 255],
        }
    }
}

impl TileProvider for HeightDebugProvider {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn fetch_tile(&self, coordinate: TileCoordinate) -> ProviderFuture<'_, TileImage> {
        let grid = self.grid(&coordinate);
        let data = grid
            .samples()
            .iter()
            .flat_map(|&h| Self::tint(h))
            .collect();
        let image = TileImage::new(data, grid.width(), grid.height());
        Box::pin(async move { Ok(image) })
    }

    fn fetch_elevation(&self, coordinate: TileCoordinate) -> ProviderFuture<'_, HeightGrid> {
        let grid = self.grid(&coordinate);
        Box::pin(async move { Ok(grid) })
    }

    fn metadata(&self) -> ProviderFuture<'_, ProviderMetadata> {
        let metadata = self.metadata.clone();
        Box::pin(async move { Ok(metadata) })
    }
}
