//! Elevation grids and Terrain-RGB decoding.
//!
//! Terrain-RGB packs a height into the three colour channels of a pixel:
//! `height = -10000 + (R * 65536 + G * 256 + B) * 0.1` meters.

use crate::error::{DecodeError, DecodeResult};

/// Height offset of the Terrain-RGB encoding, in meters.
const TERRAIN_RGB_OFFSET: f64 = -10_000.0;

/// Height resolution of the Terrain-RGB encoding, in meters.
const TERRAIN_RGB_STEP: f64 = 0.1;

/// A grid of height samples covering one tile.
///
/// Samples are stored row-major with row 0 on the northern edge of the tile
/// and column 0 on the western edge.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

impl HeightGrid {
    /// Create a grid from row-major samples.
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero or the sample count does
    /// not match `width * height`.
    pub fn new(width: u32, height: u32, samples: Vec<f32>) -> DecodeResult<Self> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidFormat {
                context: "height grid",
                detail: format!("empty dimensions {width}x{height}"),
            });
        }
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(DecodeError::BufferTooSmall {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// A grid of the given size with every sample at `value`.
    #[must_use]
    pub fn flat(width: u32, height: u32, value: f32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            samples: vec![value; width as usize * height as usize],
        }
    }

    /// Grid width in samples.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in samples.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw row-major samples.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample at integer grid position, clamped to the grid edges.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        self.samples[y * self.width as usize + x]
    }

    /// Bilinearly interpolated height at normalized position.
    ///
    /// `u` runs west to east and `v` north to south; both are clamped to `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample(&self, u: f64, v: f64) -> f32 {
        let max_x = f64::from(self.width - 1);
        let max_y = f64::from(self.height - 1);
        let x = (u.clamp(0.0, 1.0) * max_x).clamp(0.0, max_x);
        let y = (v.clamp(0.0, 1.0) * max_y).clamp(0.0, max_y);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let fx = (x - f64::from(x0)) as f32;
        let fy = (y - f64::from(y0)) as f32;

        let h00 = self.get(x0, y0);
        let h10 = self.get(x0 + 1, y0);
        let h01 = self.get(x0, y0 + 1);
        let h11 = self.get(x0 + 1, y0 + 1);

        let top = h00 * (1.0 - fx) + h10 * fx;
        let bottom = h01 * (1.0 - fx) + h11 * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Minimum and maximum sample values.
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            })
    }
}

/// Decode one Terrain-RGB pixel to meters.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decode_terrain_rgb(r: u8, g: u8, b: u8) -> f32 {
    let packed = u32::from(r) * 65_536 + u32::from(g) * 256 + u32::from(b);
    (TERRAIN_RGB_OFFSET + f64::from(packed) * TERRAIN_RGB_STEP) as f32
}

/// Encode a height in meters as a Terrain-RGB pixel.
///
/// Heights outside the representable range are clamped.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_terrain_rgb(height: f32) -> [u8; 3] {
    let packed = ((f64::from(height) - TERRAIN_RGB_OFFSET) / TERRAIN_RGB_STEP)
        .round()
        .clamp(0.0, f64::from(0x00ff_ffff_u32)) as u32;
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

/// Decode an RGBA Terrain-RGB image into a height grid.
///
/// # Errors
///
/// Returns an error if the buffer does not hold `width * height` RGBA pixels.
pub fn height_grid_from_terrain_rgb(rgba: &[u8], width: u32, height: u32) -> DecodeResult<HeightGrid> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() < expected {
        return Err(DecodeError::BufferTooSmall {
            expected,
            actual: rgba.len(),
        });
    }

    let samples = rgba[..expected]
        .chunks_exact(4)
        .map(|px| decode_terrain_rgb(px[0], px[1], px[2]))
        .collect();
    HeightGrid::new(width, height, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_terrain_rgb_sea_level() {
        // 100000 * 0.1 - 10000 = 0.
        let [r, g, b] = encode_terrain_rgb(0.0);
        assert_eq!(u32::from(r) * 65_536 + u32::from(g) * 256 + u32::from(b), 100_000);
        assert!(decode_terrain_rgb(r, g, b).abs() < 1e-3);
    }

    #[test]
    fn test_terrain_rgb_zero_pixel() {
        assert!((decode_terrain_rgb(0, 0, 0) + 10_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_height_grid_rejects_wrong_length() {
        let result = HeightGrid::new(2, 2, vec![0.0; 3]);
        assert!(matches!(result, Err(DecodeError::BufferTooSmall { .. })));
        let result = HeightGrid::new(0, 2, vec![]);
        assert!(matches!(result, Err(DecodeError::InvalidFormat { .. })));
    }

    #[test]
    fn test_sample_corners_and_center() {
        let grid = HeightGrid::new(2, 2, vec![0.0, 10.0, 20.0, 30.0]).unwrap();
        assert!(grid.sample(0.0, 0.0).abs() < 1e-6);
        assert!((grid.sample(1.0, 0.0) - 10.0).abs() < 1e-6);
        assert!((grid.sample(0.0, 1.0) - 20.0).abs() < 1e-6);
        assert!((grid.sample(1.0, 1.0) - 30.0).abs() < 1e-6);
        assert!((grid.sample(0.5, 0.5) - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_max() {
        let grid = HeightGrid::new(3, 1, vec![4.0, -2.0, 9.0]).unwrap();
        assert_eq!(grid.min_max(), (-2.0, 9.0));
    }

    #[test]
    fn test_grid_from_terrain_rgb() {
        let mut rgba = Vec::new();
        for h in [0.0_f32, 100.0, 250.5, -20.0] {
            let [r, g, b] = encode_terrain_rgb(h);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
        let grid = height_grid_from_terrain_rgb(&rgba, 2, 2).unwrap();
        assert!((grid.get(1, 0) - 100.0).abs() < 0.06);
        assert!((grid.get(0, 1) - 250.5).abs() < 0.06);
        assert!((grid.get(1, 1) + 20.0).abs() < 0.06);
    }

    #[test]
    fn test_grid_from_short_buffer() {
        let result = height_grid_from_terrain_rgb(&[0; 7], 2, 1);
        assert!(matches!(result, Err(DecodeError::BufferTooSmall { .. })));
    }

    proptest! {
        #[test]
        fn prop_terrain_rgb_quantization(h in -9_000.0_f32..9_000.0) {
            let [r, g, b] = encode_terrain_rgb(h);
            prop_assert!((decode_terrain_rgb(r, g, b) - h).abs() <= 0.051);
        }

        #[test]
        fn prop_sample_within_range(
            samples in proptest::collection::vec(-500.0_f32..500.0, 16),
            u in 0.0_f64..=1.0,
            v in 0.0_f64..=1.0,
        ) {
            let grid = HeightGrid::new(4, 4, samples).unwrap();
            let (lo, hi) = grid.min_max();
            let h = grid.sample(u, v);
            prop_assert!(h >= lo - 1e-3 && h <= hi + 1e-3);
        }
    }
}
