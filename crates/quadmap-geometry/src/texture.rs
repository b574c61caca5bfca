//! Tile imagery decoding.
//!
//! Providers hand over encoded PNG or JPEG bytes; everything downstream works
//! on RGBA pixel data.

use crate::error::{DecodeError, DecodeResult};

/// Decoded RGBA tile image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    /// RGBA pixel data (4 bytes per pixel), row-major from the top-left.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TileImage {
    /// Create a new image.
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// An image of one flat colour.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        Self::new(rgba.repeat(pixels), width, height)
    }

    /// Check if the data size matches the dimensions.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data
            .get(i..i + 4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }
}

/// Decode PNG or JPEG bytes to RGBA.
///
/// # Errors
///
/// Returns an error if the buffer is empty or the codec rejects it.
pub fn decode_image(bytes: &[u8]) -> DecodeResult<TileImage> {
    if bytes.len() < 4 {
        return Err(DecodeError::BufferTooSmall {
            expected: 4,
            actual: bytes.len(),
        });
    }

    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TileImage::new(rgba.into_raw(), width, height))
}
