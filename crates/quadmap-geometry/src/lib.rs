//! Tile geometry, projection math and elevation decoding for quadtree maps.
//!
//! This crate provides pure synchronous functions for turning a tile address
//! and its downloaded content into renderable geometry. All functions are
//! designed to be called from any threading context - the library user
//! controls parallelism.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **User-controlled parallelism**: Callers decide where meshes are built
//! - **Renderer-agnostic**: Output is plain vertex/index data
//!
//! # Modules
//!
//! - [`units`]: Web-mercator and spherical coordinate conversions
//! - [`mesh`]: Plane, sphere-patch and height-displaced tile meshes
//! - [`elevation`]: Height grids and Terrain-RGB decoding
//! - [`texture`]: PNG/JPEG decoding to RGBA

pub mod bounds;
pub mod elevation;
mod error;
pub mod mesh;
pub mod texture;
pub mod units;

pub use bounds::BoundingSphere;
pub use elevation::{HeightGrid, decode_terrain_rgb, encode_terrain_rgb, height_grid_from_terrain_rgb};
pub use error::{DecodeError, DecodeResult};
pub use mesh::TileMesh;
pub use texture::{TileImage, decode_image};
pub use units::{EARTH_PERIMETER, EARTH_RADIUS, LatLonBounds};
