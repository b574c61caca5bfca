//! Per-tile mesh generation.
//!
//! All grids share the same vertex layout: `(segments + 1)²` vertices, row 0
//! on the northern edge, column 0 on the western edge, and UVs running from
//! `(0, 0)` at the north-west corner to `(1, 1)` at the south-east corner.
//! Triangles wind counter-clockwise when seen from outside (above the plane,
//! or outside the sphere).

use glam::{DVec3, Vec2, Vec3};

use crate::elevation::HeightGrid;
use crate::units::{LatLonBounds, datums_to_mercator, lat_lon_to_sphere, mercator_to_datums};

/// Triangle mesh for a single tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileMesh {
    /// Vertex positions in tile-local space.
    pub positions: Vec<Vec3>,
    /// Per-vertex unit normals.
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates.
    pub uvs: Vec<Vec2>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl TileMesh {
    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Flat unit square on the XZ plane, centered at the origin.
    ///
    /// The tile transform scales it to the tile footprint.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn plane_grid(segments: u32) -> Self {
        let segments = segments.max(1);
        let step = 1.0 / segments as f32;
        let mut mesh = Self::with_capacity(segments);

        for j in 0..=segments {
            for i in 0..=segments {
                let (u, v) = (i as f32 * step, j as f32 * step);
                mesh.positions.push(Vec3::new(u - 0.5, 0.0, v - 0.5));
                mesh.normals.push(Vec3::Y);
                mesh.uvs.push(Vec2::new(u, v));
            }
        }
        mesh.indices = grid_indices(segments);
        mesh
    }

    /// Unit square whose vertex heights come from an elevation grid.
    ///
    /// X and Z stay in unit space (the tile transform scales them by
    /// `tile_size`); Y is in meters, `height * height_scale`, because the
    /// transform leaves the vertical axis unscaled. Normals are computed in
    /// world proportions.
    #[must_use]
    pub fn displaced_grid(
        segments: u32,
        heights: &HeightGrid,
        tile_size: f64,
        height_scale: f32,
    ) -> Self {
        let segments = segments.max(1);
        let mut mesh = Self::plane_grid(segments);
        let row = segments as usize + 1;

        for (position, uv) in mesh.positions.iter_mut().zip(&mesh.uvs) {
            position.y = heights.sample(f64::from(uv.x), f64::from(uv.y)) * height_scale;
        }

        #[allow(clippy::cast_possible_truncation)]
        let spacing = (tile_size / f64::from(segments)) as f32;
        let at = |i: usize, j: usize| mesh.positions[j * row + i].y;
        let mut normals = Vec::with_capacity(mesh.positions.len());
        for j in 0..row {
            for i in 0..row {
                let (il, ir) = (i.saturating_sub(1), (i + 1).min(row - 1));
                let (jn, js) = (j.saturating_sub(1), (j + 1).min(row - 1));
                #[allow(clippy::cast_precision_loss)]
                let dx = (at(ir, j) - at(il, j)) / (spacing * (ir - il) as f32);
                #[allow(clippy::cast_precision_loss)]
                let dz = (at(i, js) - at(i, jn)) / (spacing * (js - jn) as f32);
                normals.push(Vec3::new(-dx, 1.0, -dz).normalize_or(Vec3::Y));
            }
        }
        mesh.normals = normals;
        mesh
    }

    /// Patch of a sphere covering `bounds`, with positions relative to `origin`.
    ///
    /// Rows are spaced evenly in mercator space so a web-mercator texture maps
    /// without distortion.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sphere_patch(bounds: &LatLonBounds, radius: f64, segments: u32, origin: DVec3) -> Self {
        let segments = segments.max(1);
        let north = datums_to_mercator(bounds.north, bounds.west).y;
        let south = datums_to_mercator(bounds.south, bounds.west).y;
        let mut mesh = Self::with_capacity(segments);

        for j in 0..=segments {
            let t = f64::from(j) / f64::from(segments);
            let (lat, _) = mercator_to_datums(glam::DVec2::new(0.0, north + (south - north) * t));
            for i in 0..=segments {
                let s = f64::from(i) / f64::from(segments);
                let lon = bounds.west + (bounds.east - bounds.west) * s;
                let point = lat_lon_to_sphere(lat, lon, radius);
                mesh.positions.push((point - origin).as_vec3());
                mesh.normals.push(point.normalize_or_zero().as_vec3());
                mesh.uvs.push(Vec2::new(s as f32, t as f32));
            }
        }
        mesh.indices = grid_indices(segments);
        mesh
    }

    fn with_capacity(segments: u32) -> Self {
        let vertices = (segments as usize + 1).pow(2);
        Self {
            positions: Vec::with_capacity(vertices),
            normals: Vec::with_capacity(vertices),
            uvs: Vec::with_capacity(vertices),
            indices: Vec::new(),
        }
    }
}

/// Triangle list for a `(segments + 1)²` vertex grid.
#[must_use]
pub fn grid_indices(segments: u32) -> Vec<u32> {
    let row = segments + 1;
    let mut indices = Vec::with_capacity(segments as usize * segments as usize * 6);
    for j in 0..segments {
        for i in 0..segments {
            let a = j * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            indices.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{EARTH_RADIUS, tile_lat_lon_bounds};

    fn triangle_normal(mesh: &TileMesh, t: usize) -> Vec3 {
        let [a, b, c] = [0, 1, 2].map(|k| mesh.positions[mesh.indices[t * 3 + k] as usize]);
        (b - a).cross(c - a)
    }

    #[test]
    fn test_plane_grid_counts() {
        let mesh = TileMesh::plane_grid(4);
        assert_eq!(mesh.vertex_count(), 25);
        assert_eq!(mesh.triangle_count(), 32);
        assert_eq!(mesh.normals.len(), 25);
        assert_eq!(mesh.uvs.len(), 25);
    }

    #[test]
    fn test_plane_grid_spans_unit_square() {
        let mesh = TileMesh::plane_grid(2);
        assert_eq!(mesh.positions[0], Vec3::new(-0.5, 0.0, -0.5));
        assert_eq!(mesh.positions[8], Vec3::new(0.5, 0.0, 0.5));
        assert_eq!(mesh.uvs[0], Vec2::ZERO);
        assert_eq!(mesh.uvs[8], Vec2::ONE);
    }

    #[test]
    fn test_plane_grid_faces_up() {
        let mesh = TileMesh::plane_grid(3);
        for t in 0..mesh.triangle_count() {
            assert!(triangle_normal(&mesh, t).y > 0.0);
        }
    }

    #[test]
    fn test_zero_segments_clamped() {
        let mesh = TileMesh::plane_grid(0);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_displaced_grid_heights() {
        let heights = HeightGrid::new(2, 2, vec![0.0, 100.0, 0.0, 100.0]).unwrap();
        let mesh = TileMesh::displaced_grid(2, &heights, 1000.0, 2.0);
        // West column at 0, east column at 200, middle at 100.
        assert!(mesh.positions[0].y.abs() < 1e-4);
        assert!((mesh.positions[1].y - 100.0).abs() < 1e-3);
        assert!((mesh.positions[2].y - 200.0).abs() < 1e-3);
        // Slope rises eastwards, so normals lean west.
        assert!(mesh.normals[4].x < 0.0);
        assert!(mesh.normals[4].y > 0.0);
    }

    #[test]
    fn test_displaced_flat_grid_matches_plane() {
        let heights = HeightGrid::flat(8, 8, 0.0);
        let mesh = TileMesh::displaced_grid(4, &heights, 500.0, 1.0);
        assert_eq!(mesh, TileMesh::plane_grid(4));
    }

    #[test]
    fn test_sphere_patch_on_radius() {
        let bounds = tile_lat_lon_bounds(2, 1, 1);
        let (lat, lon) = bounds.center();
        let origin = lat_lon_to_sphere(lat, lon, EARTH_RADIUS);
        let mesh = TileMesh::sphere_patch(&bounds, EARTH_RADIUS, 8, origin);
        assert_eq!(mesh.vertex_count(), 81);
        for p in &mesh.positions {
            let world = origin + p.as_dvec3();
            assert!((world.length() - EARTH_RADIUS).abs() < 5.0);
        }
    }

    #[test]
    fn test_sphere_patch_faces_outward() {
        let bounds = tile_lat_lon_bounds(3, 4, 3);
        let mesh = TileMesh::sphere_patch(&bounds, 1000.0, 4, DVec3::ZERO);
        for t in 0..mesh.triangle_count() {
            let a = mesh.positions[mesh.indices[t * 3] as usize];
            assert!(triangle_normal(&mesh, t).dot(a) > 0.0);
        }
    }
}
