//! Node variants: how each projection turns a tile into world geometry.
//!
//! All variants share the tree mechanics in [`crate::tree`]; they only differ
//! in [`NodeVariant::compute_world_geometry`] and the bounding volumes the
//! LOD heuristics see.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use glam::{DMat4, DVec3};
use quadmap_geometry::{
    BoundingSphere, EARTH_PERIMETER, EARTH_RADIUS, HeightGrid, TileMesh,
    units::{lat_lon_to_sphere, tile_column_longitude, tile_row_latitude},
};
use serde::{Deserialize, Serialize};

use crate::config::MapConfig;
use crate::coordinate::TileCoordinate;
use crate::error::{Error, Result};

/// The projection modes a map can be built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapMode {
    /// Flat web-mercator plane.
    Planar,
    /// Web-mercator tiles wrapped onto a sphere.
    Spherical,
    /// Planar tiles displaced on the CPU from elevation data.
    HeightCpu,
    /// Planar tiles displaced in a shader from a height texture.
    HeightGpu,
}

impl MapMode {
    /// Every mode, in registry order.
    pub const ALL: [MapMode; 4] = [
        MapMode::Planar,
        MapMode::Spherical,
        MapMode::HeightCpu,
        MapMode::HeightGpu,
    ];

    /// Stable name used on the command line and in config files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MapMode::Planar => "planar",
            MapMode::Spherical => "spherical",
            MapMode::HeightCpu => "height-cpu",
            MapMode::HeightGpu => "height-gpu",
        }
    }

    /// Whether nodes in this mode need elevation before they are ready.
    #[must_use]
    pub fn needs_elevation(self) -> bool {
        matches!(self, MapMode::HeightCpu | MapMode::HeightGpu)
    }
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MapMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidConfig {
                context: "map mode",
                detail: format!("unknown mode {s:?}"),
            })
    }
}

/// Height texture handed to a shader by the GPU height variant.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementMap {
    /// Raw elevation samples in meters.
    pub heights: Arc<HeightGrid>,
    /// Multiplier the shader applies to each sample.
    pub scale: f64,
    /// Lowest sample.
    pub min: f32,
    /// Highest sample.
    pub max: f32,
}

/// World-space geometry of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGeometry {
    /// Tile-local to world transform.
    pub transform: DMat4,
    /// Mesh in tile-local space.
    pub mesh: Arc<TileMesh>,
    /// Bounds of the transformed mesh.
    pub bounds: BoundingSphere,
    /// Deferred displacement, set only by the GPU height variant.
    pub displacement: Option<DisplacementMap>,
}

/// Projection-specific behaviour of the nodes of one tree.
#[derive(Debug, Clone)]
pub enum NodeVariant {
    /// Flat tiles sharing one unit grid.
    Planar {
        /// Unit grid shared by every tile.
        grid: Arc<TileMesh>,
    },
    /// Sphere patches, one mesh per tile.
    Spherical {
        /// Sphere radius in meters.
        radius: f64,
        /// Grid resolution per tile side.
        segments: u32,
    },
    /// Displaced meshes built per tile from elevation.
    HeightCpu {
        /// Grid resolution per tile side.
        segments: u32,
        /// Elevation multiplier.
        height_scale: f64,
    },
    /// Flat shared grid plus a displacement map.
    HeightGpu {
        /// Unit grid shared by every tile.
        grid: Arc<TileMesh>,
        /// Elevation multiplier.
        height_scale: f64,
    },
}

impl NodeVariant {
    /// Flat plane variant.
    #[must_use]
    pub fn planar(segments: u32) -> Self {
        NodeVariant::Planar {
            grid: Arc::new(TileMesh::plane_grid(segments)),
        }
    }

    /// Sphere variant with the Earth's radius.
    #[must_use]
    pub fn spherical(segments: u32) -> Self {
        NodeVariant::Spherical {
            radius: EARTH_RADIUS,
            segments,
        }
    }

    /// CPU displacement variant.
    #[must_use]
    pub fn height_cpu(segments: u32, height_scale: f64) -> Self {
        NodeVariant::HeightCpu {
            segments,
            height_scale,
        }
    }

    /// GPU displacement variant.
    #[must_use]
    pub fn height_gpu(segments: u32, height_scale: f64) -> Self {
        NodeVariant::HeightGpu {
            grid: Arc::new(TileMesh::plane_grid(segments)),
            height_scale,
        }
    }

    /// The mode this variant implements.
    #[must_use]
    pub fn mode(&self) -> MapMode {
        match self {
            NodeVariant::Planar { .. } => MapMode::Planar,
            NodeVariant::Spherical { .. } => MapMode::Spherical,
            NodeVariant::HeightCpu { .. } => MapMode::HeightCpu,
            NodeVariant::HeightGpu { .. } => MapMode::HeightGpu,
        }
    }

    /// Whether nodes need elevation before they are ready.
    #[must_use]
    pub fn needs_elevation(&self) -> bool {
        self.mode().needs_elevation()
    }

    /// World-space edge length of a tile (along the equator for spheres).
    #[must_use]
    pub fn tile_size(&self, coordinate: &TileCoordinate) -> f64 {
        let tiles = f64::from(TileCoordinate::tiles_per_axis(coordinate.level()));
        match self {
            NodeVariant::Spherical { radius, .. } => std::f64::consts::TAU * radius / tiles,
            _ => EARTH_PERIMETER / tiles,
        }
    }

    /// Bounds of a tile before any content has arrived.
    ///
    /// Height variants assume flat ground until elevation refines the bounds.
    #[must_use]
    pub fn bounds(&self, coordinate: &TileCoordinate) -> BoundingSphere {
        match self {
            NodeVariant::Spherical { radius, .. } => sphere_patch_bounds(coordinate, *radius),
            _ => {
                let size = self.tile_size(coordinate);
                BoundingSphere::new(planar_center(coordinate), size * std::f64::consts::FRAC_1_SQRT_2)
            }
        }
    }

    /// Build the world geometry of a tile.
    ///
    /// Height variants require `elevation`; the other variants ignore it.
    pub fn compute_world_geometry(
        &self,
        coordinate: &TileCoordinate,
        elevation: Option<&Arc<HeightGrid>>,
    ) -> Result<TileGeometry> {
        let size = self.tile_size(coordinate);
        let planar_transform = || {
            DMat4::from_translation(planar_center(coordinate))
                * DMat4::from_scale(DVec3::new(size, 1.0, size))
        };

        match self {
            NodeVariant::Planar { grid } => Ok(TileGeometry {
                transform: planar_transform(),
                mesh: Arc::clone(grid),
                bounds: self.bounds(coordinate),
                displacement: None,
            }),
            NodeVariant::Spherical { radius, segments } => {
                let lat_lon = quadmap_geometry::units::tile_lat_lon_bounds(
                    coordinate.level(),
                    coordinate.x(),
                    coordinate.y(),
                );
                let (lat, lon) = lat_lon.center();
                let origin = lat_lon_to_sphere(lat, lon, *radius);
                Ok(TileGeometry {
                    transform: DMat4::from_translation(origin),
                    mesh: Arc::new(TileMesh::sphere_patch(&lat_lon, *radius, *segments, origin)),
                    bounds: sphere_patch_bounds(coordinate, *radius),
                    displacement: None,
                })
            }
            NodeVariant::HeightCpu {
                segments,
                height_scale,
            } => {
                let heights = elevation.ok_or(Error::ContentNotReady {
                    coordinate: *coordinate,
                })?;
                #[allow(clippy::cast_possible_truncation)]
                let mesh = TileMesh::displaced_grid(*segments, heights, size, *height_scale as f32);
                Ok(TileGeometry {
                    transform: planar_transform(),
                    mesh: Arc::new(mesh),
                    bounds: displaced_bounds(coordinate, size, heights, *height_scale),
                    displacement: None,
                })
            }
            NodeVariant::HeightGpu { grid, height_scale } => {
                let heights = elevation.ok_or(Error::ContentNotReady {
                    coordinate: *coordinate,
                })?;
                let (min, max) = heights.min_max();
                Ok(TileGeometry {
                    transform: planar_transform(),
                    mesh: Arc::clone(grid),
                    bounds: displaced_bounds(coordinate, size, heights, *height_scale),
                    displacement: Some(DisplacementMap {
                        heights: Arc::clone(heights),
                        scale: *height_scale,
                        min,
                        max,
                    }),
                })
            }
        }
    }
}

/// Center of a tile on the planar map (y = 0).
#[must_use]
pub fn planar_center(coordinate: &TileCoordinate) -> DVec3 {
    let tiles = f64::from(TileCoordinate::tiles_per_axis(coordinate.level()));
    let size = EARTH_PERIMETER / tiles;
    let half = EARTH_PERIMETER / 2.0;
    DVec3::new(
        (f64::from(coordinate.x()) + 0.5) * size - half,
        0.0,
        (f64::from(coordinate.y()) + 0.5) * size - half,
    )
}

fn displaced_bounds(
    coordinate: &TileCoordinate,
    size: f64,
    heights: &HeightGrid,
    height_scale: f64,
) -> BoundingSphere {
    let (min, max) = heights.min_max();
    let (low, high) = (
        f64::from(min) * height_scale,
        f64::from(max) * height_scale,
    );
    let (low, high) = (low.min(high), low.max(high));
    let mut center = planar_center(coordinate);
    center.y = (low + high) * 0.5;
    let half_diagonal = size * std::f64::consts::FRAC_1_SQRT_2;
    let half_height = (high - low) * 0.5;
    BoundingSphere::new(center, half_diagonal.hypot(half_height))
}

/// Bounds of a sphere patch from a 3x3 sample of its surface.
///
/// The result is padded by the sagitta of the patch so the bulge between
/// samples stays inside.
fn sphere_patch_bounds(coordinate: &TileCoordinate, radius: f64) -> BoundingSphere {
    let tiles = f64::from(TileCoordinate::tiles_per_axis(coordinate.level()));
    let (x, y) = (f64::from(coordinate.x()), f64::from(coordinate.y()));

    let mut points = Vec::with_capacity(9);
    for j in 0..3 {
        let lat = tile_row_latitude(y + f64::from(j) * 0.5, tiles);
        for i in 0..3 {
            let lon = tile_column_longitude(x + f64::from(i) * 0.5, tiles);
            points.push(lat_lon_to_sphere(lat, lon, radius));
        }
    }
    let sphere = BoundingSphere::from_points(&points);

    // Angular half-width of the widest span, at most half the sphere.
    let half_angle = (std::f64::consts::PI / tiles).min(std::f64::consts::FRAC_PI_2);
    let sagitta = radius * (1.0 - half_angle.cos());
    BoundingSphere::new(sphere.center, sphere.radius + sagitta)
}

/// Builds the variant for a mode from the map configuration.
pub type NodeFactory = fn(&MapConfig) -> NodeVariant;

/// Maps projection modes to node factories.
///
/// Built once by the host and shared with every [`MapView`](crate::MapView)
/// that needs it.
#[derive(Debug, Clone, Default)]
pub struct ModeRegistry {
    factories: BTreeMap<MapMode, NodeFactory>,
}

impl ModeRegistry {
    /// A registry with no modes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the four built-in variants.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MapMode::Planar, |config| {
            NodeVariant::planar(config.mesh_segments)
        });
        registry.register(MapMode::Spherical, |config| {
            NodeVariant::spherical(config.mesh_segments)
        });
        registry.register(MapMode::HeightCpu, |config| {
            NodeVariant::height_cpu(config.mesh_segments, config.height_scale)
        });
        registry.register(MapMode::HeightGpu, |config| {
            NodeVariant::height_gpu(config.mesh_segments, config.height_scale)
        });
        registry
    }

    /// Register `factory` for `mode`, returning the factory it replaced.
    pub fn register(&mut self, mode: MapMode, factory: NodeFactory) -> Option<NodeFactory> {
        self.factories.insert(mode, factory)
    }

    /// Remove a mode.
    pub fn unregister(&mut self, mode: MapMode) -> Option<NodeFactory> {
        self.factories.remove(&mode)
    }

    /// Whether `mode` has a factory.
    #[must_use]
    pub fn contains(&self, mode: MapMode) -> bool {
        self.factories.contains_key(&mode)
    }

    /// Registered modes in order.
    pub fn modes(&self) -> impl Iterator<Item = MapMode> + '_ {
        self.factories.keys().copied()
    }

    /// Build the variant for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredMode`] if nothing is registered for `mode`.
    pub fn create(&self, mode: MapMode, config: &MapConfig) -> Result<NodeVariant> {
        let factory = self
            .factories
            .get(&mode)
            .ok_or(Error::UnregisteredMode { mode })?;
        Ok(factory(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip() {
        for mode in MapMode::ALL {
            assert_eq!(mode.to_string().parse::<MapMode>().unwrap(), mode);
        }
        assert_eq!("HEIGHT-GPU".parse::<MapMode>().unwrap(), MapMode::HeightGpu);
        assert!("ray".parse::<MapMode>().unwrap_err().is_configuration());
        assert_eq!(
            serde_json::to_string(&MapMode::HeightCpu).unwrap(),
            "\"height-cpu\""
        );
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ModeRegistry::with_defaults();
        assert_eq!(registry.modes().collect::<Vec<_>>(), MapMode::ALL.to_vec());
        for mode in MapMode::ALL {
            let variant = registry.create(mode, &MapConfig::default()).unwrap();
            assert_eq!(variant.mode(), mode);
        }
    }

    #[test]
    fn test_unregistered_mode_is_configuration_error() {
        let mut registry = ModeRegistry::with_defaults();
        registry.unregister(MapMode::Spherical);
        let err = registry
            .create(MapMode::Spherical, &MapConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnregisteredMode { mode: MapMode::Spherical }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_planar_geometry() {
        let variant = NodeVariant::planar(4);
        let root = variant
            .compute_world_geometry(&TileCoordinate::ROOT, None)
            .unwrap();
        let corner = root.transform.transform_point3(DVec3::new(-0.5, 0.0, -0.5));
        let half = EARTH_PERIMETER / 2.0;
        assert!(corner.distance(DVec3::new(-half, 0.0, -half)) < 1e-6);

        let south_east = TileCoordinate::new(1, 1, 1).unwrap();
        let geometry = variant.compute_world_geometry(&south_east, None).unwrap();
        let center = geometry.transform.transform_point3(DVec3::ZERO);
        assert!(center.distance(DVec3::new(half / 2.0, 0.0, half / 2.0)) < 1e-6);
        assert!(geometry.bounds.contains(DVec3::new(half - 1.0, 0.0, half - 1.0)));
        assert!(geometry.displacement.is_none());
    }

    #[test]
    fn test_planar_tiles_share_mesh() {
        let variant = NodeVariant::planar(8);
        let a = variant.compute_world_geometry(&TileCoordinate::ROOT, None).unwrap();
        let b = variant
            .compute_world_geometry(&TileCoordinate::new(3, 1, 2).unwrap(), None)
            .unwrap();
        assert!(Arc::ptr_eq(&a.mesh, &b.mesh));
    }

    #[test]
    fn test_spherical_bounds_contain_patch() {
        let variant = NodeVariant::spherical(8);
        for coordinate in [
            TileCoordinate::ROOT,
            TileCoordinate::new(2, 1, 1).unwrap(),
            TileCoordinate::new(5, 17, 3).unwrap(),
        ] {
            let geometry = variant.compute_world_geometry(&coordinate, None).unwrap();
            for p in &geometry.mesh.positions {
                let world = geometry.transform.transform_point3(p.as_dvec3());
                let slack = geometry.bounds.radius * 1e-4 + 1.0;
                assert!(
                    world.distance(geometry.bounds.center) <= geometry.bounds.radius + slack,
                    "{coordinate} vertex outside bounds"
                );
            }
        }
    }

    #[test]
    fn test_height_variants_need_elevation() {
        let coordinate = TileCoordinate::new(1, 0, 0).unwrap();
        for variant in [NodeVariant::height_cpu(4, 1.0), NodeVariant::height_gpu(4, 1.0)] {
            assert!(variant.needs_elevation());
            assert!(matches!(
                variant.compute_world_geometry(&coordinate, None),
                Err(Error::ContentNotReady { .. })
            ));
        }
    }

    #[test]
    fn test_height_geometry() {
        let coordinate = TileCoordinate::new(4, 3, 5).unwrap();
        let heights = Arc::new(HeightGrid::new(2, 2, vec![0.0, 100.0, 200.0, 300.0]).unwrap());

        let cpu = NodeVariant::height_cpu(4, 2.0)
            .compute_world_geometry(&coordinate, Some(&heights))
            .unwrap();
        let top = cpu.mesh.positions.iter().map(|p| p.y).fold(f32::MIN, f32::max);
        assert!((top - 600.0).abs() < 1e-3);
        assert!((cpu.bounds.center.y - 300.0).abs() < 1e-6);

        let gpu = NodeVariant::height_gpu(4, 2.0)
            .compute_world_geometry(&coordinate, Some(&heights))
            .unwrap();
        let displacement = gpu.displacement.unwrap();
        assert_eq!((displacement.min, displacement.max), (0.0, 300.0));
        assert!(gpu.mesh.positions.iter().all(|p| p.y == 0.0));
        assert_eq!(cpu.bounds, gpu.bounds);
    }
}
