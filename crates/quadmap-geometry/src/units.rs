//! Geographic units and web-mercator projection math.
//!
//! Tiles are addressed in the XYZ scheme: column `x` grows eastwards and row
//! `y` grows southwards, with `(0, 0, 0)` covering the whole mercator square.
//!
//! Planar world space puts the mercator square on the XZ plane centered at the
//! origin, with +X pointing east, +Z pointing south and +Y up.

use glam::{DVec2, DVec3};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_008.0;

/// Equatorial perimeter in meters; the side length of the level-0 planar tile.
pub const EARTH_PERIMETER: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS;

/// Latitude at which the mercator square ends, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Latitude/longitude range covered by a tile, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLonBounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl LatLonBounds {
    /// Center of the range (not the mercator center).
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) * 0.5,
            (self.west + self.east) * 0.5,
        )
    }
}

/// Project latitude/longitude (degrees) to web-mercator meters.
#[must_use]
pub fn datums_to_mercator(lat: f64, lon: f64) -> DVec2 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    DVec2::new(
        EARTH_RADIUS * lon.to_radians(),
        EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat * 0.5).tan().ln(),
    )
}

/// Inverse of [`datums_to_mercator`]; returns `(lat, lon)` in degrees.
#[must_use]
pub fn mercator_to_datums(mercator: DVec2) -> (f64, f64) {
    let lon = (mercator.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (mercator.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    (lat, lon)
}

/// Position on the planar map (y = 0) for a latitude/longitude.
#[must_use]
pub fn datums_to_planar(lat: f64, lon: f64) -> DVec3 {
    let m = datums_to_mercator(lat, lon);
    DVec3::new(m.x, 0.0, -m.y)
}

/// Point on a sphere of the given radius for a latitude/longitude in degrees.
#[must_use]
pub fn lat_lon_to_sphere(lat: f64, lon: f64, radius: f64) -> DVec3 {
    let (lat, lon) = (lat.to_radians(), lon.to_radians());
    DVec3::new(
        radius * lat.cos() * lon.sin(),
        radius * lat.sin(),
        radius * lat.cos() * lon.cos(),
    )
}

/// Latitude in degrees of the top edge of tile row `y` at a zoom level with
/// `tiles` tiles per axis. Passing `y = tiles` yields the bottom edge.
#[must_use]
pub fn tile_row_latitude(y: f64, tiles: f64) -> f64 {
    let n = std::f64::consts::PI * (1.0 - 2.0 * y / tiles);
    n.sinh().atan().to_degrees()
}

/// Longitude in degrees of the left edge of tile column `x`.
#[must_use]
pub fn tile_column_longitude(x: f64, tiles: f64) -> f64 {
    x / tiles * 360.0 - 180.0
}

/// Latitude/longitude bounds of tile `(level, x, y)`.
#[must_use]
pub fn tile_lat_lon_bounds(level: u8, x: u32, y: u32) -> LatLonBounds {
    let tiles = f64::from(1u32 << level);
    let (x, y) = (f64::from(x), f64::from(y));
    LatLonBounds {
        west: tile_column_longitude(x, tiles),
        east: tile_column_longitude(x + 1.0, tiles),
        north: tile_row_latitude(y, tiles),
        south: tile_row_latitude(y + 1.0, tiles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_tile_bounds() {
        let b = tile_lat_lon_bounds(0, 0, 0);
        assert!((b.west + 180.0).abs() < 1e-9);
        assert!((b.east - 180.0).abs() < 1e-9);
        assert!((b.north - MAX_LATITUDE).abs() < 1e-6);
        assert!((b.south + MAX_LATITUDE).abs() < 1e-6);
    }

    #[test]
    fn test_level_one_splits_at_equator_and_meridian() {
        let b = tile_lat_lon_bounds(1, 1, 0);
        assert!(b.west.abs() < 1e-9);
        assert!(b.south.abs() < 1e-9);
        assert!(b.north > 85.0);
    }

    #[test]
    fn test_mercator_round_trip() {
        let m = datums_to_mercator(40.7, -74.0);
        let (lat, lon) = mercator_to_datums(m);
        assert!((lat - 40.7).abs() < 1e-9);
        assert!((lon + 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_square_matches_perimeter() {
        let m = datums_to_mercator(MAX_LATITUDE, 180.0);
        assert!((m.x - EARTH_PERIMETER / 2.0).abs() < 1e-3);
        assert!((m.y - EARTH_PERIMETER / 2.0).abs() < 1.0);
    }

    #[test]
    fn test_planar_north_is_negative_z() {
        let p = datums_to_planar(45.0, 0.0);
        assert!(p.z < 0.0);
        assert!(p.x.abs() < 1e-9);
    }

    #[test]
    fn test_sphere_point_has_radius() {
        let p = lat_lon_to_sphere(12.0, 34.0, EARTH_RADIUS);
        assert!((p.length() - EARTH_RADIUS).abs() < 1e-3);
        let pole = lat_lon_to_sphere(90.0, 0.0, 1.0);
        assert!((pole.y - 1.0).abs() < 1e-12);
    }
}
