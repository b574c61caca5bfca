//! Bounding volumes for tile geometry.

use glam::DVec3;

/// A bounding sphere in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center.
    pub center: DVec3,
    /// Sphere radius (non-negative).
    pub radius: f64,
}

impl BoundingSphere {
    /// Create a bounding sphere.
    #[must_use]
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// Smallest sphere centered on the centroid of `points` that contains them all.
    ///
    /// Returns a zero-radius sphere at the origin for an empty slice.
    #[must_use]
    pub fn from_points(points: &[DVec3]) -> Self {
        if points.is_empty() {
            return Self::new(DVec3::ZERO, 0.0);
        }

        #[allow(clippy::cast_precision_loss)]
        let centroid = points.iter().copied().sum::<DVec3>() / points.len() as f64;
        let radius = points
            .iter()
            .map(|p| p.distance(centroid))
            .fold(0.0, f64::max);
        Self::new(centroid, radius)
    }

    /// Distance from `point` to the sphere surface, zero when inside.
    #[must_use]
    pub fn surface_distance(&self, point: DVec3) -> f64 {
        (point.distance(self.center) - self.radius).max(0.0)
    }

    /// Check whether `point` lies inside or on the sphere.
    #[must_use]
    pub fn contains(&self, point: DVec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_contains_all() {
        let points = [
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
        ];
        let sphere = BoundingSphere::from_points(&points);
        for p in points {
            assert!(sphere.contains(p));
        }
    }

    #[test]
    fn test_from_points_empty() {
        let sphere = BoundingSphere::from_points(&[]);
        assert_eq!(sphere.center, DVec3::ZERO);
        assert!(sphere.radius.abs() < f64::EPSILON);
    }

    #[test]
    fn test_surface_distance() {
        let sphere = BoundingSphere::new(DVec3::ZERO, 10.0);
        assert!((sphere.surface_distance(DVec3::new(25.0, 0.0, 0.0)) - 15.0).abs() < 1e-12);
        assert!(sphere.surface_distance(DVec3::new(1.0, 1.0, 1.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_radius_clamped() {
        let sphere = BoundingSphere::new(DVec3::ONE, -3.0);
        assert!(sphere.radius.abs() < f64::EPSILON);
    }
}
