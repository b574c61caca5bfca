//! Camera description consumed by the LOD pass.

use glam::{DMat4, DVec3};
use quadmap_geometry::BoundingSphere;

const NEAR_PLANE: f64 = 1.0;
const FAR_PLANE: f64 = 1.0e9;

/// A perspective camera in world space.
///
/// The LOD core never renders, so the camera is only the data the
/// heuristics need: eye position, combined view-projection matrix and the
/// parameters for projecting world sizes to pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position in world space.
    pub position: DVec3,
    /// Combined projection * view matrix.
    pub view_projection: DMat4,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Viewport height in pixels.
    pub screen_height: f64,
}

impl Camera {
    /// Build a camera from an explicit view-projection matrix.
    #[must_use]
    pub fn new(position: DVec3, view_projection: DMat4, fov_y: f64, screen_height: f64) -> Self {
        Self {
            position,
            view_projection,
            fov_y,
            screen_height,
        }
    }

    /// A right-handed perspective camera at `position` looking at `target`.
    #[must_use]
    pub fn look_at(
        position: DVec3,
        target: DVec3,
        up: DVec3,
        fov_y: f64,
        screen_width: f64,
        screen_height: f64,
    ) -> Self {
        let aspect = if screen_height > 0.0 {
            screen_width / screen_height
        } else {
            1.0
        };
        let view = DMat4::look_at_rh(position, target, up);
        let projection = DMat4::perspective_rh(fov_y, aspect, NEAR_PLANE, FAR_PLANE);
        Self::new(position, projection * view, fov_y, screen_height)
    }

    /// A camera `altitude` meters above the planar map point `(x, z)`, looking
    /// straight down with north at the top of the screen.
    #[must_use]
    pub fn top_down(x: f64, z: f64, altitude: f64, fov_y: f64, screen_width: f64, screen_height: f64) -> Self {
        let target = DVec3::new(x, 0.0, z);
        Self::look_at(
            target + DVec3::Y * altitude,
            target,
            DVec3::NEG_Z,
            fov_y,
            screen_width,
            screen_height,
        )
    }

    /// Pixels covered by one meter at distance one from the eye.
    #[must_use]
    pub fn pixels_per_meter(&self) -> f64 {
        self.screen_height / (2.0 * (self.fov_y / 2.0).tan())
    }

    /// The view frustum of this camera.
    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection)
    }
}

/// View frustum for visibility culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near and far planes as (normal, distance),
    /// normals pointing inwards.
    planes: [(DVec3, f64); 6],
}

impl Frustum {
    /// Extract the frustum planes from a view-projection matrix.
    #[must_use]
    pub fn from_matrix(vp: DMat4) -> Self {
        let m = vp.to_cols_array_2d();
        let row = |i: usize| [m[0][i], m[1][i], m[2][i], m[3][i]];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let combine = |a: [f64; 4], b: [f64; 4], sign: f64| {
            Self::normalize_plane(
                a[0] + sign * b[0],
                a[1] + sign * b[1],
                a[2] + sign * b[2],
                a[3] + sign * b[3],
            )
        };

        // glam's perspective_rh maps depth to [0, 1], so the near plane is row 2 alone.
        let near = Self::normalize_plane(r2[0], r2[1], r2[2], r2[3]);

        Self {
            planes: [
                combine(r3, r0, 1.0),
                combine(r3, r0, -1.0),
                combine(r3, r1, 1.0),
                combine(r3, r1, -1.0),
                near,
                combine(r3, r2, -1.0),
            ],
        }
    }

    fn normalize_plane(a: f64, b: f64, c: f64, d: f64) -> (DVec3, f64) {
        let normal = DVec3::new(a, b, c);
        let length = normal.length();
        if length > 0.0 {
            (normal / length, d / length)
        } else {
            (DVec3::ZERO, 0.0)
        }
    }

    /// Test whether a bounding sphere intersects the frustum.
    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|&(normal, distance)| normal.dot(sphere.center) + distance >= -sphere.radius)
    }

    /// Test whether a point lies inside the frustum.
    #[must_use]
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|&(normal, distance)| normal.dot(point) + distance >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    fn camera() -> Camera {
        Camera::look_at(
            DVec3::new(0.0, 0.0, 10.0),
            DVec3::ZERO,
            DVec3::Y,
            FRAC_PI_2,
            800.0,
            800.0,
        )
    }

    #[test]
    fn test_pixels_per_meter() {
        // tan(45deg) = 1, so 800 px / 2.
        assert!((camera().pixels_per_meter() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_frustum_contains_target() {
        let frustum = camera().frustum();
        assert!(frustum.contains_point(DVec3::ZERO));
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, 20.0)));
        assert!(!frustum.contains_point(DVec3::new(100.0, 0.0, 0.0)));
    }

    #[test]
    fn test_frustum_sphere_culling() {
        let frustum = camera().frustum();
        assert!(frustum.intersects_sphere(&BoundingSphere::new(DVec3::new(5.0, 0.0, 0.0), 1.0)));
        // Just outside the right plane at this depth, but the radius reaches in.
        assert!(frustum.intersects_sphere(&BoundingSphere::new(DVec3::new(11.0, 0.0, 0.0), 2.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(DVec3::new(30.0, 0.0, 0.0), 2.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(DVec3::new(0.0, 0.0, 30.0), 5.0)));
    }

    #[test]
    fn test_top_down_sees_ground() {
        let camera = Camera::top_down(1000.0, -500.0, 2000.0, FRAC_PI_2, 1280.0, 720.0);
        let frustum = camera.frustum();
        assert!(frustum.contains_point(DVec3::new(1000.0, 0.0, -500.0)));
        assert!(!frustum.contains_point(DVec3::new(1000.0, 3000.0, -500.0)));
    }
}
