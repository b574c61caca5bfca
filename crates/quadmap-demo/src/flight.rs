//! Scripted camera path.

use std::f64::consts::FRAC_PI_3;

use glam::DVec3;
use quadmap::{Camera, MapMode};
use quadmap_geometry::{
    EARTH_RADIUS,
    units::{MAX_LATITUDE, datums_to_planar, lat_lon_to_sphere},
};

use crate::launch_params::LaunchParams;

/// Altitude the descent starts from.
const START_ALTITUDE: f64 = 20_000_000.0;
/// Share of the frames spent descending; the rest hover.
const DESCENT_SHARE: f64 = 0.75;

const SCREEN_WIDTH: f64 = 1280.0;
const SCREEN_HEIGHT: f64 = 720.0;

/// Exponential descent towards a point, then a hover.
pub struct Flight {
    mode: MapMode,
    lat: f64,
    lon: f64,
    end_altitude: f64,
    descent_frames: f64,
}

impl Flight {
    pub fn new(params: &LaunchParams) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let descent_frames = (params.frames as f64 * DESCENT_SHARE).max(1.0);
        Self {
            mode: params.mode,
            lat: params.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE),
            lon: params.lon,
            end_altitude: params.altitude.max(1.0),
            descent_frames,
        }
    }

    /// Camera altitude above the surface at `frame`.
    pub fn altitude(&self, frame: u64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let t = (frame as f64 / self.descent_frames).min(1.0);
        START_ALTITUDE * (self.end_altitude / START_ALTITUDE).powf(t)
    }

    pub fn camera(&self, frame: u64) -> Camera {
        let altitude = self.altitude(frame);
        match self.mode {
            MapMode::Spherical => {
                let eye = lat_lon_to_sphere(self.lat, self.lon, EARTH_RADIUS + altitude);
                let up = if self.lat.abs() > 89.0 { DVec3::Z } else { DVec3::Y };
                Camera::look_at(eye, DVec3::ZERO, up, FRAC_PI_3, SCREEN_WIDTH, SCREEN_HEIGHT)
            }
            MapMode::Planar | MapMode::HeightCpu | MapMode::HeightGpu => {
                let ground = datums_to_planar(self.lat, self.lon);
                Camera::top_down(ground.x, ground.z, altitude, FRAC_PI_3, SCREEN_WIDTH, SCREEN_HEIGHT)
            }
        }
    }
}
