//! Map and LOD configuration.
//!
//! Every config type is plain data with serde support so hosts can load it
//! from a file. Values are checked with `validate()` before a [`MapView`]
//! or heuristic accepts them.
//!
//! [`MapView`]: crate::MapView

use serde::{Deserialize, Serialize};

use crate::coordinate::MAX_LEVEL;
use crate::error::{Error, Result};

/// What happens to a node whose content request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailurePolicy {
    /// Re-request the tile the next time the LOD pass visits the node, up to
    /// `max_attempts` requests in total. After that the node stays blank.
    Retry {
        /// Total number of requests allowed, including the first.
        max_attempts: u32,
    },
    /// Keep the node as a permanently blank tile after the first failure.
    Blank,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Retry { max_attempts: 3 }
    }
}

impl FailurePolicy {
    /// Whether a node that has made `attempts` requests may try again.
    #[must_use]
    pub fn allows_retry(self, attempts: u32) -> bool {
        match self {
            FailurePolicy::Retry { max_attempts } => attempts < max_attempts,
            FailurePolicy::Blank => false,
        }
    }
}

/// Configuration shared by the tree, the LOD pass and the fetch queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Deepest level the tree may subdivide to.
    pub max_depth: u8,
    /// Nodes shallower than this are always subdivided once their content is ready.
    pub min_depth: u8,
    /// Maximum number of nodes the LOD pass inspects per frame.
    pub visit_budget: usize,
    /// Maximum number of tile requests in flight at once.
    pub max_concurrent_fetches: usize,
    /// How failed tile requests are handled.
    pub failure_policy: FailurePolicy,
    /// Grid resolution of generated tile meshes (quads per side).
    pub mesh_segments: u32,
    /// Multiplier applied to elevation samples by the height variants.
    pub height_scale: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            min_depth: 0,
            visit_budget: 1024,
            max_concurrent_fetches: 32,
            failure_policy: FailurePolicy::default(),
            mesh_segments: 16,
            height_scale: 1.0,
        }
    }
}

impl MapConfig {
    /// Set the deepest level the tree may reach.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the level the tree always subdivides to.
    #[must_use]
    pub fn with_min_depth(mut self, min_depth: u8) -> Self {
        self.min_depth = min_depth;
        self
    }

    /// Set the per-frame node visit budget.
    #[must_use]
    pub fn with_visit_budget(mut self, visit_budget: usize) -> Self {
        self.visit_budget = visit_budget;
        self
    }

    /// Set the number of concurrent tile requests.
    #[must_use]
    pub fn with_max_concurrent_fetches(mut self, max_concurrent_fetches: usize) -> Self {
        self.max_concurrent_fetches = max_concurrent_fetches;
        self
    }

    /// Set how failed tiles are handled.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Set the tile mesh resolution.
    #[must_use]
    pub fn with_mesh_segments(mut self, mesh_segments: u32) -> Self {
        self.mesh_segments = mesh_segments;
        self
    }

    /// Set the elevation multiplier.
    #[must_use]
    pub fn with_height_scale(mut self, height_scale: f64) -> Self {
        self.height_scale = height_scale;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth > MAX_LEVEL {
            return Err(invalid(
                "max_depth",
                format!("{} exceeds the deepest level {MAX_LEVEL}", self.max_depth),
            ));
        }
        if self.min_depth > self.max_depth {
            return Err(invalid(
                "min_depth",
                format!("{} is deeper than max_depth {}", self.min_depth, self.max_depth),
            ));
        }
        if self.visit_budget == 0 {
            return Err(invalid("visit_budget", "must be at least 1".to_string()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(invalid(
                "max_concurrent_fetches",
                "must be at least 1".to_string(),
            ));
        }
        if let FailurePolicy::Retry { max_attempts: 0 } = self.failure_policy {
            return Err(invalid(
                "failure_policy",
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.mesh_segments == 0 || self.mesh_segments > 256 {
            return Err(invalid(
                "mesh_segments",
                format!("{} is outside 1..=256", self.mesh_segments),
            ));
        }
        if !self.height_scale.is_finite() {
            return Err(invalid("height_scale", "must be finite".to_string()));
        }
        Ok(())
    }
}

/// Thresholds for the distance heuristic.
///
/// A tile of size `s` at distance `d` has detail need `s / d`. It subdivides
/// once the camera is closer than `subdivide_factor` tile sizes, and its
/// children collapse again once they are all farther than `simplify_factor`
/// of their own tile sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceLodConfig {
    /// Subdivide when `distance < subdivide_factor * tile_size`.
    pub subdivide_factor: f64,
    /// Simplify when `distance > simplify_factor * child_tile_size` for every child.
    pub simplify_factor: f64,
}

impl Default for DistanceLodConfig {
    fn default() -> Self {
        Self {
            subdivide_factor: 4.0,
            simplify_factor: 9.0,
        }
    }
}

impl DistanceLodConfig {
    /// Check the factors are positive and leave a hysteresis band.
    pub fn validate(&self) -> Result<()> {
        if !(self.subdivide_factor > 0.0 && self.subdivide_factor.is_finite()) {
            return Err(invalid(
                "subdivide_factor",
                format!("{} is not a positive number", self.subdivide_factor),
            ));
        }
        if !(self.simplify_factor > self.subdivide_factor && self.simplify_factor.is_finite()) {
            return Err(invalid(
                "simplify_factor",
                format!(
                    "{} must be larger than subdivide_factor {}",
                    self.simplify_factor, self.subdivide_factor
                ),
            ));
        }
        Ok(())
    }
}

/// Thresholds and camera model for the screen-space error heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenSpaceLodConfig {
    /// Subdivide once a tile would cover more than this many pixels.
    pub subdivide_pixels: f64,
    /// Simplify once every child covers fewer than this many pixels.
    pub simplify_pixels: f64,
    /// Skip detail for tiles outside the view frustum.
    pub frustum_culling: bool,
}

impl Default for ScreenSpaceLodConfig {
    fn default() -> Self {
        Self {
            subdivide_pixels: 384.0,
            simplify_pixels: 128.0,
            frustum_culling: true,
        }
    }
}

impl ScreenSpaceLodConfig {
    /// Check the pixel thresholds leave a hysteresis band.
    pub fn validate(&self) -> Result<()> {
        if !(self.simplify_pixels > 0.0 && self.simplify_pixels.is_finite()) {
            return Err(invalid(
                "simplify_pixels",
                format!("{} is not a positive number", self.simplify_pixels),
            ));
        }
        if !(self.subdivide_pixels > self.simplify_pixels && self.subdivide_pixels.is_finite()) {
            return Err(invalid(
                "subdivide_pixels",
                format!(
                    "{} must be larger than simplify_pixels {}",
                    self.subdivide_pixels, self.simplify_pixels
                ),
            ));
        }
        Ok(())
    }
}

fn invalid(context: &'static str, detail: String) -> Error {
    Error::InvalidConfig { context, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        MapConfig::default().validate().unwrap();
        DistanceLodConfig::default().validate().unwrap();
        ScreenSpaceLodConfig::default().validate().unwrap();
    }

    #[test]
    fn test_builders() {
        let config = MapConfig::default()
            .with_max_depth(8)
            .with_min_depth(2)
            .with_visit_budget(64)
            .with_failure_policy(FailurePolicy::Blank);
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.min_depth, 2);
        assert_eq!(config.visit_budget, 64);
        assert_eq!(config.failure_policy, FailurePolicy::Blank);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_map_config() {
        let err = MapConfig::default().with_max_depth(40).validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(
            MapConfig::default()
                .with_max_depth(3)
                .with_min_depth(4)
                .validate()
                .is_err()
        );
        assert!(MapConfig::default().with_visit_budget(0).validate().is_err());
        assert!(
            MapConfig::default()
                .with_failure_policy(FailurePolicy::Retry { max_attempts: 0 })
                .validate()
                .is_err()
        );
        assert!(MapConfig::default().with_mesh_segments(0).validate().is_err());
    }

    #[test]
    fn test_hysteresis_required() {
        let config = DistanceLodConfig {
            subdivide_factor: 4.0,
            simplify_factor: 4.0,
        };
        assert!(config.validate().is_err());

        let config = ScreenSpaceLodConfig {
            subdivide_pixels: 100.0,
            simplify_pixels: 200.0,
            frustum_culling: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy() {
        let policy = FailurePolicy::Retry { max_attempts: 2 };
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(!FailurePolicy::Blank.allows_retry(0));
    }

    #[test]
    fn test_serde_partial_config() {
        let config: MapConfig =
            serde_json::from_str(r#"{ "max_depth": 12, "failure_policy": { "kind": "blank" } }"#)
                .unwrap();
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.failure_policy, FailurePolicy::Blank);
        assert_eq!(config.visit_budget, MapConfig::default().visit_budget);

        let json = serde_json::to_string(&MapConfig::default()).unwrap();
        let back: MapConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MapConfig::default());
    }
}
