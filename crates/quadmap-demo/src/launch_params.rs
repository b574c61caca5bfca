//! Launch parameter parsing for the demo.
//!
//! On native, parameters are parsed from command-line arguments using clap.
//! On WASM, defaults are used.

use std::path::PathBuf;

use quadmap::MapMode;

/// Default target latitude (Mont Blanc).
const DEFAULT_LAT: f64 = 45.832_6;
/// Default target longitude (Mont Blanc).
const DEFAULT_LON: f64 = 6.865_1;
/// Default final altitude in meters.
const DEFAULT_ALTITUDE: f64 = 2_000.0;
/// Default number of frames to simulate.
const DEFAULT_FRAMES: u64 = 600;

/// Which LOD heuristic drives the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(not(target_family = "wasm"), derive(clap::ValueEnum))]
pub enum LodChoice {
    /// Tile size over camera distance.
    #[default]
    Distance,
    /// Distance, ignoring tiles outside the view.
    Frustum,
    /// Projected size in pixels.
    ScreenSpace,
}

/// Where tile content comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(not(target_family = "wasm"), derive(clap::ValueEnum))]
pub enum ProviderChoice {
    /// Procedural tiles, no network.
    #[default]
    Debug,
    /// Tiles downloaded from a URL template.
    Http,
}

/// Launch parameters for the demo.
#[derive(Debug)]
pub struct LaunchParams {
    /// Map projection.
    pub mode: MapMode,
    /// LOD heuristic.
    pub lod: LodChoice,
    /// Tile source.
    pub provider: ProviderChoice,
    /// URL template for the HTTP provider; OpenStreetMap if unset.
    pub url_template: Option<String>,
    /// URL template for Terrain-RGB elevation tiles.
    pub elevation_template: Option<String>,
    /// Target latitude in degrees.
    pub lat: f64,
    /// Target longitude in degrees.
    pub lon: f64,
    /// Final altitude in meters.
    pub altitude: f64,
    /// Frames to simulate.
    pub frames: u64,
    /// JSON file with a map configuration.
    pub config: Option<PathBuf>,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            mode: MapMode::Planar,
            lod: LodChoice::default(),
            provider: ProviderChoice::default(),
            url_template: None,
            elevation_template: None,
            lat: DEFAULT_LAT,
            lon: DEFAULT_LON,
            altitude: DEFAULT_ALTITUDE,
            frames: DEFAULT_FRAMES,
            config: None,
        }
    }
}

#[cfg(not(target_family = "wasm"))]
mod native {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    #[command(about = "Fly a camera over a quadtree map and log what it loads")]
    struct CliArgs {
        /// Map projection: planar, spherical, height-cpu or height-gpu.
        #[arg(long, default_value_t = MapMode::Planar)]
        mode: MapMode,

        /// LOD heuristic.
        #[arg(long, value_enum, default_value_t = LodChoice::default())]
        lod: LodChoice,

        /// Tile source.
        #[arg(long, value_enum, default_value_t = ProviderChoice::default())]
        provider: ProviderChoice,

        /// URL template with {z}, {x}, {y} and optional {s} placeholders.
        #[arg(long)]
        url_template: Option<String>,

        /// Terrain-RGB URL template for the height modes.
        #[arg(long)]
        elevation_template: Option<String>,

        /// Target latitude in degrees.
        #[arg(long, default_value_t = DEFAULT_LAT)]
        lat: f64,

        /// Target longitude in degrees.
        #[arg(long, default_value_t = DEFAULT_LON)]
        lon: f64,

        /// Final altitude in meters.
        #[arg(long, default_value_t = DEFAULT_ALTITUDE)]
        altitude: f64,

        /// Frames to simulate.
        #[arg(long, default_value_t = DEFAULT_FRAMES)]
        frames: u64,

        /// JSON map configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    }

    pub fn parse() -> LaunchParams {
        let args = CliArgs::parse();
        LaunchParams {
            mode: args.mode,
            lod: args.lod,
            provider: args.provider,
            url_template: args.url_template,
            elevation_template: args.elevation_template,
            lat: args.lat,
            lon: args.lon,
            altitude: args.altitude,
            frames: args.frames,
            config: args.config,
        }
    }
}

/// Parse launch parameters from CLI args (native) or use defaults (WASM).
pub fn parse() -> LaunchParams {
    #[cfg(not(target_family = "wasm"))]
    {
        native::parse()
    }
    #[cfg(target_family = "wasm")]
    {
        LaunchParams::default()
    }
}
