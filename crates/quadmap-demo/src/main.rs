//! Headless flight over a quadtree map.
//!
//! The camera starts high above the target and descends towards it, one
//! simulated frame at a time. Every frame the map view refines or collapses
//! tiles; the demo logs what the scene holds and how loading progresses.

mod flight;
mod launch_params;
mod scene;

use std::sync::Arc;

use launch_params::{LaunchParams, LodChoice, ProviderChoice};
use quadmap::{
    DebugProvider, DistanceLod, DistanceLodConfig, FrustumLod, HeightDebugProvider, LocalSpawner,
    LodHeuristic, MapConfig, MapView, ModeRegistry, ScreenSpaceLod, ScreenSpaceLodConfig, Spawner,
    TileProvider,
};

use crate::flight::Flight;
use crate::scene::HeadlessScene;

/// Frames between progress lines.
const REPORT_INTERVAL: u64 = 30;
/// Simulated frame length.
const FRAME_TIME: std::time::Duration = std::time::Duration::from_millis(16);

fn main() {
    // Initialize tracing for native platforms.
    #[cfg(not(target_family = "wasm"))]
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let params = launch_params::parse();
    if let Err(e) = run(&params) {
        tracing::error!("demo failed: {e}");
        std::process::exit(1);
    }
}

fn load_config(params: &LaunchParams) -> Result<MapConfig, Box<dyn std::error::Error>> {
    let Some(path) = &params.config else {
        return Ok(MapConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    let config: MapConfig = serde_json::from_str(&text)?;
    tracing::info!(path = %path.display(), "loaded map configuration");
    Ok(config)
}

fn heuristic(choice: LodChoice) -> quadmap::Result<Box<dyn LodHeuristic>> {
    let heuristic: Box<dyn LodHeuristic> = match choice {
        LodChoice::Distance => Box::new(DistanceLod::new(DistanceLodConfig::default())?),
        LodChoice::Frustum => Box::new(FrustumLod::new(DistanceLodConfig::default())?),
        LodChoice::ScreenSpace => Box::new(ScreenSpaceLod::new(ScreenSpaceLodConfig::default())?),
    };
    Ok(heuristic)
}

/// How requests get driven: by the frame loop, or by a Tokio runtime.
enum Executor {
    Local(LocalSpawner),
    #[cfg(not(target_family = "wasm"))]
    Tokio(tokio::runtime::Runtime),
}

impl Executor {
    fn spawner(&self) -> Arc<dyn Spawner> {
        match self {
            Executor::Local(spawner) => Arc::new(spawner.clone()),
            #[cfg(not(target_family = "wasm"))]
            Executor::Tokio(runtime) => Arc::new(quadmap::TokioSpawner::new(runtime.handle().clone())),
        }
    }

    /// Give pending requests a chance to finish before the next frame.
    fn tick(&self) {
        match self {
            Executor::Local(spawner) => {
                spawner.run_until_stalled();
            }
            #[cfg(not(target_family = "wasm"))]
            Executor::Tokio(_) => std::thread::sleep(FRAME_TIME),
        }
    }
}

#[allow(clippy::type_complexity)]
fn providers(
    params: &LaunchParams,
) -> Result<(Arc<dyn TileProvider>, Option<Arc<dyn TileProvider>>, Executor), Box<dyn std::error::Error>> {
    match params.provider {
        ProviderChoice::Debug => {
            let colour: Arc<dyn TileProvider> = Arc::new(DebugProvider::new());
            let height: Arc<dyn TileProvider> = Arc::new(HeightDebugProvider::new());
            Ok((colour, Some(height), Executor::Local(LocalSpawner::new())))
        }
        #[cfg(not(target_family = "wasm"))]
        ProviderChoice::Http => {
            let mut provider = match &params.url_template {
                Some(template) => quadmap::HttpProvider::new("http", template.as_str()),
                None => quadmap::HttpProvider::openstreetmap(),
            };
            if let Some(template) = &params.elevation_template {
                provider = provider.with_elevation_template(template.as_str());
            }
            let provider = provider.with_cache(quadmap::MemoryCache::with_max_size(256 * 1024 * 1024));
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let provider: Arc<dyn TileProvider> = Arc::new(provider);
            Ok((provider, None, Executor::Tokio(runtime)))
        }
        #[cfg(target_family = "wasm")]
        ProviderChoice::Http => Err("the http provider is not available on this platform".into()),
    }
}

fn run(params: &LaunchParams) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(params)?;
    let (provider, height_provider, executor) = providers(params)?;

    let mut view = MapView::new(
        Arc::new(ModeRegistry::with_defaults()),
        params.mode,
        provider,
        executor.spawner(),
        HeadlessScene::default(),
        config,
    )?;
    view.set_lod(heuristic(params.lod)?);
    if params.mode.needs_elevation() && height_provider.is_some() {
        view.set_height_provider(height_provider);
    }
    view.request_metadata();

    let flight = Flight::new(params);
    let started = web_time::Instant::now();
    tracing::info!(
        mode = %params.mode,
        frames = params.frames,
        lat = params.lat,
        lon = params.lon,
        "starting flight"
    );

    for frame in 0..params.frames {
        executor.tick();
        let camera = flight.camera(frame);
        let report = view.update(&camera);

        if frame % REPORT_INTERVAL == 0 || frame + 1 == params.frames {
            let stats = view.stats();
            let scene = view.scene();
            tracing::info!(
                frame,
                altitude = flight.altitude(frame).round(),
                resident = stats.resident,
                loading = stats.loading,
                failed = stats.failed,
                max_level = stats.max_level,
                tiles = scene.len(),
                fallback = scene.fallback_tiles(),
                triangles = scene.triangles(),
                "frame"
            );
        }
        if report.lod.budget_exhausted {
            tracing::debug!(frame, "lod visit budget exhausted");
        }
    }

    let stats = view.stats();
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis(),
        resident = stats.resident,
        rendered = stats.rendered,
        stale = stats.stale_completions,
        "flight finished"
    );
    Ok(())
}
