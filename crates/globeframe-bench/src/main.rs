//! Headless stress test for the globeframe pipeline.
//!
//! Runs the driver on the main thread and the renderer on a GPU thread backed
//! by the software device, orbits the camera around the globe, picks at the
//! screen center every few frames and logs pipeline metrics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use glam::DVec2;
use globeframe::geom::{Camera, Position, Sector};
use globeframe::layer::{Marker, RenderableLayer, TiledImageLayer};
use globeframe::render::SoftwareDevice;
use globeframe::resource::{FileImageLoader, ImageData, ImageLoader, ImageOptions, ImageSource};
use globeframe::terrain::BasicTessellator;
use globeframe::tile::{LevelSet, TemplateTileFactory};
use globeframe::{Pipeline, PipelineConfig, ProduceStatus, Scene, SurfaceHost};
use web_time::Instant;

#[derive(Parser, Debug)]
#[command(name = "globeframe-bench", about = "Drive the globeframe pipeline headless")]
struct Args {
    /// Number of redraw frames to produce.
    #[arg(long, default_value_t = 600)]
    frames: u64,
    /// Surface width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Surface height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Pick at the screen center every this many frames (0 disables picking).
    #[arg(long, default_value_t = 30)]
    pick_every: u64,
    /// Levels in the synthetic imagery pyramid.
    #[arg(long, default_value_t = 6)]
    levels: usize,
    /// Camera altitude in meters.
    #[arg(long, default_value_t = 2_000_000.0)]
    altitude: f64,
    /// JSON pipeline configuration; unspecified fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Wakes the GPU thread when frames are queued.
#[derive(Default)]
struct BenchHost {
    render_requested: Mutex<bool>,
    wake: Condvar,
    redraw_registered: AtomicBool,
}

impl BenchHost {
    /// Wait up to `timeout` for a render request, clearing it.
    fn wait_for_render(&self, timeout: Duration) {
        let guard = self
            .render_requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *guard = false;
    }
}

impl SurfaceHost for BenchHost {
    fn request_render(&self) {
        *self
            .render_requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_one();
    }

    fn register_redraw(&self) {
        self.redraw_registered.store(true, Ordering::Release);
    }

    fn unregister_redraw(&self) {
        self.redraw_registered.store(false, Ordering::Release);
    }

    // The driver loop polls its messages every iteration.
    fn post_to_driver(&self) {}
}

/// Serves `synthetic://{level}/{row}/{column}` as solid tiles colored by
/// address, and everything else from disk.
struct SyntheticLoader;

impl SyntheticLoader {
    fn parse(url: &str) -> Option<(u32, u32, u32)> {
        let mut parts = url.strip_prefix("synthetic://")?.split('/');
        let level = parts.next()?.parse().ok()?;
        let row = parts.next()?.parse().ok()?;
        let column = parts.next()?.parse().ok()?;
        Some((level, row, column))
    }
}

impl ImageLoader for SyntheticLoader {
    fn load(&self, source: &ImageSource, options: &ImageOptions) -> globeframe::Result<ImageData> {
        if let ImageSource::Url(url) = source
            && let Some((level, row, column)) = Self::parse(url)
        {
            let shade = |v: u32| (v.wrapping_mul(67) % 200 + 55) as u8;
            return Ok(ImageData::solid(
                32,
                32,
                [shade(level), shade(row), shade(column), 255],
            ));
        }
        FileImageLoader.load(source, options)
    }
}

fn build_scene(args: &Args) -> globeframe::Result<Scene> {
    let mut scene = Scene::new(Box::new(BasicTessellator::new()?));
    scene.camera = Camera::looking_down(0.0, 0.0, args.altitude);

    let levels = LevelSet::new(Sector::full_sphere(), 45.0, args.levels.max(1), 32, 32)?;
    let factory = TemplateTileFactory::new("synthetic://{level}/{row}/{column}");
    scene
        .layers
        .add_layer(Box::new(TiledImageLayer::new("Synthetic imagery", levels, Box::new(factory))));

    let mut markers = RenderableLayer::new("Cities");
    for (name, latitude, longitude) in [
        ("London", 51.5, -0.1),
        ("New York", 40.7, -74.0),
        ("Singapore", 1.35, 103.8),
        ("Sydney", -33.9, 151.2),
        ("Null Island", 0.0, 0.0),
    ] {
        markers.add_renderable(Box::new(
            Marker::new(name, Position::new(latitude, longitude, 0.0)).with_color([255, 64, 64, 255]),
        ));
    }
    scene.layers.add_layer(Box::new(markers));
    Ok(scene)
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&text)?;
    tracing::info!("Loaded pipeline configuration from {}", path.display());
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
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

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let host = Arc::new(BenchHost::default());
    let (mut driver, mut renderer) = Pipeline::new(
        config,
        build_scene(&args)?,
        host.clone(),
        Arc::new(SyntheticLoader),
    )?
    .into_parts();

    let stop = Arc::new(AtomicBool::new(false));
    let gpu = {
        let host = Arc::clone(&host);
        let stop = Arc::clone(&stop);
        let (width, height) = (args.width, args.height);
        thread::Builder::new()
            .name("globeframe-gpu".to_string())
            .spawn(move || {
                let mut device = SoftwareDevice::new(1, 1);
                renderer.on_surface_created();
                renderer.on_surface_size_changed(&mut device, width, height);
                while !stop.load(Ordering::Acquire) {
                    host.wait_for_render(Duration::from_millis(5));
                    while renderer.consume_frame(&mut device) {}
                }
                device.presented_frames()
            })?
    };

    let center = DVec2::new(f64::from(args.width) * 0.5, f64::from(args.height) * 0.5);
    let start = Instant::now();
    let mut produced = 0;
    while produced < args.frames {
        driver.process_messages();
        let camera = &mut driver.scene_mut().camera;
        camera.longitude = (camera.longitude + 0.5 + 180.0).rem_euclid(360.0) - 180.0;
        camera.latitude = 30.0 * (produced as f64 * 0.01).sin();

        match driver.produce_frame() {
            ProduceStatus::Queued => produced += 1,
            ProduceStatus::Backpressured => {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            ProduceStatus::Paused | ProduceStatus::NoSurface => {
                thread::sleep(Duration::from_millis(5));
                continue;
            }
        }

        if args.pick_every > 0 && produced % args.pick_every == 0 {
            match driver.pick(center.x, center.y) {
                Ok(picked) => {
                    let top = picked
                        .top_picked_object()
                        .map_or_else(|| "nothing".to_string(), |object| {
                            object
                                .user_object_as::<String>()
                                .cloned()
                                .or_else(|| {
                                    object.terrain_position().map(|p| {
                                        format!("terrain at {:.2}, {:.2}", p.latitude, p.longitude)
                                    })
                                })
                                .unwrap_or_else(|| "unknown".to_string())
                        });
                    tracing::info!("Frame {produced}: picked {} objects, top is {top}", picked.len());
                }
                Err(e) => tracing::warn!("Frame {produced}: pick failed: {e}"),
            }
        }

        if produced % 100 == 0 {
            let metrics = driver.metrics();
            tracing::info!(
                "Frame {produced}: assembly {:.2} ms (sd {:.2}), submission {:.2} ms, cache {} KB in {} textures",
                metrics.frames.render.average_ms(),
                metrics.frames.render.std_dev_ms(),
                metrics.frames.draw.average_ms(),
                metrics.cache.used_capacity / 1024,
                metrics.cache.texture_count
            );
        }
    }

    // Let the GPU thread drain what is still queued.
    while driver.metrics().queued_redraw_frames > 0 {
        thread::sleep(Duration::from_millis(1));
    }
    stop.store(true, Ordering::Release);
    host.request_render();
    let presented = gpu.join().map_err(|_| "GPU thread panicked")?;

    let elapsed = start.elapsed();
    let metrics = driver.metrics();
    tracing::info!(
        "Produced {produced} frames in {:.2} s ({:.1} fps), {presented} presented",
        elapsed.as_secs_f64(),
        produced as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
