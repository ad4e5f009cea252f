//! The frame pipeline: assembly on a driver thread, submission on a GPU
//! thread, and the bounded queues between them.
//!
//! Redraw frames are submitted in the order they were produced. Pick frames
//! wait in a separate queue that the GPU thread serves first.

mod config;
mod driver;
mod messages;
mod metrics;
mod renderer;

pub use config::PipelineConfig;
pub use driver::{FrameDriver, ProduceStatus};
pub use messages::{DriverMessage, PollingHost, RedrawHandle, SurfaceHost};
pub use metrics::{FrameMetrics, PipelineMetrics, TimeStats};
pub use renderer::FrameRenderer;

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::render::{BasicFrameController, Frame, FrameController, FramePool};
use crate::resource::{ImageLoader, RenderResourceCache};
use crate::scene::Scene;

/// Frames between the two threads.
#[derive(Default)]
struct FrameQueues {
    redraw: VecDeque<Frame>,
    pick: VecDeque<Frame>,
    /// The last submitted redraw frame, kept until the next one replaces it.
    current: Option<Frame>,
    /// Bumped whenever the queues are drained, so a frame that was being
    /// submitted at the time is not kept as current.
    epoch: u64,
}

/// State shared by the driver and the renderer.
struct Shared {
    config: PipelineConfig,
    pool: FramePool,
    queues: Mutex<FrameQueues>,
    resources: Arc<RenderResourceCache>,
    controller: Arc<dyn FrameController>,
    metrics: Mutex<FrameMetrics>,
    paused: AtomicBool,
    host: Arc<dyn SurfaceHost>,
}

impl Shared {
    fn lock_queues(&self) -> MutexGuard<'_, FrameQueues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_metrics(&self) -> MutexGuard<'_, FrameMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return queued frames to the pool, and the displayed frame too when
    /// `include_current` is set.
    fn drain_frames(&self, include_current: bool) -> usize {
        let frames: Vec<Frame> = {
            let mut queues = self.lock_queues();
            let mut frames: Vec<Frame> = queues.pick.drain(..).collect();
            frames.extend(queues.redraw.drain(..));
            if include_current {
                queues.epoch += 1;
                frames.extend(queues.current.take());
            }
            frames
        };
        let count = frames.len();
        for frame in frames {
            self.pool.release(frame);
        }
        count
    }
}

/// A connected driver and renderer.
pub struct Pipeline {
    pub driver: FrameDriver,
    pub renderer: FrameRenderer,
}

impl Pipeline {
    /// Build a pipeline using [`BasicFrameController`].
    pub fn new(
        config: PipelineConfig,
        scene: Scene,
        host: Arc<dyn SurfaceHost>,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<Self> {
        Self::with_controller(
            config,
            scene,
            Arc::new(BasicFrameController::default()),
            host,
            loader,
        )
    }

    pub fn with_controller(
        config: PipelineConfig,
        scene: Scene,
        controller: Arc<dyn FrameController>,
        host: Arc<dyn SurfaceHost>,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<Self> {
        config.validate()?;
        let resources = Arc::new(RenderResourceCache::new(
            config.resource_cache_capacity,
            config.resource_cache_low_water,
            config.retriever(),
            loader,
        )?);

        let (sender, receiver) = async_channel::unbounded();
        let handle = RedrawHandle::new(sender, Arc::clone(&host));
        let listener = handle.clone();
        resources.set_retrieval_listener(Arc::new(move || listener.request_redraw()));

        let shared = Arc::new(Shared {
            pool: FramePool::new(config.frame_pool_size + 1),
            queues: Mutex::new(FrameQueues::default()),
            resources,
            controller,
            metrics: Mutex::new(FrameMetrics::default()),
            paused: AtomicBool::new(false),
            host,
            config,
        });

        Ok(Self {
            driver: FrameDriver::new(Arc::clone(&shared), scene, handle.clone(), receiver),
            renderer: FrameRenderer::new(shared, handle),
        })
    }

    #[must_use]
    pub fn into_parts(self) -> (FrameDriver, FrameRenderer) {
        (self.driver, self.renderer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use web_time::Instant;

    use super::*;
    use crate::geom::{Camera, Position, Viewport};
    use crate::layer::{Marker, RenderableLayer};
    use crate::render::{DrawContext, RenderContext, RenderDevice, SoftwareDevice};
    use crate::resource::FileImageLoader;
    use crate::terrain::BasicTessellator;

    fn scene() -> Scene {
        let mut scene = Scene::new(Box::new(BasicTessellator::new().unwrap()));
        scene.camera = Camera::looking_down(0.0, 0.0, 1_000_000.0);
        let mut markers = RenderableLayer::new("Markers");
        markers.add_renderable(Box::new(Marker::new(
            "origin",
            Position::new(0.0, 0.0, 0.0),
        )));
        scene.layers.add_layer(Box::new(markers));
        scene
    }

    /// Records the order in which frames reach the GPU thread.
    #[derive(Default)]
    struct RecordingController {
        inner: BasicFrameController,
        submitted: Mutex<Vec<(u64, bool)>>,
    }

    impl FrameController for RecordingController {
        fn render_frame(&self, scene: &mut Scene, rc: &mut RenderContext<'_>) -> Result<()> {
            self.inner.render_frame(scene, rc)
        }

        fn draw_frame(&self, dc: &mut DrawContext<'_>, frame: &mut Frame) -> Result<()> {
            self.submitted
                .lock()
                .unwrap()
                .push((frame.sequence, frame.is_pick_frame()));
            self.inner.draw_frame(dc, frame)
        }
    }

    /// Counts render requests so a test can tell when a frame was queued.
    #[derive(Default)]
    struct CountingHost {
        renders: AtomicUsize,
    }

    impl SurfaceHost for CountingHost {
        fn request_render(&self) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }

        fn register_redraw(&self) {}

        fn unregister_redraw(&self) {}

        fn post_to_driver(&self) {}
    }

    fn pipeline() -> (FrameDriver, FrameRenderer) {
        let config = PipelineConfig {
            resource_cache_capacity: 1024 * 1024,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config, scene(), Arc::new(PollingHost), Arc::new(FileImageLoader))
            .unwrap();
        let (mut driver, renderer) = pipeline.into_parts();
        driver.set_viewport(Viewport::new(0, 0, 200, 100));
        (driver, renderer)
    }

    /// Run the renderer on its own thread until the returned flag is set.
    fn spawn_gpu_thread(
        mut renderer: FrameRenderer,
    ) -> (Arc<AtomicBool>, thread::JoinHandle<FrameRenderer>) {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut device = SoftwareDevice::new(200, 100);
                renderer.on_surface_created();
                while !stop.load(Ordering::SeqCst) {
                    if !renderer.consume_frame(&mut device) {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                renderer
            })
        };
        (stop, handle)
    }

    #[test]
    fn test_backpressure_skips_assembly() {
        let (mut driver, _renderer) = pipeline();
        assert_eq!(driver.produce_frame(), ProduceStatus::Queued);
        assert_eq!(driver.produce_frame(), ProduceStatus::Queued);
        assert_eq!(driver.produce_frame(), ProduceStatus::Backpressured);

        let metrics = driver.metrics();
        assert_eq!(metrics.queued_redraw_frames, 2);
        assert_eq!(metrics.frames.backpressured_frames, 1);
        assert_eq!(metrics.frames.render.count, 2);
    }

    #[test]
    fn test_pause_resume_recycles_queued_frames() {
        let (mut driver, _renderer) = pipeline();
        driver.produce_frame();
        driver.produce_frame();
        assert_eq!(driver.metrics().live_frames, 2);

        driver.pause();
        assert_eq!(driver.produce_frame(), ProduceStatus::Paused);
        driver.resume();

        let metrics = driver.metrics();
        assert_eq!(metrics.queued_redraw_frames, 0);
        assert_eq!(metrics.live_frames, 0);
        assert_eq!(metrics.cache.texture_count, 0);
        assert!(!driver.is_paused());
    }

    #[test]
    fn test_live_frames_stay_within_pool() {
        let (mut driver, mut renderer) = pipeline();
        let mut device = SoftwareDevice::new(200, 100);
        renderer.on_surface_created();
        let capacity = driver.metrics().pool_capacity;
        for _ in 0..10 {
            driver.produce_frame();
            driver.produce_frame();
            assert!(driver.metrics().live_frames <= capacity);
            while renderer.consume_frame(&mut device) {}
            // The displayed frame stays out of the pool.
            assert_eq!(driver.metrics().live_frames, 1);
        }
        assert_eq!(device.presented_frames(), 20);
        assert_eq!(driver.metrics().frames.draw.count, 20);
    }

    #[test]
    fn test_pick_finds_marker() {
        let (mut driver, renderer) = pipeline();
        let (stop, gpu) = spawn_gpu_thread(renderer);

        let picked = driver.pick(100.5, 49.5).unwrap();
        let top = picked.top_picked_object().unwrap();
        assert_eq!(top.user_object_as::<String>().map(String::as_str), Some("origin"));
        assert!(picked.terrain_picked_object().is_some());

        // Nothing but terrain near the corner.
        let picked = driver.pick(5.5, 5.5).unwrap();
        assert!(!picked.has_non_terrain_objects());

        stop.store(true, Ordering::SeqCst);
        gpu.join().unwrap();
    }

    #[test]
    fn test_pick_region_and_empty_picks() {
        let (mut driver, renderer) = pipeline();
        let (stop, gpu) = spawn_gpu_thread(renderer);

        let picked = driver.pick_region(90.0, 40.0, 20.0, 20.0).unwrap();
        assert_eq!(picked.len(), 1);
        assert!(picked.iter().all(|object| object.is_on_top()));

        // Off the viewport.
        assert!(driver.pick(-10.0, 5.0).unwrap().is_empty());
        assert!(driver.pick_region(500.0, 500.0, 5.0, 5.0).unwrap().is_empty());

        stop.store(true, Ordering::SeqCst);
        gpu.join().unwrap();
    }

    #[test]
    fn test_pick_without_gpu_thread_times_out() {
        let config = PipelineConfig {
            pick_timeout_ms: 20,
            resource_cache_capacity: 1024 * 1024,
            ..PipelineConfig::default()
        };
        let (mut driver, _renderer) =
            Pipeline::new(config, scene(), Arc::new(PollingHost), Arc::new(FileImageLoader))
                .unwrap()
                .into_parts();
        driver.set_viewport(Viewport::new(0, 0, 200, 100));
        let result = driver.pick(100.5, 49.5);
        assert!(matches!(result, Err(crate::Error::PickTimeout { .. })));
        assert_eq!(driver.metrics().frames.pick_timeouts, 1);
        // The abandoned pick frame is discarded with the rest.
        driver.discard_pending();
        assert_eq!(driver.metrics().live_frames, 0);
    }

    #[test]
    fn test_abandoned_pick_frame_is_not_submitted() {
        let config = PipelineConfig {
            pick_timeout_ms: 20,
            resource_cache_capacity: 1024 * 1024,
            ..PipelineConfig::default()
        };
        let (mut driver, mut renderer) =
            Pipeline::new(config, scene(), Arc::new(PollingHost), Arc::new(FileImageLoader))
                .unwrap()
                .into_parts();
        driver.set_viewport(Viewport::new(0, 0, 200, 100));
        assert!(driver.pick(100.5, 49.5).is_err());

        let mut device = SoftwareDevice::new(200, 100);
        assert!(renderer.consume_frame(&mut device));
        let metrics = driver.metrics();
        assert_eq!(metrics.frames.discarded_frames, 1);
        assert_eq!(metrics.frames.draw.count, 0);
        assert_eq!(metrics.live_frames, 0);
    }

    #[test]
    fn test_pick_wait_shares_one_deadline() {
        let config = PipelineConfig {
            max_frame_queue_size: 1,
            frame_pool_size: 1,
            pick_timeout_ms: 400,
            resource_cache_capacity: 1024 * 1024,
            ..PipelineConfig::default()
        };
        let (mut driver, mut renderer) =
            Pipeline::new(config, scene(), Arc::new(PollingHost), Arc::new(FileImageLoader))
                .unwrap()
                .into_parts();
        driver.set_viewport(Viewport::new(0, 0, 200, 100));

        // One queued redraw frame and one abandoned pick frame fill the pool.
        assert_eq!(driver.produce_frame(), ProduceStatus::Queued);
        assert!(driver.pick(100.5, 49.5).is_err());
        assert_eq!(driver.metrics().live_frames, driver.metrics().pool_capacity);

        // Halfway through the next pick's wait for a frame, the GPU thread
        // frees one by dropping the abandoned pick.
        let gpu = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            let mut device = SoftwareDevice::new(200, 100);
            renderer.consume_frame(&mut device);
            renderer
        });
        let start = Instant::now();
        let result = driver.pick(100.5, 49.5);
        let elapsed = start.elapsed();
        gpu.join().unwrap();

        assert!(matches!(result, Err(crate::Error::PickTimeout { .. })));
        assert!(elapsed >= Duration::from_millis(390));
        assert!(elapsed < Duration::from_millis(580), "pick blocked for {elapsed:?}");
    }

    #[test]
    fn test_pick_frames_jump_the_redraw_queue() {
        let controller = Arc::new(RecordingController::default());
        let host = Arc::new(CountingHost::default());
        let config = PipelineConfig {
            resource_cache_capacity: 1024 * 1024,
            ..PipelineConfig::default()
        };
        let (mut driver, mut renderer) = Pipeline::with_controller(
            config,
            scene(),
            controller.clone(),
            host.clone(),
            Arc::new(FileImageLoader),
        )
        .unwrap()
        .into_parts();
        driver.set_viewport(Viewport::new(0, 0, 200, 100));
        assert_eq!(driver.produce_frame(), ProduceStatus::Queued);
        assert_eq!(driver.produce_frame(), ProduceStatus::Queued);
        assert_eq!(host.renders.load(Ordering::SeqCst), 2);

        let picker = thread::spawn(move || {
            let picked = driver.pick(100.5, 49.5);
            (driver, picked)
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while host.renders.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let mut device = SoftwareDevice::new(200, 100);
        while renderer.consume_frame(&mut device) {}
        let (_driver, picked) = picker.join().unwrap();
        assert!(picked.unwrap().top_picked_object().is_some());

        let submitted = controller.submitted.lock().unwrap().clone();
        assert_eq!(submitted, vec![(3, true), (1, false), (2, false)]);
    }

    #[test]
    fn test_paused_pick_is_empty() {
        let (mut driver, _renderer) = pipeline();
        driver.pause();
        assert!(driver.pick(100.5, 49.5).unwrap().is_empty());
    }

    #[test]
    fn test_surface_size_reaches_driver() {
        let config = PipelineConfig {
            resource_cache_capacity: 1024 * 1024,
            ..PipelineConfig::default()
        };
        let (mut driver, mut renderer) =
            Pipeline::new(config, scene(), Arc::new(PollingHost), Arc::new(FileImageLoader))
                .unwrap()
                .into_parts();
        assert_eq!(driver.produce_frame(), ProduceStatus::NoSurface);

        let mut device = SoftwareDevice::new(1, 1);
        renderer.on_surface_created();
        renderer.on_surface_size_changed(&mut device, 64, 32);
        assert_eq!(device.width(), 64);

        driver.process_messages();
        assert_eq!(driver.viewport(), Viewport::new(0, 0, 64, 32));
        assert!(driver.is_redraw_pending());
        driver.on_display_refresh();
        assert!(!driver.is_redraw_pending());
        assert!(renderer.consume_frame(&mut device));

        renderer.on_surface_destroyed();
        driver.process_messages();
        assert_eq!(driver.produce_frame(), ProduceStatus::NoSurface);
        assert_eq!(driver.metrics().live_frames, 0);
        device.present();
    }
}
