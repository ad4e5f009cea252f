//! The driver-thread half of the pipeline.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use web_time::Instant;

use crate::error::{Error, Result};
use crate::geom::{Ray, Viewport};
use crate::pick::{PickCompletion, PickedObjectList};
use crate::render::{Frame, FrameState, PickRequest, RenderContext};
use crate::resource::RenderResourceCache;
use crate::scene::Scene;

use super::messages::{DriverMessage, RedrawHandle};
use super::metrics::PipelineMetrics;
use super::Shared;

/// Outcome of [`FrameDriver::produce_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceStatus {
    /// A frame was assembled and queued for the GPU thread.
    Queued,
    /// The GPU thread is behind; try again on the next refresh.
    Backpressured,
    Paused,
    /// There is no surface to draw to yet.
    NoSurface,
}

/// Owns the scene and assembles frames. Lives on the driver thread.
pub struct FrameDriver {
    shared: Arc<Shared>,
    scene: Scene,
    handle: RedrawHandle,
    messages: async_channel::Receiver<DriverMessage>,
    viewport: Viewport,
    redraw_pending: bool,
    sequence: u64,
}

impl FrameDriver {
    pub(super) fn new(
        shared: Arc<Shared>,
        mut scene: Scene,
        handle: RedrawHandle,
        messages: async_channel::Receiver<DriverMessage>,
    ) -> Self {
        scene.field_of_view = shared.config.field_of_view;
        Self {
            shared,
            scene,
            handle,
            messages,
            viewport: Viewport::default(),
            redraw_pending: false,
            sequence: 0,
        }
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The scene, for camera and layer changes. Call
    /// [`Self::request_redraw`] afterwards to show them.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// A handle for requesting redraws from other threads.
    #[must_use]
    pub fn redraw_handle(&self) -> RedrawHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn resources(&self) -> &Arc<RenderResourceCache> {
        &self.shared.resources
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.request_redraw();
    }

    /// Ask for a frame on the next display refresh. Repeated calls before
    /// then have no further effect.
    pub fn request_redraw(&mut self) {
        if !self.redraw_pending {
            self.redraw_pending = true;
            self.shared.host.register_redraw();
        }
    }

    #[must_use]
    pub fn is_redraw_pending(&self) -> bool {
        self.redraw_pending
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Handle every message sent from other threads.
    pub fn process_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.messages.try_recv() {
            handled += 1;
            match message {
                DriverMessage::RequestRedraw => {
                    self.handle.acknowledge_redraw();
                    self.request_redraw();
                }
                DriverMessage::ClearCache => {
                    self.shared.resources.clear();
                    self.request_redraw();
                }
                DriverMessage::SetViewport(viewport) => self.set_viewport(viewport),
                DriverMessage::SurfaceDestroyed => {
                    let recycled = self.shared.drain_frames(true);
                    self.viewport = Viewport::default();
                    tracing::info!("Surface destroyed, recycled {recycled} frames");
                }
            }
        }
        handled
    }

    /// Called by the host once per display refresh while a redraw is pending.
    pub fn on_display_refresh(&mut self) {
        self.process_messages();
        if !self.redraw_pending {
            return;
        }
        self.redraw_pending = false;
        if self.produce_frame() == ProduceStatus::Backpressured {
            self.redraw_pending = true;
        } else if !self.redraw_pending {
            self.shared.host.unregister_redraw();
        }
    }

    /// Assemble a redraw frame and queue it for the GPU thread.
    ///
    /// Never blocks: when the queue is full or the pool is empty, assembly is
    /// skipped and [`ProduceStatus::Backpressured`] returned.
    pub fn produce_frame(&mut self) -> ProduceStatus {
        if self.is_paused() {
            return ProduceStatus::Paused;
        }
        if self.viewport.is_empty() {
            return ProduceStatus::NoSurface;
        }

        let queued = self.shared.lock_queues().redraw.len();
        let frame = if queued < self.shared.config.max_frame_queue_size {
            self.shared.pool.acquire()
        } else {
            None
        };
        let Some(mut frame) = frame else {
            self.shared.lock_metrics().backpressured_frames += 1;
            tracing::trace!("Frame queue full, skipping assembly");
            return ProduceStatus::Backpressured;
        };

        self.assemble(&mut frame);
        self.shared.lock_queues().redraw.push_back(frame);
        self.shared.host.request_render();
        ProduceStatus::Queued
    }

    /// Objects under a screen point, origin at the top-left.
    ///
    /// Blocks until the GPU thread resolves the pick. A paused pipeline or a
    /// point outside the viewport yields an empty list.
    pub fn pick(&mut self, x: f64, y: f64) -> Result<PickedObjectList> {
        if self.is_paused() || self.viewport.is_empty() {
            return Ok(PickedObjectList::new());
        }
        let view = self.scene.view_state(self.viewport);
        let column = x.floor() as i32;
        let row = view.flip_y(y).ceil() as i32 - 1;
        if !self.viewport.contains(column, row) {
            return Ok(PickedObjectList::new());
        }

        let region = Viewport::new(column - 1, row - 1, 3, 3).intersection(&self.viewport);
        let ray = view.ray_through_screen_point(x, y);
        self.run_pick(region, Some((column, row)), ray)
    }

    /// Objects within a screen rectangle whose top-left corner is at `(x, y)`.
    pub fn pick_region(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<PickedObjectList> {
        if self.is_paused() || self.viewport.is_empty() {
            return Ok(PickedObjectList::new());
        }
        let top = f64::from(self.viewport.y + self.viewport.height) - (y + height);
        let region = Viewport::new(
            x.floor() as i32,
            top.floor() as i32,
            width.ceil() as i32,
            height.ceil() as i32,
        )
        .intersection(&self.viewport);
        if region.is_empty() {
            return Ok(PickedObjectList::new());
        }
        self.run_pick(region, None, None)
    }

    fn run_pick(
        &mut self,
        region: Viewport,
        point: Option<(i32, i32)>,
        ray: Option<Ray>,
    ) -> Result<PickedObjectList> {
        let timeout = self.shared.config.pick_timeout();
        let start = Instant::now();
        self.shared.lock_metrics().picks += 1;

        let Some(mut frame) = self.shared.pool.acquire_timeout(timeout) else {
            return Err(self.pick_timed_out(timeout));
        };
        let completion = PickCompletion::new();
        frame.pick = Some(PickRequest {
            viewport: region,
            point,
            ray,
            completion: Arc::clone(&completion),
        });

        self.assemble(&mut frame);
        self.shared.lock_queues().pick.push_back(frame);
        self.shared.host.request_render();

        // Waiting for a frame and for the result share one deadline.
        let remaining = timeout.saturating_sub(start.elapsed());
        completion
            .wait(remaining)
            .ok_or_else(|| self.pick_timed_out(timeout))
    }

    fn pick_timed_out(&self, waited: std::time::Duration) -> Error {
        self.shared.lock_metrics().pick_timeouts += 1;
        tracing::warn!("Pick not resolved within {} ms", waited.as_millis());
        Error::PickTimeout { waited }
    }

    fn assemble(&mut self, frame: &mut Frame) {
        self.sequence += 1;
        frame.sequence = self.sequence;
        frame.state = FrameState::Assembling;
        frame.clear_color = self.shared.config.clear_color;

        let start = Instant::now();
        let view = self.scene.view_state(self.viewport);
        let redraw_requested = {
            let mut rc = RenderContext::new(view, Arc::clone(&self.shared.resources), frame);
            if let Err(e) = self.shared.controller.render_frame(&mut self.scene, &mut rc) {
                tracing::error!("Frame {} assembly failed: {e}", self.sequence);
            }
            rc.redraw_requested()
        };
        self.shared.lock_metrics().render.record(start.elapsed());
        frame.state = FrameState::Queued;

        if redraw_requested && !frame.is_pick_frame() {
            self.request_redraw();
        }
    }

    /// Stop producing frames, recycle every queued frame and drop the
    /// resource cache, as when the surface is hidden.
    pub fn pause(&mut self) {
        if self.shared.paused.swap(true, Ordering::AcqRel) {
            return;
        }
        let recycled = self.shared.drain_frames(true);
        self.shared.resources.clear();
        if self.redraw_pending {
            self.redraw_pending = false;
            self.shared.host.unregister_redraw();
        }
        tracing::info!("Pipeline paused, recycled {recycled} frames");
    }

    pub fn resume(&mut self) {
        if !self.shared.paused.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Pipeline resumed");
        self.request_redraw();
    }

    /// Return every frame not yet submitted to the pool. Waiting picks
    /// resolve to empty lists.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.shared.drain_frames(false);
        self.shared.lock_metrics().discarded_frames += discarded as u64;
        discarded
    }

    #[must_use]
    pub fn metrics(&self) -> PipelineMetrics {
        let (queued_redraw_frames, queued_pick_frames) = {
            let queues = self.shared.lock_queues();
            (queues.redraw.len(), queues.pick.len())
        };
        PipelineMetrics {
            frames: *self.shared.lock_metrics(),
            queued_redraw_frames,
            queued_pick_frames,
            live_frames: self.shared.pool.live(),
            pool_capacity: self.shared.pool.capacity(),
            cache: self.shared.resources.stats(),
        }
    }
}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("viewport", &self.viewport)
            .field("redraw_pending", &self.redraw_pending)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
