//! The GPU-thread half of the pipeline.

use std::sync::Arc;

use web_time::Instant;

use crate::geom::Viewport;
use crate::pick::PickedObjectList;
use crate::render::{DrawContext, Frame, FrameState, RenderDevice};

use super::Shared;
use super::messages::RedrawHandle;

/// Submits queued frames. Lives on the thread that owns the render device.
pub struct FrameRenderer {
    shared: Arc<Shared>,
    handle: RedrawHandle,
}

impl FrameRenderer {
    pub(super) fn new(shared: Arc<Shared>, handle: RedrawHandle) -> Self {
        Self { shared, handle }
    }

    /// A new GPU context exists. Nothing cached for the old one is valid.
    pub fn on_surface_created(&mut self) {
        self.shared.resources.clear();
        tracing::info!("Surface created");
        self.handle.request_redraw();
    }

    pub fn on_surface_size_changed(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) {
        device.resize(width, height);
        self.handle
            .set_viewport(Viewport::new(0, 0, width as i32, height as i32));
        self.handle.request_redraw();
    }

    /// The GPU context is gone; drop its resources without touching it.
    pub fn on_surface_destroyed(&mut self) {
        self.shared.resources.clear();
        self.handle.surface_destroyed();
    }

    /// Submit the next frame, pick frames first. A pick frame whose caller
    /// has timed out is discarded instead.
    ///
    /// Returns `false` when no frame was waiting. Evicted textures are
    /// released either way.
    pub fn consume_frame(&mut self, device: &mut dyn RenderDevice) -> bool {
        let next = {
            let mut queues = self.shared.lock_queues();
            let frame = queues.pick.pop_front().or_else(|| queues.redraw.pop_front());
            frame.map(|frame| (frame, queues.epoch))
        };

        let submitted = match next {
            Some((frame, _)) if frame.pick.as_ref().is_some_and(|p| p.completion.is_abandoned()) => {
                tracing::debug!("Dropping pick frame {} nobody is waiting for", frame.sequence);
                self.shared.lock_metrics().discarded_frames += 1;
                self.shared.pool.release(frame);
                true
            }
            Some((mut frame, epoch)) => {
                self.submit(device, &mut frame);
                self.recycle(frame, epoch);
                true
            }
            None => false,
        };

        self.shared.resources.release_evicted(device);
        self.shared
            .resources
            .trim_stale_retrievals(self.shared.config.stale_retrieval_age());
        submitted
    }

    fn submit(&self, device: &mut dyn RenderDevice, frame: &mut Frame) {
        frame.state = FrameState::Submitting;
        let start = Instant::now();
        let result = {
            let mut dc = DrawContext::for_frame(device, frame);
            self.shared.controller.draw_frame(&mut dc, frame)
        };
        self.shared.lock_metrics().draw.record(start.elapsed());

        if let Err(e) = &result {
            tracing::error!("Frame {} submission failed: {e}", frame.sequence);
        }
        if let Some(pick) = &frame.pick {
            let picked = match result {
                Ok(()) => std::mem::take(&mut frame.picked_objects),
                Err(_) => PickedObjectList::new(),
            };
            pick.completion.complete(picked);
        }
    }

    /// Keep a redraw frame on display until the next one replaces it. Pick
    /// frames, and frames whose queues were drained meanwhile, go straight
    /// back to the pool.
    fn recycle(&self, mut frame: Frame, epoch: u64) {
        frame.state = FrameState::Idle;
        let released = {
            let mut queues = self.shared.lock_queues();
            if frame.is_pick_frame() || queues.epoch != epoch {
                Some(frame)
            } else {
                queues.current.replace(frame)
            }
        };
        if let Some(frame) = released {
            self.shared.pool.release(frame);
        }
    }
}

impl std::fmt::Debug for FrameRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRenderer").finish_non_exhaustive()
    }
}
