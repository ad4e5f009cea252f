//! Cross-thread messages to the driver thread and the host callbacks that
//! deliver them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::geom::Viewport;

/// Requests marshalled onto the driver thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMessage {
    RequestRedraw,
    /// Drop every cached resource, such as after the GPU context was lost.
    ClearCache,
    /// The drawing surface now covers `viewport`.
    SetViewport(Viewport),
    SurfaceDestroyed,
}

/// Callbacks into the windowing host.
///
/// The host owns the driver and GPU threads and decides when each runs.
pub trait SurfaceHost: Send + Sync {
    /// Schedule a call to `FrameRenderer::consume_frame` on the GPU thread.
    fn request_render(&self);

    /// Start calling `FrameDriver::on_display_refresh` once per display
    /// refresh.
    fn register_redraw(&self);

    /// Stop the per-refresh calls started by [`Self::register_redraw`].
    fn unregister_redraw(&self);

    /// Wake the driver thread so it calls `FrameDriver::process_messages`.
    fn post_to_driver(&self);
}

/// A host that ignores every callback, for hosts that poll instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollingHost;

impl SurfaceHost for PollingHost {
    fn request_render(&self) {}

    fn register_redraw(&self) {}

    fn unregister_redraw(&self) {}

    fn post_to_driver(&self) {}
}

/// Sends messages to the driver thread from any thread.
#[derive(Clone)]
pub struct RedrawHandle {
    sender: async_channel::Sender<DriverMessage>,
    redraw_queued: Arc<AtomicBool>,
    host: Arc<dyn SurfaceHost>,
}

impl std::fmt::Debug for RedrawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedrawHandle")
            .field("redraw_queued", &self.redraw_queued.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RedrawHandle {
    pub(crate) fn new(
        sender: async_channel::Sender<DriverMessage>,
        host: Arc<dyn SurfaceHost>,
    ) -> Self {
        Self {
            sender,
            redraw_queued: Arc::new(AtomicBool::new(false)),
            host,
        }
    }

    /// Ask for a redraw. Requests made before the driver handles the first
    /// one collapse into it.
    pub fn request_redraw(&self) {
        if !self.redraw_queued.swap(true, Ordering::AcqRel) {
            self.send(DriverMessage::RequestRedraw);
        }
    }

    pub fn clear_cache(&self) {
        self.send(DriverMessage::ClearCache);
    }

    pub(crate) fn set_viewport(&self, viewport: Viewport) {
        self.send(DriverMessage::SetViewport(viewport));
    }

    pub(crate) fn surface_destroyed(&self) {
        self.send(DriverMessage::SurfaceDestroyed);
    }

    /// Called by the driver before it handles a redraw request.
    pub(crate) fn acknowledge_redraw(&self) {
        self.redraw_queued.store(false, Ordering::Release);
    }

    fn send(&self, message: DriverMessage) {
        if self.sender.try_send(message).is_err() {
            tracing::debug!("Driver is gone, dropping {message:?}");
            return;
        }
        self.host.post_to_driver();
    }
}
