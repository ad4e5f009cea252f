//! The two views of a frame: assembly on the driver thread and submission on
//! the GPU thread.

use std::sync::Arc;

use glam::{DMat4, DVec2};

use crate::geom::{Globe, Ray, Viewport};
use crate::pick::{MAX_PICK_IDENTIFIER, PickedObject};
use crate::resource::RenderResourceCache;
use crate::terrain::TerrainGeometry;

use super::device::RenderDevice;
use super::drawable::Drawable;
use super::frame::Frame;
use super::view::ViewState;

/// Assembly-time state: the camera and globe, the terrain, a handle to the
/// resource cache, and the frame whose queues are being filled.
pub struct RenderContext<'a> {
    pub view: ViewState,
    pub resources: Arc<RenderResourceCache>,
    pub terrain: TerrainGeometry,
    /// Display name of the layer being rendered.
    pub current_layer: Option<String>,
    frame: &'a mut Frame,
    next_pick_id: u32,
    redraw_requested: bool,
}

impl<'a> RenderContext<'a> {
    /// Start assembling `frame`. For pick frames the culling frustum is
    /// narrowed to the pick viewport.
    pub fn new(view: ViewState, resources: Arc<RenderResourceCache>, frame: &'a mut Frame) -> Self {
        let view = match &frame.pick {
            Some(pick) => view.with_pick_viewport(&pick.viewport),
            None => view,
        };
        frame.viewport = view.viewport;
        frame.modelview = view.modelview;
        frame.projection = view.projection;
        frame.modelview_projection = view.modelview_projection;
        Self {
            view,
            resources,
            terrain: TerrainGeometry::default(),
            current_layer: None,
            frame,
            next_pick_id: 1,
            redraw_requested: false,
        }
    }

    #[must_use]
    pub fn globe(&self) -> &Globe {
        &self.view.globe
    }

    #[must_use]
    pub fn is_pick_mode(&self) -> bool {
        self.frame.pick.is_some()
    }

    #[must_use]
    pub fn pick_viewport(&self) -> Option<Viewport> {
        self.frame.pick.as_ref().map(|pick| pick.viewport)
    }

    /// The pick pixel center in window coordinates, for point picks.
    #[must_use]
    pub fn pick_point(&self) -> Option<DVec2> {
        self.frame.pick_point()
    }

    #[must_use]
    pub fn pick_ray(&self) -> Option<Ray> {
        self.frame.pick.as_ref().and_then(|pick| pick.ray)
    }

    /// A pick identifier unique within this frame.
    ///
    /// Returns `None` once the 24-bit identifier space is exhausted.
    pub fn next_pick_id(&mut self) -> Option<u32> {
        if self.next_pick_id > MAX_PICK_IDENTIFIER {
            tracing::warn!("Pick identifiers exhausted; remaining objects are not pickable");
            return None;
        }
        let id = self.next_pick_id;
        self.next_pick_id += 1;
        Some(id)
    }

    pub fn offer_picked_object(&mut self, object: PickedObject) {
        self.frame.picked_objects.offer(object);
    }

    /// Enqueue a drawable that drapes the globe surface, ordered by `z_order`.
    pub fn offer_surface_drawable(&mut self, drawable: Box<dyn Drawable>, z_order: f64) {
        self.frame.surface_drawables.offer(drawable, z_order);
    }

    /// Enqueue a screen-space drawable, drawn back to front by `depth`.
    pub fn offer_screen_drawable(&mut self, drawable: Box<dyn Drawable>, depth: f64) {
        self.frame.screen_drawables.offer(drawable, depth);
    }

    #[must_use]
    pub fn surface_drawable_count(&self) -> usize {
        self.frame.surface_drawables.len()
    }

    #[must_use]
    pub fn screen_drawable_count(&self) -> usize {
        self.frame.screen_drawables.len()
    }

    #[must_use]
    pub fn picked_object_count(&self) -> usize {
        self.frame.picked_objects.len()
    }

    pub fn sort_drawables(&mut self) {
        self.frame.surface_drawables.sort();
        self.frame.screen_drawables.sort();
    }

    /// Ask for another frame once this one is done, such as when content is
    /// still animating.
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    #[must_use]
    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }
}

/// Submission-time state: the device, the frame's matrices and viewport, and
/// the pick rectangle. Holds no geographic state.
pub struct DrawContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub viewport: Viewport,
    pub modelview_projection: DMat4,
    pub pick_viewport: Option<Viewport>,
}

impl<'a> DrawContext<'a> {
    #[must_use]
    pub fn new(device: &'a mut dyn RenderDevice, viewport: Viewport) -> Self {
        Self {
            device,
            viewport,
            modelview_projection: DMat4::IDENTITY,
            pick_viewport: None,
        }
    }

    /// A context for submitting `frame`.
    #[must_use]
    pub fn for_frame(device: &'a mut dyn RenderDevice, frame: &Frame) -> Self {
        Self {
            device,
            viewport: frame.viewport,
            modelview_projection: frame.modelview_projection,
            pick_viewport: frame.pick.as_ref().map(|pick| pick.viewport),
        }
    }

    #[must_use]
    pub fn is_pick_mode(&self) -> bool {
        self.pick_viewport.is_some()
    }
}
