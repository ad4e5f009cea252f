//! The scene a frame is assembled from.

use crate::geom::{Camera, Globe, Viewport};
use crate::layer::LayerList;
use crate::render::ViewState;
use crate::terrain::Tessellator;

/// Camera, globe, layers and terrain. Owned by the driver thread.
pub struct Scene {
    pub globe: Globe,
    pub camera: Camera,
    /// Vertical field of view in degrees.
    pub field_of_view: f64,
    pub layers: LayerList,
    pub tessellator: Box<dyn Tessellator>,
}

impl Scene {
    pub const DEFAULT_FIELD_OF_VIEW: f64 = 45.0;

    #[must_use]
    pub fn new(tessellator: Box<dyn Tessellator>) -> Self {
        Self {
            globe: Globe::default(),
            camera: Camera::default(),
            field_of_view: Self::DEFAULT_FIELD_OF_VIEW,
            layers: LayerList::new(),
            tessellator,
        }
    }

    /// The view for the current camera over `viewport`.
    #[must_use]
    pub fn view_state(&self, viewport: Viewport) -> ViewState {
        ViewState::new(self.globe, self.camera, viewport, self.field_of_view)
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("globe", &self.globe)
            .field("camera", &self.camera)
            .field("field_of_view", &self.field_of_view)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
