//! Layers: the ordered units of content a scene renders.

mod renderable;
mod tiled;

pub use renderable::{Marker, Renderable, RenderableLayer};
pub use tiled::TiledImageLayer;

use crate::error::Result;
use crate::render::RenderContext;

/// Content that assembles drawables for a frame.
pub trait Layer: Send {
    fn display_name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether the layer takes part in pick frames.
    fn is_pick_enabled(&self) -> bool {
        true
    }

    /// Enqueue this layer's drawables. Runs on the driver thread.
    fn render(&mut self, rc: &mut RenderContext<'_>) -> Result<()>;
}

/// An ordered list of layers, rendered first to last.
#[derive(Default)]
pub struct LayerList {
    layers: Vec<Box<dyn Layer>>,
}

impl LayerList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    /// Insert a layer at `index`, or at the end when `index` is past it.
    pub fn insert_layer(&mut self, index: usize, layer: Box<dyn Layer>) {
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
    }

    pub fn remove_layer(&mut self, index: usize) -> Option<Box<dyn Layer>> {
        (index < self.layers.len()).then(|| self.layers.remove(index))
    }

    /// Index of the first layer with the given display name.
    #[must_use]
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|layer| layer.display_name() == name)
    }

    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(AsRef::as_ref)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut (dyn Layer + 'static)> {
        self.layers.get_mut(index).map(AsMut::as_mut)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(AsRef::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Layer + 'static)> {
        self.layers.iter_mut().map(AsMut::as_mut)
    }
}

impl std::fmt::Debug for LayerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|layer| layer.display_name()))
            .finish()
    }
}
