//! The graphics API seen by the GPU thread.
//!
//! Everything behind [`RenderDevice`] is only ever called from the thread that
//! owns the device. Coordinates are window coordinates: pixels with the origin
//! at the lower-left corner of the surface.

use glam::DVec2;

use crate::error::Result;
use crate::geom::Viewport;
use crate::resource::{ImageData, ImageOptions};

/// Handle to a texture created by a [`RenderDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// An 8-bit RGBA color.
pub type Rgba = [u8; 4];

/// How a quad is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadFill {
    /// A single color.
    Solid(Rgba),
    /// A texture sampled at per-corner coordinates. Texture coordinates have
    /// their origin at the top-left texel.
    Textured {
        texture: TextureId,
        tex_coords: [DVec2; 4],
    },
}

/// GPU-thread graphics operations.
pub trait RenderDevice {
    /// Upload an image, returning a handle valid until [`Self::delete_texture`].
    fn create_texture(&mut self, image: &ImageData, options: &ImageOptions) -> Result<TextureId>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Resize the drawing surface.
    fn resize(&mut self, width: u32, height: u32);

    /// Limit subsequent clears and draws to `viewport`.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Fill the current viewport with `color`.
    fn clear(&mut self, color: Rgba);

    /// Draw a quad whose corners are given counter-clockwise starting at the
    /// lower-left: southwest, southeast, northeast, northwest.
    fn draw_quad(&mut self, corners: &[DVec2; 4], fill: &QuadFill) -> Result<()>;

    /// Read back a rectangle of pixels, rows bottom to top.
    fn read_pixels(&mut self, region: Viewport) -> Result<Vec<Rgba>>;

    /// Show the finished frame.
    fn present(&mut self);
}
