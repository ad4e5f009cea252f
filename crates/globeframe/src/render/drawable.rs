//! Submission-ready units of work and the queues that order them.

use std::fmt;
use std::sync::Arc;

use glam::{DMat3, DVec2};

use crate::error::Result;
use crate::resource::Texture;

use super::context::DrawContext;
use super::device::{QuadFill, Rgba};
use super::view::SurfaceCell;

/// Work enqueued during assembly and executed on the GPU thread.
///
/// Drawables carry window-space geometry; drawing them involves no
/// geographic computation.
pub trait Drawable: Send + fmt::Debug {
    fn draw(&self, dc: &mut DrawContext<'_>) -> Result<()>;
}

/// A texture draped over a sector of the globe.
pub struct DrawableSurfaceTexture {
    cells: Vec<SurfaceCell>,
    tex_coords: Vec<[DVec2; 4]>,
    texture: Arc<Texture>,
}

impl DrawableSurfaceTexture {
    /// `tex_transform` maps each cell's sector-local coordinates onto the
    /// texture's image coordinates.
    #[must_use]
    pub fn new(cells: Vec<SurfaceCell>, texture: Arc<Texture>, tex_transform: &DMat3) -> Self {
        let tex_coords = cells
            .iter()
            .map(|cell| cell.local.map(|st| tex_transform.transform_point2(st)))
            .collect();
        Self {
            cells,
            tex_coords,
            texture,
        }
    }

    #[must_use]
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    #[must_use]
    pub fn tex_coords(&self) -> &[[DVec2; 4]] {
        &self.tex_coords
    }
}

impl fmt::Debug for DrawableSurfaceTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawableSurfaceTexture")
            .field("cells", &self.cells.len())
            .field("texture", &self.texture)
            .finish()
    }
}

impl Drawable for DrawableSurfaceTexture {
    fn draw(&self, dc: &mut DrawContext<'_>) -> Result<()> {
        let texture = self.texture.bind(dc.device)?;
        for (cell, tex_coords) in self.cells.iter().zip(&self.tex_coords) {
            dc.device.draw_quad(
                &cell.corners,
                &QuadFill::Textured {
                    texture,
                    tex_coords: *tex_coords,
                },
            )?;
        }
        Ok(())
    }
}

/// A sector of the globe filled with one color. Used for terrain picking.
pub struct DrawableSurfaceColor {
    cells: Vec<SurfaceCell>,
    color: Rgba,
}

impl DrawableSurfaceColor {
    #[must_use]
    pub fn new(cells: Vec<SurfaceCell>, color: Rgba) -> Self {
        Self { cells, color }
    }
}

impl fmt::Debug for DrawableSurfaceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawableSurfaceColor")
            .field("cells", &self.cells.len())
            .field("color", &self.color)
            .finish()
    }
}

impl Drawable for DrawableSurfaceColor {
    fn draw(&self, dc: &mut DrawContext<'_>) -> Result<()> {
        let fill = QuadFill::Solid(self.color);
        for cell in &self.cells {
            dc.device.draw_quad(&cell.corners, &fill)?;
        }
        Ok(())
    }
}

/// A solid axis-aligned rectangle in window coordinates.
#[derive(Debug, Clone)]
pub struct DrawableScreenRect {
    corners: [DVec2; 4],
    color: Rgba,
}

impl DrawableScreenRect {
    #[must_use]
    pub fn new(center: DVec2, size: f64, color: Rgba) -> Self {
        let h = size * 0.5;
        Self {
            corners: [
                center + DVec2::new(-h, -h),
                center + DVec2::new(h, -h),
                center + DVec2::new(h, h),
                center + DVec2::new(-h, h),
            ],
            color,
        }
    }

    #[must_use]
    pub fn corners(&self) -> &[DVec2; 4] {
        &self.corners
    }
}

impl Drawable for DrawableScreenRect {
    fn draw(&self, dc: &mut DrawContext<'_>) -> Result<()> {
        dc.device
            .draw_quad(&self.corners, &QuadFill::Solid(self.color))
    }
}

/// Ordering applied by [`DrawableQueue::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest key first, such as z-order.
    Ascending,
    /// Largest key first, such as depth for back-to-front drawing.
    Descending,
}

struct QueueEntry {
    key: f64,
    ordinal: usize,
    drawable: Box<dyn Drawable>,
}

/// Drawables with sort keys. Equal keys keep their enqueue order.
pub struct DrawableQueue {
    entries: Vec<QueueEntry>,
    order: SortOrder,
}

impl fmt::Debug for DrawableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawableQueue")
            .field("len", &self.entries.len())
            .field("order", &self.order)
            .finish()
    }
}

impl DrawableQueue {
    #[must_use]
    pub fn new(order: SortOrder) -> Self {
        Self {
            entries: Vec::new(),
            order,
        }
    }

    pub fn offer(&mut self, drawable: Box<dyn Drawable>, key: f64) {
        let ordinal = self.entries.len();
        self.entries.push(QueueEntry {
            key,
            ordinal,
            drawable,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sort(&mut self) {
        let order = self.order;
        self.entries.sort_by(|a, b| {
            let by_key = match order {
                SortOrder::Ascending => a.key.total_cmp(&b.key),
                SortOrder::Descending => b.key.total_cmp(&a.key),
            };
            by_key.then(a.ordinal.cmp(&b.ordinal))
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Drawable> {
        self.entries.iter().map(|entry| entry.drawable.as_ref())
    }

    /// Drop every drawable, keeping the allocation for the next frame.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderDevice, SoftwareDevice};
    use crate::resource::{ImageData, ImageOptions};
    use crate::geom::Viewport;

    #[derive(Debug)]
    struct Tagged(u32);

    impl Drawable for Tagged {
        fn draw(&self, _dc: &mut DrawContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn tags(queue: &DrawableQueue) -> Vec<String> {
        queue.iter().map(|d| format!("{d:?}")).collect()
    }

    #[test]
    fn test_ascending_sort_is_stable() {
        let mut queue = DrawableQueue::new(SortOrder::Ascending);
        queue.offer(Box::new(Tagged(1)), 1.0);
        queue.offer(Box::new(Tagged(2)), 0.0);
        queue.offer(Box::new(Tagged(3)), 1.0);
        queue.offer(Box::new(Tagged(4)), 0.0);
        queue.sort();
        assert_eq!(tags(&queue), ["Tagged(2)", "Tagged(4)", "Tagged(1)", "Tagged(3)"]);
    }

    #[test]
    fn test_descending_sort_draws_far_first() {
        let mut queue = DrawableQueue::new(SortOrder::Descending);
        queue.offer(Box::new(Tagged(1)), 0.2);
        queue.offer(Box::new(Tagged(2)), 0.9);
        queue.offer(Box::new(Tagged(3)), 0.2);
        queue.sort();
        assert_eq!(tags(&queue), ["Tagged(2)", "Tagged(1)", "Tagged(3)"]);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_surface_texture_applies_transform() {
        let cell = SurfaceCell {
            corners: [
                DVec2::new(0.0, 0.0),
                DVec2::new(4.0, 0.0),
                DVec2::new(4.0, 4.0),
                DVec2::new(0.0, 4.0),
            ],
            local: [
                DVec2::new(0.0, 0.0),
                DVec2::new(1.0, 0.0),
                DVec2::new(1.0, 1.0),
                DVec2::new(0.0, 1.0),
            ],
            depth: 0.5,
        };
        let texture = Arc::new(Texture::new(
            Arc::new(ImageData::solid(2, 2, [9, 9, 9, 255])),
            ImageOptions::default(),
        ));
        let transform = *texture.tex_coord_transform();
        let drawable = DrawableSurfaceTexture::new(vec![cell], texture, &transform);
        assert_eq!(drawable.tex_coords()[0][0], DVec2::new(0.0, 1.0));
        assert_eq!(drawable.tex_coords()[0][2], DVec2::new(1.0, 0.0));

        let mut device = SoftwareDevice::new(4, 4);
        let mut dc = DrawContext::new(&mut device, Viewport::new(0, 0, 4, 4));
        drawable.draw(&mut dc).unwrap();
        assert_eq!(device.pixel(2, 2), Some([9, 9, 9, 255]));
        assert_eq!(device.texture_count(), 1);
        device.present();
    }
}
