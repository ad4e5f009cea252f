//! What happens inside a frame: assembly on the driver thread, submission on
//! the GPU thread.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::pick::{PickedObject, color_to_identifier, identifier_to_color};
use crate::scene::Scene;

use super::context::{DrawContext, RenderContext};
use super::drawable::DrawableSurfaceColor;
use super::frame::Frame;

/// Drives the two phases of a frame.
///
/// `render_frame` runs on the driver thread and must not touch the device.
/// `draw_frame` runs on the GPU thread and must not touch the scene.
pub trait FrameController: Send + Sync {
    fn render_frame(&self, scene: &mut Scene, rc: &mut RenderContext<'_>) -> Result<()>;

    fn draw_frame(&self, dc: &mut DrawContext<'_>, frame: &mut Frame) -> Result<()>;
}

/// Tessellates terrain, renders each layer in order and draws the queues.
#[derive(Debug, Clone, Copy)]
pub struct BasicFrameController {
    /// Cells per side when drawing terrain tiles for picking.
    pub terrain_pick_density: usize,
}

impl Default for BasicFrameController {
    fn default() -> Self {
        Self {
            terrain_pick_density: 4,
        }
    }
}

/// Terrain is drawn beneath everything else layers put on the surface.
const TERRAIN_PICK_Z_ORDER: f64 = -1.0;

impl BasicFrameController {
    fn tessellate(scene: &mut Scene, rc: &mut RenderContext<'_>) {
        match scene.tessellator.tessellate(&rc.view) {
            Ok(terrain) => rc.terrain = terrain,
            Err(e) => tracing::error!("Terrain tessellation failed: {e}"),
        }
    }

    fn pick_terrain(&self, rc: &mut RenderContext<'_>) {
        let Some(ray) = rc.pick_ray() else {
            return;
        };
        let Some(hit) = rc.globe().intersect(&ray) else {
            return;
        };
        let Some(id) = rc.next_pick_id() else {
            return;
        };
        let position = rc.globe().cartesian_to_geographic(hit);
        rc.offer_picked_object(PickedObject::from_terrain(id, position));

        let color = identifier_to_color(id);
        let sectors: Vec<_> = rc.terrain.tiles().iter().map(|tile| tile.sector).collect();
        for sector in &sectors {
            let cells = rc.view.project_sector(sector, self.terrain_pick_density);
            if !cells.is_empty() {
                rc.offer_surface_drawable(
                    Box::new(DrawableSurfaceColor::new(cells, color)),
                    TERRAIN_PICK_Z_ORDER,
                );
            }
        }
    }

    fn render_layers(scene: &mut Scene, rc: &mut RenderContext<'_>) {
        let pick_mode = rc.is_pick_mode();
        for layer in scene.layers.iter_mut() {
            if !layer.is_enabled() || (pick_mode && !layer.is_pick_enabled()) {
                continue;
            }
            rc.current_layer = Some(layer.display_name().to_string());
            if let Err(e) = layer.render(rc) {
                tracing::error!("Layer '{}' failed to render: {e}", layer.display_name());
            }
        }
        rc.current_layer = None;
    }

    fn draw_drawables(dc: &mut DrawContext<'_>, frame: &Frame) {
        let queues = [&frame.surface_drawables, &frame.screen_drawables];
        for drawable in queues.into_iter().flat_map(|queue| queue.iter()) {
            if let Err(e) = drawable.draw(dc) {
                tracing::error!("Drawable {drawable:?} failed: {e}");
            }
        }
    }

    /// Read back the pick viewport and keep the objects whose colors appear.
    fn resolve_pick(dc: &mut DrawContext<'_>, frame: &mut Frame) -> Result<()> {
        let Some((region, point)) = frame.pick.as_ref().map(|pick| (pick.viewport, pick.point))
        else {
            return Ok(());
        };
        let pixels = dc.device.read_pixels(region)?;

        match point {
            Some((x, y)) => {
                let index = region.contains(x, y).then(|| {
                    ((y - region.y) * region.width + (x - region.x)) as usize
                });
                let id = index
                    .and_then(|i| pixels.get(i))
                    .map_or(0, |color| color_to_identifier(*color));
                frame.picked_objects.resolve_top_pick(id);
            }
            None => {
                let ids: BTreeSet<u32> = pixels
                    .iter()
                    .map(|color| color_to_identifier(*color))
                    .filter(|id| *id != 0)
                    .collect();
                frame.picked_objects.resolve_region_pick(&ids);
            }
        }
        Ok(())
    }
}

impl FrameController for BasicFrameController {
    fn render_frame(&self, scene: &mut Scene, rc: &mut RenderContext<'_>) -> Result<()> {
        Self::tessellate(scene, rc);
        if rc.is_pick_mode() {
            self.pick_terrain(rc);
        }
        Self::render_layers(scene, rc);
        rc.sort_drawables();
        Ok(())
    }

    fn draw_frame(&self, dc: &mut DrawContext<'_>, frame: &mut Frame) -> Result<()> {
        match dc.pick_viewport {
            Some(pick_viewport) => {
                dc.device.set_viewport(pick_viewport);
                dc.device.clear(identifier_to_color(0));
            }
            None => {
                dc.device.set_viewport(dc.viewport);
                dc.device.clear(frame.clear_color);
            }
        }

        Self::draw_drawables(dc, frame);

        if dc.is_pick_mode() {
            Self::resolve_pick(dc, frame)
        } else {
            dc.device.present();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::geom::{Camera, Globe, Position, Viewport};
    use crate::layer::{Layer, Marker, RenderableLayer};
    use crate::pick::PickCompletion;
    use crate::render::{FramePool, PickRequest, SoftwareDevice};
    use crate::resource::{FileImageLoader, RenderResourceCache, RetrieverConfig};
    use crate::terrain::BasicTessellator;

    struct Failing;

    impl Layer for Failing {
        fn display_name(&self) -> &str {
            "failing"
        }

        fn render(&mut self, _rc: &mut RenderContext<'_>) -> Result<()> {
            Err(Error::Render {
                context: "failing".to_string(),
                message: "no data".to_string(),
            })
        }
    }

    fn scene() -> Scene {
        let mut scene = Scene::new(Box::new(BasicTessellator::new().unwrap()));
        scene.camera = Camera::looking_down(0.0, 0.0, 1_000_000.0);
        scene.layers.add_layer(Box::new(Failing));
        let mut markers = RenderableLayer::new("Markers");
        markers.add_renderable(Box::new(
            Marker::new("origin", Position::new(0.0, 0.0, 0.0)).with_color([255, 0, 0, 255]),
        ));
        scene.layers.add_layer(Box::new(markers));
        scene
    }

    fn resources() -> Arc<RenderResourceCache> {
        Arc::new(
            RenderResourceCache::new(
                1024 * 1024,
                None,
                RetrieverConfig::default(),
                Arc::new(FileImageLoader),
            )
            .unwrap(),
        )
    }

    fn run(scene: &mut Scene, frame: &mut Frame, device: &mut SoftwareDevice) {
        let controller = BasicFrameController::default();
        let viewport = Viewport::new(0, 0, 200, 100);
        {
            let mut rc = RenderContext::new(scene.view_state(viewport), resources(), frame);
            controller.render_frame(scene, &mut rc).unwrap();
        }
        let mut dc = DrawContext::for_frame(device, frame);
        controller.draw_frame(&mut dc, frame).unwrap();
    }

    #[test]
    fn test_failing_layer_does_not_blank_frame() {
        let mut scene = scene();
        let pool = FramePool::new(1);
        let mut frame = pool.acquire().unwrap();
        let mut device = SoftwareDevice::new(200, 100);
        run(&mut scene, &mut frame, &mut device);

        assert_eq!(device.presented_frames(), 1);
        assert_eq!(device.pixel(100, 50), Some([255, 0, 0, 255]));
        assert_eq!(device.pixel(10, 10), Some(frame.clear_color));
    }

    #[test]
    fn test_point_pick_finds_marker_over_terrain() {
        let mut scene = scene();
        let pool = FramePool::new(1);
        let mut frame = pool.acquire().unwrap();
        let view = scene.view_state(Viewport::new(0, 0, 200, 100));
        frame.pick = Some(PickRequest {
            viewport: Viewport::new(99, 49, 3, 3),
            point: Some((100, 50)),
            ray: view.ray_through_screen_point(100.5, 49.5),
            completion: PickCompletion::new(),
        });
        let mut device = SoftwareDevice::new(200, 100);
        run(&mut scene, &mut frame, &mut device);

        assert_eq!(device.presented_frames(), 0);
        assert_eq!(frame.picked_objects.len(), 2);
        let top = frame.picked_objects.top_picked_object().unwrap();
        assert_eq!(top.user_object_as::<String>().map(String::as_str), Some("origin"));
        assert!(frame.picked_objects.terrain_picked_object().is_some());
    }

    #[test]
    fn test_region_pick_over_empty_space() {
        let mut scene = Scene::new(Box::new(BasicTessellator::new().unwrap()));
        scene.camera = Camera::looking_down(0.0, 0.0, 1_000_000.0);
        let pool = FramePool::new(1);
        let mut frame = pool.acquire().unwrap();
        frame.pick = Some(PickRequest {
            viewport: Viewport::new(0, 0, 20, 20),
            point: None,
            ray: None,
            completion: PickCompletion::new(),
        });
        let mut device = SoftwareDevice::new(200, 100);
        run(&mut scene, &mut frame, &mut device);
        assert!(frame.picked_objects.is_empty());
    }

    #[test]
    fn test_terrain_pick_reports_position() {
        let mut scene = Scene::new(Box::new(BasicTessellator::new().unwrap()));
        scene.camera = Camera::looking_down(10.0, 20.0, 1_000_000.0);
        let pool = FramePool::new(1);
        let mut frame = pool.acquire().unwrap();
        let view = scene.view_state(Viewport::new(0, 0, 200, 100));
        frame.pick = Some(PickRequest {
            viewport: Viewport::new(99, 49, 3, 3),
            point: Some((100, 50)),
            ray: view.ray_through_screen_point(100.5, 49.5),
            completion: PickCompletion::new(),
        });
        let mut device = SoftwareDevice::new(200, 100);
        run(&mut scene, &mut frame, &mut device);

        let terrain = frame.picked_objects.terrain_picked_object().unwrap();
        let position = terrain.terrain_position().unwrap();
        assert!((position.latitude - 10.0).abs() < 0.1);
        assert!((position.longitude - 20.0).abs() < 0.1);
        assert!(terrain.is_on_top());
    }
}
