//! Layers of individually rendered objects.

use std::sync::Arc;

use glam::DVec2;

use crate::error::Result;
use crate::geom::{Position, Viewport};
use crate::pick::{PickedObject, UserObject, identifier_to_color};
use crate::render::{DrawableScreenRect, RenderContext, Rgba};

use super::Layer;

/// One object within a [`RenderableLayer`].
pub trait Renderable: Send {
    fn display_name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    fn render(&mut self, rc: &mut RenderContext<'_>) -> Result<()>;
}

/// A layer holding renderables. A renderable that fails is logged and skipped.
pub struct RenderableLayer {
    display_name: String,
    enabled: bool,
    pick_enabled: bool,
    renderables: Vec<Box<dyn Renderable>>,
}

impl RenderableLayer {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            enabled: true,
            pick_enabled: true,
            renderables: Vec::new(),
        }
    }

    pub fn add_renderable(&mut self, renderable: Box<dyn Renderable>) {
        self.renderables.push(renderable);
    }

    pub fn remove_renderable(&mut self, index: usize) -> Option<Box<dyn Renderable>> {
        (index < self.renderables.len()).then(|| self.renderables.remove(index))
    }

    pub fn clear(&mut self) {
        self.renderables.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.renderables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renderables.is_empty()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_pick_enabled(&mut self, pick_enabled: bool) {
        self.pick_enabled = pick_enabled;
    }
}

impl Layer for RenderableLayer {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_pick_enabled(&self) -> bool {
        self.pick_enabled
    }

    fn render(&mut self, rc: &mut RenderContext<'_>) -> Result<()> {
        for renderable in self.renderables.iter_mut().filter(|r| r.is_enabled()) {
            if let Err(e) = renderable.render(rc) {
                tracing::error!(
                    "Renderable '{}' in layer '{}' failed: {e}",
                    renderable.display_name(),
                    self.display_name
                );
            }
        }
        Ok(())
    }
}

/// A square of fixed screen size anchored at a geographic position.
pub struct Marker {
    name: String,
    position: Position,
    size: f64,
    color: Rgba,
    enabled: bool,
    user_object: UserObject,
}

impl Marker {
    pub const DEFAULT_SIZE: f64 = 8.0;

    /// A marker whose user object is its name.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        let name = name.into();
        Self {
            user_object: Arc::new(name.clone()),
            name,
            position,
            size: Self::DEFAULT_SIZE,
            color: [255, 255, 255, 255],
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    /// Attach the object reported when this marker is picked.
    #[must_use]
    pub fn with_user_object(mut self, user_object: UserObject) -> Self {
        self.user_object = user_object;
        self
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn screen_bounds(center: DVec2, size: f64) -> Viewport {
        let half = size * 0.5;
        let x = (center.x - half).floor() as i32;
        let y = (center.y - half).floor() as i32;
        let extent = size.ceil() as i32 + 1;
        Viewport::new(x, y, extent, extent)
    }
}

impl Renderable for Marker {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn render(&mut self, rc: &mut RenderContext<'_>) -> Result<()> {
        let p = self.position;
        let point = rc
            .globe()
            .geographic_to_cartesian(p.latitude, p.longitude, p.altitude);
        if !rc.view.is_facing(point) {
            return Ok(());
        }
        let Some(window) = rc.view.project(point) else {
            return Ok(());
        };
        let center = window.truncate();

        let color = match rc.pick_viewport() {
            Some(pick_viewport) => {
                if !Self::screen_bounds(center, self.size).intersects(&pick_viewport) {
                    return Ok(());
                }
                let Some(id) = rc.next_pick_id() else {
                    return Ok(());
                };
                let layer_name = rc.current_layer.clone().unwrap_or_default();
                rc.offer_picked_object(PickedObject::from_renderable(
                    id,
                    Arc::clone(&self.user_object),
                    layer_name,
                ));
                identifier_to_color(id)
            }
            None => self.color,
        };

        rc.offer_screen_drawable(
            Box::new(DrawableScreenRect::new(center, self.size, color)),
            window.z,
        );
        Ok(())
    }
}
