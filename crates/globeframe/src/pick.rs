//! Color-coded picking.
//!
//! In a pick frame every pick-eligible object is drawn in a solid color that
//! encodes a frame-local identifier. The GPU thread reads the colors back under
//! the pick point and turns them into a [`PickedObjectList`].

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::geom::Position;
use crate::render::Rgba;

/// Largest identifier representable in 24 bits of color.
pub const MAX_PICK_IDENTIFIER: u32 = 0x00FF_FFFF;

/// Encode an identifier as an opaque color. Identifier 0 is the clear color.
#[must_use]
pub fn identifier_to_color(identifier: u32) -> Rgba {
    let id = identifier & MAX_PICK_IDENTIFIER;
    [(id >> 16) as u8, (id >> 8) as u8, id as u8, 255]
}

/// Decode a color read back from a pick frame.
#[must_use]
pub fn color_to_identifier(color: Rgba) -> u32 {
    (u32::from(color[0]) << 16) | (u32::from(color[1]) << 8) | u32::from(color[2])
}

/// Application data attached to a pickable object.
pub type UserObject = Arc<dyn Any + Send + Sync>;

/// One object found under a pick point or in a pick region.
#[derive(Clone)]
pub struct PickedObject {
    identifier: u32,
    user_object: Option<UserObject>,
    layer_name: Option<String>,
    terrain_position: Option<Position>,
    on_top: bool,
}

impl fmt::Debug for PickedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickedObject")
            .field("identifier", &self.identifier)
            .field("layer_name", &self.layer_name)
            .field("terrain_position", &self.terrain_position)
            .field("on_top", &self.on_top)
            .finish_non_exhaustive()
    }
}

impl PickedObject {
    #[must_use]
    pub fn from_renderable(
        identifier: u32,
        user_object: UserObject,
        layer_name: impl Into<String>,
    ) -> Self {
        Self {
            identifier,
            user_object: Some(user_object),
            layer_name: Some(layer_name.into()),
            terrain_position: None,
            on_top: false,
        }
    }

    #[must_use]
    pub fn from_terrain(identifier: u32, position: Position) -> Self {
        Self {
            identifier,
            user_object: None,
            layer_name: None,
            terrain_position: Some(position),
            on_top: false,
        }
    }

    #[must_use]
    pub fn identifier(&self) -> u32 {
        self.identifier
    }

    #[must_use]
    pub fn user_object(&self) -> Option<&UserObject> {
        self.user_object.as_ref()
    }

    /// The user object downcast to a concrete type.
    #[must_use]
    pub fn user_object_as<T: Any>(&self) -> Option<&T> {
        self.user_object.as_ref()?.downcast_ref::<T>()
    }

    #[must_use]
    pub fn layer_name(&self) -> Option<&str> {
        self.layer_name.as_deref()
    }

    #[must_use]
    pub fn terrain_position(&self) -> Option<Position> {
        self.terrain_position
    }

    #[must_use]
    pub fn is_terrain(&self) -> bool {
        self.terrain_position.is_some() && self.user_object.is_none()
    }

    #[must_use]
    pub fn is_on_top(&self) -> bool {
        self.on_top
    }

    pub fn mark_on_top(&mut self) {
        self.on_top = true;
    }
}

/// Objects found by one pick, ordered by identifier.
#[derive(Debug, Clone, Default)]
pub struct PickedObjectList {
    objects: BTreeMap<u32, PickedObject>,
}

impl PickedObjectList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, replacing any earlier object with the same identifier.
    pub fn offer(&mut self, object: PickedObject) {
        self.objects.insert(object.identifier, object);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PickedObject> {
        self.objects.values()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    #[must_use]
    pub fn picked_object_with_id(&self, identifier: u32) -> Option<&PickedObject> {
        self.objects.get(&identifier)
    }

    /// The first object marked as on top.
    #[must_use]
    pub fn top_picked_object(&self) -> Option<&PickedObject> {
        self.iter().find(|object| object.on_top)
    }

    #[must_use]
    pub fn terrain_picked_object(&self) -> Option<&PickedObject> {
        self.iter().find(|object| object.is_terrain())
    }

    #[must_use]
    pub fn has_non_terrain_objects(&self) -> bool {
        self.iter().any(|object| !object.is_terrain())
    }

    /// Keep the object drawn at the pick point and the terrain object.
    ///
    /// The object at the pick point is marked on top. When nothing but terrain
    /// is under the point, the terrain object is on top.
    pub fn resolve_top_pick(&mut self, identifier_at_point: u32) {
        let terrain_id = self.terrain_picked_object().map(PickedObject::identifier);
        let top_id = self
            .objects
            .contains_key(&identifier_at_point)
            .then_some(identifier_at_point);
        self.objects
            .retain(|id, _| Some(*id) == top_id || Some(*id) == terrain_id);
        if let Some(top) = top_id.and_then(|id| self.objects.get_mut(&id)) {
            top.mark_on_top();
        }
    }

    /// Keep every object whose color appears in a pick region, all on top.
    pub fn resolve_region_pick(&mut self, identifiers_in_region: &BTreeSet<u32>) {
        self.objects
            .retain(|id, _| identifiers_in_region.contains(id));
        for object in self.objects.values_mut() {
            object.mark_on_top();
        }
    }
}

impl<'a> IntoIterator for &'a PickedObjectList {
    type Item = &'a PickedObject;
    type IntoIter = std::collections::btree_map::Values<'a, u32, PickedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.values()
    }
}

/// The hand-off between a thread waiting on a pick and the GPU thread.
#[derive(Debug, Default)]
pub struct PickCompletion {
    result: Mutex<Option<PickedObjectList>>,
    signal: Condvar,
    abandoned: AtomicBool,
}

impl PickCompletion {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish the result and wake the waiter. Later results are ignored.
    pub fn complete(&self, list: PickedObjectList) {
        let mut result = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        if result.is_none() {
            *result = Some(list);
            self.signal.notify_all();
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Block until the result is published or `timeout` elapses. After a
    /// timeout the pick counts as abandoned.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> Option<PickedObjectList> {
        let guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |result| result.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            self.abandoned.store(true, Ordering::Release);
        }
        guard.clone()
    }

    /// Whether the waiting thread gave up before a result arrived.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}
