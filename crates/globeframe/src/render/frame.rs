//! Frames and the pool they are recycled through.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use glam::{DMat4, DVec2};

use crate::geom::{Ray, Viewport};
use crate::pick::{PickCompletion, PickedObjectList};

use super::device::Rgba;
use super::drawable::{DrawableQueue, SortOrder};

/// Where a frame is in the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameState {
    /// In the pool or freshly acquired.
    #[default]
    Idle,
    Assembling,
    /// Waiting in a queue for the GPU thread.
    Queued,
    Submitting,
}

/// What a pick frame is looking for.
#[derive(Debug, Clone)]
pub struct PickRequest {
    /// The pixels that are drawn and read back, in window coordinates.
    pub viewport: Viewport,
    /// The pixel under a point pick, in window coordinates. `None` for
    /// region picks.
    pub point: Option<(i32, i32)>,
    /// Ray through the pick point, for terrain picking.
    pub ray: Option<Ray>,
    /// Signalled by the GPU thread once the pick is resolved.
    pub completion: Arc<PickCompletion>,
}

/// One pass's worth of draw state, handed from assembly to submission.
///
/// A frame is owned by exactly one stage at a time and moves between threads
/// by value.
pub struct Frame {
    slot: usize,
    pub state: FrameState,
    /// Increases with every frame produced by a pipeline.
    pub sequence: u64,
    pub viewport: Viewport,
    pub modelview: DMat4,
    pub projection: DMat4,
    pub modelview_projection: DMat4,
    pub clear_color: Rgba,
    /// Drawn first, ordered by z-order.
    pub surface_drawables: DrawableQueue,
    /// Drawn after surface drawables, back to front.
    pub screen_drawables: DrawableQueue,
    pub pick: Option<PickRequest>,
    pub picked_objects: PickedObjectList,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("slot", &self.slot)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .field("viewport", &self.viewport)
            .field("surface_drawables", &self.surface_drawables.len())
            .field("screen_drawables", &self.screen_drawables.len())
            .field("pick", &self.pick.is_some())
            .finish_non_exhaustive()
    }
}

impl Frame {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            state: FrameState::Idle,
            sequence: 0,
            viewport: Viewport::default(),
            modelview: DMat4::IDENTITY,
            projection: DMat4::IDENTITY,
            modelview_projection: DMat4::IDENTITY,
            clear_color: [0, 0, 0, 255],
            surface_drawables: DrawableQueue::new(SortOrder::Ascending),
            screen_drawables: DrawableQueue::new(SortOrder::Descending),
            pick: None,
            picked_objects: PickedObjectList::new(),
        }
    }

    /// The pool slot this frame belongs to.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub fn is_pick_frame(&self) -> bool {
        self.pick.is_some()
    }

    /// Pick point as a pixel center, in window coordinates.
    #[must_use]
    pub fn pick_point(&self) -> Option<DVec2> {
        let (x, y) = self.pick.as_ref()?.point?;
        Some(DVec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5))
    }

    /// Publish an empty pick result so a waiting thread is not left hanging.
    pub fn cancel_pick(&mut self) {
        if let Some(pick) = &self.pick {
            pick.completion.complete(PickedObjectList::new());
        }
    }

    fn reset(&mut self) {
        self.cancel_pick();
        self.state = FrameState::Idle;
        self.surface_drawables.clear();
        self.screen_drawables.clear();
        self.pick = None;
        self.picked_objects.clear();
    }
}

struct PoolSlots {
    slots: Vec<Option<Frame>>,
    free: Vec<usize>,
}

/// A fixed arena of frames with an explicit free list.
///
/// Frames are created once and reused; the pool never allocates after
/// construction.
pub struct FramePool {
    inner: Mutex<PoolSlots>,
    released: Condvar,
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity", &self.capacity())
            .field("live", &self.live())
            .finish()
    }
}

impl FramePool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(PoolSlots {
                slots: (0..capacity).map(|slot| Some(Frame::new(slot))).collect(),
                free: (0..capacity).rev().collect(),
            }),
            released: Condvar::new(),
        }
    }

    /// Take a free frame, or `None` if every frame is in use.
    pub fn acquire(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::take_free(&mut inner)
    }

    /// Take a free frame, waiting up to `timeout` for one to be released.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Frame> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut inner, _) = self
            .released
            .wait_timeout_while(inner, timeout, |inner| inner.free.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        Self::take_free(&mut inner)
    }

    fn take_free(inner: &mut PoolSlots) -> Option<Frame> {
        let slot = inner.free.pop()?;
        inner.slots[slot].take()
    }

    /// Return a frame to the pool, clearing its drawables and cancelling any
    /// pick it carried.
    pub fn release(&self, mut frame: Frame) {
        frame.reset();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = frame.slot;
        if inner.slots.get(slot).is_some_and(Option::is_none) {
            inner.slots[slot] = Some(frame);
            inner.free.push(slot);
            self.released.notify_one();
        } else {
            tracing::warn!("Frame slot {slot} released twice");
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }

    /// Number of frames currently out of the pool.
    #[must_use]
    pub fn live(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.slots.len() - inner.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::drawable::DrawableScreenRect;

    #[test]
    fn test_pool_never_exceeds_capacity() {
        let pool = FramePool::new(3);
        let frames: Vec<_> = std::iter::from_fn(|| pool.acquire()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(pool.live(), 3);
        assert!(pool.acquire().is_none());

        for frame in frames {
            pool.release(frame);
        }
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn test_release_resets_frame() {
        let pool = FramePool::new(1);
        let mut frame = pool.acquire().unwrap();
        let completion = PickCompletion::new();
        frame.state = FrameState::Queued;
        frame
            .screen_drawables
            .offer(Box::new(DrawableScreenRect::new(DVec2::ZERO, 2.0, [0; 4])), 0.0);
        frame.pick = Some(PickRequest {
            viewport: Viewport::new(0, 0, 3, 3),
            point: Some((1, 1)),
            ray: None,
            completion: Arc::clone(&completion),
        });
        pool.release(frame);

        // The waiter gets an empty result instead of timing out.
        assert!(completion.wait(Duration::ZERO).unwrap().is_empty());
        let frame = pool.acquire().unwrap();
        assert_eq!(frame.state, FrameState::Idle);
        assert!(frame.screen_drawables.is_empty());
        assert!(frame.pick.is_none());
    }

    #[test]
    fn test_acquire_timeout_waits_for_release() {
        let pool = Arc::new(FramePool::new(1));
        let frame = pool.acquire().unwrap();
        assert!(pool.acquire_timeout(Duration::from_millis(5)).is_none());

        let releaser = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                pool.release(frame);
            })
        };
        let frame = pool.acquire_timeout(Duration::from_secs(5));
        releaser.join().unwrap();
        assert!(frame.is_some());
    }
}
