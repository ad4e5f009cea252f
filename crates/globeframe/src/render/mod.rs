//! Frames, drawables and the two contexts a frame passes through.

mod context;
mod controller;
mod device;
mod drawable;
mod frame;
mod software;
mod view;

pub use context::{DrawContext, RenderContext};
pub use controller::{BasicFrameController, FrameController};
pub use device::{QuadFill, RenderDevice, Rgba, TextureId};
pub use drawable::{
    Drawable, DrawableQueue, DrawableScreenRect, DrawableSurfaceColor, DrawableSurfaceTexture,
    SortOrder,
};
pub use frame::{Frame, FramePool, FrameState, PickRequest};
pub use software::SoftwareDevice;
pub use view::{SurfaceCell, ViewState, distance_to_view_globe_extents, viewing_transform};
