//! Geometric primitives shared by assembly and picking.

mod camera;
mod frustum;
mod globe;
mod sector;
mod viewport;

pub use camera::Camera;
pub use frustum::Frustum;
pub use globe::{Globe, Position, Ray, WGS84_EQUATORIAL_RADIUS};
pub use sector::Sector;
pub use viewport::Viewport;
