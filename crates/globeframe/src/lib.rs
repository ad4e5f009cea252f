//! Frame pipeline, tiled level of detail and color picking for a 3D globe.
//!
//! Rendering is split into two phases that run on different threads:
//!
//! - **Assembly** (driver thread): the camera, terrain and layers produce
//!   drawables into a pooled [`Frame`](render::Frame).
//! - **Submission** (GPU thread): the frame's drawables are executed against a
//!   [`RenderDevice`](render::RenderDevice). No geographic math happens here.
//!
//! Frames move between the two through a small bounded queue. Picking reuses
//! the same frames, drawing each pickable object in a color that encodes its
//! identifier and reading the colors back.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use globeframe::{Pipeline, PipelineConfig, PollingHost, Scene};
//! use globeframe::resource::FileImageLoader;
//! use globeframe::terrain::BasicTessellator;
//!
//! let scene = Scene::new(Box::new(BasicTessellator::new()?));
//! let (mut driver, mut renderer) = Pipeline::new(
//!     PipelineConfig::default(),
//!     scene,
//!     Arc::new(PollingHost),
//!     Arc::new(FileImageLoader),
//! )?
//! .into_parts();
//!
//! // Driver thread.
//! driver.on_display_refresh();
//! let picked = driver.pick(320.0, 240.0)?;
//!
//! // GPU thread.
//! renderer.consume_frame(&mut device);
//! ```

mod error;
pub mod geom;
pub mod layer;
mod lru;
pub mod pick;
pub mod pipeline;
pub mod render;
pub mod resource;
mod scene;
pub mod terrain;
pub mod tile;

pub use error::{Error, Result};
pub use lru::LruCache;
pub use pick::{PickedObject, PickedObjectList};
pub use pipeline::{
    FrameDriver, FrameRenderer, Pipeline, PipelineConfig, PipelineMetrics, PollingHost,
    ProduceStatus, RedrawHandle, SurfaceHost,
};
pub use scene::Scene;
