//! Render resources: image sources, textures and the cache that owns them.

mod cache;
mod image;
mod retriever;
mod texture;

pub use cache::{CacheStats, RenderResourceCache, RetrievalListener, recommended_cache_capacity};
pub use image::{
    FileImageLoader, ImageData, ImageLoader, ImageOptions, ImageSource, Resampling, WrapMode,
};
pub use retriever::{
    FetchFn, RetrievalStatus, Retriever, RetrieverCallback, RetrieverConfig,
};
pub use texture::Texture;
