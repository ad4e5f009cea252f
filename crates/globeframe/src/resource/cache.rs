//! The render resource cache.
//!
//! Textures are keyed by their [`ImageSource`] and costed in bytes. Misses
//! schedule a background retrieval; decoded images wait in a small retrieval
//! cache until the next frame turns them into textures. Evicted textures are
//! queued and only deleted from the GPU thread.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::lru::LruCache;
use crate::render::RenderDevice;

use super::retriever::{FetchFn, RetrievalStatus, Retriever, RetrieverCallback, RetrieverConfig};
use super::{ImageData, ImageLoader, ImageOptions, ImageSource, Texture};

const MIB: usize = 1024 * 1024;

/// A cache budget for a device with `total_memory` bytes.
#[must_use]
pub fn recommended_cache_capacity(total_memory: u64) -> usize {
    const MIB64: u64 = 1024 * 1024;
    match total_memory {
        m if m >= 2048 * MIB64 => 384 * MIB,
        m if m >= 1536 * MIB64 => 256 * MIB,
        m if m >= 1024 * MIB64 => 192 * MIB,
        m if m >= 512 * MIB64 => 96 * MIB,
        _ => 64 * MIB,
    }
}

/// Receives notice that a retrieval finished and a redraw would show it.
pub type RetrievalListener = Arc<dyn Fn() + Send + Sync>;

/// Occupancy of a [`RenderResourceCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub used_capacity: usize,
    pub texture_count: usize,
    pub queued_evictions: usize,
    pub retrieved_images: usize,
    pub pending_retrievals: usize,
}

/// Decoded images waiting to become textures, shared with worker threads.
struct RetrievalSink {
    images: Mutex<LruCache<ImageSource, Arc<ImageData>>>,
    listener: Mutex<Option<RetrievalListener>>,
    /// Sources too large to ever be cached. They are not retrieved again.
    oversized: Mutex<HashSet<ImageSource>>,
}

impl RetrievalSink {
    fn is_oversized(&self, key: &ImageSource) -> bool {
        self.oversized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn mark_oversized(&self, key: &ImageSource, bytes: usize, limit: usize) {
        let inserted = self
            .oversized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if inserted {
            tracing::warn!(
                "Image '{key}' needs {} KB but the cache holds {} KB; it will not be shown",
                bytes / 1024,
                limit / 1024
            );
        }
    }
}

impl RetrieverCallback<ImageSource, ImageData> for RetrievalSink {
    fn retrieval_succeeded(&self, key: &ImageSource, value: ImageData) {
        let cost = value.byte_count();
        let limit = {
            let mut images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
            images.put(key.clone(), Arc::new(value), cost);
            images.capacity()
        };
        if cost > limit {
            self.mark_oversized(key, cost, limit);
        }
        tracing::debug!("Image retrieval succeeded '{key}'");

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    fn retrieval_failed(&self, key: &ImageSource, error: &Error) {
        tracing::error!("Image retrieval failed '{key}': {error}");
    }

    fn retrieval_rejected(&self, key: &ImageSource, reason: &str) {
        tracing::debug!("Image retrieval rejected '{key}': {reason}");
    }
}

struct TextureEntries {
    textures: LruCache<ImageSource, Arc<Texture>>,
    evicted: Vec<Arc<Texture>>,
}

impl TextureEntries {
    fn put(&mut self, source: ImageSource, texture: Arc<Texture>) {
        let cost = texture.byte_count();
        let displaced = self.textures.put(source, texture, cost);
        self.evicted.extend(displaced.into_iter().map(|(_, t)| t));
    }
}

/// Capacity-bounded store of GPU textures keyed by image source.
pub struct RenderResourceCache {
    entries: Mutex<TextureEntries>,
    sink: Arc<RetrievalSink>,
    retriever: Retriever<ImageSource, ImageOptions, ImageData>,
}

impl RenderResourceCache {
    /// Create a cache holding up to `capacity` bytes of textures.
    ///
    /// Eviction stops at `low_water` bytes, 75 % of capacity when `None`.
    pub fn new(
        capacity: usize,
        low_water: Option<usize>,
        retrieval: RetrieverConfig,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<Self> {
        let textures = match low_water {
            Some(low_water) => LruCache::with_low_water(capacity, low_water)?,
            None if capacity == 0 => {
                return Err(Error::invalid(
                    "RenderResourceCache",
                    "capacity must be greater than zero",
                ));
            }
            None => LruCache::new(capacity),
        };
        let retrieval_capacity = (capacity / 8).max(1);
        let sink = Arc::new(RetrievalSink {
            images: Mutex::new(LruCache::new(retrieval_capacity)),
            listener: Mutex::new(None),
            oversized: Mutex::new(HashSet::new()),
        });
        let fetch: FetchFn<ImageSource, ImageOptions, ImageData> =
            Arc::new(move |source, options| loader.load(source, options));

        tracing::info!(
            "Render resource cache initialized with {} KB ({} KB retrieval cache)",
            capacity / 1024,
            retrieval_capacity / 1024
        );

        Ok(Self {
            entries: Mutex::new(TextureEntries {
                textures,
                evicted: Vec::new(),
            }),
            sink,
            retriever: Retriever::new(retrieval, fetch),
        })
    }

    /// Call `listener` whenever a retrieval completes.
    pub fn set_retrieval_listener(&self, listener: RetrievalListener) {
        *self
            .sink
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// The texture for `source`, scheduling a retrieval if it is not ready.
    ///
    /// Returns `None` while the image is being retrieved, and for images
    /// larger than the whole cache.
    pub fn retrieve_texture(
        &self,
        source: &ImageSource,
        options: &ImageOptions,
    ) -> Option<Arc<Texture>> {
        if let Some(texture) = self.get_texture(source) {
            return Some(texture);
        }
        if self.sink.is_oversized(source) {
            return None;
        }

        if let ImageSource::Bitmap(image) = source {
            return self.insert_texture(source, Arc::clone(image), options);
        }

        let retrieved = self
            .sink
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source);
        if let Some(image) = retrieved {
            return self.insert_texture(source, image, options);
        }

        let sink: Arc<dyn RetrieverCallback<ImageSource, ImageData>> = self.sink.clone();
        if self.retriever.retrieve(source.clone(), *options, sink) == RetrievalStatus::Scheduled {
            tracing::trace!("Scheduled retrieval of '{source}'");
        }
        None
    }

    fn insert_texture(
        &self,
        source: &ImageSource,
        image: Arc<ImageData>,
        options: &ImageOptions,
    ) -> Option<Arc<Texture>> {
        let mut entries = self.lock_entries();
        let capacity = entries.textures.capacity();
        let bytes = image.byte_count();
        if bytes > capacity {
            drop(entries);
            self.sink.mark_oversized(source, bytes, capacity);
            return None;
        }
        let texture = Arc::new(Texture::new(image, *options));
        entries.put(source.clone(), Arc::clone(&texture));
        Some(texture)
    }

    /// The cached texture for `source`, marking it recently used.
    pub fn get_texture(&self, source: &ImageSource) -> Option<Arc<Texture>> {
        let mut entries = self.lock_entries();
        let texture = entries.textures.get(source).cloned()?;
        if texture.is_released() {
            // Released textures cannot be bound again.
            entries.textures.remove(source);
            return None;
        }
        Some(texture)
    }

    #[must_use]
    pub fn contains(&self, source: &ImageSource) -> bool {
        self.lock_entries().textures.contains_key(source)
    }

    /// Mark a texture for deletion on the next GPU pass.
    pub fn evict(&self, source: &ImageSource) -> bool {
        let mut entries = self.lock_entries();
        match entries.textures.remove(source) {
            Some(texture) => {
                entries.evicted.push(texture);
                true
            }
            None => false,
        }
    }

    /// Delete evicted textures. Must run on the GPU thread.
    pub fn release_evicted(&self, device: &mut dyn RenderDevice) -> usize {
        let evicted = std::mem::take(&mut self.lock_entries().evicted);
        for texture in &evicted {
            texture.release(device);
            tracing::trace!("Released texture {texture:?}");
        }
        evicted.len()
    }

    /// Drop decoded images nobody turned into a texture within `max_age`.
    pub fn trim_stale_retrievals(&self, max_age: Duration) -> usize {
        let trimmed = self
            .sink
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trim_to_age(max_age);
        let bytes: usize = trimmed.iter().map(|(_, image)| image.byte_count()).sum();
        if bytes > 0 {
            tracing::debug!("Trimmed stale image retrievals {} KB", bytes / 1024);
        }
        bytes
    }

    /// Drop every entry without touching the GPU, after the context was lost.
    pub fn clear(&self) {
        let mut entries = self.lock_entries();
        let evicted = std::mem::take(&mut entries.evicted);
        let cached = entries.textures.drain();
        drop(entries);
        for texture in evicted.into_iter().chain(cached.into_iter().map(|(_, t)| t)) {
            texture.abandon();
        }

        self.sink
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock_entries().textures.capacity()
    }

    #[must_use]
    pub fn used_capacity(&self) -> usize {
        self.lock_entries().textures.used_capacity()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock_entries();
        let retrieved_images = self
            .sink
            .images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        CacheStats {
            capacity: entries.textures.capacity(),
            used_capacity: entries.textures.used_capacity(),
            texture_count: entries.textures.len(),
            queued_evictions: entries.evicted.len(),
            retrieved_images,
            pending_retrievals: self.retriever.pending_count(),
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, TextureEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use super::*;
    use crate::render::SoftwareDevice;

    /// Serves solid images for any URL, counting loads.
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ImageLoader for CountingLoader {
        fn load(&self, source: &ImageSource, _options: &ImageOptions) -> Result<ImageData> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match source {
                ImageSource::Url(url) if url.starts_with("missing") => Err(Error::Retrieval {
                    key: url.clone(),
                    message: "not found".to_string(),
                }),
                _ => Ok(ImageData::solid(4, 4, [0, 255, 0, 255])),
            }
        }
    }

    fn cache_with(capacity: usize) -> (RenderResourceCache, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let cache = RenderResourceCache::new(
            capacity,
            None,
            RetrieverConfig::default(),
            loader.clone(),
        )
        .unwrap();
        (cache, loader)
    }

    #[test]
    fn test_recommended_capacity_tiers() {
        assert_eq!(recommended_cache_capacity(4096 * 1024 * 1024), 384 * MIB);
        assert_eq!(recommended_cache_capacity(1536 * 1024 * 1024), 256 * MIB);
        assert_eq!(recommended_cache_capacity(1024 * 1024 * 1024), 192 * MIB);
        assert_eq!(recommended_cache_capacity(600 * 1024 * 1024), 96 * MIB);
        assert_eq!(recommended_cache_capacity(0), 64 * MIB);
    }

    #[test]
    fn test_bitmap_becomes_texture_immediately() {
        let (cache, loader) = cache_with(MIB);
        let source = ImageSource::from_bitmap(ImageData::solid(8, 8, [1, 2, 3, 255]));
        let texture = cache
            .retrieve_texture(&source, &ImageOptions::default())
            .unwrap();
        assert_eq!(texture.byte_count(), 256);
        assert_eq!(cache.used_capacity(), 256);
        assert!(cache.contains(&source));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);

        let again = cache
            .retrieve_texture(&source, &ImageOptions::default())
            .unwrap();
        assert!(Arc::ptr_eq(&texture, &again));
    }

    #[test]
    fn test_retrieval_lands_on_next_request() {
        let (cache, loader) = cache_with(MIB);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        cache.set_retrieval_listener(Arc::new(move || {
            let _ = tx.lock().unwrap().send(());
        }));

        // Put data.
        let source = ImageSource::from_url("synthetic://0/0/0");
        assert!(cache.retrieve_texture(&source, &ImageOptions::default()).is_none());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Get data.
        let texture = cache.retrieve_texture(&source, &ImageOptions::default());
        assert!(texture.is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().texture_count, 1);
        assert_eq!(cache.stats().retrieved_images, 0);
    }

    #[test]
    fn test_eviction_is_deferred_to_gpu_thread() {
        // Room for two 16x16 textures (1 KB each), low water at one.
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let cache =
            RenderResourceCache::new(2048, Some(1024), RetrieverConfig::default(), loader).unwrap();
        let mut device = SoftwareDevice::new(4, 4);
        let options = ImageOptions::default();

        let sources: Vec<_> = (0..3)
            .map(|_| ImageSource::from_bitmap(ImageData::solid(16, 16, [0; 4])))
            .collect();
        let first = cache.retrieve_texture(&sources[0], &options).unwrap();
        first.bind(&mut device).unwrap();
        cache.retrieve_texture(&sources[1], &options).unwrap();
        cache.retrieve_texture(&sources[2], &options).unwrap();

        assert!(cache.used_capacity() <= cache.capacity());
        assert!(!cache.contains(&sources[0]));
        // The evicted texture keeps its GPU handle until the GPU thread runs.
        assert_eq!(device.texture_count(), 1);
        assert!(cache.stats().queued_evictions >= 1);

        let released = cache.release_evicted(&mut device);
        assert!(released >= 1);
        assert_eq!(device.texture_count(), 0);
        assert!(first.is_released());
    }

    #[test]
    fn test_clear_skips_gpu_deletion() {
        let (cache, _loader) = cache_with(MIB);
        let mut device = SoftwareDevice::new(4, 4);
        let source = ImageSource::from_bitmap(ImageData::solid(2, 2, [0; 4]));
        let texture = cache.retrieve_texture(&source, &ImageOptions::default()).unwrap();
        texture.bind(&mut device).unwrap();

        cache.clear();
        assert_eq!(cache.stats().texture_count, 0);
        assert_eq!(cache.used_capacity(), 0);
        assert_eq!(cache.capacity(), MIB);
        assert_eq!(cache.release_evicted(&mut device), 0);
        assert_eq!(device.texture_count(), 1);
    }

    #[test]
    fn test_oversized_images_are_not_cached_or_refetched() {
        // 64x64 RGBA is 16 KB: larger than the texture cache and its retrieval cache.
        struct LargeLoader {
            loads: AtomicUsize,
        }
        impl ImageLoader for LargeLoader {
            fn load(&self, _source: &ImageSource, _options: &ImageOptions) -> Result<ImageData> {
                self.loads.fetch_add(1, Ordering::SeqCst);
                Ok(ImageData::solid(64, 64, [0; 4]))
            }
        }

        let loader = Arc::new(LargeLoader {
            loads: AtomicUsize::new(0),
        });
        let cache =
            RenderResourceCache::new(8192, None, RetrieverConfig::default(), loader.clone())
                .unwrap();
        let options = ImageOptions::default();

        let bitmap = ImageSource::from_bitmap(ImageData::solid(64, 64, [0; 4]));
        for _ in 0..3 {
            assert!(cache.retrieve_texture(&bitmap, &options).is_none());
        }
        assert_eq!(cache.stats().texture_count, 0);
        assert_eq!(cache.stats().queued_evictions, 0);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        cache.set_retrieval_listener(Arc::new(move || {
            let _ = tx.lock().unwrap().send(());
        }));
        let url = ImageSource::from_url("synthetic://large");
        assert!(cache.retrieve_texture(&url, &options).is_none());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let deadline = web_time::Instant::now() + Duration::from_secs(5);
        while cache.stats().pending_retrievals > 0 && web_time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        for _ in 0..3 {
            assert!(cache.retrieve_texture(&url, &options).is_none());
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().pending_retrievals, 0);
        assert_eq!(cache.stats().texture_count, 0);
    }

    #[test]
    fn test_failed_retrieval_yields_nothing() {
        let (cache, loader) = cache_with(MIB);
        let source = ImageSource::from_url("missing://tile");
        assert!(cache.retrieve_texture(&source, &ImageOptions::default()).is_none());
        // Wait for the worker to finish with the key.
        let deadline = web_time::Instant::now() + Duration::from_secs(5);
        while cache.stats().pending_retrievals > 0 && web_time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(cache.retrieve_texture(&source, &ImageOptions::default()).is_none());
    }
}
