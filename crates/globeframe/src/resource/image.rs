//! Image sources and decoding.
//!
//! An [`ImageSource`] identifies where pixels come from and doubles as the
//! key of the render resource cache. Decoding produces RGBA8 [`ImageData`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Decoded RGBA8 pixels, rows ordered top to bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl ImageData {
    /// Wrap raw RGBA8 pixels, checking the buffer length.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::invalid(
                "ImageData",
                format!(
                    "{width}x{height} image needs {expected} bytes, got {}",
                    pixels.len()
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// An image filled with one color.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Decode PNG or JPEG bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.pixels.len()
    }

    /// The pixel at column `x`, row `y` counted from the top.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Where an image comes from.
///
/// Bitmaps compare by identity; paths and URLs compare by value.
#[derive(Clone)]
pub enum ImageSource {
    /// Pixels already in memory.
    Bitmap(Arc<ImageData>),
    /// A PNG or JPEG file on disk.
    Path(PathBuf),
    /// A remote or synthetic resource, resolved by an [`ImageLoader`].
    Url(String),
}

impl ImageSource {
    #[must_use]
    pub fn from_bitmap(image: ImageData) -> Self {
        Self::Bitmap(Arc::new(image))
    }

    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    #[must_use]
    pub fn is_bitmap(&self) -> bool {
        matches!(self, Self::Bitmap(_))
    }
}

impl PartialEq for ImageSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bitmap(a), Self::Bitmap(b)) => Arc::ptr_eq(a, b),
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Url(a), Self::Url(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ImageSource {}

impl Hash for ImageSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Bitmap(image) => std::ptr::hash(Arc::as_ptr(image), state),
            Self::Path(path) => path.hash(state),
            Self::Url(url) => url.hash(state),
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitmap(image) => write!(f, "Bitmap({:p})", Arc::as_ptr(image)),
            Self::Path(path) => write!(f, "Path({})", path.display()),
            Self::Url(url) => write!(f, "Url({url})"),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitmap(image) => write!(f, "bitmap {}x{}", image.width, image.height),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Resampling {
    #[default]
    Bilinear,
    NearestNeighbor,
}

/// Texture coordinate behavior outside [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageOptions {
    pub resampling: Resampling,
    pub wrap_mode: WrapMode,
}

/// Resolves image sources to pixels. Called from retrieval worker threads.
pub trait ImageLoader: Send + Sync {
    fn load(&self, source: &ImageSource, options: &ImageOptions) -> Result<ImageData>;
}

/// Loads bitmaps and decodes PNG/JPEG files from disk.
///
/// URLs are rejected; hosts that fetch over a network supply their own loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, source: &ImageSource, _options: &ImageOptions) -> Result<ImageData> {
        match source {
            ImageSource::Bitmap(image) => Ok(image.as_ref().clone()),
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|e| Error::Retrieval {
                    key: source.to_string(),
                    message: e.to_string(),
                })?;
                ImageData::decode(&bytes).map_err(|e| Error::Retrieval {
                    key: source.to_string(),
                    message: e.to_string(),
                })
            }
            ImageSource::Url(url) => Err(Error::Retrieval {
                key: url.clone(),
                message: "no loader configured for URLs".to_string(),
            }),
        }
    }
}
