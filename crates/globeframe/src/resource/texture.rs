//! GPU textures created lazily on the render thread.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use glam::{DMat3, DVec3};

use crate::error::{Error, Result};
use crate::render::{RenderDevice, TextureId};

use super::{ImageData, ImageOptions};

#[derive(Debug, Default)]
struct TextureState {
    id: Option<TextureId>,
    released: bool,
}

/// An image destined for the GPU.
///
/// The GPU handle is created on first [`Texture::bind`] and deleted by
/// [`Texture::release`], both of which only run on the GPU thread. Assembly
/// code on the driver thread only reads the immutable parts.
pub struct Texture {
    image: Arc<ImageData>,
    options: ImageOptions,
    byte_count: usize,
    tex_coord_transform: DMat3,
    state: Mutex<TextureState>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.image.width)
            .field("height", &self.image.height)
            .field("byte_count", &self.byte_count)
            .field("id", &self.texture_id())
            .finish_non_exhaustive()
    }
}

impl Texture {
    #[must_use]
    pub fn new(image: Arc<ImageData>, options: ImageOptions) -> Self {
        let byte_count = image.width as usize * image.height as usize * 4;
        // Images are stored top row first; geographic texture coordinates put
        // t = 0 at the southern edge.
        let tex_coord_transform = DMat3::from_cols(
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, -1.0, 0.0),
            DVec3::new(0.0, 1.0, 1.0),
        );
        Self {
            image,
            options,
            byte_count,
            tex_coord_transform,
            state: Mutex::new(TextureState::default()),
        }
    }

    #[must_use]
    pub fn image(&self) -> &Arc<ImageData> {
        &self.image
    }

    #[must_use]
    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    /// Approximate GPU memory used by the texture.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// Maps texture coordinates with the origin at the lower-left corner onto
    /// image coordinates.
    #[must_use]
    pub fn tex_coord_transform(&self) -> &DMat3 {
        &self.tex_coord_transform
    }

    #[must_use]
    pub fn texture_id(&self) -> Option<TextureId> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).id
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .released
    }

    /// Return the GPU handle, uploading the image on first use.
    pub fn bind(&self, device: &mut dyn RenderDevice) -> Result<TextureId> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.released {
            return Err(Error::device("bind", "texture has been released"));
        }
        if let Some(id) = state.id {
            return Ok(id);
        }
        let id = device.create_texture(&self.image, &self.options)?;
        state.id = Some(id);
        Ok(id)
    }

    /// Delete the GPU handle. The texture cannot be bound afterwards.
    pub fn release(&self, device: &mut dyn RenderDevice) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = state.id.take() {
            device.delete_texture(id);
        }
        state.released = true;
    }

    /// Forget the GPU handle without deleting it, after the context was lost.
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.id = None;
        state.released = true;
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::render::SoftwareDevice;

    #[test]
    fn test_bind_creates_once_and_release_deletes() {
        let mut device = SoftwareDevice::new(4, 4);
        let texture = Texture::new(
            Arc::new(ImageData::solid(2, 2, [1, 1, 1, 255])),
            ImageOptions::default(),
        );
        assert_eq!(texture.byte_count(), 16);
        assert!(texture.texture_id().is_none());

        let first = texture.bind(&mut device).unwrap();
        let second = texture.bind(&mut device).unwrap();
        assert_eq!(first, second);
        assert_eq!(device.texture_count(), 1);

        texture.release(&mut device);
        assert_eq!(device.texture_count(), 0);
        assert!(texture.is_released());
        assert!(texture.bind(&mut device).is_err());
    }

    #[test]
    fn test_abandon_skips_device() {
        let mut device = SoftwareDevice::new(4, 4);
        let texture = Texture::new(
            Arc::new(ImageData::solid(1, 1, [0; 4])),
            ImageOptions::default(),
        );
        texture.bind(&mut device).unwrap();
        texture.abandon();
        assert!(texture.texture_id().is_none());
        // The stale handle is left for the lost context to discard.
        assert_eq!(device.texture_count(), 1);
    }

    #[test]
    fn test_tex_coord_transform_flips_vertically() {
        let texture = Texture::new(
            Arc::new(ImageData::solid(1, 1, [0; 4])),
            ImageOptions::default(),
        );
        let m = texture.tex_coord_transform();
        let southwest = *m * DVec3::new(0.0, 0.0, 1.0);
        let northeast = *m * DVec3::new(1.0, 1.0, 1.0);
        assert_eq!(southwest.truncate(), DVec2::new(0.0, 1.0));
        assert_eq!(northeast.truncate(), DVec2::new(1.0, 0.0));
    }
}
