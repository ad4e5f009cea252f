//! A CPU rasterizer implementing [`RenderDevice`].
//!
//! Used headless by tests and the benchmark binary. Quads are split into two
//! triangles and filled by testing pixel centers against their edges.

use std::collections::HashMap;

use glam::DVec2;

use crate::error::{Error, Result};
use crate::geom::Viewport;
use crate::resource::{ImageData, ImageOptions, Resampling, WrapMode};

use super::device::{QuadFill, RenderDevice, Rgba, TextureId};

struct SoftwareTexture {
    image: ImageData,
    options: ImageOptions,
}

/// Software render target with a color buffer and a texture table.
pub struct SoftwareDevice {
    width: u32,
    height: u32,
    /// Rows ordered bottom to top.
    color: Vec<Rgba>,
    viewport: Viewport,
    textures: HashMap<TextureId, SoftwareTexture>,
    next_texture: u32,
    presented: u64,
}

impl SoftwareDevice {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let mut device = Self {
            width: 0,
            height: 0,
            color: Vec::new(),
            viewport: Viewport::default(),
            textures: HashMap::new(),
            next_texture: 1,
            presented: 0,
        };
        device.resize(width, height);
        device
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of textures currently allocated.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of frames presented so far.
    #[must_use]
    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    /// The color at a window coordinate.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        self.index(x, y).map(|i| self.color[i])
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let (x, y) = (u32::try_from(x).ok()?, u32::try_from(y).ok()?);
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }

    fn surface(&self) -> Viewport {
        Viewport::new(0, 0, self.width as i32, self.height as i32)
    }

    fn fill_triangle(
        &mut self,
        p: [DVec2; 3],
        uv: Option<(&SoftwareTexture, [DVec2; 3])>,
        solid: Rgba,
    ) {
        let area = edge(p[0], p[1], p[2]);
        if area.abs() < f64::EPSILON {
            return;
        }
        let clip = self.viewport.intersection(&self.surface());
        if clip.is_empty() {
            return;
        }
        let min_x = p.iter().map(|v| v.x).fold(f64::INFINITY, f64::min).floor() as i32;
        let max_x = p.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        let min_y = p.iter().map(|v| v.y).fold(f64::INFINITY, f64::min).floor() as i32;
        let max_y = p.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        let x0 = min_x.max(clip.x);
        let x1 = max_x.min(clip.x + clip.width);
        let y0 = min_y.max(clip.y);
        let y1 = max_y.min(clip.y + clip.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let center = DVec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                let w0 = edge(p[1], p[2], center) / area;
                let w1 = edge(p[2], p[0], center) / area;
                let w2 = edge(p[0], p[1], center) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let color = match uv {
                    Some((texture, t)) => {
                        let st = t[0] * w0 + t[1] * w1 + t[2] * w2;
                        sample(texture, st)
                    }
                    None => solid,
                };
                if let Some(i) = self.index(x, y) {
                    self.color[i] = blend(self.color[i], color);
                }
            }
        }
    }
}

/// Twice the signed area of the triangle (a, b, c).
fn edge(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn blend(dst: Rgba, src: Rgba) -> Rgba {
    match src[3] {
        255 => src,
        0 => dst,
        alpha => {
            let a = u32::from(alpha);
            let mix = |s: u8, d: u8| ((u32::from(s) * a + u32::from(d) * (255 - a)) / 255) as u8;
            [
                mix(src[0], dst[0]),
                mix(src[1], dst[1]),
                mix(src[2], dst[2]),
                (a + u32::from(dst[3]) * (255 - a) / 255) as u8,
            ]
        }
    }
}

fn wrap(coord: f64, mode: WrapMode) -> f64 {
    match mode {
        WrapMode::ClampToEdge => coord.clamp(0.0, 1.0),
        WrapMode::Repeat => coord.rem_euclid(1.0),
    }
}

fn texel(image: &ImageData, x: i64, y: i64) -> Rgba {
    let x = x.clamp(0, i64::from(image.width) - 1) as u32;
    let y = y.clamp(0, i64::from(image.height) - 1) as u32;
    image.pixel(x, y).unwrap_or([0, 0, 0, 0])
}

fn sample(texture: &SoftwareTexture, st: DVec2) -> Rgba {
    let image = &texture.image;
    let s = wrap(st.x, texture.options.wrap_mode) * f64::from(image.width);
    let t = wrap(st.y, texture.options.wrap_mode) * f64::from(image.height);
    match texture.options.resampling {
        Resampling::NearestNeighbor => texel(image, s.floor() as i64, t.floor() as i64),
        Resampling::Bilinear => {
            let (fx, fy) = (s - 0.5, t - 0.5);
            let (x0, y0) = (fx.floor(), fy.floor());
            let (ax, ay) = (fx - x0, fy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);
            let c00 = texel(image, x0, y0);
            let c10 = texel(image, x0 + 1, y0);
            let c01 = texel(image, x0, y0 + 1);
            let c11 = texel(image, x0 + 1, y0 + 1);
            let mut out = [0u8; 4];
            for (i, channel) in out.iter_mut().enumerate() {
                let top = f64::from(c00[i]) * (1.0 - ax) + f64::from(c10[i]) * ax;
                let bottom = f64::from(c01[i]) * (1.0 - ax) + f64::from(c11[i]) * ax;
                *channel = (top * (1.0 - ay) + bottom * ay).round() as u8;
            }
            out
        }
    }
}

impl RenderDevice for SoftwareDevice {
    fn create_texture(&mut self, image: &ImageData, options: &ImageOptions) -> Result<TextureId> {
        if image.width == 0 || image.height == 0 {
            return Err(Error::device("create_texture", "image has no pixels"));
        }
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            SoftwareTexture {
                image: image.clone(),
                options: *options,
            },
        );
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.color = vec![[0, 0, 0, 0]; width as usize * height as usize];
        self.viewport = self.surface();
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: Rgba) {
        let clip = self.viewport.intersection(&self.surface());
        for y in clip.y..clip.y + clip.height {
            for x in clip.x..clip.x + clip.width {
                if let Some(i) = self.index(x, y) {
                    self.color[i] = color;
                }
            }
        }
    }

    fn draw_quad(&mut self, corners: &[DVec2; 4], fill: &QuadFill) -> Result<()> {
        let [a, b, c, d] = *corners;
        match fill {
            QuadFill::Solid(color) => {
                self.fill_triangle([a, b, c], None, *color);
                self.fill_triangle([a, c, d], None, *color);
            }
            QuadFill::Textured {
                texture,
                tex_coords,
            } => {
                // Temporarily take the texture so the color buffer can be borrowed mutably.
                let entry = self.textures.remove(texture).ok_or_else(|| {
                    Error::device("draw_quad", format!("texture {} does not exist", texture.0))
                })?;
                let [ta, tb, tc, td] = *tex_coords;
                self.fill_triangle([a, b, c], Some((&entry, [ta, tb, tc])), [0; 4]);
                self.fill_triangle([a, c, d], Some((&entry, [ta, tc, td])), [0; 4]);
                self.textures.insert(*texture, entry);
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, region: Viewport) -> Result<Vec<Rgba>> {
        let clip = region.intersection(&self.surface());
        if clip != region {
            return Err(Error::device(
                "read_pixels",
                format!("region {region:?} lies outside the {}x{} surface", self.width, self.height),
            ));
        }
        let mut pixels = Vec::with_capacity(region.area());
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                pixels.push(self.pixel(x, y).unwrap_or([0; 4]));
            }
        }
        Ok(pixels)
    }

    fn present(&mut self) {
        self.presented += 1;
    }
}
