//! Tiled imagery with level-of-detail selection.

use std::sync::Arc;

use glam::{DMat3, DVec3};

use crate::error::Result;
use crate::render::{DrawableSurfaceTexture, RenderContext};
use crate::resource::{ImageOptions, Texture};
use crate::tile::{LevelSet, Tile, TileCache, TileFactory, assemble_tiles_for_level, new_tile_cache};

use super::Layer;

/// Imagery drawn from a tile pyramid.
///
/// Each frame selects the tiles whose texels best match the screen resolution.
/// Tiles whose own image is still loading show the nearest resident ancestor's
/// image instead.
pub struct TiledImageLayer {
    display_name: String,
    enabled: bool,
    level_set: LevelSet,
    tile_factory: Box<dyn TileFactory>,
    image_options: ImageOptions,
    detail_control: f64,
    grid_density: usize,
    top_level_tiles: Vec<Tile>,
    tile_cache: TileCache,
}

impl TiledImageLayer {
    pub const DEFAULT_DETAIL_CONTROL: f64 = 4.0;
    /// Cells per side when projecting a tile onto the screen.
    pub const DEFAULT_GRID_DENSITY: usize = 8;

    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        level_set: LevelSet,
        tile_factory: Box<dyn TileFactory>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            enabled: true,
            level_set,
            tile_factory,
            image_options: ImageOptions::default(),
            detail_control: Self::DEFAULT_DETAIL_CONTROL,
            grid_density: Self::DEFAULT_GRID_DENSITY,
            top_level_tiles: Vec::new(),
            tile_cache: new_tile_cache(),
        }
    }

    #[must_use]
    pub fn with_image_options(mut self, image_options: ImageOptions) -> Self {
        self.image_options = image_options;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn level_set(&self) -> &LevelSet {
        &self.level_set
    }

    /// Replace the level set, rebuilding the quadtree on the next frame.
    pub fn set_level_set(&mut self, level_set: LevelSet) {
        self.level_set = level_set;
        self.invalidate_tiles();
    }

    /// Replace the tile factory, rebuilding the quadtree on the next frame.
    pub fn set_tile_factory(&mut self, tile_factory: Box<dyn TileFactory>) {
        self.tile_factory = tile_factory;
        self.invalidate_tiles();
    }

    #[must_use]
    pub fn detail_control(&self) -> f64 {
        self.detail_control
    }

    /// Larger values select coarser tiles.
    pub fn set_detail_control(&mut self, detail_control: f64) {
        self.detail_control = detail_control;
    }

    pub fn set_grid_density(&mut self, grid_density: usize) {
        self.grid_density = grid_density.max(1);
    }

    /// Number of child quartets held by the tile cache.
    #[must_use]
    pub fn cached_tile_count(&self) -> usize {
        self.tile_cache.len()
    }

    fn invalidate_tiles(&mut self) {
        self.top_level_tiles.clear();
        self.tile_cache.clear();
    }

    fn create_top_level_tiles(&mut self) {
        if let Some(first) = self.level_set.first_level() {
            self.top_level_tiles =
                assemble_tiles_for_level(first, self.level_set.sector(), self.tile_factory.as_ref());
        }
    }

    fn add_tile_or_descendants(
        &mut self,
        rc: &mut RenderContext<'_>,
        tile: &Tile,
        ancestor: Option<(&Tile, &Arc<Texture>)>,
    ) {
        if !tile.intersects_sector(self.level_set.sector())
            || !tile.intersects_sector(rc.terrain.sector())
            || tile.is_beyond_horizon(&rc.view)
            || !tile.intersects_frustum(rc.globe(), &rc.view.frustum)
        {
            return;
        }

        if tile.level.is_last_level() || !tile.must_subdivide(&rc.view, self.detail_control) {
            self.add_tile(rc, tile, ancestor);
            return;
        }

        let Some(children) =
            tile.subdivide_to_cache(&self.level_set, self.tile_factory.as_ref(), &mut self.tile_cache)
        else {
            self.add_tile(rc, tile, ancestor);
            return;
        };

        // This tile backs its descendants while their images load.
        let resident = tile
            .image_source
            .as_ref()
            .and_then(|source| rc.resources.get_texture(source));
        let ancestor = match &resident {
            Some(texture) => Some((tile, texture)),
            None => ancestor,
        };
        for child in children.iter() {
            self.add_tile_or_descendants(rc, child, ancestor);
        }
    }

    fn add_tile(
        &self,
        rc: &mut RenderContext<'_>,
        tile: &Tile,
        ancestor: Option<(&Tile, &Arc<Texture>)>,
    ) {
        let Some(source) = &tile.image_source else {
            return;
        };

        let (texture, transform) = match rc.resources.retrieve_texture(source, &self.image_options) {
            Some(texture) => {
                let transform = *texture.tex_coord_transform();
                (texture, transform)
            }
            None => match ancestor {
                Some((ancestor_tile, ancestor_texture)) => (
                    Arc::clone(ancestor_texture),
                    *ancestor_texture.tex_coord_transform()
                        * sub_sector_transform(tile, ancestor_tile),
                ),
                None => return,
            },
        };

        let cells = rc.view.project_sector(&tile.sector, self.grid_density);
        if cells.is_empty() {
            return;
        }
        rc.offer_surface_drawable(
            Box::new(DrawableSurfaceTexture::new(cells, texture, &transform)),
            0.0,
        );
    }
}

/// Maps a tile's local coordinates onto the matching sub-rectangle of an
/// ancestor's local coordinates.
fn sub_sector_transform(tile: &Tile, ancestor: &Tile) -> DMat3 {
    let (s, a) = (&tile.sector, &ancestor.sector);
    let x_scale = s.delta_longitude() / a.delta_longitude();
    let y_scale = s.delta_latitude() / a.delta_latitude();
    let x_offset = (s.min_longitude - a.min_longitude) / a.delta_longitude();
    let y_offset = (s.min_latitude - a.min_latitude) / a.delta_latitude();
    DMat3::from_cols(
        DVec3::new(x_scale, 0.0, 0.0),
        DVec3::new(0.0, y_scale, 0.0),
        DVec3::new(x_offset, y_offset, 1.0),
    )
}

impl Layer for TiledImageLayer {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_pick_enabled(&self) -> bool {
        false
    }

    fn render(&mut self, rc: &mut RenderContext<'_>) -> Result<()> {
        if rc.terrain.sector().is_empty() {
            return Ok(());
        }
        if self.top_level_tiles.is_empty() {
            self.create_top_level_tiles();
        }

        let top = std::mem::take(&mut self.top_level_tiles);
        for tile in &top {
            self.add_tile_or_descendants(rc, tile, None);
        }
        self.top_level_tiles = top;
        Ok(())
    }
}
