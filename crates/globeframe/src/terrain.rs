//! Terrain tessellation.
//!
//! The tessellator selects the terrain tiles that cover the visible part of
//! the globe for the current view. Layers drape their imagery over the region
//! those tiles cover.

use glam::DVec3;

use crate::error::Result;
use crate::geom::Sector;
use crate::render::ViewState;
use crate::resource::ImageSource;
use crate::tile::{
    LevelSet, Tile, TileCache, TileFactory, TileKey, assemble_tiles_for_level, new_tile_cache,
};

/// One terrain tile selected for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainTile {
    pub key: TileKey,
    pub sector: Sector,
    /// Cartesian corners: southwest, southeast, northeast, northwest.
    pub corners: [DVec3; 4],
}

/// The terrain tiles of one frame and the region they cover.
#[derive(Debug, Clone)]
pub struct TerrainGeometry {
    tiles: Vec<TerrainTile>,
    sector: Sector,
}

impl Default for TerrainGeometry {
    fn default() -> Self {
        Self {
            tiles: Vec::new(),
            sector: Sector::EMPTY,
        }
    }
}

impl TerrainGeometry {
    pub fn add_tile(&mut self, tile: TerrainTile) {
        self.sector = if self.sector.is_empty() {
            tile.sector
        } else {
            self.sector.union(&tile.sector)
        };
        self.tiles.push(tile);
    }

    #[must_use]
    pub fn tiles(&self) -> &[TerrainTile] {
        &self.tiles
    }

    /// Union of every tile's sector. Empty when no terrain is visible.
    #[must_use]
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Produces the terrain for a view.
pub trait Tessellator: Send {
    fn tessellate(&mut self, view: &ViewState) -> Result<TerrainGeometry>;
}

/// Terrain tiles carry no imagery.
struct TerrainTileFactory;

impl TileFactory for TerrainTileFactory {
    fn image_source(&self, _tile: &Tile) -> Option<ImageSource> {
        None
    }
}

/// Quadtree tessellation of a smooth globe.
pub struct BasicTessellator {
    level_set: LevelSet,
    detail_control: f64,
    top_level_tiles: Vec<Tile>,
    tile_cache: TileCache,
}

impl BasicTessellator {
    pub const DEFAULT_DETAIL_CONTROL: f64 = 80.0;

    /// The default full-sphere level set: 90 degree top tiles, 20 levels of
    /// 32x32 cells.
    pub fn new() -> Result<Self> {
        Ok(Self::with_level_set(LevelSet::new(
            Sector::full_sphere(),
            90.0,
            20,
            32,
            32,
        )?))
    }

    #[must_use]
    pub fn with_level_set(level_set: LevelSet) -> Self {
        Self {
            level_set,
            detail_control: Self::DEFAULT_DETAIL_CONTROL,
            top_level_tiles: Vec::new(),
            tile_cache: new_tile_cache(),
        }
    }

    #[must_use]
    pub fn level_set(&self) -> &LevelSet {
        &self.level_set
    }

    pub fn set_level_set(&mut self, level_set: LevelSet) {
        self.level_set = level_set;
        self.invalidate_tiles();
    }

    #[must_use]
    pub fn detail_control(&self) -> f64 {
        self.detail_control
    }

    pub fn set_detail_control(&mut self, detail_control: f64) {
        self.detail_control = detail_control;
    }

    fn invalidate_tiles(&mut self) {
        self.top_level_tiles.clear();
        self.tile_cache.clear();
    }

    fn add_tile_or_descendants(&mut self, view: &ViewState, tile: &Tile, out: &mut TerrainGeometry) {
        if tile.is_beyond_horizon(view) || !tile.intersects_frustum(&view.globe, &view.frustum) {
            return;
        }
        if tile.level.is_last_level() || !tile.must_subdivide(view, self.detail_control) {
            Self::add_tile(view, tile, out);
            return;
        }
        match tile.subdivide_to_cache(&self.level_set, &TerrainTileFactory, &mut self.tile_cache) {
            Some(children) => {
                for child in children.iter() {
                    self.add_tile_or_descendants(view, child, out);
                }
            }
            None => Self::add_tile(view, tile, out),
        }
    }

    fn add_tile(view: &ViewState, tile: &Tile, out: &mut TerrainGeometry) {
        let s = &tile.sector;
        let corner = |lat, lon| view.globe.geographic_to_cartesian(lat, lon, 0.0);
        out.add_tile(TerrainTile {
            key: tile.key(),
            sector: *s,
            corners: [
                corner(s.min_latitude, s.min_longitude),
                corner(s.min_latitude, s.max_longitude),
                corner(s.max_latitude, s.max_longitude),
                corner(s.max_latitude, s.min_longitude),
            ],
        });
    }
}

impl Tessellator for BasicTessellator {
    fn tessellate(&mut self, view: &ViewState) -> Result<TerrainGeometry> {
        let mut terrain = TerrainGeometry::default();
        if self.top_level_tiles.is_empty() {
            if let Some(first) = self.level_set.first_level() {
                self.top_level_tiles =
                    assemble_tiles_for_level(first, self.level_set.sector(), &TerrainTileFactory);
            }
        }
        let top = std::mem::take(&mut self.top_level_tiles);
        for tile in &top {
            self.add_tile_or_descendants(view, tile, &mut terrain);
        }
        self.top_level_tiles = top;
        Ok(terrain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Camera, Globe, Viewport};

    fn view_at(latitude: f64, longitude: f64, altitude: f64) -> ViewState {
        ViewState::new(
            Globe::default(),
            Camera::looking_down(latitude, longitude, altitude),
            Viewport::new(0, 0, 400, 300),
            45.0,
        )
    }

    #[test]
    fn test_far_view_uses_top_level() {
        let mut tessellator = BasicTessellator::new().unwrap();
        let terrain = tessellator.tessellate(&view_at(0.0, 0.0, 30_000_000.0)).unwrap();
        assert!(!terrain.is_empty());
        assert!(terrain.tiles().iter().all(|tile| tile.key.level == 0));
        assert!(terrain.sector().contains(0.0, 0.0));
    }

    #[test]
    fn test_close_view_refines_under_camera() {
        let mut tessellator = BasicTessellator::new().unwrap();
        let terrain = tessellator.tessellate(&view_at(10.0, 20.0, 100_000.0)).unwrap();
        let under = terrain
            .tiles()
            .iter()
            .find(|tile| tile.sector.contains(10.0, 20.0))
            .unwrap();
        assert!(under.key.level > 2);
        // The far side of the globe is culled.
        assert!(!terrain.sector().contains(-10.0, -160.0));
    }

    #[test]
    fn test_tiles_do_not_overlap() {
        let mut tessellator = BasicTessellator::new().unwrap();
        let terrain = tessellator.tessellate(&view_at(45.0, 0.0, 2_000_000.0)).unwrap();
        let tiles = terrain.tiles();
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                assert!(!a.sector.intersects(&b.sector), "{:?} overlaps {:?}", a.key, b.key);
            }
        }
    }
}
