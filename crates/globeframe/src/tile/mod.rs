//! Quadtree tiles and level-of-detail selection.
//!
//! Tiles are addressed by `(level, row, column)` within a [`LevelSet`]. Row 0
//! starts at -90° latitude and column 0 at -180° longitude. A tile carries no
//! state that cannot be rebuilt from its address, so cached children can be
//! evicted and recreated freely.

mod factory;
mod level;

pub use factory::{TemplateTileFactory, TileFactory};
pub use level::{Level, LevelSet, LevelSetConfig};

use std::fmt;
use std::sync::Arc;

use glam::DVec3;

use crate::geom::{Frustum, Globe, Sector};
use crate::lru::LruCache;
use crate::render::ViewState;
use crate::resource::ImageSource;

/// Number of child quartets kept by a tile cache.
pub const TILE_CACHE_CAPACITY: usize = 500;

/// Cache of subdivided children keyed by the parent tile.
pub type TileCache = LruCache<TileKey, Arc<[Tile]>>;

/// Create an empty tile cache with the default capacity.
#[must_use]
pub fn new_tile_cache() -> TileCache {
    LruCache::new(TILE_CACHE_CAPACITY)
}

/// Address of a tile within its level set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: usize,
    pub row: i32,
    pub column: i32,
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.level, self.row, self.column)
    }
}

/// Row containing `latitude` at the given tile delta.
#[must_use]
pub fn compute_row(tile_delta: f64, latitude: f64) -> i32 {
    let mut row = ((latitude + 90.0) / tile_delta).floor() as i32;
    // The north pole belongs to the last row.
    if latitude == 90.0 {
        row -= 1;
    }
    row
}

/// Last row touched by a sector ending at `max_latitude`.
#[must_use]
pub fn compute_last_row(tile_delta: f64, max_latitude: f64) -> i32 {
    if max_latitude + 90.0 < tile_delta {
        return 0;
    }
    ((max_latitude + 90.0) / tile_delta - 1.0).ceil() as i32
}

/// Column containing `longitude` at the given tile delta.
#[must_use]
pub fn compute_column(tile_delta: f64, longitude: f64) -> i32 {
    let mut column = ((longitude + 180.0) / tile_delta).floor() as i32;
    // The antimeridian at +180 belongs to the last column.
    if longitude == 180.0 {
        column -= 1;
    }
    column
}

/// Last column touched by a sector ending at `max_longitude`.
#[must_use]
pub fn compute_last_column(tile_delta: f64, max_longitude: f64) -> i32 {
    if max_longitude + 180.0 < tile_delta {
        return 0;
    }
    ((max_longitude + 180.0) / tile_delta - 1.0).ceil() as i32
}

/// Create every tile of `level` that covers `sector`.
pub fn assemble_tiles_for_level(
    level: &Level,
    sector: &Sector,
    factory: &dyn TileFactory,
) -> Vec<Tile> {
    let delta = level.tile_delta;
    let first_row = compute_row(delta, sector.min_latitude);
    let last_row = compute_last_row(delta, sector.max_latitude);
    let first_column = compute_column(delta, sector.min_longitude);
    let last_column = compute_last_column(delta, sector.max_longitude);

    let mut tiles = Vec::new();
    for row in first_row..=last_row {
        let latitude = -90.0 + f64::from(row) * delta;
        for column in first_column..=last_column {
            let longitude = -180.0 + f64::from(column) * delta;
            let tile_sector = Sector::from_degrees(latitude, longitude, delta, delta);
            tiles.push(factory.create_tile(tile_sector, level, row, column));
        }
    }
    tiles
}

/// One quadtree node.
#[derive(Debug, Clone)]
pub struct Tile {
    pub sector: Sector,
    pub level: Level,
    pub row: i32,
    pub column: i32,
    /// Image displayed by this tile, absent where the pyramid has no data.
    pub image_source: Option<ImageSource>,
    texel_size_factor: f64,
}

impl Tile {
    #[must_use]
    pub fn new(sector: Sector, level: Level, row: i32, column: i32) -> Self {
        let texel_size_factor = (level.tile_delta / f64::from(level.tile_width)).to_radians()
            * sector.centroid_latitude().to_radians().cos();
        Self {
            sector,
            level,
            row,
            column,
            image_source: None,
            texel_size_factor,
        }
    }

    #[must_use]
    pub fn key(&self) -> TileKey {
        TileKey {
            level: self.level.number,
            row: self.row,
            column: self.column,
        }
    }

    #[must_use]
    pub fn intersects_sector(&self, sector: &Sector) -> bool {
        self.sector.intersects(sector)
    }

    /// Bounding sphere of the tile's surface at zero elevation.
    #[must_use]
    pub fn extent(&self, globe: &Globe) -> (DVec3, f64) {
        const SAMPLES: usize = 5;
        let s = &self.sector;
        let mut points = [DVec3::ZERO; SAMPLES * SAMPLES];
        for (i, point) in points.iter_mut().enumerate() {
            let u = (i % SAMPLES) as f64 / (SAMPLES - 1) as f64;
            let v = (i / SAMPLES) as f64 / (SAMPLES - 1) as f64;
            let lat = s.min_latitude + v * s.delta_latitude();
            let lon = s.min_longitude + u * s.delta_longitude();
            *point = globe.geographic_to_cartesian(lat, lon, 0.0);
        }
        let center = points.iter().copied().sum::<DVec3>() / points.len() as f64;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f64::max);
        // Pad for the surface bulging between samples.
        let chord = radius * 0.25 / (SAMPLES - 1) as f64;
        (center, radius + chord)
    }

    #[must_use]
    pub fn intersects_frustum(&self, globe: &Globe, frustum: &Frustum) -> bool {
        let (center, radius) = self.extent(globe);
        frustum.intersects_sphere(center, radius)
    }

    /// Whether every point of the tile lies past the horizon, including the
    /// band of atmosphere visible beyond it.
    #[must_use]
    pub fn is_beyond_horizon(&self, view: &ViewState) -> bool {
        let angle = self
            .sector
            .angular_distance_to(view.camera.latitude, view.camera.longitude);
        angle > view.visible_surface_angle()
    }

    /// Distance from the camera to the nearest point of the tile.
    #[must_use]
    pub fn distance_to_camera(&self, view: &ViewState) -> f64 {
        let s = &self.sector;
        let camera = &view.camera;
        let nearest_lat = camera.latitude.clamp(s.min_latitude, s.max_latitude);
        let lon_difference = camera.longitude - s.centroid_longitude();
        let nearest_lon = if lon_difference < -180.0 {
            s.max_longitude
        } else if lon_difference > 180.0 {
            s.min_longitude
        } else {
            camera.longitude.clamp(s.min_longitude, s.max_longitude)
        };
        let nearest = view.globe.geographic_to_cartesian(nearest_lat, nearest_lon, 0.0);
        view.camera_point.distance(nearest)
    }

    /// Whether this tile's texels appear larger than `detail_control` pixels.
    #[must_use]
    pub fn must_subdivide(&self, view: &ViewState, detail_control: f64) -> bool {
        let distance = self.distance_to_camera(view);
        let texel_size = self.texel_size_factor * view.globe.equatorial_radius();
        let pixel_size = view.pixel_size_at_distance(distance);
        texel_size > pixel_size * detail_control
    }

    /// The four children in the next level: southwest, southeast, northwest,
    /// northeast. Returns `None` at the last level.
    #[must_use]
    pub fn subdivide(&self, levels: &LevelSet, factory: &dyn TileFactory) -> Option<[Tile; 4]> {
        let child_level = levels.next_level(&self.level)?;
        let min_lat = self.sector.min_latitude;
        let min_lon = self.sector.min_longitude;
        let mid_lat = self.sector.centroid_latitude();
        let mid_lon = self.sector.centroid_longitude();
        let delta = self.level.tile_delta * 0.5;
        let (row, column) = (2 * self.row, 2 * self.column);

        Some([
            factory.create_tile(
                Sector::from_degrees(min_lat, min_lon, delta, delta),
                child_level,
                row,
                column,
            ),
            factory.create_tile(
                Sector::from_degrees(min_lat, mid_lon, delta, delta),
                child_level,
                row,
                column + 1,
            ),
            factory.create_tile(
                Sector::from_degrees(mid_lat, min_lon, delta, delta),
                child_level,
                row + 1,
                column,
            ),
            factory.create_tile(
                Sector::from_degrees(mid_lat, mid_lon, delta, delta),
                child_level,
                row + 1,
                column + 1,
            ),
        ])
    }

    /// Children fetched from `cache`, subdividing and caching them on a miss.
    pub fn subdivide_to_cache(
        &self,
        levels: &LevelSet,
        factory: &dyn TileFactory,
        cache: &mut TileCache,
    ) -> Option<Arc<[Tile]>> {
        let key = self.key();
        if let Some(children) = cache.get(&key) {
            return Some(Arc::clone(children));
        }
        let children: Arc<[Tile]> = Arc::new(self.subdivide(levels, factory)?);
        cache.put(key, Arc::clone(&children), 1);
        Some(children)
    }
}
