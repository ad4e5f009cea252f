//! Refinement levels of a tile pyramid.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geom::Sector;

/// One refinement level within a [`LevelSet`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    /// Ordinal within the level set, starting at 0 for the coarsest level.
    pub number: usize,
    /// Geographic width and height of this level's tiles, in degrees.
    pub tile_delta: f64,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Size of one texel in radians.
    pub texel_height: f64,
    last: bool,
}

impl Level {
    #[must_use]
    pub fn is_first_level(&self) -> bool {
        self.number == 0
    }

    #[must_use]
    pub fn is_last_level(&self) -> bool {
        self.last
    }
}

/// Serializable description of a level set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSetConfig {
    pub sector: Sector,
    /// Tile delta of the first level, in degrees.
    pub first_level_delta: f64,
    pub num_levels: usize,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl Default for LevelSetConfig {
    fn default() -> Self {
        Self {
            sector: Sector::full_sphere(),
            first_level_delta: 90.0,
            num_levels: 1,
            tile_width: 256,
            tile_height: 256,
        }
    }
}

impl LevelSetConfig {
    /// Number of levels needed to reach the given resolution in radians per pixel.
    pub fn num_levels_for_resolution(&self, radians_per_pixel: f64) -> Result<usize> {
        let level = self.fractional_level(radians_per_pixel)?;
        Ok(level.ceil().max(0.0) as usize + 1)
    }

    fn fractional_level(&self, radians_per_pixel: f64) -> Result<f64> {
        if radians_per_pixel <= 0.0 || radians_per_pixel.is_nan() {
            return Err(Error::invalid(
                "LevelSetConfig",
                format!("resolution {radians_per_pixel} is not positive"),
            ));
        }
        let degrees_per_pixel = radians_per_pixel.to_degrees();
        let first_level_degrees_per_pixel =
            self.first_level_delta / f64::from(self.tile_width.min(self.tile_height));
        Ok((first_level_degrees_per_pixel / degrees_per_pixel).log2())
    }
}

/// An ordered sequence of levels, each doubling the angular resolution of
/// the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSet {
    config: LevelSetConfig,
    levels: Vec<Level>,
}

impl LevelSet {
    pub fn new(
        sector: Sector,
        first_level_delta: f64,
        num_levels: usize,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self> {
        Self::from_config(LevelSetConfig {
            sector,
            first_level_delta,
            num_levels,
            tile_width,
            tile_height,
        })
    }

    pub fn from_config(config: LevelSetConfig) -> Result<Self> {
        if config.first_level_delta.is_nan() || config.first_level_delta <= 0.0 {
            return Err(Error::invalid(
                "LevelSet",
                format!("first level delta {} is not positive", config.first_level_delta),
            ));
        }
        if config.tile_width == 0 || config.tile_height == 0 {
            return Err(Error::invalid(
                "LevelSet",
                format!(
                    "tile size {}x{} is empty",
                    config.tile_width, config.tile_height
                ),
            ));
        }

        let levels = (0..config.num_levels)
            .map(|number| {
                let tile_delta = config.first_level_delta / f64::from(1u32 << number.min(31));
                Level {
                    number,
                    tile_delta,
                    tile_width: config.tile_width,
                    tile_height: config.tile_height,
                    texel_height: tile_delta.to_radians() / f64::from(config.tile_height),
                    last: number + 1 == config.num_levels,
                }
            })
            .collect();

        Ok(Self { config, levels })
    }

    #[must_use]
    pub fn sector(&self) -> &Sector {
        &self.config.sector
    }

    #[must_use]
    pub fn config(&self) -> &LevelSetConfig {
        &self.config
    }

    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn level(&self, number: usize) -> Option<&Level> {
        self.levels.get(number)
    }

    #[must_use]
    pub fn first_level(&self) -> Option<&Level> {
        self.levels.first()
    }

    #[must_use]
    pub fn last_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    #[must_use]
    pub fn next_level(&self, level: &Level) -> Option<&Level> {
        self.levels.get(level.number + 1)
    }

    /// The level closest to the given resolution in radians per pixel,
    /// clamped to the first and last levels.
    pub fn level_for_resolution(&self, radians_per_pixel: f64) -> Result<Option<&Level>> {
        let level = self.config.fractional_level(radians_per_pixel)?;
        if self.levels.is_empty() {
            return Ok(None);
        }
        let number = level.round();
        if number < 0.0 {
            return Ok(self.levels.first());
        }
        Ok(self
            .levels
            .get(number as usize)
            .or_else(|| self.levels.last()))
    }
}
