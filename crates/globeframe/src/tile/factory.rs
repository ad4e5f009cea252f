//! Tile construction and image source assignment.

use crate::geom::Sector;
use crate::resource::ImageSource;

use super::{Level, Tile};

/// Builds tiles and decides which image, if any, each tile displays.
pub trait TileFactory: Send + Sync {
    /// The image for a tile, or `None` when the source has no data there.
    fn image_source(&self, tile: &Tile) -> Option<ImageSource>;

    fn create_tile(&self, sector: Sector, level: &Level, row: i32, column: i32) -> Tile {
        let mut tile = Tile::new(sector, *level, row, column);
        tile.image_source = self.image_source(&tile);
        tile
    }
}

/// A factory that expands `{level}`, `{row}` and `{column}` in a template.
///
/// Templates starting with a URL scheme produce URL sources; anything else is
/// treated as a file path. Coverage and level limits describe sparse pyramids:
/// tiles outside them get no image but still subdivide.
#[derive(Debug, Clone)]
pub struct TemplateTileFactory {
    template: String,
    coverage: Option<Sector>,
    first_level: usize,
    last_level: Option<usize>,
}

impl TemplateTileFactory {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            coverage: None,
            first_level: 0,
            last_level: None,
        }
    }

    /// Only produce images for tiles intersecting `coverage`.
    #[must_use]
    pub fn with_coverage(mut self, coverage: Sector) -> Self {
        self.coverage = Some(coverage);
        self
    }

    /// Only produce images for levels within `first..=last`.
    #[must_use]
    pub fn with_levels(mut self, first: usize, last: usize) -> Self {
        self.first_level = first;
        self.last_level = Some(last);
        self
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expand the template for a tile address.
    #[must_use]
    pub fn expand(&self, level: usize, row: i32, column: i32) -> String {
        self.template
            .replace("{level}", &level.to_string())
            .replace("{row}", &row.to_string())
            .replace("{column}", &column.to_string())
    }

    fn has_data(&self, tile: &Tile) -> bool {
        let number = tile.level.number;
        if number < self.first_level || self.last_level.is_some_and(|last| number > last) {
            return false;
        }
        self.coverage
            .is_none_or(|coverage| coverage.intersects(&tile.sector))
    }
}

impl TileFactory for TemplateTileFactory {
    fn image_source(&self, tile: &Tile) -> Option<ImageSource> {
        if !self.has_data(tile) {
            return None;
        }
        let expanded = self.expand(tile.level.number, tile.row, tile.column);
        if expanded.contains("://") {
            Some(ImageSource::from_url(expanded))
        } else {
            Some(ImageSource::from_path(expanded))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::LevelSet;

    #[test]
    fn test_expand_template() {
        let factory = TemplateTileFactory::new("https://tiles.example.com/{level}/{row}/{column}.png");
        assert_eq!(
            factory.expand(3, 5, 12),
            "https://tiles.example.com/3/5/12.png"
        );
    }

    #[test]
    fn test_url_and_path_sources() {
        let levels = LevelSet::new(Sector::full_sphere(), 90.0, 2, 256, 256).unwrap();
        let level = levels.first_level().unwrap();
        let sector = Sector::from_degrees(-90.0, -180.0, 90.0, 90.0);

        let url = TemplateTileFactory::new("http://host/{level}_{row}_{column}.jpg");
        let tile = url.create_tile(sector, level, 0, 0);
        assert_eq!(
            tile.image_source,
            Some(ImageSource::from_url("http://host/0_0_0.jpg"))
        );

        let path = TemplateTileFactory::new("/data/{level}/{row}/{column}.png");
        let tile = path.create_tile(sector, level, 0, 1);
        assert_eq!(
            tile.image_source,
            Some(ImageSource::from_path("/data/0/0/1.png"))
        );
    }

    #[test]
    fn test_sparse_levels_and_coverage() {
        let levels = LevelSet::new(Sector::full_sphere(), 90.0, 3, 256, 256).unwrap();
        let factory = TemplateTileFactory::new("{level}/{row}/{column}")
            .with_levels(1, 2)
            .with_coverage(Sector::from_degrees(0.0, 0.0, 10.0, 10.0));

        let top = factory.create_tile(
            Sector::from_degrees(0.0, 0.0, 90.0, 90.0),
            levels.level(0).unwrap(),
            1,
            2,
        );
        assert!(top.image_source.is_none());

        let inside = factory.create_tile(
            Sector::from_degrees(0.0, 0.0, 45.0, 45.0),
            levels.level(1).unwrap(),
            2,
            4,
        );
        assert!(inside.image_source.is_some());

        let outside = factory.create_tile(
            Sector::from_degrees(-45.0, -45.0, 45.0, 45.0),
            levels.level(1).unwrap(),
            1,
            3,
        );
        assert!(outside.image_source.is_none());
    }
}
