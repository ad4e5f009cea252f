//! Integer window rectangles.

/// A rectangle in window coordinates, origin at the lower-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    #[must_use]
    pub fn intersects(&self, other: &Viewport) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// The overlap of both rectangles, empty when they do not intersect.
    #[must_use]
    pub fn intersection(&self, other: &Viewport) -> Viewport {
        if !self.intersects(other) {
            return Viewport::default();
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let top = (self.y + self.height).min(other.y + other.height);
        Viewport::new(x, y, right - x, top - y)
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_half_open() {
        let v = Viewport::new(0, 0, 10, 5);
        assert!(v.contains(0, 0));
        assert!(v.contains(9, 4));
        assert!(!v.contains(10, 4));
        assert!(!v.contains(9, 5));
    }

    #[test]
    fn test_intersection_clips_pick_rectangle() {
        let screen = Viewport::new(0, 0, 100, 100);
        let pick = Viewport::new(-1, 98, 3, 3);
        assert_eq!(pick.intersection(&screen), Viewport::new(0, 98, 2, 2));
        assert!(Viewport::new(200, 200, 3, 3).intersection(&screen).is_empty());
    }
}
