//! Geographic bounding rectangles.

use serde::{Deserialize, Serialize};

/// An axis-aligned latitude/longitude rectangle, in degrees.
///
/// A sector whose minimum exceeds its maximum on either axis is empty. The
/// default sector is empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Default for Sector {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Sector {
    /// A sector containing nothing.
    pub const EMPTY: Sector = Sector {
        min_latitude: f64::NAN,
        max_latitude: f64::NAN,
        min_longitude: f64::NAN,
        max_longitude: f64::NAN,
    };

    /// Create a sector from its minimum corner and its extent.
    #[must_use]
    pub fn from_degrees(
        min_latitude: f64,
        min_longitude: f64,
        delta_latitude: f64,
        delta_longitude: f64,
    ) -> Self {
        Self {
            min_latitude,
            max_latitude: min_latitude + delta_latitude,
            min_longitude,
            max_longitude: min_longitude + delta_longitude,
        }
    }

    /// The whole globe.
    #[must_use]
    pub fn full_sphere() -> Self {
        Self {
            min_latitude: -90.0,
            max_latitude: 90.0,
            min_longitude: -180.0,
            max_longitude: 180.0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        // NaN bounds fail both comparisons, so the negation also catches them.
        !(self.min_latitude <= self.max_latitude && self.min_longitude <= self.max_longitude)
    }

    #[must_use]
    pub fn is_full_sphere(&self) -> bool {
        self.min_latitude == -90.0
            && self.max_latitude == 90.0
            && self.min_longitude == -180.0
            && self.max_longitude == 180.0
    }

    #[must_use]
    pub fn delta_latitude(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    #[must_use]
    pub fn delta_longitude(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    #[must_use]
    pub fn centroid_latitude(&self) -> f64 {
        0.5 * (self.min_latitude + self.max_latitude)
    }

    #[must_use]
    pub fn centroid_longitude(&self) -> f64 {
        0.5 * (self.min_longitude + self.max_longitude)
    }

    /// Whether the location lies inside or on the boundary of this sector.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        !self.is_empty()
            && latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    /// Great-circle angle in degrees from a location to the nearest point of
    /// this sector. Zero inside the sector, infinite for an empty sector.
    #[must_use]
    pub fn angular_distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        if self.is_empty() {
            return f64::INFINITY;
        }
        let wrapped = self.min_longitude + (longitude - self.min_longitude).rem_euclid(360.0);
        if latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && wrapped <= self.max_longitude
        {
            return 0.0;
        }

        // Outside the sector the nearest point lies on its boundary.
        let cosine = [
            meridian_max_cosine(latitude, longitude, self.min_longitude, self),
            meridian_max_cosine(latitude, longitude, self.max_longitude, self),
            parallel_max_cosine(latitude, longitude, self.min_latitude, self),
            parallel_max_cosine(latitude, longitude, self.max_latitude, self),
        ]
        .into_iter()
        .fold(-1.0, f64::max);
        cosine.clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// Whether `other` lies entirely within this sector.
    #[must_use]
    pub fn contains_sector(&self, other: &Sector) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.min_latitude >= self.min_latitude
            && other.max_latitude <= self.max_latitude
            && other.min_longitude >= self.min_longitude
            && other.max_longitude <= self.max_longitude
    }

    /// Whether the two sectors share any interior area.
    ///
    /// Sectors that only touch along an edge do not intersect.
    #[must_use]
    pub fn intersects(&self, other: &Sector) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min_latitude < other.max_latitude
            && self.max_latitude > other.min_latitude
            && self.min_longitude < other.max_longitude
            && self.max_longitude > other.min_longitude
    }

    /// The overlapping region, or an empty sector.
    #[must_use]
    pub fn intersection(&self, other: &Sector) -> Sector {
        if !self.intersects(other) {
            return Sector::EMPTY;
        }
        Sector {
            min_latitude: self.min_latitude.max(other.min_latitude),
            max_latitude: self.max_latitude.min(other.max_latitude),
            min_longitude: self.min_longitude.max(other.min_longitude),
            max_longitude: self.max_longitude.min(other.max_longitude),
        }
    }

    /// The smallest sector containing both sectors.
    #[must_use]
    pub fn union(&self, other: &Sector) -> Sector {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Sector {
            min_latitude: self.min_latitude.min(other.min_latitude),
            max_latitude: self.max_latitude.max(other.max_latitude),
            min_longitude: self.min_longitude.min(other.min_longitude),
            max_longitude: self.max_longitude.max(other.max_longitude),
        }
    }
}

/// Cosine of the angle between two locations given in degrees.
fn angle_cosine(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let (lat_a, lat_b) = (lat_a.to_radians(), lat_b.to_radians());
    lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * (lon_b - lon_a).to_radians().cos()
}

/// Largest cosine from the location to the sector's edge along `meridian`.
fn meridian_max_cosine(latitude: f64, longitude: f64, meridian: f64, sector: &Sector) -> f64 {
    let (min, max) = (sector.min_latitude, sector.max_latitude);
    let lat = latitude.to_radians();
    // Along a meridian the cosine is a sinusoid in latitude peaking here.
    let peak = lat
        .sin()
        .atan2(lat.cos() * (meridian - longitude).to_radians().cos())
        .to_degrees();
    let mut best = angle_cosine(latitude, longitude, min, meridian)
        .max(angle_cosine(latitude, longitude, max, meridian));
    if (min..=max).contains(&peak) {
        best = best.max(angle_cosine(latitude, longitude, peak, meridian));
    }
    best
}

/// Largest cosine from the location to the sector's edge along `parallel`.
fn parallel_max_cosine(latitude: f64, longitude: f64, parallel: f64, sector: &Sector) -> f64 {
    let (min, max) = (sector.min_longitude, sector.max_longitude);
    let mut best = angle_cosine(latitude, longitude, parallel, min)
        .max(angle_cosine(latitude, longitude, parallel, max));
    let wrapped = min + (longitude - min).rem_euclid(360.0);
    if wrapped <= max {
        best = best.max(angle_cosine(latitude, longitude, parallel, wrapped));
    }
    best
}
