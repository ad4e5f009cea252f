//! Globe geometry and coordinate conversion.
//!
//! Cartesian coordinates are Earth-centered, Earth-fixed: +Z through the north
//! pole, +X through (0°, 0°), +Y through (0°, 90°E). The globe is a sphere of
//! the WGS84 equatorial radius.

use glam::DVec3;

/// WGS84 equatorial radius in meters.
pub const WGS84_EQUATORIAL_RADIUS: f64 = 6_378_137.0;

/// A geographic position in degrees and meters above the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Position {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// A half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    /// Create a ray, normalizing the direction.
    #[must_use]
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    #[must_use]
    pub fn point_at(&self, distance: f64) -> DVec3 {
        self.origin + self.direction * distance
    }
}

/// A spherical globe.
#[derive(Debug, Clone, Copy)]
pub struct Globe {
    radius: f64,
}

impl Default for Globe {
    fn default() -> Self {
        Self::new(WGS84_EQUATORIAL_RADIUS)
    }
}

impl Globe {
    #[must_use]
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    #[must_use]
    pub fn equatorial_radius(&self) -> f64 {
        self.radius
    }

    /// Convert latitude, longitude (degrees) and altitude (meters) to Cartesian coordinates.
    #[must_use]
    pub fn geographic_to_cartesian(&self, latitude: f64, longitude: f64, altitude: f64) -> DVec3 {
        self.surface_normal(latitude, longitude) * (self.radius + altitude)
    }

    /// Convert a Cartesian point to a geographic position.
    #[must_use]
    pub fn cartesian_to_geographic(&self, point: DVec3) -> Position {
        let length = point.length();
        if length == 0.0 {
            return Position::new(0.0, 0.0, -self.radius);
        }
        let lat_rad = (point.z / length).clamp(-1.0, 1.0).asin();
        let lon_rad = point.y.atan2(point.x);
        Position::new(lat_rad.to_degrees(), lon_rad.to_degrees(), length - self.radius)
    }

    /// Unit vector pointing away from the globe's center at the given location.
    #[must_use]
    pub fn surface_normal(&self, latitude: f64, longitude: f64) -> DVec3 {
        let lat_rad = latitude.to_radians();
        let lon_rad = longitude.to_radians();
        DVec3::new(
            lat_rad.cos() * lon_rad.cos(),
            lat_rad.cos() * lon_rad.sin(),
            lat_rad.sin(),
        )
    }

    /// Unit vector pointing north along the surface at the given location.
    #[must_use]
    pub fn north_tangent(&self, latitude: f64, longitude: f64) -> DVec3 {
        let lat_rad = latitude.to_radians();
        let lon_rad = longitude.to_radians();
        DVec3::new(
            -lat_rad.sin() * lon_rad.cos(),
            -lat_rad.sin() * lon_rad.sin(),
            lat_rad.cos(),
        )
    }

    /// Distance from a viewer at `altitude` to the horizon.
    #[must_use]
    pub fn horizon_distance(&self, altitude: f64) -> f64 {
        if altitude > 0.0 {
            (altitude * (2.0 * self.radius + altitude)).sqrt()
        } else {
            0.0
        }
    }

    /// Angle in degrees between the nadir and the horizon, seen from
    /// `altitude`.
    #[must_use]
    pub fn horizon_angle(&self, altitude: f64) -> f64 {
        if altitude > 0.0 {
            (self.radius / (self.radius + altitude)).acos().to_degrees()
        } else {
            0.0
        }
    }

    /// Nearest intersection of the ray with the globe's surface.
    #[must_use]
    pub fn intersect(&self, ray: &Ray) -> Option<DVec3> {
        let b = 2.0 * ray.origin.dot(ray.direction);
        let c = ray.origin.length_squared() - self.radius * self.radius;
        let discriminant = b * b - 4.0 * c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = (-b - root) * 0.5;
        let far = (-b + root) * 0.5;
        let t = if near >= 0.0 { near } else { far };
        (t >= 0.0).then(|| ray.point_at(t))
    }
}
