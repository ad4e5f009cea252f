//! Camera state and the viewing matrix it implies.

use glam::{DMat4, DQuat};

use super::globe::{Globe, Position};

/// Camera state in geographic terms.
///
/// Heading is measured clockwise from north, tilt from straight down towards
/// the horizon, and roll about the view direction; all in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f64,
    pub tilt: f64,
    pub roll: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 10_000_000.0,
            heading: 0.0,
            tilt: 0.0,
            roll: 0.0,
        }
    }
}

impl Camera {
    /// A camera looking straight down at the given location.
    #[must_use]
    pub fn looking_down(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude, self.altitude)
    }

    /// The modelview matrix transforming globe Cartesian coordinates to eye coordinates.
    #[must_use]
    pub fn view_matrix(&self, globe: &Globe) -> DMat4 {
        let eye = globe.geographic_to_cartesian(self.latitude, self.longitude, self.altitude);
        let up = globe.surface_normal(self.latitude, self.longitude);
        let north = globe.north_tangent(self.latitude, self.longitude);
        let east = north.cross(up);

        // Start looking straight down with north at the top of the screen.
        let heading = DQuat::from_axis_angle(up, -self.heading.to_radians());
        let mut forward = -up;
        let mut view_up = heading * north;

        let right = heading * east;
        let tilt = DQuat::from_axis_angle(right, self.tilt.to_radians());
        forward = tilt * forward;
        view_up = tilt * view_up;

        let roll = DQuat::from_axis_angle(forward, self.roll.to_radians());
        view_up = roll * view_up;

        DMat4::look_to_rh(eye, forward, view_up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looking_down_centers_nadir() {
        let globe = Globe::default();
        let camera = Camera::looking_down(30.0, 60.0, 500_000.0);
        let view = camera.view_matrix(&globe);
        let nadir = globe.geographic_to_cartesian(30.0, 60.0, 0.0);
        let eye = view.transform_point3(nadir);
        assert!(eye.x.abs() < 1e-3);
        assert!(eye.y.abs() < 1e-3);
        assert!((eye.z + 500_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_north_is_up_on_screen() {
        let globe = Globe::default();
        let camera = Camera::looking_down(0.0, 0.0, 500_000.0);
        let view = camera.view_matrix(&globe);
        let north = view.transform_point3(globe.geographic_to_cartesian(1.0, 0.0, 0.0));
        let east = view.transform_point3(globe.geographic_to_cartesian(0.0, 1.0, 0.0));
        assert!(north.y > 0.0);
        assert!(east.x > 0.0);
    }

    #[test]
    fn test_tilt_looks_towards_horizon() {
        let globe = Globe::default();
        let camera = Camera {
            tilt: 90.0,
            ..Camera::looking_down(0.0, 0.0, 1000.0)
        };
        let view = camera.view_matrix(&globe);
        // A point due north on the horizon lies in front of the eye.
        let ahead = view.transform_point3(globe.geographic_to_cartesian(0.5, 0.0, 1000.0));
        assert!(ahead.z < 0.0);
        assert!(ahead.x.abs() < 1.0);
    }

    #[test]
    fn test_heading_turns_east_to_top() {
        let globe = Globe::default();
        let camera = Camera {
            heading: 90.0,
            ..Camera::looking_down(0.0, 0.0, 500_000.0)
        };
        let view = camera.view_matrix(&globe);
        let east = view.transform_point3(globe.geographic_to_cartesian(0.0, 1.0, 0.0));
        assert!(east.y > 0.0);
        assert!(east.x.abs() < 1e-3);
    }
}
