//! View frustum extraction and culling.

use glam::{DMat4, DVec3};

/// A frustum for culling tiles and renderables against the view volume.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// Frustum planes (left, right, bottom, top, near, far).
    /// Each plane is represented as (normal, distance) with the normal
    /// pointing into the volume.
    planes: [(DVec3, f64); 6],
}

impl Default for Frustum {
    /// The canonical clip volume, which accepts everything inside [-1, 1]^3.
    fn default() -> Self {
        Self::from_matrix(DMat4::IDENTITY)
    }
}

impl Frustum {
    /// Create a frustum from a modelview-projection matrix.
    #[must_use]
    pub fn from_matrix(mvp: DMat4) -> Self {
        // Columns are indexed first: m[col][row].
        let m = mvp.to_cols_array_2d();
        let row = |r: usize| [m[0][r], m[1][r], m[2][r], m[3][r]];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let combine = |a: [f64; 4], b: [f64; 4], sign: f64| {
            Self::normalize_plane(
                a[0] + sign * b[0],
                a[1] + sign * b[1],
                a[2] + sign * b[2],
                a[3] + sign * b[3],
            )
        };

        Self {
            planes: [
                combine(r3, r0, 1.0),
                combine(r3, r0, -1.0),
                combine(r3, r1, 1.0),
                combine(r3, r1, -1.0),
                combine(r3, r2, 1.0),
                combine(r3, r2, -1.0),
            ],
        }
    }

    fn normalize_plane(a: f64, b: f64, c: f64, d: f64) -> (DVec3, f64) {
        let normal = DVec3::new(a, b, c);
        let length = normal.length();
        if length > 0.0 {
            (normal / length, d / length)
        } else {
            (DVec3::ZERO, 0.0)
        }
    }

    /// Test if a bounding sphere intersects the frustum.
    #[must_use]
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.planes
            .iter()
            .all(|&(normal, distance)| normal.dot(center) + distance >= -radius)
    }

    /// Test if a point lies inside the frustum.
    #[must_use]
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perspective() -> DMat4 {
        let projection =
            DMat4::perspective_rh_gl(std::f64::consts::FRAC_PI_2, 1.0, 1.0, 1000.0);
        let view = DMat4::look_to_rh(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y);
        projection * view
    }

    #[test]
    fn test_point_in_front_is_inside() {
        let frustum = Frustum::from_matrix(perspective());
        assert!(frustum.contains_point(DVec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.contains_point(DVec3::new(0.0, 0.0, -2000.0)));
    }

    #[test]
    fn test_sphere_straddling_plane_intersects() {
        let frustum = Frustum::from_matrix(perspective());
        // Behind the camera, but large enough to reach the near plane.
        assert!(frustum.intersects_sphere(DVec3::new(0.0, 0.0, 5.0), 10.0));
        assert!(!frustum.intersects_sphere(DVec3::new(0.0, 0.0, 50.0), 10.0));
    }
}
