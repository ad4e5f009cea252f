//! Viewing transforms and the projections derived from them.

use glam::{DMat4, DVec2, DVec3, DVec4};

use crate::geom::{Camera, Frustum, Globe, Ray, Sector, Viewport};

/// Altitude of the atmosphere's upper edge used to place the far clip plane.
const ATMOSPHERE_ALTITUDE: f64 = 160_000.0;

/// Smallest near clip distance, for cameras at or below the surface.
const MIN_NEAR_DISTANCE: f64 = 1.0;

/// Compute the projection and modelview matrices for a camera.
#[must_use]
pub fn viewing_transform(
    globe: &Globe,
    camera: &Camera,
    viewport: &Viewport,
    field_of_view: f64,
) -> (DMat4, DMat4) {
    let eye_horizon = globe.horizon_distance(camera.altitude);
    let atmosphere_horizon = globe.horizon_distance(ATMOSPHERE_ALTITUDE);
    let near = (camera.altitude * 0.5).max(MIN_NEAR_DISTANCE);
    let far = (eye_horizon + atmosphere_horizon).max(near * 2.0);
    let aspect = if viewport.height > 0 {
        f64::from(viewport.width) / f64::from(viewport.height)
    } else {
        1.0
    };
    let projection = DMat4::perspective_rh_gl(field_of_view.to_radians(), aspect, near, far);
    (projection, camera.view_matrix(globe))
}

/// Minimum distance from the surface that shows the whole globe.
#[must_use]
pub fn distance_to_view_globe_extents(globe: &Globe, field_of_view: f64) -> f64 {
    let sin_half = (field_of_view * 0.5).to_radians().sin();
    let radius = globe.equatorial_radius();
    radius / sin_half - radius
}

/// Clip-space transform that stretches `sub` to fill `viewport`.
fn sub_viewport_transform(viewport: &Viewport, sub: &Viewport) -> DMat4 {
    let vw = f64::from(viewport.width.max(1));
    let vh = f64::from(viewport.height.max(1));
    let x0 = 2.0 * f64::from(sub.x - viewport.x) / vw - 1.0;
    let x1 = 2.0 * f64::from(sub.x + sub.width - viewport.x) / vw - 1.0;
    let y0 = 2.0 * f64::from(sub.y - viewport.y) / vh - 1.0;
    let y1 = 2.0 * f64::from(sub.y + sub.height - viewport.y) / vh - 1.0;
    let sx = 2.0 / (x1 - x0);
    let sy = 2.0 / (y1 - y0);
    DMat4::from_cols(
        DVec4::new(sx, 0.0, 0.0, 0.0),
        DVec4::new(0.0, sy, 0.0, 0.0),
        DVec4::new(0.0, 0.0, 1.0, 0.0),
        DVec4::new(-(x0 + x1) / (x1 - x0), -(y0 + y1) / (y1 - y0), 0.0, 1.0),
    )
}

/// One projected grid cell of a sector, ready for submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCell {
    /// Window coordinates, counter-clockwise from the southwest corner.
    pub corners: [DVec2; 4],
    /// Position of each corner within the sector: `s` east, `t` north, both
    /// in [0, 1].
    pub local: [DVec2; 4],
    /// Mean window depth of the corners.
    pub depth: f64,
}

/// The geometric state of one assembly pass.
///
/// Window coordinates have their origin at the viewport's lower-left corner.
/// Screen coordinates, used by the `screen_` helpers, have their origin at the
/// top-left corner, as input events report them.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub globe: Globe,
    pub camera: Camera,
    pub camera_point: DVec3,
    pub viewport: Viewport,
    pub modelview: DMat4,
    pub projection: DMat4,
    pub modelview_projection: DMat4,
    pub frustum: Frustum,
    pub horizon_distance: f64,
    pub field_of_view: f64,
    pixel_size_factor: f64,
}

impl ViewState {
    #[must_use]
    pub fn new(globe: Globe, camera: Camera, viewport: Viewport, field_of_view: f64) -> Self {
        let (projection, modelview) = viewing_transform(&globe, &camera, &viewport, field_of_view);
        let modelview_projection = projection * modelview;
        let camera_point =
            globe.geographic_to_cartesian(camera.latitude, camera.longitude, camera.altitude);
        let pixel_size_factor = if viewport.height > 0 {
            2.0 * (field_of_view * 0.5).to_radians().tan() / f64::from(viewport.height)
        } else {
            0.0
        };
        Self {
            horizon_distance: globe.horizon_distance(camera.altitude),
            frustum: Frustum::from_matrix(modelview_projection),
            globe,
            camera,
            camera_point,
            viewport,
            modelview,
            projection,
            modelview_projection,
            field_of_view,
            pixel_size_factor,
        }
    }

    /// Restrict the culling frustum to a sub-rectangle of the viewport.
    #[must_use]
    pub fn with_pick_viewport(mut self, pick_viewport: &Viewport) -> Self {
        if !pick_viewport.is_empty() {
            let remap = sub_viewport_transform(&self.viewport, pick_viewport);
            self.frustum = Frustum::from_matrix(remap * self.modelview_projection);
        }
        self
    }

    /// Largest angle from the camera's nadir, in degrees, at which the surface
    /// or the atmosphere above it can still be seen.
    #[must_use]
    pub fn visible_surface_angle(&self) -> f64 {
        self.globe.horizon_angle(self.camera.altitude)
            + self.globe.horizon_angle(ATMOSPHERE_ALTITUDE)
    }

    /// Size in meters of one pixel at the given distance from the eye.
    #[must_use]
    pub fn pixel_size_at_distance(&self, distance: f64) -> f64 {
        distance * self.pixel_size_factor
    }

    /// Project a Cartesian point to window coordinates with depth in [0, 1].
    #[must_use]
    pub fn project(&self, point: DVec3) -> Option<DVec3> {
        let clip = self.modelview_projection * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if !(-1.0..=1.0).contains(&ndc.z) {
            return None;
        }
        Some(DVec3::new(
            f64::from(self.viewport.x) + (ndc.x * 0.5 + 0.5) * f64::from(self.viewport.width),
            f64::from(self.viewport.y) + (ndc.y * 0.5 + 0.5) * f64::from(self.viewport.height),
            ndc.z * 0.5 + 0.5,
        ))
    }

    /// Convert a screen y coordinate to window coordinates, or back.
    #[must_use]
    pub fn flip_y(&self, y: f64) -> f64 {
        f64::from(self.viewport.y + self.viewport.height) - y
    }

    /// Ray from the eye through a screen point.
    #[must_use]
    pub fn ray_through_screen_point(&self, x: f64, y: f64) -> Option<Ray> {
        if self.viewport.is_empty() {
            return None;
        }
        let wy = self.flip_y(y);
        let nx = 2.0 * (x - f64::from(self.viewport.x)) / f64::from(self.viewport.width) - 1.0;
        let ny = 2.0 * (wy - f64::from(self.viewport.y)) / f64::from(self.viewport.height) - 1.0;
        let inverse = self.modelview_projection.inverse();
        let near = inverse.project_point3(DVec3::new(nx, ny, -1.0));
        let far = inverse.project_point3(DVec3::new(nx, ny, 1.0));
        if !near.is_finite() || !far.is_finite() {
            return None;
        }
        Some(Ray::new(near, far - near))
    }

    /// Whether a point on the globe faces the eye.
    #[must_use]
    pub fn is_facing(&self, point: DVec3) -> bool {
        point.normalize_or_zero().dot(point - self.camera_point) < 0.0
    }

    /// Split a sector into a `density` x `density` grid and project the cells
    /// that face the eye and overlap the viewport.
    #[must_use]
    pub fn project_sector(&self, sector: &Sector, density: usize) -> Vec<SurfaceCell> {
        let n = density.max(1);
        let stride = n + 1;
        let mut projected = Vec::with_capacity(stride * stride);
        for i in 0..=n {
            let lat = sector.min_latitude + sector.delta_latitude() * i as f64 / n as f64;
            for j in 0..=n {
                let lon = sector.min_longitude + sector.delta_longitude() * j as f64 / n as f64;
                projected.push(self.project(self.globe.geographic_to_cartesian(lat, lon, 0.0)));
            }
        }

        let (vx0, vy0) = (f64::from(self.viewport.x), f64::from(self.viewport.y));
        let vx1 = vx0 + f64::from(self.viewport.width);
        let vy1 = vy0 + f64::from(self.viewport.height);
        let mut cells = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let indices = [
                    i * stride + j,
                    i * stride + j + 1,
                    (i + 1) * stride + j + 1,
                    (i + 1) * stride + j,
                ];
                let Some(points) = indices
                    .iter()
                    .map(|&k| projected[k])
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };
                let center_lat = sector.min_latitude
                    + sector.delta_latitude() * (i as f64 + 0.5) / n as f64;
                let center_lon = sector.min_longitude
                    + sector.delta_longitude() * (j as f64 + 0.5) / n as f64;
                let center = self.globe.geographic_to_cartesian(center_lat, center_lon, 0.0);
                if !self.is_facing(center) {
                    continue;
                }
                let min = points
                    .iter()
                    .fold(DVec2::splat(f64::INFINITY), |m, p| m.min(p.truncate()));
                let max = points
                    .iter()
                    .fold(DVec2::splat(f64::NEG_INFINITY), |m, p| m.max(p.truncate()));
                if max.x < vx0 || min.x > vx1 || max.y < vy0 || min.y > vy1 {
                    continue;
                }
                let (s0, s1) = (j as f64 / n as f64, (j + 1) as f64 / n as f64);
                let (t0, t1) = (i as f64 / n as f64, (i + 1) as f64 / n as f64);
                cells.push(SurfaceCell {
                    corners: [
                        points[0].truncate(),
                        points[1].truncate(),
                        points[2].truncate(),
                        points[3].truncate(),
                    ],
                    local: [
                        DVec2::new(s0, t0),
                        DVec2::new(s1, t0),
                        DVec2::new(s1, t1),
                        DVec2::new(s0, t1),
                    ],
                    depth: points.iter().map(|p| p.z).sum::<f64>() / 4.0,
                });
            }
        }
        cells
    }

    /// Screen point of a geographic position, if it lies within the clip volume.
    #[must_use]
    pub fn geographic_to_screen_point(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    ) -> Option<DVec2> {
        let point = self.globe.geographic_to_cartesian(latitude, longitude, altitude);
        let window = self.project(point)?;
        Some(DVec2::new(window.x, self.flip_y(window.y)))
    }
}
