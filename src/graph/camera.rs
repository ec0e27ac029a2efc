use super::Graph;
use crate::ids::NodeId;
use crate::interpolator::Interpolator;
use crate::node::Node;
use glam::{Mat3, Mat4, Quat, Vec3, Vec4Swizzles};
use std::f32::consts::FRAC_PI_3;

/// How the eye projects the scene onto the viewport.
///
/// `Perspective` and `Orthographic` derive their matrices from the eye pose,
/// the eye magnitude and the scene ball. `TwoD` is an orthographic variant
/// for planar graphs: depth translation is rejected and fits only move the
/// eye in the XY plane. `Custom` bypasses the derivation entirely and trusts
/// the caller's matrix.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Projection {
    Perspective,
    Orthographic,
    TwoD,
    Custom(Mat4),
}

/// Axis-aligned viewport rectangle in pixels, y-down.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }
}

impl Graph {
    #[inline]
    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.touch_projection();
    }

    pub(crate) fn is_2d(&self) -> bool {
        matches!(self.projection, Projection::TwoD)
    }

    #[inline]
    pub fn z_near_coefficient(&self) -> f32 {
        self.z_near_coefficient
    }

    pub fn set_z_near_coefficient(&mut self, coefficient: f32) {
        self.z_near_coefficient = coefficient;
        self.touch_projection();
    }

    #[inline]
    pub fn z_clipping_coefficient(&self) -> f32 {
        self.z_clipping_coefficient
    }

    pub fn set_z_clipping_coefficient(&mut self, coefficient: f32) {
        self.z_clipping_coefficient = coefficient;
        self.touch_projection();
    }

    /// Distance from the eye to the scene center, measured along the view
    /// axis.
    pub fn distance_to_center(&self) -> f32 {
        self.view().transform_point3(self.center()).z.abs()
    }

    /// Near clipping distance, derived per call from the eye pose and the
    /// scene ball: view-axis distance to the center minus
    /// `z_clipping_coefficient * radius`, floored so the scene ball always
    /// clips sanely (`z_near_coefficient * z_clipping_coefficient * radius`
    /// for perspective, 0 for orthographic and 2D).
    pub fn z_near(&self) -> f32 {
        let z = self.distance_to_center() - self.z_clipping_coefficient * self.radius();
        let z_min = self.z_near_coefficient * self.z_clipping_coefficient * self.radius();
        if z < z_min {
            match self.projection {
                Projection::Perspective | Projection::Custom(_) => z_min,
                Projection::Orthographic | Projection::TwoD => 0.0,
            }
        } else {
            z
        }
    }

    /// Far clipping distance: view-axis distance to the center plus
    /// `z_clipping_coefficient * radius`.
    pub fn z_far(&self) -> f32 {
        self.distance_to_center() + self.z_clipping_coefficient * self.radius()
    }

    // ---- field of view ----

    /// Field of view in radians: vertical under perspective, the equivalent
    /// angle the viewport width subtends at the scene center for
    /// orthographic and 2D.
    ///
    /// Perspective reads it straight off the eye magnitude
    /// (`2 * atan(magnitude)`); orthographic kinds have no intrinsic angle,
    /// so the projected half-width `magnitude * width / 2` at the
    /// eye-to-center distance stands in. Falls back to PI/3 with a warning
    /// when the kind admits no answer.
    pub fn fov(&self) -> f32 {
        match self.projection {
            Projection::Perspective => 2.0 * self.magnitude(self.eye).atan(),
            Projection::Orthographic | Projection::TwoD => {
                let d = self.distance_to_center();
                if d <= f32::EPSILON {
                    log::warn!("fov: eye sits on the scene center plane, using fallback");
                    FRAC_PI_3
                } else {
                    2.0 * (self.magnitude(self.eye) * self.width() as f32 * 0.5 / d).atan()
                }
            }
            Projection::Custom(_) => {
                log::warn!("fov: not derivable from a custom projection, using fallback");
                FRAC_PI_3
            }
        }
    }

    /// Set the field of view by adjusting the eye magnitude, inverting the
    /// per-kind formula `fov` uses.
    pub fn set_fov(&mut self, fov: f32) {
        let eye = self.eye;
        match self.projection {
            Projection::Perspective => self.set_magnitude(eye, (fov * 0.5).tan()),
            Projection::Orthographic | Projection::TwoD => {
                let d = self.distance_to_center();
                if d <= f32::EPSILON {
                    log::warn!("set_fov: eye sits on the scene center plane, ignored");
                    return;
                }
                self.set_magnitude(eye, 2.0 * d * (fov * 0.5).tan() / self.width() as f32);
            }
            Projection::Custom(_) => log::warn!("set_fov: custom projection, ignored"),
        }
    }

    /// Horizontal field of view in radians. Orthographic kinds define their
    /// equivalent angle against the viewport width, so this coincides with
    /// `fov` there.
    pub fn hfov(&self) -> f32 {
        match self.projection {
            Projection::Perspective => {
                2.0 * (self.magnitude(self.eye) * self.aspect_ratio()).atan()
            }
            Projection::Orthographic | Projection::TwoD => {
                let d = self.distance_to_center();
                if d <= f32::EPSILON {
                    log::warn!("hfov: eye sits on the scene center plane, using fallback");
                    FRAC_PI_3
                } else {
                    2.0 * (self.magnitude(self.eye) * self.width() as f32 * 0.5 / d).atan()
                }
            }
            Projection::Custom(_) => {
                log::warn!("hfov: not derivable from a custom projection, using fallback");
                FRAC_PI_3
            }
        }
    }

    /// Set the horizontal field of view by adjusting the eye magnitude.
    pub fn set_hfov(&mut self, hfov: f32) {
        let eye = self.eye;
        match self.projection {
            Projection::Perspective => {
                self.set_magnitude(eye, (hfov * 0.5).tan() / self.aspect_ratio())
            }
            Projection::Orthographic | Projection::TwoD => {
                let d = self.distance_to_center();
                if d <= f32::EPSILON {
                    log::warn!("set_hfov: eye sits on the scene center plane, ignored");
                    return;
                }
                self.set_magnitude(eye, 2.0 * d * (hfov * 0.5).tan() / self.width() as f32);
            }
            Projection::Custom(_) => log::warn!("set_hfov: custom projection, ignored"),
        }
    }

    // ---- matrices ----

    /// World-to-eye matrix, derived from the eye pose. The eye magnitude is
    /// a field-of-view proxy and deliberately does not leak into the view.
    pub fn view(&self) -> Mat4 {
        let orientation = self.orientation(self.eye);
        let position = self.position(self.eye);
        let inverse = orientation.inverse();
        Mat4::from_rotation_translation(inverse, inverse * -position)
    }

    /// Eye-to-clip matrix for the current projection kind and clipping
    /// range.
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective => Mat4::perspective_rh_gl(
                self.fov(),
                self.aspect_ratio(),
                self.z_near(),
                self.z_far(),
            ),
            Projection::Orthographic | Projection::TwoD => {
                let m = self.magnitude(self.eye);
                let half_w = m * self.width() as f32 * 0.5;
                let half_h = m * self.height() as f32 * 0.5;
                Mat4::orthographic_rh_gl(-half_w, half_w, -half_h, half_h, self.z_near(), self.z_far())
            }
            Projection::Custom(matrix) => matrix,
        }
    }

    /// `projection_matrix() * view()`.
    pub fn projection_view(&self) -> Mat4 {
        self.projection_matrix() * self.view()
    }

    // ---- eye basis ----

    /// World direction the eye looks along (its -Z axis).
    pub fn view_direction(&self) -> Vec3 {
        self.orientation(self.eye) * Vec3::NEG_Z
    }

    /// World up direction of the eye (its +Y axis).
    pub fn up_vector(&self) -> Vec3 {
        self.orientation(self.eye) * Vec3::Y
    }

    /// World right direction of the eye (its +X axis).
    pub fn right_vector(&self) -> Vec3 {
        self.orientation(self.eye) * Vec3::X
    }

    /// Rotate the eye so it looks along `direction`, keeping the up vector
    /// as close as possible to the current one.
    pub fn set_view_direction(&mut self, direction: Vec3) {
        if self.is_2d() {
            log::warn!("set_view_direction: 2d graphs always look along -Z, ignored");
            return;
        }
        let Some(dir) = direction.try_normalize() else {
            log::warn!("set_view_direction: zero direction, ignored");
            return;
        };
        let up = self.up_vector();
        let mut x_axis = dir.cross(up);
        if x_axis.length_squared() <= 1e-10 {
            // direction is collinear with up; keep the current x axis
            x_axis = self.right_vector();
        }
        let x = x_axis.normalize();
        let y = x.cross(dir).normalize();
        let eye = self.eye;
        self.set_orientation(eye, Quat::from_mat3(&Mat3::from_cols(x, y, -dir)));
    }

    /// Rotate the eye in place so its up vector becomes `up`.
    pub fn set_up_vector(&mut self, up: Vec3) {
        let Some(up) = up.try_normalize() else {
            log::warn!("set_up_vector: zero up vector, ignored");
            return;
        };
        let eye = self.eye;
        let local_up = (self.orientation(eye).inverse() * up).normalize();
        self.rotate(eye, Quat::from_rotation_arc(Vec3::Y, local_up));
    }

    /// Point the eye at a world target.
    pub fn look_at(&mut self, target: Vec3) {
        let eye_position = self.position(self.eye);
        self.set_view_direction(target - eye_position);
    }

    // ---- pixel mapping ----

    /// Project a world point to viewport coordinates: x right, y down, z the
    /// 0..1 depth. Points on the eye plane warn and map to the origin.
    pub fn projected(&self, world: Vec3) -> Vec3 {
        let clip = self.projection_view() * world.extend(1.0);
        if clip.w.abs() <= f32::EPSILON {
            log::warn!("projected: point lies on the eye plane");
            return Vec3::ZERO;
        }
        let ndc = clip.xyz() / clip.w;
        Vec3::new(
            (ndc.x + 1.0) * 0.5 * self.width() as f32,
            (1.0 - ndc.y) * 0.5 * self.height() as f32,
            (ndc.z + 1.0) * 0.5,
        )
    }

    /// Inverse of [`Graph::projected`]: viewport coordinates (x, y, depth)
    /// back to a world point.
    pub fn unprojected(&self, screen: Vec3) -> Vec3 {
        let pv = self.projection_view();
        if pv.determinant().abs() <= 1e-12 {
            log::warn!("unprojected: projection * view is singular");
            return Vec3::ZERO;
        }
        let ndc = Vec3::new(
            screen.x / self.width() as f32 * 2.0 - 1.0,
            1.0 - screen.y / self.height() as f32 * 2.0,
            screen.z * 2.0 - 1.0,
        );
        let world = pv.inverse() * ndc.extend(1.0);
        if world.w.abs() <= f32::EPSILON {
            log::warn!("unprojected: degenerate clip coordinates");
            return Vec3::ZERO;
        }
        world.xyz() / world.w
    }

    /// The world ray cast through pixel (x, y): origin on the near plane,
    /// unit direction into the scene.
    pub fn pixel_ray(&self, x: f32, y: f32) -> Option<(Vec3, Vec3)> {
        let near = self.unprojected(Vec3::new(x, y, 0.0));
        let far = self.unprojected(Vec3::new(x, y, 1.0));
        (far - near).try_normalize().map(|dir| (near, dir))
    }

    /// World units covered by one pixel at the depth of `world`. Constant
    /// for orthographic kinds, depth-dependent under perspective.
    pub fn pixel_to_scene_ratio(&self, world: Vec3) -> f32 {
        match self.projection {
            Projection::Perspective => {
                let z = self.view().transform_point3(world).z.abs();
                2.0 * z * (self.fov() * 0.5).tan() / self.height() as f32
            }
            Projection::Orthographic | Projection::TwoD => self.magnitude(self.eye),
            Projection::Custom(_) => {
                let screen = self.projected(world);
                let a = self.unprojected(screen);
                let b = self.unprojected(Vec3::new(screen.x + 1.0, screen.y, screen.z));
                (b - a).length()
            }
        }
    }

    // ---- fitting ----

    /// Move the eye (without rotating it) so the ball fills the viewport.
    ///
    /// Perspective backs the eye away along the view axis until both fields
    /// of view contain the ball; orthographic kinds adjust the eye magnitude
    /// and recenter. No-op with a warning for custom projections.
    pub fn fit_ball(&mut self, center: Vec3, radius: f32) {
        if radius <= 0.0 || !radius.is_finite() {
            log::warn!("fit_ball: non-positive radius {radius}, ignored");
            return;
        }
        let eye = self.eye;
        match self.projection {
            Projection::Perspective => {
                let y = radius / (self.fov() * 0.5).sin();
                let x = radius / (self.hfov() * 0.5).sin();
                let distance = x.max(y);
                let position = center - self.view_direction() * distance;
                self.set_position(eye, position);
            }
            Projection::Orthographic => {
                let m = 2.0 * radius / self.width().min(self.height()) as f32;
                self.set_magnitude(eye, m);
                let distance = self.z_clipping_coefficient * radius;
                let position = center - self.view_direction() * distance;
                self.set_position(eye, position);
            }
            Projection::TwoD => {
                let m = 2.0 * radius / self.width().min(self.height()) as f32;
                self.set_magnitude(eye, m);
                let z = self.position(eye).z;
                self.set_position(eye, Vec3::new(center.x, center.y, z));
            }
            Projection::Custom(_) => {
                log::warn!("fit_ball: custom projections cannot be fitted, ignored")
            }
        }
    }

    /// Fit the whole scene ball.
    pub fn fit(&mut self) {
        let center = self.center();
        let radius = self.radius();
        self.fit_ball(center, radius);
    }

    /// Fit the ball wrapping an axis-aligned box (radius from its largest
    /// extent).
    pub fn fit_bounding_box(&mut self, min: Vec3, max: Vec3) {
        let extent = (max - min).abs();
        let diameter = extent.x.max(extent.y).max(extent.z);
        self.fit_ball((min + max) * 0.5, diameter * 0.5);
    }

    /// Fit the ball around a node: its world position, with a radius scaling
    /// the scene radius by the node's world magnitude.
    pub fn fit_node(&mut self, id: NodeId) {
        if !self.contains(id) {
            log::warn!("fit_node: stale node handle {id}");
            return;
        }
        let center = self.position(id);
        let radius = self.radius() * self.magnitude(id);
        self.fit_ball(center, radius);
    }

    /// Zoom onto a viewport rectangle: the world points seen through the
    /// region's center and edge midpoints, pushed onto the plane through the
    /// scene center orthogonal to the view axis, decide the new eye pose.
    pub fn fit_screen_region(&mut self, region: PixelRect) {
        if region.width <= 0.0 || region.height <= 0.0 {
            log::warn!("fit_screen_region: empty region, ignored");
            return;
        }
        if matches!(self.projection, Projection::Custom(_)) {
            log::warn!("fit_screen_region: custom projections cannot be fitted, ignored");
            return;
        }
        let direction = self.view_direction();
        let distance = self.distance_to_center();
        let (cx, cy) = region.center();
        let (Some(plane_center), Some(point_x), Some(point_y)) = (
            self.center_plane_hit(cx, cy, direction),
            self.center_plane_hit(region.x, cy, direction),
            self.center_plane_hit(cx, region.y, direction),
        ) else {
            log::warn!("fit_screen_region: region rays miss the center plane, ignored");
            return;
        };
        let eye = self.eye;
        let half_w = point_x.distance(plane_center);
        let half_h = point_y.distance(plane_center);
        match self.projection {
            Projection::Perspective => {
                let x = half_w / (self.hfov() * 0.5).sin();
                let y = half_h / (self.fov() * 0.5).sin();
                self.set_position(eye, plane_center - direction * x.max(y));
            }
            Projection::Orthographic => {
                let m = (2.0 * half_w / self.width() as f32).max(2.0 * half_h / self.height() as f32);
                self.set_magnitude(eye, m);
                self.set_position(eye, plane_center - direction * distance);
            }
            Projection::TwoD => {
                let m = (2.0 * half_w / self.width() as f32).max(2.0 * half_h / self.height() as f32);
                self.set_magnitude(eye, m);
                let z = self.position(eye).z;
                self.set_position(eye, Vec3::new(plane_center.x, plane_center.y, z));
            }
            Projection::Custom(_) => unreachable!(),
        }
    }

    /// Where the ray through pixel (x, y) meets the plane through the scene
    /// center orthogonal to the view axis.
    fn center_plane_hit(&self, x: f32, y: f32, view_direction: Vec3) -> Option<Vec3> {
        let (origin, dir) = self.pixel_ray(x, y)?;
        let denom = dir.dot(view_direction);
        if denom.abs() <= 1e-6 {
            return None;
        }
        let t = (self.center() - origin).dot(view_direction) / denom;
        Some(origin + dir * t)
    }

    // ---- animated fits ----

    pub fn fit_ball_animated(&mut self, center: Vec3, radius: f32, duration_ms: f32) {
        self.fly_with(duration_ms, |graph| graph.fit_ball(center, radius));
    }

    pub fn fit_animated(&mut self, duration_ms: f32) {
        self.fly_with(duration_ms, |graph| graph.fit());
    }

    pub fn fit_bounding_box_animated(&mut self, min: Vec3, max: Vec3, duration_ms: f32) {
        self.fly_with(duration_ms, |graph| graph.fit_bounding_box(min, max));
    }

    pub fn fit_node_animated(&mut self, id: NodeId, duration_ms: f32) {
        self.fly_with(duration_ms, |graph| graph.fit_node(id));
    }

    pub fn fit_screen_region_animated(&mut self, region: PixelRect, duration_ms: f32) {
        self.fly_with(duration_ms, |graph| graph.fit_screen_region(region));
    }

    /// Run `fit`, then fly the eye from its current pose to the fitted pose
    /// over `duration_ms` on the graph-owned flight interpolator. A
    /// non-positive duration applies the fit immediately; a new flight
    /// replaces any running one.
    fn fly_with(&mut self, duration_ms: f32, fit: impl FnOnce(&mut Self)) {
        if duration_ms <= 0.0 {
            fit(self);
            return;
        }
        let eye = self.eye;
        let start = (
            self.position(eye),
            self.orientation(eye),
            self.magnitude(eye),
        );
        fit(self);
        let end = (
            self.position(eye),
            self.orientation(eye),
            self.magnitude(eye),
        );
        self.set_position(eye, start.0);
        self.set_orientation(eye, start.1);
        self.set_magnitude(eye, start.2);
        let mut flight = self
            .eye_flight
            .take()
            .unwrap_or_else(|| Interpolator::new(eye));
        flight.stop();
        flight.clear(self);
        flight.set_node(eye);
        let from = self.insert_detached_with(Node::from_trs(start.0, start.1, start.2));
        let to = self.insert_detached_with(Node::from_trs(end.0, end.1, end.2));
        flight.add_key_frame(self, from, 0.0);
        flight.add_key_frame(self, to, duration_ms / 1000.0);
        flight.reset();
        flight.run();
        self.eye_flight = Some(flight);
    }
}
