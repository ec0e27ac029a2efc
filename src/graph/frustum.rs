use super::{Graph, Projection};
use glam::{Vec3, Vec4, Vec4Swizzles};

/// Outcome of classifying a volume against the eye boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Visibility {
    /// Entirely inside the boundary.
    Visible,
    /// Straddles at least one boundary plane.
    SemiVisible,
    /// Entirely outside.
    Invisible,
}

/// Cached boundary planes keyed on the eye and projection stamps.
///
/// Planes store inward normals: `n.dot(p) + w` is positive inside the
/// frustum. Indices run left, right, top, bottom, near, far; 2D graphs use
/// only the first four.
#[derive(Debug, Clone)]
pub(crate) struct FrustumCache {
    pub(crate) planes: [Vec4; 6],
    pub(crate) plane_count: usize,
    pub(crate) enabled: bool,
    pub(crate) computed: bool,
    pub(crate) eye_stamp: u64,
    pub(crate) projection_stamp: u64,
}

impl FrustumCache {
    pub(crate) fn new() -> Self {
        Self {
            planes: [Vec4::ZERO; 6],
            plane_count: 0,
            enabled: false,
            computed: false,
            eye_stamp: 0,
            projection_stamp: 0,
        }
    }
}

impl Graph {
    /// Keep the boundary planes current: refreshed here and on every
    /// [`Graph::pre_draw`] while enabled.
    pub fn enable_boundary_equations(&mut self, enabled: bool) {
        self.frustum.enabled = enabled;
        if enabled {
            self.update_boundary_equations();
        }
    }

    pub fn boundary_equations_enabled(&self) -> bool {
        self.frustum.enabled
    }

    fn boundary_stale(&self) -> bool {
        if !self.frustum.computed {
            return true;
        }
        let eye_stamp = self
            .node(self.eye())
            .map(|n| n.last_update())
            .unwrap_or(0);
        self.frustum.eye_stamp != eye_stamp
            || self.frustum.projection_stamp != self.projection_stamp
    }

    /// Recompute the boundary planes if the eye or projection changed since
    /// the last computation.
    pub fn update_boundary_equations(&mut self) {
        if !self.boundary_stale() {
            return;
        }
        let (planes, count) = self.compute_boundary_equations();
        self.frustum.planes = planes;
        self.frustum.plane_count = count;
        self.frustum.computed = true;
        self.frustum.eye_stamp = self
            .node(self.eye())
            .map(|n| n.last_update())
            .unwrap_or(0);
        self.frustum.projection_stamp = self.projection_stamp;
    }

    fn compute_boundary_equations(&self) -> ([Vec4; 6], usize) {
        match self.projection {
            Projection::Custom(_) => (self.extract_planes_from_matrix(), 6),
            Projection::Perspective => (self.perspective_planes(), 6),
            Projection::Orthographic => (self.orthographic_planes(), 6),
            Projection::TwoD => (self.orthographic_planes(), 4),
        }
    }

    fn perspective_planes(&self) -> [Vec4; 6] {
        let position = self.position(self.eye());
        let view = self.view_direction();
        let up = self.up_vector();
        let right = self.right_vector();
        let (sin_h, cos_h) = (self.hfov() * 0.5).sin_cos();
        let (sin_v, cos_v) = (self.fov() * 0.5).sin_cos();
        let normals = [
            right * cos_h + view * sin_h,  // left
            -right * cos_h + view * sin_h, // right
            -up * cos_v + view * sin_v,    // top
            up * cos_v + view * sin_v,     // bottom
            view,                          // near
            -view,                         // far
        ];
        let mut planes = [Vec4::ZERO; 6];
        for (i, n) in normals.iter().enumerate() {
            let point = match i {
                4 => position + view * self.z_near(),
                5 => position + view * self.z_far(),
                _ => position,
            };
            planes[i] = n.extend(-n.dot(point));
        }
        planes
    }

    fn orthographic_planes(&self) -> [Vec4; 6] {
        let position = self.position(self.eye());
        let view = self.view_direction();
        let up = self.up_vector();
        let right = self.right_vector();
        let m = self.magnitude(self.eye());
        let half_w = m * self.width() as f32 * 0.5;
        let half_h = m * self.height() as f32 * 0.5;
        let sides = [
            (right, position - right * half_w), // left
            (-right, position + right * half_w), // right
            (-up, position + up * half_h),      // top
            (up, position - up * half_h),       // bottom
            (view, position + view * self.z_near()),
            (-view, position + view * self.z_far()),
        ];
        let mut planes = [Vec4::ZERO; 6];
        for (i, (n, point)) in sides.iter().enumerate() {
            planes[i] = n.extend(-n.dot(*point));
        }
        planes
    }

    /// Clip-space plane extraction, for projections we only know as a
    /// matrix.
    fn extract_planes_from_matrix(&self) -> [Vec4; 6] {
        let m = self.projection_view();
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let raw = [
            r3 + r0, // left
            r3 - r0, // right
            r3 - r1, // top
            r3 + r1, // bottom
            r3 + r2, // near
            r3 - r2, // far
        ];
        raw.map(|p| {
            let len = p.xyz().length();
            if len > f32::EPSILON {
                p / len
            } else {
                p
            }
        })
    }

    fn warn_if_boundary_stale(&self) {
        if !self.frustum.computed {
            log::warn!(
                "boundary equations were never computed; call enable_boundary_equations \
                 or update_boundary_equations first"
            );
        } else if !self.frustum.enabled && self.boundary_stale() {
            log::warn!(
                "boundary equations are stale; enable_boundary_equations keeps them current"
            );
        }
    }

    /// The cached boundary planes (inward normals, `n.dot(p) + w > 0`
    /// inside). Until first computed they are all zero, which classifies
    /// everything as visible.
    pub fn boundary_equations(&self) -> [Vec4; 6] {
        self.warn_if_boundary_stale();
        self.frustum.planes
    }

    /// Signed distance from `point` to boundary plane `index` (positive
    /// inside).
    pub fn distance_to_boundary(&self, index: usize, point: Vec3) -> f32 {
        self.warn_if_boundary_stale();
        match self.frustum.planes.get(index) {
            Some(plane) => plane.xyz().dot(point) + plane.w,
            None => {
                log::warn!("distance_to_boundary: plane index {index} out of range");
                0.0
            }
        }
    }

    fn active_planes(&self) -> &[Vec4] {
        &self.frustum.planes[..self.frustum.plane_count]
    }

    /// Whether a world point sits inside every boundary plane.
    pub fn is_point_visible(&self, point: Vec3) -> bool {
        self.warn_if_boundary_stale();
        self.active_planes()
            .iter()
            .all(|p| p.xyz().dot(point) + p.w >= 0.0)
    }

    /// Classify a world-space ball against the boundary.
    pub fn ball_visibility(&self, center: Vec3, radius: f32) -> Visibility {
        self.warn_if_boundary_stale();
        let mut all_inside = true;
        for plane in self.active_planes() {
            let d = plane.xyz().dot(center) + plane.w;
            if d < -radius {
                return Visibility::Invisible;
            }
            if d < radius {
                all_inside = false;
            }
        }
        if all_inside {
            Visibility::Visible
        } else {
            Visibility::SemiVisible
        }
    }

    /// Classify an axis-aligned box against the boundary. Invisible only
    /// when all eight corners fall outside one plane, so boxes clipping a
    /// frustum corner conservatively report semi-visible.
    pub fn box_visibility(&self, min: Vec3, max: Vec3) -> Visibility {
        self.warn_if_boundary_stale();
        let corners = [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ];
        let mut all_inside = true;
        for plane in self.active_planes() {
            let mut outside = 0;
            for corner in &corners {
                if plane.xyz().dot(*corner) + plane.w < 0.0 {
                    outside += 1;
                }
            }
            if outside == corners.len() {
                return Visibility::Invisible;
            }
            if outside > 0 {
                all_inside = false;
            }
        }
        if all_inside {
            Visibility::Visible
        } else {
            Visibility::SemiVisible
        }
    }
}
