//! Renderer-side matrix state.
//!
//! [`Graph::render`](crate::graph::Graph::render) drives any
//! [`MatrixHandler`]: it binds the camera's projection and view once per
//! pass, then push/apply/pops the model matrix around each visited node. A
//! real renderer implements the trait over its own matrix state (uniforms,
//! fixed-function stacks, command encoders); [`MatrixStack`] is the
//! reference software implementation and is what headless hosts and tests
//! use.

use glam::{Mat4, Quat, Vec3};

/// Bounded depth of the model and projection stacks. Overrunning it is a
/// programming error, not a recoverable condition.
pub const STACK_DEPTH: usize = 32;

/// Matrix contract a renderer fulfils for the traversal.
///
/// `apply_transformation` right-multiplies the model matrix, so a pre-order
/// walk accumulates parent-to-child transforms; `push_model`/`pop_model`
/// bracket each subtree. The HUD pair swaps in a pixel-space orthographic
/// projection with identity view and model, for screen-anchored drawing.
pub trait MatrixHandler {
    /// Bind the camera matrices for the coming pass.
    fn bind(&mut self, projection: Mat4, view: Mat4);

    fn projection(&self) -> Mat4;
    fn view(&self) -> Mat4;
    fn model(&self) -> Mat4;

    fn load_projection(&mut self, projection: Mat4);
    fn load_model(&mut self, model: Mat4);

    /// Right-multiply the model matrix by a node's local matrix.
    fn apply_transformation(&mut self, local: Mat4);

    fn push_model(&mut self);
    fn pop_model(&mut self);
    fn push_projection(&mut self);
    fn pop_projection(&mut self);

    fn begin_hud(&mut self, width: u32, height: u32);
    fn end_hud(&mut self);

    fn translate(&mut self, delta: Vec3) {
        self.apply_transformation(Mat4::from_translation(delta));
    }

    fn rotate(&mut self, rotation: Quat) {
        self.apply_transformation(Mat4::from_quat(rotation));
    }

    fn scale(&mut self, factor: f32) {
        self.apply_transformation(Mat4::from_scale(Vec3::splat(factor)));
    }
}

#[derive(Debug, Clone, Copy)]
struct HudState {
    projection: Mat4,
    view: Mat4,
    model: Mat4,
}

/// Software [`MatrixHandler`]: plain matrices, two bounded stacks and a
/// lazily cached `projection × view` product.
#[derive(Debug, Clone)]
pub struct MatrixStack {
    projection: Mat4,
    view: Mat4,
    model: Mat4,
    projection_stack: Vec<Mat4>,
    model_stack: Vec<Mat4>,
    projection_view: Option<Mat4>,
    projection_view_inverse: Option<Mat4>,
    hud: Option<HudState>,
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            model: Mat4::IDENTITY,
            projection_stack: Vec::new(),
            model_stack: Vec::new(),
            projection_view: None,
            projection_view_inverse: None,
            hud: None,
        }
    }

    fn invalidate(&mut self) {
        self.projection_view = None;
        self.projection_view_inverse = None;
    }

    /// Cached `projection × view`, rebuilt after any rebind.
    pub fn projection_view(&mut self) -> Mat4 {
        let (projection, view) = (self.projection, self.view);
        *self
            .projection_view
            .get_or_insert_with(|| projection * view)
    }

    /// Inverse of `projection × view`; a singular product falls back to
    /// identity with a warning.
    pub fn projection_view_inverse(&mut self) -> Mat4 {
        let pv = self.projection_view();
        *self.projection_view_inverse.get_or_insert_with(|| {
            if pv.determinant().abs() <= f32::EPSILON {
                log::warn!("projection_view_inverse: singular product, using identity");
                Mat4::IDENTITY
            } else {
                pv.inverse()
            }
        })
    }

    pub fn is_hud_active(&self) -> bool {
        self.hud.is_some()
    }

    pub fn model_depth(&self) -> usize {
        self.model_stack.len()
    }
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixHandler for MatrixStack {
    fn bind(&mut self, projection: Mat4, view: Mat4) {
        self.projection = projection;
        self.view = view;
        self.model = Mat4::IDENTITY;
        self.invalidate();
    }

    fn projection(&self) -> Mat4 {
        self.projection
    }

    fn view(&self) -> Mat4 {
        self.view
    }

    fn model(&self) -> Mat4 {
        self.model
    }

    fn load_projection(&mut self, projection: Mat4) {
        self.projection = projection;
        self.invalidate();
    }

    fn load_model(&mut self, model: Mat4) {
        self.model = model;
    }

    fn apply_transformation(&mut self, local: Mat4) {
        self.model *= local;
    }

    /// # Panics
    ///
    /// Panics when the model stack is already [`STACK_DEPTH`] deep.
    fn push_model(&mut self) {
        assert!(
            self.model_stack.len() < STACK_DEPTH,
            "push_model: stack depth {STACK_DEPTH} exceeded"
        );
        self.model_stack.push(self.model);
    }

    /// # Panics
    ///
    /// Panics when the model stack is empty.
    fn pop_model(&mut self) {
        self.model = self
            .model_stack
            .pop()
            .expect("pop_model: empty matrix stack");
    }

    /// # Panics
    ///
    /// Panics when the projection stack is already [`STACK_DEPTH`] deep.
    fn push_projection(&mut self) {
        assert!(
            self.projection_stack.len() < STACK_DEPTH,
            "push_projection: stack depth {STACK_DEPTH} exceeded"
        );
        self.projection_stack.push(self.projection);
    }

    /// # Panics
    ///
    /// Panics when the projection stack is empty.
    fn pop_projection(&mut self) {
        self.projection = self
            .projection_stack
            .pop()
            .expect("pop_projection: empty matrix stack");
        self.invalidate();
    }

    /// Swap in a pixel-space orthographic projection (origin top-left, y
    /// down) with identity view and model. Must be closed with
    /// [`end_hud`](MatrixHandler::end_hud).
    ///
    /// # Panics
    ///
    /// Panics when a HUD pass is already open.
    fn begin_hud(&mut self, width: u32, height: u32) {
        assert!(self.hud.is_none(), "begin_hud: HUD pass already open");
        self.hud = Some(HudState {
            projection: self.projection,
            view: self.view,
            model: self.model,
        });
        self.projection =
            Mat4::orthographic_rh_gl(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
        self.view = Mat4::IDENTITY;
        self.model = Mat4::IDENTITY;
        self.invalidate();
    }

    /// Restore the matrices saved by the matching
    /// [`begin_hud`](MatrixHandler::begin_hud).
    ///
    /// # Panics
    ///
    /// Panics when no HUD pass is open.
    fn end_hud(&mut self) {
        let saved = self.hud.take().expect("end_hud: no HUD pass open");
        self.projection = saved.projection;
        self.view = saved.view;
        self.model = saved.model;
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat4_close(a: Mat4, b: Mat4) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for i in 0..16 {
            assert!((a[i] - b[i]).abs() < 1e-5, "element {i}: {} != {}", a[i], b[i]);
        }
    }

    #[test]
    fn traversal_brackets_restore_the_model() {
        let mut stack = MatrixStack::new();
        let parent = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let child = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        stack.apply_transformation(parent);
        stack.push_model();
        stack.apply_transformation(child);
        assert_mat4_close(stack.model(), parent * child);
        stack.pop_model();
        assert_mat4_close(stack.model(), parent);
    }

    #[test]
    fn convenience_ops_compose_like_matrices() {
        let mut stack = MatrixStack::new();
        stack.translate(Vec3::new(3.0, 0.0, 0.0));
        stack.rotate(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        stack.scale(2.0);
        let p = stack.model().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        // scale then rotate then translate: (1,0,0) -> (2,0,0) -> (0,2,0) -> (3,2,0)
        assert!((p - Vec3::new(3.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn projection_view_cache_follows_rebinds() {
        let mut stack = MatrixStack::new();
        let projection = Mat4::perspective_rh_gl(1.0, 4.0 / 3.0, 0.1, 100.0);
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        stack.bind(projection, view);
        assert_mat4_close(stack.projection_view(), projection * view);
        // warm hit returns the cached product bit for bit
        assert_eq!(stack.projection_view(), projection * view);
        let round_trip = stack.projection_view() * stack.projection_view_inverse();
        assert_mat4_close(round_trip, Mat4::IDENTITY);
        stack.bind(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_mat4_close(stack.projection_view(), Mat4::IDENTITY);
    }

    #[test]
    fn singular_product_inverts_to_identity() {
        let mut stack = MatrixStack::new();
        stack.bind(Mat4::ZERO, Mat4::IDENTITY);
        assert_mat4_close(stack.projection_view_inverse(), Mat4::IDENTITY);
    }

    #[test]
    fn hud_maps_pixels_and_restores_on_end() {
        let mut stack = MatrixStack::new();
        let projection = Mat4::perspective_rh_gl(1.0, 4.0 / 3.0, 0.1, 100.0);
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        stack.bind(projection, view);
        stack.apply_transformation(Mat4::from_translation(Vec3::X));
        let model = stack.model();
        stack.begin_hud(800, 600);
        assert!(stack.is_hud_active());
        let center = stack.projection().project_point3(Vec3::new(400.0, 300.0, 0.0));
        assert!(center.length() < 1e-5);
        let corner = stack.projection().project_point3(Vec3::ZERO);
        assert!((corner - Vec3::new(-1.0, 1.0, 0.0)).length() < 1e-5);
        assert_mat4_close(stack.model(), Mat4::IDENTITY);
        stack.end_hud();
        assert!(!stack.is_hud_active());
        assert_mat4_close(stack.projection(), projection);
        assert_mat4_close(stack.view(), view);
        assert_mat4_close(stack.model(), model);
    }

    #[test]
    #[should_panic(expected = "pop_model: empty matrix stack")]
    fn popping_an_empty_stack_is_fatal() {
        let mut stack = MatrixStack::new();
        stack.pop_model();
    }

    #[test]
    #[should_panic(expected = "stack depth")]
    fn overflowing_the_stack_is_fatal() {
        let mut stack = MatrixStack::new();
        for _ in 0..=STACK_DEPTH {
            stack.push_model();
        }
    }

    #[test]
    #[should_panic(expected = "HUD pass already open")]
    fn nesting_hud_passes_is_fatal() {
        let mut stack = MatrixStack::new();
        stack.begin_hud(800, 600);
        stack.begin_hud(800, 600);
    }

    #[test]
    #[should_panic(expected = "no HUD pass open")]
    fn closing_an_unopened_hud_is_fatal() {
        let mut stack = MatrixStack::new();
        stack.end_hud();
    }
}
