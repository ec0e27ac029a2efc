use crate::constraint::Constraint;
use crate::ids::NodeId;
use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;
use std::fmt;

/// Bullseye shape used when hit-testing a node's projected origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Bullseye {
    Square,
    Circle,
}

/// Units of [`Node::picking_threshold`]: screen pixels, or a fraction of the
/// graph radius measured at the node's depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ThresholdUnits {
    Pixels,
    SceneRatio,
}

/// A coordinate frame: local translation, rotation and uniform scale relative
/// to an optional reference (parent) frame.
///
/// Nodes store only their local state; world-space position, orientation and
/// magnitude are always derived by composing up the reference chain (see the
/// `Graph` world-space queries). The local transform maps local coordinates
/// into the reference frame as `p_ref = rotation * (scaling * p_local) +
/// translation`.
///
/// Hierarchy links (`reference`, `children`) are handles into the owning
/// graph's arena; mutate them through the graph so the forest invariant and
/// modification stamps stay consistent.
pub struct Node {
    pub(crate) id: NodeId,
    translation: Vec3,
    rotation: Quat,
    scaling: f32,
    pub(crate) reference: NodeId,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) constraint: Option<Box<dyn Constraint>>,
    pub(crate) last_update: u64,
    picking_threshold: f32,
    bullseye: Bullseye,
    threshold_units: ThresholdUnits,
    pub(crate) culled: bool,
    pub(crate) tracking: bool,
}

impl Node {
    /// Create an identity node: zero translation, identity rotation, scale 1.
    pub fn new() -> Self {
        Self {
            id: NodeId::nil(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scaling: 1.0,
            reference: NodeId::nil(),
            children: SmallVec::new(),
            constraint: None,
            last_update: 0,
            picking_threshold: 20.0,
            bullseye: Bullseye::Square,
            threshold_units: ThresholdUnits::Pixels,
            culled: false,
            tracking: true,
        }
    }

    /// Create a node from an explicit local pose. Non-positive `scaling` is
    /// rejected (falls back to 1, warns).
    pub fn from_trs(translation: Vec3, rotation: Quat, scaling: f32) -> Self {
        let mut node = Self::new();
        node.translation = translation;
        node.rotation = rotation.normalize();
        node.set_scaling(scaling);
        node
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Handle of the reference (parent) frame; nil means the world frame.
    #[inline]
    pub fn reference(&self) -> NodeId {
        self.reference
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Frame-count stamp of the last local mutation (or of an ancestor's;
    /// modification propagates down the subtree).
    #[inline]
    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    // ---- local pose ----

    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    /// Set the local translation (expressed in the reference frame).
    ///
    /// This is the raw, unfiltered setter; graph-owned nodes should be moved
    /// through the graph so constraints apply and the subtree gets stamped.
    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
    }

    /// Set the local rotation. Renormalized to counter drift.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    /// Set the local uniform scale. Values <= 0 are rejected and the prior
    /// value is kept.
    pub fn set_scaling(&mut self, scaling: f32) {
        if scaling > 0.0 && scaling.is_finite() {
            self.scaling = scaling;
        } else {
            log::warn!(
                "node {}: rejected non-positive scaling {} (keeping {})",
                self.id,
                scaling,
                self.scaling
            );
        }
    }

    /// Add `delta` (reference-frame coordinates) to the translation.
    pub fn translate(&mut self, delta: Vec3) {
        self.translation += delta;
    }

    /// Compose `delta` onto the local rotation (right-multiplied, so the
    /// delta acts in this node's local frame). Renormalized after composing.
    pub fn rotate(&mut self, delta: Quat) {
        self.rotation = (self.rotation * delta).normalize();
    }

    /// Multiply the local scale by `factor` (> 0; rejected otherwise).
    pub fn scale(&mut self, factor: f32) {
        self.set_scaling(self.scaling * factor);
    }

    // ---- constraint ----

    pub fn constraint(&self) -> Option<&dyn Constraint> {
        self.constraint.as_deref()
    }

    pub fn set_constraint(&mut self, constraint: Option<Box<dyn Constraint>>) {
        self.constraint = constraint;
    }

    // ---- picking configuration ----

    /// Bullseye half-extent used by `Graph::tracks`. Exactly 0 defers
    /// hit-testing to the graph's exact track filter.
    #[inline]
    pub fn picking_threshold(&self) -> f32 {
        self.picking_threshold
    }

    pub fn set_picking_threshold(&mut self, threshold: f32) {
        self.picking_threshold = threshold.max(0.0);
    }

    #[inline]
    pub fn bullseye(&self) -> Bullseye {
        self.bullseye
    }

    pub fn set_bullseye(&mut self, bullseye: Bullseye) {
        self.bullseye = bullseye;
    }

    #[inline]
    pub fn threshold_units(&self) -> ThresholdUnits {
        self.threshold_units
    }

    pub fn set_threshold_units(&mut self, units: ThresholdUnits) {
        self.threshold_units = units;
    }

    /// Whether the node (and its subtree) is skipped by traversal.
    #[inline]
    pub fn is_culled(&self) -> bool {
        self.culled
    }

    /// Whether the node participates in picking.
    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    // ---- local frame algebra ----

    /// The local transform as a matrix (scale, then rotate, then translate).
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scaling),
            self.rotation,
            self.translation,
        )
    }

    /// Convert a point from this frame into the reference frame.
    #[inline]
    pub fn reference_location_of(&self, local: Vec3) -> Vec3 {
        self.rotation * (local * self.scaling) + self.translation
    }

    /// Convert a point from the reference frame into this frame.
    #[inline]
    pub fn local_location_of(&self, reference: Vec3) -> Vec3 {
        (self.rotation.inverse() * (reference - self.translation)) / self.scaling
    }

    /// Convert a free vector from this frame into the reference frame
    /// (rotation and scale only, no translation).
    #[inline]
    pub fn reference_displacement_of(&self, local: Vec3) -> Vec3 {
        self.rotation * (local * self.scaling)
    }

    /// Convert a free vector from the reference frame into this frame.
    #[inline]
    pub fn local_displacement_of(&self, reference: Vec3) -> Vec3 {
        (self.rotation.inverse() * reference) / self.scaling
    }

    /// The algebraic inverse of the local transform, as a new detached node
    /// value sharing this node's reference: negated inverse-rotated
    /// translation, inverse rotation, reciprocal scale.
    pub fn inverse(&self) -> Node {
        let mut node = Node::new();
        node.reference = self.reference;
        node.rotation = self.rotation.inverse();
        node.scaling = 1.0 / self.scaling;
        node.translation = -(node.rotation * self.translation) * node.scaling;
        node
    }

    /// Snapshot of the local pose only (no hierarchy links, no constraint).
    pub(crate) fn pose_clone(&self) -> Node {
        let mut node = Node::new();
        node.translation = self.translation;
        node.rotation = self.rotation;
        node.scaling = self.scaling;
        node
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("translation", &self.translation)
            .field("rotation", &self.rotation)
            .field("scaling", &self.scaling)
            .field("reference", &self.reference)
            .field("children", &self.children.as_slice())
            .field("constrained", &self.constraint.is_some())
            .field("last_update", &self.last_update)
            .field("culled", &self.culled)
            .field("tracking", &self.tracking)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn identity_node_maps_points_unchanged() {
        let node = Node::new();
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_vec3_eq(node.reference_location_of(p), p);
        assert_vec3_eq(node.local_location_of(p), p);
    }

    #[test]
    fn location_roundtrip() {
        let node = Node::from_trs(
            Vec3::new(3.0, -1.0, 2.0),
            Quat::from_axis_angle(Vec3::Y, 0.7),
            2.5,
        );
        let p = Vec3::new(0.5, 4.0, -2.0);
        assert_vec3_eq(node.local_location_of(node.reference_location_of(p)), p);
        assert_vec3_eq(node.reference_location_of(node.local_location_of(p)), p);
    }

    #[test]
    fn displacement_ignores_translation() {
        let node = Node::from_trs(Vec3::new(10.0, 10.0, 10.0), Quat::IDENTITY, 2.0);
        assert_vec3_eq(
            node.reference_displacement_of(Vec3::X),
            Vec3::new(2.0, 0.0, 0.0),
        );
        assert_vec3_eq(
            node.local_displacement_of(Vec3::new(2.0, 0.0, 0.0)),
            Vec3::X,
        );
    }

    #[test]
    fn non_positive_scaling_is_rejected() {
        let mut node = Node::new();
        node.set_scaling(3.0);
        node.set_scaling(0.0);
        assert_eq!(node.scaling(), 3.0);
        node.set_scaling(-1.0);
        assert_eq!(node.scaling(), 3.0);
        node.scale(-2.0);
        assert_eq!(node.scaling(), 3.0);
        assert!(node.scaling() > 0.0);
    }

    #[test]
    fn inverse_undoes_the_local_transform() {
        let node = Node::from_trs(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 1.2),
            0.5,
        );
        let inv = node.inverse();
        let p = Vec3::new(-4.0, 0.25, 7.0);
        assert_vec3_eq(inv.reference_location_of(node.reference_location_of(p)), p);
        assert_vec3_eq((node.local_matrix() * inv.local_matrix()).transform_point3(p), p);
    }

    #[test]
    fn rotate_keeps_rotation_normalized() {
        let mut node = Node::new();
        for _ in 0..200 {
            node.rotate(Quat::from_axis_angle(Vec3::Z, 0.1));
        }
        assert!((node.rotation().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn local_matrix_matches_algebra() {
        let node = Node::from_trs(
            Vec3::new(2.0, -3.0, 1.0),
            Quat::from_axis_angle(Vec3::X, -0.4),
            1.5,
        );
        let p = Vec3::new(1.0, 1.0, 1.0);
        assert_vec3_eq(
            node.local_matrix().transform_point3(p),
            node.reference_location_of(p),
        );
    }
}
