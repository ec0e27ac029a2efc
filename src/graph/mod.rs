//! The scene graph: an arena-backed forest of [`Node`]s plus the eye state
//! that turns it into a camera rig.
//!
//! World-space poses are never cached; every query composes the local frames
//! up the reference chain, so readers always observe the latest hierarchy.
//! Submodules split the camera math (`camera`), frustum culling queries
//! (`frustum`), tag-based picking (`picking`) and screen-space gestures
//! (`spatial`) into their own impl blocks.

mod camera;
mod frustum;
mod picking;
mod spatial;

pub use camera::{PixelRect, Projection};
pub use frustum::Visibility;
pub use picking::TrackFilter;
pub use spatial::Subject;

use crate::arena::NodeArena;
use crate::constraint::Constraint;
use crate::error::{ArmatureError, Result};
use crate::ids::NodeId;
use crate::interpolator::Interpolator;
use crate::matrix_handler::MatrixHandler;
use crate::node::{Bullseye, Node, ThresholdUnits};
use crate::timing::TimingHandler;
use frustum::FrustumCache;
use glam::{Mat4, Quat, Vec3};
use picking::Ray;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Scene graph, camera and input-target state for one viewport.
///
/// A graph owns an arena of nodes organized as a forest: attached trees hang
/// off the root list and are reached by [`Graph::render`], detached nodes
/// (the eye among them, by default) stay allocated but outside traversal.
/// The eye node, scene center/radius/anchor and the projection kind together
/// define the camera; all view/projection matrices are derived on demand.
///
/// Structural mutators return [`ArmatureError`] and leave the graph untouched
/// on misuse (stale handles, cycles, attach-state mixing); pose mutators warn
/// and no-op instead, since they sit on interactive input paths.
pub struct Graph {
    arena: NodeArena,
    roots: Vec<NodeId>,
    eye: NodeId,
    width: u32,
    height: u32,
    center: Vec3,
    radius: f32,
    anchor: Vec3,
    pub(crate) projection: Projection,
    pub(crate) projection_stamp: u64,
    pub(crate) z_near_coefficient: f32,
    pub(crate) z_clipping_coefficient: f32,
    left_handed: bool,
    clock: u64,
    timing: TimingHandler,
    pub(crate) frustum: FrustumCache,
    pub(crate) tags: FxHashMap<Option<String>, NodeId>,
    pub(crate) track_filter: Option<TrackFilter>,
    pub(crate) pending_rays: Vec<Ray>,
    eye_flight: Option<Interpolator>,
}

fn reject<T>(err: ArmatureError) -> Result<T> {
    log::warn!("{err}");
    Err(err)
}

impl Graph {
    /// Create a graph for a viewport of `width` x `height` pixels.
    ///
    /// Starts with a perspective projection, a 60 degree vertical field of
    /// view, a scene ball of radius 100 at the origin and a detached eye
    /// fitted to that ball, looking down -Z.
    pub fn new(width: u32, height: u32) -> Self {
        let mut graph = Self {
            arena: NodeArena::new(),
            roots: Vec::new(),
            eye: NodeId::nil(),
            width: width.max(1),
            height: height.max(1),
            center: Vec3::ZERO,
            radius: 100.0,
            anchor: Vec3::ZERO,
            projection: Projection::Perspective,
            projection_stamp: 0,
            z_near_coefficient: 0.005,
            z_clipping_coefficient: 3.0_f32.sqrt(),
            left_handed: false,
            clock: 0,
            timing: TimingHandler::new(),
            frustum: FrustumCache::new(),
            tags: FxHashMap::default(),
            track_filter: None,
            pending_rays: Vec::new(),
            eye_flight: None,
        };
        let eye = graph.arena.insert(Node::new());
        graph.eye = eye;
        graph.set_magnitude(eye, (std::f32::consts::FRAC_PI_3 / 2.0).tan());
        graph.fit_ball(graph.center, graph.radius);
        graph
    }

    // ---- viewport and scene ball ----

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.touch_projection();
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn set_center(&mut self, center: Vec3) {
        self.center = center;
        self.touch_projection();
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) -> Result<()> {
        if radius <= 0.0 || !radius.is_finite() {
            return reject(ArmatureError::NonPositiveRadius(radius));
        }
        self.radius = radius;
        self.touch_projection();
        Ok(())
    }

    /// Set scene center and radius in one call; the anchor follows the
    /// center.
    pub fn set_frustum(&mut self, center: Vec3, radius: f32) -> Result<()> {
        self.set_radius(radius)?;
        self.set_center(center);
        self.set_anchor(center);
        Ok(())
    }

    /// Set the scene volume from two opposite corners of an axis-aligned
    /// box: the center is the midpoint, the radius half the diagonal.
    pub fn set_frustum_box(&mut self, corner_a: Vec3, corner_b: Vec3) -> Result<()> {
        let center = (corner_a + corner_b) * 0.5;
        let radius = (corner_b - corner_a).length() * 0.5;
        self.set_frustum(center, radius)
    }

    /// Point the eye orbits and the gestures pivot around.
    #[inline]
    pub fn anchor(&self) -> Vec3 {
        self.anchor
    }

    pub fn set_anchor(&mut self, anchor: Vec3) {
        self.anchor = anchor;
    }

    #[inline]
    pub fn is_left_handed(&self) -> bool {
        self.left_handed
    }

    /// Flip the screen-space handedness used by gestures (y-axis feel).
    pub fn set_left_handed(&mut self, left_handed: bool) {
        self.left_handed = left_handed;
    }

    #[inline]
    pub fn timing(&self) -> &TimingHandler {
        &self.timing
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.timing.frame_count()
    }

    // ---- node bookkeeping ----

    #[inline]
    pub fn eye(&self) -> NodeId {
        self.eye
    }

    #[inline]
    pub fn is_eye(&self, id: NodeId) -> bool {
        id == self.eye
    }

    /// Replace the eye node. Any live node qualifies, attached or not.
    pub fn set_eye(&mut self, id: NodeId) -> Result<()> {
        if !self.arena.contains(id) {
            return reject(ArmatureError::StaleHandle(id));
        }
        self.eye = id;
        self.touch_projection();
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(id)
    }

    /// Total live nodes, attached and detached, eye included.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.arena.keys()
    }

    /// Attached top-level nodes, in traversal order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.arena.get(id).map(|n| n.children()).unwrap_or(&[])
    }

    pub fn reference(&self, id: NodeId) -> NodeId {
        self.arena
            .get(id)
            .map(|n| n.reference())
            .unwrap_or_else(NodeId::nil)
    }

    /// Whether `id` sits in an attached tree (reachable from the root list).
    pub fn is_attached(&self, id: NodeId) -> bool {
        if !self.arena.contains(id) {
            return false;
        }
        let mut cur = id;
        loop {
            match self.arena.get(cur) {
                Some(node) if node.reference().is_nil() => return self.roots.contains(&cur),
                Some(node) => cur = node.reference(),
                None => return false,
            }
        }
    }

    /// Whether `ancestor` appears on `id`'s reference chain (`id` itself
    /// does not count).
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = self.reference(id);
        while !cur.is_nil() {
            if cur == ancestor {
                return true;
            }
            cur = self.reference(cur);
        }
        false
    }

    // ---- insertion ----

    /// Allocate a fresh identity node attached as a root.
    pub fn insert(&mut self) -> NodeId {
        let id = self.arena.insert(Node::new());
        self.roots.push(id);
        id
    }

    /// Allocate a fresh identity node referencing `parent`.
    pub fn insert_child(&mut self, parent: NodeId) -> Result<NodeId> {
        if !self.arena.contains(parent) {
            return reject(ArmatureError::StaleHandle(parent));
        }
        let id = self.arena.insert(Node::new());
        if let Some(node) = self.arena.get_mut(id) {
            node.reference = parent;
        }
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Allocate a fresh identity node outside the traversal forest.
    pub fn insert_detached(&mut self) -> NodeId {
        self.arena.insert(Node::new())
    }

    /// Insert a pre-configured node as an attached root. Hierarchy links on
    /// the value are ignored; only pose, constraint and picking setup carry
    /// over.
    pub fn insert_with(&mut self, node: Node) -> NodeId {
        let id = self.insert_detached_with(node);
        self.roots.push(id);
        id
    }

    /// Insert a pre-configured node detached.
    pub fn insert_detached_with(&mut self, mut node: Node) -> NodeId {
        node.reference = NodeId::nil();
        node.children.clear();
        self.arena.insert(node)
    }

    /// Detached copy of `id`'s world pose, useful as a keyframe.
    pub fn snapshot(&mut self, id: NodeId) -> NodeId {
        let node = Node::from_trs(self.position(id), self.orientation(id), self.magnitude(id));
        self.arena.insert(node)
    }

    // ---- hierarchy surgery ----

    /// Re-seed a detached node as an attached root. Severs any detached
    /// parent link first.
    pub fn attach(&mut self, id: NodeId) -> Result<()> {
        if !self.arena.contains(id) {
            return reject(ArmatureError::StaleHandle(id));
        }
        if self.is_attached(id) {
            return reject(ArmatureError::AlreadyAttached(id));
        }
        let parent = self.reference(id);
        if !parent.is_nil() {
            self.unlink(id, parent);
        }
        self.roots.push(id);
        self.mark_modified(id);
        Ok(())
    }

    /// Detach `id`'s subtree from the traversal forest. The nodes stay
    /// allocated and keep their internal structure; `id` becomes a detached
    /// root, re-seedable with [`Graph::attach`]. Already-detached nodes are
    /// left alone.
    pub fn prune(&mut self, id: NodeId) -> Result<()> {
        if !self.arena.contains(id) {
            return reject(ArmatureError::StaleHandle(id));
        }
        if !self.is_attached(id) {
            return Ok(());
        }
        let parent = self.reference(id);
        if parent.is_nil() {
            self.roots.retain(|&r| r != id);
        } else {
            self.unlink(id, parent);
        }
        self.mark_modified(id);
        Ok(())
    }

    /// Remove `id` and every descendant from the arena. Handles into the
    /// subtree go stale, tags pointing inside it are swept. Refused when the
    /// subtree contains the eye.
    pub fn destroy(&mut self, id: NodeId) -> Result<()> {
        if !self.arena.contains(id) {
            return reject(ArmatureError::StaleHandle(id));
        }
        let mut subtree = Vec::new();
        self.collect_subtree(id, &mut subtree);
        if subtree.contains(&self.eye) {
            return reject(ArmatureError::EyeInSubtree(id));
        }
        let parent = self.reference(id);
        if parent.is_nil() {
            self.roots.retain(|&r| r != id);
        } else {
            self.unlink(id, parent);
        }
        for &node in &subtree {
            self.arena.remove(node);
        }
        self.tags.retain(|_, tagged| !subtree.contains(tagged));
        Ok(())
    }

    /// Rewire `child`'s reference frame to `parent` (nil for none).
    ///
    /// Rejected with no state change when either handle is stale, when the
    /// link would close a cycle, or when it would mix an attached frame with
    /// a detached one. A nil `parent` turns an attached child into a root
    /// and leaves a detached child detached.
    pub fn set_reference(&mut self, child: NodeId, parent: NodeId) -> Result<()> {
        if !self.arena.contains(child) {
            return reject(ArmatureError::StaleHandle(child));
        }
        if parent == child {
            return reject(ArmatureError::SelfReference(child));
        }
        if !parent.is_nil() {
            if !self.arena.contains(parent) {
                return reject(ArmatureError::StaleHandle(parent));
            }
            if self.is_ancestor(child, parent) {
                return reject(ArmatureError::CyclicReference { child, parent });
            }
            if self.is_attached(child) != self.is_attached(parent) {
                return reject(ArmatureError::MixedAttachment { child, parent });
            }
        }
        let old_parent = self.reference(child);
        if old_parent == parent {
            return Ok(());
        }
        let child_was_attached = self.is_attached(child);
        let was_root = old_parent.is_nil() && self.roots.contains(&child);
        if was_root {
            self.roots.retain(|&r| r != child);
        } else if !old_parent.is_nil() {
            self.unlink(child, old_parent);
        }
        if parent.is_nil() {
            if let Some(node) = self.arena.get_mut(child) {
                node.reference = NodeId::nil();
            }
            if child_was_attached {
                // unhooking from an attached parent promotes the child to a root
                self.roots.push(child);
            }
        } else {
            if let Some(node) = self.arena.get_mut(child) {
                node.reference = parent;
            }
            if let Some(node) = self.arena.get_mut(parent) {
                node.children.push(child);
            }
        }
        self.mark_modified(child);
        Ok(())
    }

    fn unlink(&mut self, child: NodeId, parent: NodeId) {
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.arena.get_mut(child) {
            node.reference = NodeId::nil();
        }
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let mut stack: SmallVec<[NodeId; 16]> = smallvec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.arena.get(cur) {
                out.push(cur);
                stack.extend(node.children.iter().copied());
            }
        }
    }

    // ---- modification stamps ----

    /// Stamp `id` and its whole subtree with a fresh logical timestamp.
    /// Every pose mutation funnels through here, which is what keeps the
    /// frustum and interpolator caches honest.
    pub(crate) fn mark_modified(&mut self, id: NodeId) {
        self.clock += 1;
        let stamp = self.clock;
        let mut stack: SmallVec<[NodeId; 16]> = smallvec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.arena.get_mut(cur) {
                node.last_update = stamp;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    pub(crate) fn touch_projection(&mut self) {
        self.clock += 1;
        self.projection_stamp = self.clock;
    }

    fn live(&self, id: NodeId, op: &str) -> bool {
        if self.arena.contains(id) {
            true
        } else {
            log::warn!("{op}: stale node handle {id}");
            false
        }
    }

    // ---- local pose, constraint-filtered ----

    /// Overwrite the local translation (reference-frame coordinates).
    pub fn set_translation(&mut self, id: NodeId, translation: Vec3) {
        if !self.live(id, "set_translation") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.set_translation(translation);
        }
        self.mark_modified(id);
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) {
        if !self.live(id, "set_rotation") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.set_rotation(rotation);
        }
        self.mark_modified(id);
    }

    pub fn set_scaling(&mut self, id: NodeId, scaling: f32) {
        if !self.live(id, "set_scaling") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.set_scaling(scaling);
        }
        self.mark_modified(id);
    }

    /// Translate by `delta` (reference-frame coordinates), filtered through
    /// the node's constraint.
    pub fn translate(&mut self, id: NodeId, delta: Vec3) {
        let Some(node) = self.arena.get(id) else {
            log::warn!("translate: stale node handle {id}");
            return;
        };
        let filtered = match node.constraint() {
            Some(c) => c.constrain_translation(delta, self, id),
            None => delta,
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.translate(filtered);
        }
        self.mark_modified(id);
    }

    /// Compose `delta` onto the local rotation, filtered through the node's
    /// constraint.
    pub fn rotate(&mut self, id: NodeId, delta: Quat) {
        let Some(node) = self.arena.get(id) else {
            log::warn!("rotate: stale node handle {id}");
            return;
        };
        let filtered = match node.constraint() {
            Some(c) => c.constrain_rotation(delta, self, id),
            None => delta,
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.rotate(filtered);
        }
        self.mark_modified(id);
    }

    /// Multiply the local scale by `factor` (> 0; warned and dropped
    /// otherwise).
    pub fn scale(&mut self, id: NodeId, factor: f32) {
        if !self.live(id, "scale") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.scale(factor);
        }
        self.mark_modified(id);
    }

    pub fn set_constraint(&mut self, id: NodeId, constraint: Option<Box<dyn Constraint>>) {
        if !self.live(id, "set_constraint") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.set_constraint(constraint);
        }
    }

    // ---- world pose ----

    /// World position of `id`'s origin, composed up the reference chain.
    pub fn position(&self, id: NodeId) -> Vec3 {
        if !self.live(id, "position") {
            return Vec3::ZERO;
        }
        let mut p = Vec3::ZERO;
        let mut cur = id;
        while let Some(node) = self.arena.get(cur) {
            p = node.reference_location_of(p);
            cur = node.reference();
        }
        p
    }

    /// World orientation of `id`.
    pub fn orientation(&self, id: NodeId) -> Quat {
        if !self.live(id, "orientation") {
            return Quat::IDENTITY;
        }
        let mut q = Quat::IDENTITY;
        let mut cur = id;
        while let Some(node) = self.arena.get(cur) {
            q = node.rotation() * q;
            cur = node.reference();
        }
        q.normalize()
    }

    /// World magnitude (accumulated uniform scale) of `id`.
    pub fn magnitude(&self, id: NodeId) -> f32 {
        if !self.live(id, "magnitude") {
            return 1.0;
        }
        let mut m = 1.0;
        let mut cur = id;
        while let Some(node) = self.arena.get(cur) {
            m *= node.scaling();
            cur = node.reference();
        }
        m
    }

    /// The node-to-world matrix.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        if !self.live(id, "world_matrix") {
            return Mat4::IDENTITY;
        }
        let mut m = Mat4::IDENTITY;
        let mut cur = id;
        while let Some(node) = self.arena.get(cur) {
            m = node.local_matrix() * m;
            cur = node.reference();
        }
        m
    }

    /// Inverse of `id`'s world transform, as a detached node value.
    pub fn world_inverse(&self, id: NodeId) -> Node {
        let rotation = self.orientation(id).inverse();
        let scaling = 1.0 / self.magnitude(id);
        let translation = -(rotation * self.position(id)) * scaling;
        Node::from_trs(translation, rotation, scaling)
    }

    /// Place `id` so its world position becomes `position` (reference frame
    /// compensated; not constraint-filtered).
    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        if !self.live(id, "set_position") {
            return;
        }
        let reference = self.reference(id);
        let local = if reference.is_nil() {
            position
        } else {
            self.location(reference, position)
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.set_translation(local);
        }
        self.mark_modified(id);
    }

    /// Orient `id` so its world orientation becomes `orientation`.
    pub fn set_orientation(&mut self, id: NodeId, orientation: Quat) {
        if !self.live(id, "set_orientation") {
            return;
        }
        let reference = self.reference(id);
        let local = if reference.is_nil() {
            orientation
        } else {
            self.orientation(reference).inverse() * orientation
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.set_rotation(local);
        }
        self.mark_modified(id);
    }

    /// Scale `id` so its world magnitude becomes `magnitude` (> 0).
    pub fn set_magnitude(&mut self, id: NodeId, magnitude: f32) {
        if !self.live(id, "set_magnitude") {
            return;
        }
        let reference = self.reference(id);
        let local = if reference.is_nil() {
            magnitude
        } else {
            magnitude / self.magnitude(reference)
        };
        if let Some(node) = self.arena.get_mut(id) {
            node.set_scaling(local);
        }
        self.mark_modified(id);
    }

    // ---- frame conversions ----

    /// Convert a point in `id`'s frame to world coordinates.
    pub fn world_location(&self, id: NodeId, local: Vec3) -> Vec3 {
        if !self.live(id, "world_location") {
            return local;
        }
        let mut p = local;
        let mut cur = id;
        while let Some(node) = self.arena.get(cur) {
            p = node.reference_location_of(p);
            cur = node.reference();
        }
        p
    }

    /// Convert a world point into `id`'s frame.
    pub fn location(&self, id: NodeId, world: Vec3) -> Vec3 {
        if !self.live(id, "location") {
            return world;
        }
        let mut chain: SmallVec<[NodeId; 16]> = SmallVec::new();
        let mut cur = id;
        while !cur.is_nil() {
            chain.push(cur);
            cur = self.reference(cur);
        }
        let mut p = world;
        for &link in chain.iter().rev() {
            if let Some(node) = self.arena.get(link) {
                p = node.local_location_of(p);
            }
        }
        p
    }

    /// Convert a point from `from`'s frame into `to`'s frame.
    pub fn location_from(&self, to: NodeId, from: NodeId, point: Vec3) -> Vec3 {
        self.location(to, self.world_location(from, point))
    }

    /// Convert a free vector in `id`'s frame to world coordinates.
    pub fn world_displacement(&self, id: NodeId, local: Vec3) -> Vec3 {
        if !self.live(id, "world_displacement") {
            return local;
        }
        let mut v = local;
        let mut cur = id;
        while let Some(node) = self.arena.get(cur) {
            v = node.reference_displacement_of(v);
            cur = node.reference();
        }
        v
    }

    /// Convert a world free vector into `id`'s frame.
    pub fn displacement(&self, id: NodeId, world: Vec3) -> Vec3 {
        if !self.live(id, "displacement") {
            return world;
        }
        let mut chain: SmallVec<[NodeId; 16]> = SmallVec::new();
        let mut cur = id;
        while !cur.is_nil() {
            chain.push(cur);
            cur = self.reference(cur);
        }
        let mut v = world;
        for &link in chain.iter().rev() {
            if let Some(node) = self.arena.get(link) {
                v = node.local_displacement_of(v);
            }
        }
        v
    }

    /// Convert a free vector from `from`'s frame into `to`'s frame.
    pub fn displacement_from(&self, to: NodeId, from: NodeId, vector: Vec3) -> Vec3 {
        self.displacement(to, self.world_displacement(from, vector))
    }

    /// Express a world-space delta in `id`'s reference frame, which is where
    /// [`Graph::translate`] expects deltas.
    pub(crate) fn delta_to_reference(&self, id: NodeId, world_delta: Vec3) -> Vec3 {
        let reference = self.reference(id);
        if reference.is_nil() {
            world_delta
        } else {
            self.displacement(reference, world_delta)
        }
    }

    // ---- axis alignment ----

    /// Snap `id`'s orientation to the nearest axes of `target`'s frame (nil
    /// for the world axes).
    ///
    /// The closest pair of world axes is aligned first; a second pass aligns
    /// one of the remaining axes when its |cosine| to a target axis reaches
    /// `threshold` (0 aligns unconditionally). With `relocate`, the node is
    /// also translated so the target origin keeps its coordinates in this
    /// node's frame. Rotations go through the node's constraint.
    pub fn align_with(&mut self, id: NodeId, target: NodeId, threshold: f32, relocate: bool) {
        if !self.live(id, "align_with") {
            return;
        }
        if !target.is_nil() && !self.live(target, "align_with") {
            return;
        }
        let target_orientation = if target.is_nil() {
            Quat::IDENTITY
        } else {
            self.orientation(target)
        };
        let axes = [Vec3::X, Vec3::Y, Vec3::Z];
        let target_dirs: [Vec3; 3] = axes.map(|a| target_orientation * a);
        let my_orientation = self.orientation(id);
        let my_dirs: [Vec3; 3] = axes.map(|a| my_orientation * a);

        let center = if target.is_nil() {
            Vec3::ZERO
        } else {
            self.position(target)
        };
        let old_local_center = relocate.then(|| self.location(id, center));

        let (mut best_i, mut best_j, mut best) = (0, 0, 0.0_f32);
        for (i, td) in target_dirs.iter().enumerate() {
            for (j, md) in my_dirs.iter().enumerate() {
                let proj = td.dot(*md).abs();
                if proj >= best {
                    best_i = i;
                    best_j = j;
                    best = proj;
                }
            }
        }
        let coef = target_dirs[best_i].dot(my_dirs[best_j]);
        if coef.abs() >= threshold {
            self.align_axis_pair(id, target_dirs[best_i], my_dirs[best_j], coef);
            // second pass: try to align one of the remaining own axes
            let next = axes[(best_j + 1) % 3];
            let dir = self.orientation(id) * next;
            let (mut base, mut max) = (0, 0.0_f32);
            for (i, td) in target_dirs.iter().enumerate() {
                let proj = td.dot(dir).abs();
                if proj > max {
                    base = i;
                    max = proj;
                }
            }
            if max >= threshold {
                let coef = target_dirs[base].dot(dir);
                self.align_axis_pair(id, target_dirs[base], dir, coef);
            }
        }
        if let Some(old_local) = old_local_center {
            let drifted = self.world_location(id, old_local);
            let delta = self.delta_to_reference(id, center - drifted);
            self.translate(id, delta);
        }
    }

    fn align_axis_pair(&mut self, id: NodeId, target_dir: Vec3, my_dir: Vec3, coef: f32) {
        let axis = target_dir.cross(my_dir);
        let angle = axis.length().clamp(-1.0, 1.0).asin();
        let angle = if coef >= 0.0 { -angle } else { angle };
        let local_axis = self.orientation(id).inverse() * axis;
        if let Some(local_axis) = local_axis.try_normalize() {
            self.rotate(id, Quat::from_axis_angle(local_axis, angle));
        }
    }

    // ---- traversal ----

    /// Mark `id`'s subtree as skipped by (or restored to) rendering and
    /// deferred picking.
    pub fn cull(&mut self, id: NodeId, culled: bool) {
        if !self.live(id, "cull") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.culled = culled;
        }
    }

    pub fn is_culled(&self, id: NodeId) -> bool {
        self.arena.get(id).map(|n| n.is_culled()).unwrap_or(false)
    }

    /// Exclude `id` from picking without affecting rendering.
    pub fn set_tracking(&mut self, id: NodeId, tracking: bool) {
        if !self.live(id, "set_tracking") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.tracking = tracking;
        }
    }

    pub fn set_picking_threshold(&mut self, id: NodeId, threshold: f32) {
        if !self.live(id, "set_picking_threshold") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.set_picking_threshold(threshold);
        }
    }

    pub fn set_bullseye(&mut self, id: NodeId, bullseye: Bullseye, units: ThresholdUnits) {
        if !self.live(id, "set_bullseye") {
            return;
        }
        if let Some(node) = self.arena.get_mut(id) {
            node.set_bullseye(bullseye);
            node.set_threshold_units(units);
        }
    }

    /// Attached, non-culled nodes in pre-order. This is the order `render`
    /// visits and deferred rays resolve in.
    pub(crate) fn visit_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            if node.is_culled() {
                continue;
            }
            order.push(id);
            stack.extend(node.children().iter().rev().copied());
        }
        order
    }

    /// Advance the frame clock: steps the eye flight interpolator and, when
    /// boundary equations are enabled, refreshes them. Call once per frame
    /// before rendering.
    pub fn pre_draw(&mut self, delta_ms: f32) {
        self.timing.handle(delta_ms);
        if let Some(mut flight) = self.eye_flight.take() {
            flight.update(self, delta_ms);
            if self.eye_flight.is_none() {
                self.eye_flight = Some(flight);
            }
        }
        if self.frustum.enabled {
            self.update_boundary_equations();
        }
    }

    /// The interpolator flying the eye during an animated fit, if any.
    pub fn eye_flight(&self) -> Option<&Interpolator> {
        self.eye_flight.as_ref()
    }

    /// Cancel a running animated fit, freezing the eye wherever the flight
    /// left it.
    pub fn stop_eye_flight(&mut self) {
        if let Some(flight) = self.eye_flight.as_mut() {
            flight.stop();
        }
    }

    /// Traverse attached, non-culled subtrees in order, binding matrices on
    /// `handler` and invoking `visit` per node with the node's model matrix
    /// applied. Deferred picking rays are resolved against the visited nodes
    /// exactly once, then cleared; rays that hit nothing drop their tag.
    pub fn render<H, F>(&mut self, handler: &mut H, mut visit: F)
    where
        H: MatrixHandler + ?Sized,
        F: FnMut(&mut H, &Graph, NodeId),
    {
        handler.bind(self.projection_matrix(), self.view());
        let mut rays = std::mem::take(&mut self.pending_rays);
        let roots = self.roots.clone();
        for root in roots {
            self.render_subtree(handler, &mut visit, &mut rays, root);
        }
        // leftover rays hit nothing: their channels lose the tag
        for ray in rays {
            self.tags.remove(&ray.tag);
        }
    }

    fn render_subtree<H, F>(
        &mut self,
        handler: &mut H,
        visit: &mut F,
        rays: &mut Vec<Ray>,
        id: NodeId,
    ) where
        H: MatrixHandler + ?Sized,
        F: FnMut(&mut H, &Graph, NodeId),
    {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if node.is_culled() {
            return;
        }
        let local = node.local_matrix();
        let children: SmallVec<[NodeId; 4]> = node.children.clone();
        handler.push_model();
        handler.apply_transformation(local);
        self.resolve_rays_at(id, rays);
        visit(handler, self, id);
        for child in children {
            self.render_subtree(handler, visit, rays, child);
        }
        handler.pop_model();
    }

    /// Load `id`'s node-to-world matrix as the handler's model matrix,
    /// for drawing outside the visitor traversal.
    pub fn apply_world_transformation<H>(&self, handler: &mut H, id: NodeId)
    where
        H: MatrixHandler + ?Sized,
    {
        handler.load_model(self.world_matrix(id));
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.arena.len())
            .field("roots", &self.roots)
            .field("eye", &self.eye)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("center", &self.center)
            .field("radius", &self.radius)
            .field("projection", &self.projection)
            .finish()
    }
}
