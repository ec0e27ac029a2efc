//! Screen-space gesture mapping: pixel deltas from a host input loop become
//! node-local translations, rotations and scalings through the eye's basis.

use super::Graph;
use crate::ids::NodeId;
use glam::{EulerRot, Quat, Vec3};

/// What a gesture acts on.
///
/// `Tag` resolves through the picking table and falls back to the eye when
/// the channel is empty, so a host can wire pointer events straight through
/// without tracking hit state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    Eye,
    Node(NodeId),
    Tag(Option<&'a str>),
}

// classic deformed-ball mapping: unit sphere near the center, hyperbolic
// sheet past half the squared radius so the mapping never folds back
fn project_on_ball(x: f32, y: f32) -> Vec3 {
    const SIZE: f32 = 1.0;
    let size2 = SIZE * SIZE;
    let limit = size2 * 0.5;
    let d = x * x + y * y;
    let z = if d < limit {
        (size2 - d).sqrt()
    } else {
        limit / d.sqrt()
    };
    Vec3::new(x, y, z)
}

impl Graph {
    fn resolve_subject(&self, subject: Subject<'_>, op: &str) -> Option<(NodeId, bool)> {
        match subject {
            Subject::Eye => Some((self.eye, true)),
            Subject::Node(id) => {
                if self.contains(id) {
                    Some((id, self.is_eye(id)))
                } else {
                    log::warn!("{op}: stale node handle {id}");
                    None
                }
            }
            Subject::Tag(tag) => match self.tagged(tag) {
                Some(id) => Some((id, self.is_eye(id))),
                None => Some((self.eye, true)),
            },
        }
    }

    /// Re-express a rotation given in eye coordinates as the node-local
    /// delta producing the mirrored on-screen motion.
    fn eye_rotation_for(&self, id: NodeId, quaternion: Quat) -> Quat {
        let (axis, angle) = quaternion.to_axis_angle();
        if angle.abs() <= f32::EPSILON {
            return Quat::IDENTITY;
        }
        let world = self.orientation(self.eye) * axis;
        let local = (self.orientation(id).inverse() * world).normalize();
        Quat::from_axis_angle(local, -angle)
    }

    /// Drag the subject by a pixel delta (`dz` in pixels of equivalent
    /// depth). The eye moves itself so the scene follows the pointer; a node
    /// follows the pointer directly. Deltas scale with the subject's depth
    /// so a drag covers the same screen distance at any range.
    pub fn translate_screen(&mut self, subject: Subject<'_>, dx: f32, dy: f32, dz: f32) {
        let Some((id, is_eye)) = self.resolve_subject(subject, "translate_screen") else {
            return;
        };
        let mut dz = dz;
        if self.is_2d() && dz != 0.0 {
            log::warn!("translate_screen: depth component ignored on a 2D graph");
            dz = 0.0;
        }
        let right_handed = !self.left_handed;
        let sx = if is_eye { -dx } else { dx };
        let sy = if right_handed ^ is_eye { -dy } else { dy };
        let sz = if is_eye { dz } else { -dz };
        let depth_at = if is_eye {
            self.anchor
        } else {
            self.position(id)
        };
        let ratio = self.pixel_to_scene_ratio(depth_at);
        let world = self.orientation(self.eye) * (Vec3::new(sx, sy, sz) * ratio);
        let reference = self.reference(id);
        let delta = if reference.is_nil() {
            world
        } else {
            self.displacement(reference, world)
        };
        self.translate(id, delta);
    }

    /// Rotate the subject by Euler angles (radians) about the eye's
    /// right/up/view axes. The eye orbits the anchor; a node turns in place
    /// about its own origin. On a 2D graph only the roll component applies.
    pub fn rotate_screen(&mut self, subject: Subject<'_>, rx: f32, ry: f32, rz: f32) {
        let Some((id, is_eye)) = self.resolve_subject(subject, "rotate_screen") else {
            return;
        };
        let (mut rx, mut rz) = (rx, rz);
        if self.is_2d() && (rx != 0.0 || ry != 0.0) {
            log::warn!("rotate_screen: only the roll component applies on a 2D graph");
            rx = 0.0;
        }
        let ry = if self.is_2d() { 0.0 } else { ry };
        if self.left_handed {
            rx = -rx;
            rz = -rz;
        }
        let quaternion = Quat::from_euler(EulerRot::XYZ, rx, ry, rz);
        if is_eye {
            self.orbit_node(id, quaternion, self.anchor);
        } else {
            let local = self.eye_rotation_for(id, quaternion);
            self.rotate(id, local);
        }
    }

    /// Arcball rotation from a pixel drag (`from` → `to`). Both pixels
    /// project onto a ball centered on the subject (the anchor, for the
    /// eye); the rotation axis is their cross product. A 2D graph reduces
    /// the gesture to a roll about the view axis.
    pub fn spin(&mut self, subject: Subject<'_>, from_x: f32, from_y: f32, to_x: f32, to_y: f32) {
        let Some((id, is_eye)) = self.resolve_subject(subject, "spin") else {
            return;
        };
        let pivot = if is_eye {
            self.anchor
        } else {
            self.position(id)
        };
        let center = self.projected(pivot);
        let width = self.width() as f32;
        let height = self.height() as f32;
        let flip = if self.left_handed { -1.0 } else { 1.0 };
        let p1 = project_on_ball(
            (from_x - center.x) / width,
            flip * (center.y - from_y) / height,
        );
        let p2 = project_on_ball(
            (to_x - center.x) / width,
            flip * (center.y - to_y) / height,
        );
        let axis = p2.cross(p1);
        let norm2 = p1.length_squared() * p2.length_squared();
        if axis.length_squared() <= 1e-12 || norm2 <= 1e-12 {
            return; // no motion
        }
        let angle = 2.0 * (axis.length_squared() / norm2).sqrt().min(1.0).asin();
        let quaternion = if self.is_2d() {
            Quat::from_axis_angle(Vec3::Z, if axis.z < 0.0 { -angle } else { angle })
        } else {
            Quat::from_axis_angle(axis.normalize(), angle)
        };
        if is_eye {
            self.orbit_node(id, quaternion, self.anchor);
        } else {
            let local = self.eye_rotation_for(id, quaternion);
            self.rotate(id, local);
        }
    }

    /// Scale the subject from a one-dimensional pixel delta (wheel or
    /// pinch). Positive deltas grow a node on screen; for the eye the factor
    /// inverts, since growing the eye's magnitude widens the view and
    /// shrinks everything else.
    pub fn scale_screen(&mut self, subject: Subject<'_>, delta: f32) {
        let Some((id, is_eye)) = self.resolve_subject(subject, "scale_screen") else {
            return;
        };
        let mut factor = 1.0 + delta.abs() / self.height() as f32;
        if delta < 0.0 {
            factor = factor.recip();
        }
        if is_eye {
            factor = factor.recip();
        }
        self.scale(id, factor);
    }

    /// Rotate `id` about the world point `center`: the local rotation delta
    /// is applied (constraint-filtered) and the node's position swings
    /// around `center` by the equivalent world rotation.
    pub fn orbit_node(&mut self, id: NodeId, rotation: Quat, center: Vec3) {
        let Some(node) = self.arena.get(id) else {
            log::warn!("orbit_node: stale node handle {id}");
            return;
        };
        let filtered = match node.constraint() {
            Some(c) => c.constrain_rotation(rotation, self, id),
            None => rotation,
        };
        let orientation = self.orientation(id);
        let world = orientation * filtered * orientation.inverse();
        let position = center + world * (self.position(id) - center);
        if let Some(node) = self.arena.get_mut(id) {
            node.rotate(filtered);
        }
        self.mark_modified(id);
        self.set_position(id, position);
    }
}
