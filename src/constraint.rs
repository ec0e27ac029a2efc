//! Motion filters applied by the graph before committing node displacements.
//!
//! A constraint never mutates anything; it receives the proposed local delta
//! plus read access to the graph and returns the delta that is actually
//! applied. Stock [`FrameConstraint`] covers the usual axis/plane cases,
//! custom behavior implements [`Constraint`] directly.

use crate::graph::Graph;
use crate::ids::NodeId;
use glam::{Quat, Vec3};

/// Filters translation and rotation deltas for one node.
///
/// `delta` conventions match the graph's mutators: translations are expressed
/// in the node's reference frame, rotations are local right-multiplied
/// increments. The default passes everything through.
pub trait Constraint: Send + Sync {
    fn constrain_translation(&self, delta: Vec3, _graph: &Graph, _node: NodeId) -> Vec3 {
        delta
    }

    fn constrain_rotation(&self, delta: Quat, _graph: &Graph, _node: NodeId) -> Quat {
        delta
    }
}

/// Frame in which a [`FrameConstraint`]'s axes are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConstraintFrame {
    /// Axes given in the constrained node's own frame.
    Local,
    /// Axes given in world coordinates.
    World,
    /// Axes given in the eye's frame; the filter tracks the eye as it moves.
    Eye,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TranslationPolicy {
    Free,
    /// Keep the component lying in the plane with this normal.
    Plane(Vec3),
    /// Keep only the component along this axis.
    Axis(Vec3),
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RotationPolicy {
    Free,
    /// Keep only the spin about this axis.
    Axis(Vec3),
    Forbidden,
}

/// Axis/plane filter with its directions interpreted in a chosen frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameConstraint {
    pub frame: ConstraintFrame,
    pub translation: TranslationPolicy,
    pub rotation: RotationPolicy,
}

impl FrameConstraint {
    pub fn new(frame: ConstraintFrame) -> Self {
        Self {
            frame,
            translation: TranslationPolicy::Free,
            rotation: RotationPolicy::Free,
        }
    }

    pub fn local() -> Self {
        Self::new(ConstraintFrame::Local)
    }

    pub fn world() -> Self {
        Self::new(ConstraintFrame::World)
    }

    pub fn eye() -> Self {
        Self::new(ConstraintFrame::Eye)
    }

    pub fn with_translation(mut self, policy: TranslationPolicy) -> Self {
        self.translation = policy;
        self
    }

    pub fn with_rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = policy;
        self
    }

    /// Express a policy axis in the node's reference frame (where translation
    /// deltas live).
    fn axis_in_reference(&self, axis: Vec3, graph: &Graph, node: NodeId) -> Vec3 {
        let world = match self.frame {
            ConstraintFrame::Local => graph.orientation(node) * axis,
            ConstraintFrame::World => axis,
            ConstraintFrame::Eye => graph.orientation(graph.eye()) * axis,
        };
        let reference = graph
            .node(node)
            .map(|n| n.reference())
            .unwrap_or(NodeId::nil());
        if reference.is_nil() {
            world
        } else {
            graph.orientation(reference).inverse() * world
        }
    }

    /// Express a policy axis in the node's local frame (where rotation deltas
    /// live).
    fn axis_in_local(&self, axis: Vec3, graph: &Graph, node: NodeId) -> Vec3 {
        match self.frame {
            ConstraintFrame::Local => axis,
            ConstraintFrame::World => graph.orientation(node).inverse() * axis,
            ConstraintFrame::Eye => {
                graph.orientation(node).inverse() * (graph.orientation(graph.eye()) * axis)
            }
        }
    }
}

impl Default for FrameConstraint {
    fn default() -> Self {
        Self::local()
    }
}

impl Constraint for FrameConstraint {
    fn constrain_translation(&self, delta: Vec3, graph: &Graph, node: NodeId) -> Vec3 {
        match self.translation {
            TranslationPolicy::Free => delta,
            TranslationPolicy::Plane(normal) => {
                let Some(n) = self.axis_in_reference(normal, graph, node).try_normalize() else {
                    log::warn!("degenerate plane normal on node {node}; leaving delta free");
                    return delta;
                };
                delta - n * delta.dot(n)
            }
            TranslationPolicy::Axis(axis) => {
                let Some(a) = self.axis_in_reference(axis, graph, node).try_normalize() else {
                    log::warn!("degenerate translation axis on node {node}; leaving delta free");
                    return delta;
                };
                a * delta.dot(a)
            }
            TranslationPolicy::Forbidden => Vec3::ZERO,
        }
    }

    fn constrain_rotation(&self, delta: Quat, graph: &Graph, node: NodeId) -> Quat {
        match self.rotation {
            RotationPolicy::Free => delta,
            RotationPolicy::Axis(axis) => {
                let Some(a) = self.axis_in_local(axis, graph, node).try_normalize() else {
                    log::warn!("degenerate rotation axis on node {node}; leaving delta free");
                    return delta;
                };
                // Project the quaternion vector part on the axis, keep w and
                // renormalize; off-axis spin collapses toward identity.
                let v = delta.xyz();
                let kept = a * v.dot(a);
                Quat::from_xyzw(kept.x, kept.y, kept.z, delta.w).normalize()
            }
            RotationPolicy::Forbidden => Quat::IDENTITY,
        }
    }
}
