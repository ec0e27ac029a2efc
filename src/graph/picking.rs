//! Tag-based picking: hit-testing projected node origins and binding the
//! results to named tag channels that gestures later resolve.

use super::Graph;
use crate::ids::NodeId;
use crate::node::{Bullseye, ThresholdUnits};

/// Pluggable exact hit-test, consulted for nodes whose picking threshold is
/// exactly zero (e.g. renderers with an id-buffer).
pub type TrackFilter = Box<dyn Fn(&Graph, NodeId, f32, f32) -> bool + Send + Sync>;

/// A deferred picking request, resolved against the visited nodes of the
/// next render traversal.
#[derive(Debug, Clone)]
pub(crate) struct Ray {
    pub(crate) tag: Option<String>,
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl Graph {
    // ---- tag channels ----

    /// Bind `id` to a tag channel (`None` is the default channel). The
    /// binding replaces whatever the channel held.
    pub fn tag_node(&mut self, tag: Option<&str>, id: NodeId) {
        if !self.contains(id) {
            log::warn!("tag_node: stale node handle {id}");
            return;
        }
        self.tags.insert(tag.map(Into::into), id);
    }

    /// Clear a tag channel.
    pub fn untag(&mut self, tag: Option<&str>) {
        self.tags.remove(&tag.map(String::from));
    }

    /// Remove `id` from every tag channel it appears in.
    pub fn untag_node(&mut self, id: NodeId) {
        self.tags.retain(|_, tagged| *tagged != id);
    }

    /// The node currently bound to a tag channel.
    pub fn tagged(&self, tag: Option<&str>) -> Option<NodeId> {
        self.tags.get(&tag.map(String::from)).copied()
    }

    pub fn has_tag(&self, tag: Option<&str>) -> bool {
        self.tagged(tag).is_some()
    }

    /// Whether any channel is bound to `id`.
    pub fn is_tagged(&self, id: NodeId) -> bool {
        self.tags.values().any(|&tagged| tagged == id)
    }

    // ---- hit testing ----

    /// Whether pixel (x, y) lands on `id`'s bullseye.
    ///
    /// The bullseye sits on the node's projected origin; the threshold is
    /// its half-extent, in pixels or as a scene-radius fraction measured at
    /// the node's depth. A zero threshold defers to the graph's track
    /// filter. Non-tracking nodes never match.
    pub fn tracks(&self, id: NodeId, x: f32, y: f32) -> bool {
        let Some(node) = self.node(id) else {
            log::warn!("tracks: stale node handle {id}");
            return false;
        };
        if !node.is_tracking() {
            return false;
        }
        let threshold = node.picking_threshold();
        if threshold == 0.0 {
            return match &self.track_filter {
                Some(filter) => filter(self, id, x, y),
                None => false,
            };
        }
        let position = self.position(id);
        let projected = self.projected(position);
        let half = match node.threshold_units() {
            ThresholdUnits::Pixels => threshold,
            ThresholdUnits::SceneRatio => {
                let ratio = self.pixel_to_scene_ratio(position);
                if ratio <= f32::EPSILON {
                    log::warn!("tracks: degenerate pixel ratio at node {id}");
                    return false;
                }
                threshold * self.radius() / ratio
            }
        };
        let dx = (x - projected.x).abs();
        let dy = (y - projected.y).abs();
        match node.bullseye() {
            Bullseye::Square => dx <= half && dy <= half,
            Bullseye::Circle => dx * dx + dy * dy <= half * half,
        }
    }

    /// Synchronous pick: test pixel (x, y) against the attached, non-culled
    /// nodes in traversal order, bind the first hit to the tag channel and
    /// return it. A miss clears the channel.
    pub fn track(&mut self, tag: Option<&str>, x: f32, y: f32) -> Option<NodeId> {
        for id in self.visit_order() {
            if self.tracks(id, x, y) {
                self.tag_node(tag, id);
                return Some(id);
            }
        }
        self.untag(tag);
        None
    }

    /// Deferred pick: queue a ray for the tag channel. Rays are resolved
    /// (first visited hit wins) during the next [`Graph::render`] and the
    /// queue is cleared; a ray that hits nothing clears its channel.
    pub fn cast(&mut self, tag: Option<&str>, x: f32, y: f32) {
        self.pending_rays.push(Ray {
            tag: tag.map(Into::into),
            x,
            y,
        });
    }

    pub(crate) fn resolve_rays_at(&mut self, id: NodeId, rays: &mut Vec<Ray>) {
        if rays.is_empty() {
            return;
        }
        let mut i = 0;
        while i < rays.len() {
            if self.tracks(id, rays[i].x, rays[i].y) {
                let ray = rays.remove(i);
                self.tags.insert(ray.tag, id);
            } else {
                i += 1;
            }
        }
    }

    /// Install (or clear) the exact hit-test used by zero-threshold nodes.
    pub fn set_track_filter(&mut self, filter: Option<TrackFilter>) {
        self.track_filter = filter;
    }

    pub fn has_track_filter(&self) -> bool {
        self.track_filter.is_some()
    }
}
