//! Keyframed pose playback.
//!
//! An [`Interpolator`] drives one node along a spline defined by keyframe
//! holder nodes: positions blend through a Catmull-Rom cubic, orientations
//! through SQUAD, magnitudes linearly. Holders are live graph nodes, so
//! editing one re-shapes the path on the next evaluation; the interpolator
//! owns the holders it is given and destroys them when cleared.

use crate::error::{ArmatureError, Result};
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::timing::Task;
use glam::{Quat, Vec3};

const PURE_EPSILON: f32 = 1e-6;

/// Unit-quaternion logarithm, returned as a pure quaternion.
fn quat_log(q: Quat) -> Quat {
    let v = Vec3::new(q.x, q.y, q.z);
    let len = v.length();
    if len < PURE_EPSILON {
        return Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
    }
    let scale = len.atan2(q.w) / len;
    Quat::from_xyzw(v.x * scale, v.y * scale, v.z * scale, 0.0)
}

/// Exponential of a pure quaternion.
fn quat_exp(q: Quat) -> Quat {
    let v = Vec3::new(q.x, q.y, q.z);
    let angle = v.length();
    if angle < PURE_EPSILON {
        return Quat::IDENTITY;
    }
    let scale = angle.sin() / angle;
    Quat::from_xyzw(v.x * scale, v.y * scale, v.z * scale, angle.cos())
}

/// Spherical cubic blend between `a` and `b` steered by their auxiliary
/// quaternions.
fn squad(a: Quat, aux_a: Quat, aux_b: Quat, b: Quat, t: f32) -> Quat {
    let outer = a.slerp(b, t);
    let inner = aux_a.slerp(aux_b, t);
    outer.slerp(inner, 2.0 * t * (1.0 - t))
}

/// One stop on the path: the holder node and its time, plus the cached pose
/// and per-key spline helpers rebuilt whenever a holder changes.
#[derive(Debug, Clone)]
struct KeyFrame {
    node: NodeId,
    time: f32,
    stamp: u64,
    position: Vec3,
    orientation: Quat,
    magnitude: f32,
    tangent: Vec3,
    aux: Quat,
}

/// Plays a keyframe path into a driven node.
///
/// Playback is cooperative: the host (usually [`Graph::pre_draw`]) feeds
/// elapsed milliseconds into [`update`](Interpolator::update) and the
/// internal [`Task`] decides how many fixed-period steps came due.
#[derive(Debug)]
pub struct Interpolator {
    node: NodeId,
    keys: Vec<KeyFrame>,
    time: f32,
    speed: f32,
    looping: bool,
    task: Task,
    keys_valid: bool,
    segment: usize,
    segment_valid: bool,
    v1: Vec3,
    v2: Vec3,
}

impl Interpolator {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            keys: Vec::new(),
            time: 0.0,
            speed: 1.0,
            looping: false,
            task: Task::new(),
            keys_valid: true,
            segment: 0,
            segment_valid: false,
            v1: Vec3::ZERO,
            v2: Vec3::ZERO,
        }
    }

    // ---- configuration ----

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Redirect playback to another node. The path itself is unchanged.
    pub fn set_node(&mut self, node: NodeId) {
        self.node = node;
    }

    /// Current playback time in seconds.
    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Playback rate multiplier; negative plays backwards.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    #[inline]
    pub fn period_ms(&self) -> f32 {
        self.task.period_ms()
    }

    pub fn set_period_ms(&mut self, period_ms: f32) {
        self.task.set_period_ms(period_ms);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.task.is_active()
    }

    // ---- keyframe surface ----

    #[inline]
    pub fn keyframe_count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Holder node of the keyframe at `index`.
    pub fn keyframe(&self, index: usize) -> Option<NodeId> {
        self.keys.get(index).map(|key| key.node)
    }

    pub fn keyframe_time(&self, index: usize) -> Option<f32> {
        self.keys.get(index).map(|key| key.time)
    }

    /// Time of the first keyframe (0 when empty).
    pub fn first_time(&self) -> f32 {
        self.keys.first().map_or(0.0, |key| key.time)
    }

    pub fn last_time(&self) -> f32 {
        self.keys.last().map_or(0.0, |key| key.time)
    }

    pub fn duration(&self) -> f32 {
        self.last_time() - self.first_time()
    }

    /// Append a keyframe holding `node`'s pose at `time` (seconds). Times
    /// must not decrease; an out-of-order keyframe is dropped with a
    /// warning.
    pub fn add_key_frame(&mut self, graph: &Graph, node: NodeId, time: f32) {
        if !graph.contains(node) {
            log::warn!("add_key_frame: stale node handle {node}");
            return;
        }
        if let Some(last) = self.keys.last() {
            if time < last.time {
                log::warn!(
                    "add_key_frame: time {time} precedes the last keyframe at {}; dropped",
                    last.time
                );
                return;
            }
        }
        self.keys.push(KeyFrame {
            node,
            time,
            stamp: 0,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            magnitude: 1.0,
            tangent: Vec3::ZERO,
            aux: Quat::IDENTITY,
        });
        self.keys_valid = false;
    }

    /// Append a detached snapshot of `source`'s current world pose, one
    /// second after the last keyframe.
    pub fn add_snapshot(&mut self, graph: &mut Graph, source: NodeId) {
        if !graph.contains(source) {
            log::warn!("add_snapshot: stale node handle {source}");
            return;
        }
        let time = self.keys.last().map_or(0.0, |key| key.time + 1.0);
        let holder = graph.snapshot(source);
        self.add_key_frame(graph, holder, time);
    }

    /// Drop the keyframe at `index` and hand its holder node back to the
    /// caller (the holder stays alive in the graph).
    pub fn remove_key_frame(&mut self, index: usize) -> Result<NodeId> {
        if index >= self.keys.len() {
            let err = ArmatureError::KeyFrameOutOfBounds {
                index,
                len: self.keys.len(),
            };
            log::warn!("{err}");
            return Err(err);
        }
        let key = self.keys.remove(index);
        self.keys_valid = false;
        self.segment_valid = false;
        if self.keys.is_empty() {
            self.task.stop();
        }
        Ok(key.node)
    }

    /// Stop playback and destroy every keyframe holder. A holder the graph
    /// refuses to destroy (the eye moved into its subtree) is left alive
    /// and logged.
    pub fn clear(&mut self, graph: &mut Graph) {
        self.task.stop();
        for key in self.keys.drain(..) {
            if let Err(err) = graph.destroy(key.node) {
                log::warn!("interpolator: keyframe holder {} survives clear: {err}", key.node);
            }
        }
        self.keys_valid = true;
        self.segment = 0;
        self.segment_valid = false;
        self.time = 0.0;
    }

    // ---- playback control ----

    /// Start (or resume) stepping at the current period.
    pub fn run(&mut self) {
        let period = self.task.period_ms();
        self.task.run(period);
    }

    /// Start stepping every `period_ms` at `speed`.
    pub fn run_at(&mut self, period_ms: f32, speed: f32) {
        self.speed = speed;
        self.task.run(period_ms);
    }

    /// Freeze playback; the driven node keeps its last evaluated pose.
    pub fn stop(&mut self) {
        self.task.stop();
    }

    pub fn toggle(&mut self) {
        if self.task.is_active() {
            self.stop();
        } else {
            self.run();
        }
    }

    /// Rewind to the first keyframe without starting playback.
    pub fn reset(&mut self) {
        self.time = self.first_time();
        self.segment = 0;
        self.segment_valid = false;
    }

    // ---- evaluation ----

    fn stale(&self, graph: &Graph) -> bool {
        if !self.keys_valid {
            return true;
        }
        self.keys.iter().any(|key| match graph.node(key.node) {
            Some(node) => node.last_update() != key.stamp,
            None => true,
        })
    }

    /// Re-read holder poses and rebuild tangents and auxiliary quaternions
    /// if any holder changed since the last evaluation.
    fn refresh(&mut self, graph: &Graph) {
        if !self.stale(graph) {
            return;
        }
        let before = self.keys.len();
        self.keys.retain(|key| graph.contains(key.node));
        if self.keys.len() != before {
            log::warn!(
                "interpolator: dropped {} keyframe(s) whose holder was destroyed",
                before - self.keys.len()
            );
        }
        let n = self.keys.len();
        self.keys_valid = true;
        self.segment_valid = false;
        if n == 0 {
            return;
        }
        for i in 0..n {
            let id = self.keys[i].node;
            let mut orientation = graph.orientation(id);
            // keep consecutive orientations on the same hemisphere so the
            // spline never takes the long way around
            if i > 0 && self.keys[i - 1].orientation.dot(orientation) < 0.0 {
                orientation = -orientation;
            }
            let stamp = graph.node(id).map_or(0, |node| node.last_update());
            let key = &mut self.keys[i];
            key.position = graph.position(id);
            key.orientation = orientation;
            key.magnitude = graph.magnitude(id);
            key.stamp = stamp;
        }
        for i in 0..n {
            let prev = &self.keys[i.saturating_sub(1)];
            let next = &self.keys[(i + 1).min(n - 1)];
            let tangent = (next.position - prev.position) * 0.5;
            let q = self.keys[i].orientation;
            let arg = (quat_log(q.inverse() * next.orientation)
                + quat_log(q.inverse() * prev.orientation))
                * -0.25;
            let aux = (q * quat_exp(arg)).normalize();
            let key = &mut self.keys[i];
            key.tangent = tangent;
            key.aux = aux;
        }
    }

    /// Move the bracketing cursor so `keys[segment].time <= time <=
    /// keys[segment + 1].time`, rebuilding the segment cache when the pair
    /// changes. Callers guarantee at least two keyframes and an interior
    /// `time`.
    fn seek(&mut self, time: f32) {
        let last_pair = self.keys.len() - 2;
        let mut segment = self.segment.min(last_pair);
        while segment < last_pair && self.keys[segment + 1].time <= time {
            segment += 1;
        }
        while segment > 0 && self.keys[segment].time > time {
            segment -= 1;
        }
        if segment != self.segment || !self.segment_valid {
            self.segment = segment;
            self.rebuild_segment();
        }
    }

    fn rebuild_segment(&mut self) {
        let a = &self.keys[self.segment];
        let b = &self.keys[self.segment + 1];
        let delta = b.position - a.position;
        self.v1 = 3.0 * delta - 2.0 * a.tangent - b.tangent;
        self.v2 = -2.0 * delta + a.tangent + b.tangent;
        self.segment_valid = true;
    }

    fn write_key(&self, graph: &mut Graph, index: usize) {
        let key = &self.keys[index];
        let (position, orientation, magnitude) = (key.position, key.orientation, key.magnitude);
        graph.set_position(self.node, position);
        graph.set_orientation(self.node, orientation);
        graph.set_magnitude(self.node, magnitude);
    }

    /// Evaluate the path at `time` (seconds) and write the pose into the
    /// driven node. Times outside the keyframe range clamp to the nearest
    /// boundary keyframe; exact keyframe times reproduce the keyframe.
    pub fn interpolate(&mut self, graph: &mut Graph, time: f32) {
        self.refresh(graph);
        if self.keys.is_empty() {
            return;
        }
        if !graph.contains(self.node) {
            log::warn!("interpolate: driven node {} is gone", self.node);
            return;
        }
        let first = self.keys[0].time;
        let last = self.keys[self.keys.len() - 1].time;
        if self.keys.len() == 1 || time <= first {
            self.write_key(graph, 0);
            return;
        }
        if time >= last {
            self.write_key(graph, self.keys.len() - 1);
            return;
        }
        self.seek(time);
        let a = &self.keys[self.segment];
        let b = &self.keys[self.segment + 1];
        let dt = b.time - a.time;
        let alpha = if dt <= f32::EPSILON {
            0.0
        } else {
            (time - a.time) / dt
        };
        let position = a.position + alpha * (a.tangent + alpha * (self.v1 + alpha * self.v2));
        let orientation = squad(a.orientation, a.aux, b.aux, b.orientation, alpha);
        let magnitude = a.magnitude + alpha * (b.magnitude - a.magnitude);
        graph.set_position(self.node, position);
        graph.set_orientation(self.node, orientation);
        graph.set_magnitude(self.node, magnitude);
    }

    /// One scheduler step: evaluate at the current time, then advance it by
    /// `speed × period`. Crossing either end wraps when looping, otherwise
    /// lands exactly on the boundary keyframe and stops.
    pub fn execute(&mut self, graph: &mut Graph) {
        self.refresh(graph);
        if self.keys.is_empty() {
            self.task.stop();
            return;
        }
        self.interpolate(graph, self.time);
        self.time += self.speed * self.task.period_ms() / 1000.0;
        let first = self.keys[0].time;
        let last = self.keys[self.keys.len() - 1].time;
        if self.time < first || self.time > last {
            if self.looping {
                let span = last - first;
                self.time = if span <= f32::EPSILON {
                    first
                } else {
                    first + (self.time - first).rem_euclid(span)
                };
            } else {
                let boundary = if self.time > last { last } else { first };
                self.interpolate(graph, boundary);
                self.time = boundary;
                self.task.stop();
            }
        }
    }

    /// Feed elapsed host time and run however many steps came due (capped
    /// by the task's catch-up policy).
    pub fn update(&mut self, graph: &mut Graph, delta_ms: f32) {
        let due = self.task.tick(delta_ms);
        for _ in 0..due {
            self.execute(graph);
            if !self.task.is_active() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    fn key_at(graph: &mut Graph, position: Vec3) -> NodeId {
        let id = graph.insert_detached();
        graph.set_position(id, position);
        id
    }

    fn driven(graph: &mut Graph) -> NodeId {
        graph.insert_detached()
    }

    #[test]
    fn cubic_blend_midpoint_matches_the_closed_form() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::new(8.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 4.0);
        interp.interpolate(&mut graph, 2.0);
        // tangents (4,0,0) each: p(1/2) = 1/2 (4 + 1/2 (12 - 4)) = 4
        assert!((graph.position(node).x - 4.0).abs() < 1e-4);
        interp.interpolate(&mut graph, 1.0);
        let x = graph.position(node).x;
        assert!(x > 0.0 && x < 4.0);
    }

    #[test]
    fn keyframe_times_reproduce_their_poses() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let poses = [
            (Vec3::ZERO, Quat::IDENTITY, 1.0, 0.0),
            (Vec3::new(5.0, 1.0, 0.0), Quat::from_rotation_y(0.9), 2.0, 1.0),
            (Vec3::new(2.0, -3.0, 4.0), Quat::from_rotation_z(-0.7), 0.5, 2.5),
        ];
        for (p, q, m, t) in poses {
            let id = graph.insert_detached();
            graph.set_position(id, p);
            graph.set_orientation(id, q);
            graph.set_magnitude(id, m);
            interp.add_key_frame(&graph, id, t);
        }
        for (p, q, m, t) in poses {
            interp.interpolate(&mut graph, t);
            assert!((graph.position(node) - p).length() < 1e-4, "at t={t}");
            assert!(graph.orientation(node).angle_between(q) < 1e-3, "at t={t}");
            assert!((graph.magnitude(node) - m).abs() < 1e-4, "at t={t}");
        }
    }

    #[test]
    fn out_of_order_keyframes_are_dropped() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::ONE);
        interp.add_key_frame(&graph, k0, 4.0);
        interp.add_key_frame(&graph, k1, 1.0);
        assert_eq!(interp.keyframe_count(), 1);
        assert_eq!(interp.keyframe(0), Some(k0));
    }

    #[test]
    fn times_outside_the_range_clamp_to_the_boundaries() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::new(-2.0, 0.0, 0.0));
        let k1 = key_at(&mut graph, Vec3::new(6.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 1.0);
        interp.add_key_frame(&graph, k1, 2.0);
        interp.interpolate(&mut graph, -5.0);
        assert!((graph.position(node).x + 2.0).abs() < 1e-5);
        interp.interpolate(&mut graph, 50.0);
        assert!((graph.position(node).x - 6.0).abs() < 1e-5);
    }

    #[test]
    fn magnitude_interpolates_linearly() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = graph.insert_detached();
        graph.set_magnitude(k0, 1.0);
        let k1 = graph.insert_detached();
        graph.set_magnitude(k1, 3.0);
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 1.0);
        interp.interpolate(&mut graph, 0.5);
        assert!((graph.magnitude(node) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn orientation_midpoint_of_a_single_turn() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = graph.insert_detached();
        let k1 = graph.insert_detached();
        graph.set_orientation(k1, Quat::from_rotation_y(FRAC_PI_2));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 2.0);
        interp.interpolate(&mut graph, 1.0);
        let expected = Quat::from_rotation_y(FRAC_PI_4);
        assert!(graph.orientation(node).angle_between(expected) < 1e-3);
    }

    #[test]
    fn editing_a_holder_reshapes_the_path() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::new(8.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 4.0);
        interp.interpolate(&mut graph, 2.0);
        assert!((graph.position(node).x - 4.0).abs() < 1e-4);
        graph.set_position(k1, Vec3::new(16.0, 0.0, 0.0));
        interp.interpolate(&mut graph, 2.0);
        assert!((graph.position(node).x - 8.0).abs() < 1e-4);
    }

    #[test]
    fn destroyed_holders_fall_out_of_the_path() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::new(4.0, 0.0, 0.0));
        let k2 = key_at(&mut graph, Vec3::new(8.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 1.0);
        interp.add_key_frame(&graph, k2, 2.0);
        graph.destroy(k1).unwrap();
        interp.interpolate(&mut graph, 2.0);
        assert_eq!(interp.keyframe_count(), 2);
        assert!((graph.position(node).x - 8.0).abs() < 1e-4);
    }

    #[test]
    fn playback_stops_exactly_on_the_last_keyframe() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::new(8.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 0.2);
        interp.run_at(40.0, 1.0);
        assert!(interp.is_running());
        let mut last_x = -1.0;
        for _ in 0..8 {
            interp.update(&mut graph, 40.0);
            let x = graph.position(node).x;
            assert!(x >= last_x, "playback went backwards: {x} < {last_x}");
            last_x = x;
        }
        assert!(!interp.is_running());
        assert!((graph.position(node).x - 8.0).abs() < 1e-4);
        assert!((interp.time() - 0.2).abs() < 1e-5);
    }

    #[test]
    fn looping_wraps_instead_of_stopping() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::new(8.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 0.2);
        interp.set_loop(true);
        interp.run();
        for _ in 0..12 {
            interp.update(&mut graph, 40.0);
            assert!(interp.is_running());
            assert!(interp.time() >= 0.0 && interp.time() <= 0.2 + 1e-5);
        }
    }

    #[test]
    fn negative_speed_plays_backwards_to_the_first_keyframe() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::new(8.0, 0.0, 0.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 0.2);
        interp.set_time(0.2);
        interp.run_at(40.0, -1.0);
        for _ in 0..8 {
            interp.update(&mut graph, 40.0);
        }
        assert!(!interp.is_running());
        assert!(graph.position(node).x.abs() < 1e-4);
        assert!(interp.time().abs() < 1e-5);
    }

    #[test]
    fn remove_key_frame_hands_back_the_holder() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::ONE);
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 1.0);
        assert_eq!(
            interp.remove_key_frame(5),
            Err(ArmatureError::KeyFrameOutOfBounds { index: 5, len: 2 })
        );
        assert_eq!(interp.remove_key_frame(0), Ok(k0));
        assert!(graph.contains(k0));
        assert_eq!(interp.keyframe_count(), 1);
    }

    #[test]
    fn clear_destroys_the_holders() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::ONE);
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 1.0);
        interp.run();
        interp.clear(&mut graph);
        assert!(!graph.contains(k0));
        assert!(!graph.contains(k1));
        assert!(interp.is_empty());
        assert!(!interp.is_running());
    }

    #[test]
    fn clear_leaves_a_holder_carrying_the_eye() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        let k1 = key_at(&mut graph, Vec3::ONE);
        interp.add_key_frame(&graph, k0, 0.0);
        interp.add_key_frame(&graph, k1, 1.0);
        graph.set_eye(k1).unwrap();
        interp.clear(&mut graph);
        // the graph refuses to destroy its eye; everything else goes
        assert!(!graph.contains(k0));
        assert!(graph.contains(k1));
        assert!(graph.is_eye(k1));
        assert!(interp.is_empty());
    }

    #[test]
    fn add_snapshot_appends_one_second_later() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::ZERO);
        interp.add_key_frame(&graph, k0, 1.5);
        let source = graph.insert();
        graph.set_position(source, Vec3::new(7.0, 0.0, 0.0));
        interp.add_snapshot(&mut graph, source);
        assert_eq!(interp.keyframe_count(), 2);
        assert_eq!(interp.keyframe_time(1), Some(2.5));
        let holder = interp.keyframe(1).unwrap();
        assert!((graph.position(holder) - Vec3::new(7.0, 0.0, 0.0)).length() < 1e-5);
        // the snapshot is its own node: moving the source no longer matters
        graph.set_position(source, Vec3::new(-3.0, 0.0, 0.0));
        interp.interpolate(&mut graph, 2.5);
        assert!((graph.position(node).x - 7.0).abs() < 1e-4);
    }

    #[test]
    fn single_keyframe_pins_the_pose() {
        let mut graph = Graph::new(800, 600);
        let node = driven(&mut graph);
        let mut interp = Interpolator::new(node);
        let k0 = key_at(&mut graph, Vec3::new(3.0, 2.0, 1.0));
        interp.add_key_frame(&graph, k0, 0.0);
        interp.interpolate(&mut graph, 0.7);
        assert!((graph.position(node) - Vec3::new(3.0, 2.0, 1.0)).length() < 1e-5);
    }
}
