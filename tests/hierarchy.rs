use armature::{ArmatureError, Graph, NodeId, Projection, Visibility};
use glam::{EulerRot, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn assert_close(a: Vec3, b: Vec3, tol: f32) {
    assert!(
        (a - b).length() <= tol,
        "expected {b:?}, got {a:?} (off by {})",
        (a - b).length()
    );
}

#[test]
fn nested_references_compose_world_positions() {
    let mut graph = Graph::new(800, 600);
    let root = graph.insert();
    let a = graph.insert_child(root).unwrap();
    graph.set_translation(a, Vec3::new(1.0, 0.0, 0.0));
    let b = graph.insert_child(a).unwrap();

    assert_close(graph.position(b), Vec3::new(1.0, 0.0, 0.0), 1e-6);

    graph.translate(a, Vec3::new(0.0, 0.0, 5.0));
    assert_close(graph.position(b), Vec3::new(1.0, 0.0, 5.0), 1e-6);
    assert_close(graph.position(a), Vec3::new(1.0, 0.0, 5.0), 1e-6);
    assert_close(graph.position(root), Vec3::ZERO, 1e-6);
}

#[test]
fn frame_conversions_round_trip_through_a_crooked_chain() {
    let mut graph = Graph::new(800, 600);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut leaf = graph.insert();
    for _ in 0..3 {
        let child = graph.insert_child(leaf).unwrap();
        graph.set_translation(
            child,
            Vec3::new(
                rng.gen_range(-10.0_f32..10.0),
                rng.gen_range(-10.0_f32..10.0),
                rng.gen_range(-10.0_f32..10.0),
            ),
        );
        graph.set_rotation(
            child,
            Quat::from_euler(
                EulerRot::XYZ,
                rng.gen_range(-1.0_f32..1.0),
                rng.gen_range(-1.0_f32..1.0),
                rng.gen_range(-1.0_f32..1.0),
            ),
        );
        graph.set_scaling(child, rng.gen_range(0.5_f32..2.0));
        leaf = child;
    }

    for _ in 0..8 {
        let v = Vec3::new(
            rng.gen_range(-20.0_f32..20.0),
            rng.gen_range(-20.0_f32..20.0),
            rng.gen_range(-20.0_f32..20.0),
        );
        let world = graph.world_location(leaf, v);
        assert_close(graph.location(leaf, world), v, 1e-3);

        let world = graph.world_displacement(leaf, v);
        assert_close(graph.displacement(leaf, world), v, 1e-3);
    }
}

#[test]
fn world_pose_setters_compensate_for_the_reference_frame() {
    let mut graph = Graph::new(800, 600);
    let parent = graph.insert();
    graph.set_translation(parent, Vec3::new(10.0, 0.0, 0.0));
    graph.set_rotation(parent, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
    graph.set_scaling(parent, 2.0);
    let child = graph.insert_child(parent).unwrap();

    graph.set_position(child, Vec3::new(1.0, 2.0, 3.0));
    assert_close(graph.position(child), Vec3::new(1.0, 2.0, 3.0), 1e-4);

    graph.set_orientation(child, Quat::IDENTITY);
    assert!(graph.orientation(child).angle_between(Quat::IDENTITY) < 1e-4);

    graph.set_magnitude(child, 3.0);
    assert!((graph.magnitude(child) - 3.0).abs() < 1e-4);
    // the local pose absorbed the parent frame
    assert!((graph.node(child).unwrap().scaling() - 1.5).abs() < 1e-4);
}

#[test]
fn cyclic_reparenting_is_rejected_and_harmless() {
    init_logs();
    let mut graph = Graph::new(800, 600);
    let a = graph.insert();
    let b = graph.insert_child(a).unwrap();
    let c = graph.insert_child(b).unwrap();

    let err = graph.set_reference(a, c).unwrap_err();
    assert_eq!(err, ArmatureError::CyclicReference { child: a, parent: c });
    assert_eq!(
        graph.set_reference(a, a),
        Err(ArmatureError::SelfReference(a))
    );

    // the chain is untouched
    assert!(graph.reference(a).is_nil());
    assert_eq!(graph.reference(b), a);
    assert_eq!(graph.reference(c), b);
    assert_eq!(graph.roots(), &[a]);
}

#[test]
fn reparenting_keeps_local_poses() {
    let mut graph = Graph::new(800, 600);
    let left = graph.insert();
    graph.set_translation(left, Vec3::new(-5.0, 0.0, 0.0));
    let right = graph.insert();
    graph.set_translation(right, Vec3::new(5.0, 0.0, 0.0));
    let child = graph.insert_child(left).unwrap();
    graph.set_translation(child, Vec3::new(0.0, 1.0, 0.0));

    assert_close(graph.position(child), Vec3::new(-5.0, 1.0, 0.0), 1e-5);

    graph.set_reference(child, right).unwrap();
    assert_eq!(graph.reference(child), right);
    assert!(graph.children(left).is_empty());
    // the local translation rides along, so the world position jumps
    assert_close(graph.position(child), Vec3::new(5.0, 1.0, 0.0), 1e-5);
}

#[test]
fn non_positive_scales_are_dropped() {
    init_logs();
    let mut graph = Graph::new(800, 600);
    let n = graph.insert();
    graph.set_scaling(n, 2.0);

    graph.set_scaling(n, -1.0);
    assert_eq!(graph.node(n).unwrap().scaling(), 2.0);
    graph.set_scaling(n, 0.0);
    assert_eq!(graph.node(n).unwrap().scaling(), 2.0);
    graph.scale(n, 0.0);
    assert_eq!(graph.node(n).unwrap().scaling(), 2.0);
    graph.scale(n, 0.5);
    assert_eq!(graph.node(n).unwrap().scaling(), 1.0);
    assert!(graph.magnitude(n) > 0.0);
}

#[test]
fn pruned_subtrees_survive_and_reattach() {
    let mut graph = Graph::new(800, 600);
    let root = graph.insert();
    let limb = graph.insert_child(root).unwrap();
    graph.set_translation(limb, Vec3::new(3.0, 0.0, 0.0));
    let tip = graph.insert_child(limb).unwrap();

    graph.prune(limb).unwrap();
    assert!(!graph.is_attached(limb));
    assert!(!graph.is_attached(tip));
    assert!(graph.contains(limb));
    assert_eq!(graph.node(limb).unwrap().translation(), Vec3::new(3.0, 0.0, 0.0));
    assert_eq!(graph.reference(tip), limb);

    graph.attach(limb).unwrap();
    assert!(graph.is_attached(tip));
    assert!(graph.roots().contains(&limb));
    assert_eq!(
        graph.attach(limb),
        Err(ArmatureError::AlreadyAttached(limb))
    );
}

#[test]
fn attached_and_detached_trees_do_not_mix() {
    init_logs();
    let mut graph = Graph::new(800, 600);
    let root = graph.insert();
    let loose = graph.insert_detached();
    let held = graph.insert_detached();

    graph.set_reference(held, loose).unwrap();
    assert_eq!(
        graph.set_reference(held, root),
        Err(ArmatureError::MixedAttachment {
            child: held,
            parent: root
        })
    );
    assert_eq!(graph.reference(held), loose);
}

#[test]
fn destroyed_handles_degrade_to_warnings() {
    init_logs();
    let mut graph = Graph::new(800, 600);
    let a = graph.insert();
    let b = graph.insert_child(a).unwrap();
    graph.set_translation(b, Vec3::ONE);

    graph.destroy(a).unwrap();
    assert!(!graph.contains(a));
    assert!(!graph.contains(b));

    // reads fall back to identity defaults, writes are dropped
    assert_eq!(graph.position(b), Vec3::ZERO);
    assert_eq!(graph.magnitude(b), 1.0);
    graph.translate(b, Vec3::ONE);
    assert_eq!(
        graph.set_reference(b, NodeId::nil()),
        Err(ArmatureError::StaleHandle(b))
    );
    assert_eq!(graph.destroy(b), Err(ArmatureError::StaleHandle(b)));
}

#[test]
fn the_eye_cannot_be_destroyed() {
    init_logs();
    let mut graph = Graph::new(800, 600);
    let eye = graph.eye();
    assert_eq!(graph.destroy(eye), Err(ArmatureError::EyeInSubtree(eye)));

    // nor removed as part of a subtree
    let carrier = graph.insert();
    let new_eye = graph.insert_child(carrier).unwrap();
    graph.set_eye(new_eye).unwrap();
    assert_eq!(
        graph.destroy(carrier),
        Err(ArmatureError::EyeInSubtree(carrier))
    );
    assert!(graph.contains(carrier));
}

#[test]
fn recycled_slots_invalidate_old_handles() {
    let mut graph = Graph::new(800, 600);
    let first = graph.insert();
    graph.destroy(first).unwrap();
    let second = graph.insert();

    assert_ne!(first, second);
    assert!(!graph.contains(first));
    assert!(graph.contains(second));
}

#[test]
fn snapshots_copy_the_world_pose_without_linking() {
    let mut graph = Graph::new(800, 600);
    let parent = graph.insert();
    graph.set_translation(parent, Vec3::new(4.0, 0.0, 0.0));
    let child = graph.insert_child(parent).unwrap();
    graph.set_translation(child, Vec3::new(0.0, 2.0, 0.0));

    let copy = graph.snapshot(child);
    assert!(!graph.is_attached(copy));
    assert!(graph.reference(copy).is_nil());
    assert_close(graph.position(copy), Vec3::new(4.0, 2.0, 0.0), 1e-5);

    // the copy does not follow its source
    graph.translate(parent, Vec3::new(0.0, 0.0, 9.0));
    assert_close(graph.position(copy), Vec3::new(4.0, 2.0, 0.0), 1e-5);
}

#[test]
fn ids_and_enums_serialize_stably() {
    let mut graph = Graph::new(800, 600);
    let n = graph.insert();

    let json = serde_json::to_string(&n).unwrap();
    let back: NodeId = serde_json::from_str(&json).unwrap();
    assert_eq!(n, back);

    let nil: NodeId = serde_json::from_str(&serde_json::to_string(&NodeId::nil()).unwrap()).unwrap();
    assert!(nil.is_nil());

    assert_eq!(
        serde_json::to_string(&Visibility::SemiVisible).unwrap(),
        "\"SemiVisible\""
    );
    let p: Projection = serde_json::from_str("\"Orthographic\"").unwrap();
    assert!(matches!(p, Projection::Orthographic));
}
