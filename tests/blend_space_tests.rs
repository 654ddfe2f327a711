//! Blend Space Tests
//!
//! Tests for:
//! - 1D sample ordering, bracketing and clamping
//! - 2D triangulation (Delaunay empty-circle property, stored circumcircles)
//! - Weights summing to one inside and outside the hull
//! - JSON round trip and compilation into blend nodes

use glam::{Mat4, Quat, Vec2, Vec3};
use proptest::prelude::*;

use nova::animation::blend_tree::{BlendNode, EvalContext};
use nova::animation::delaunay::{circumcircle, triangulate};
use nova::animation::{
    Animation, AnimationChannel, AnimationLibrary, BlendSpace1D, BlendSpace2D, BlendSpace2DMode, Keyframe,
    SkeletonBuilder,
};

const EPSILON: f32 = 1e-3;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn sum(weights: &[f32]) -> f32 {
    weights.iter().sum()
}

fn locomotion_1d() -> BlendSpace1D {
    BlendSpace1D::new("locomotion", "speed")
        .with_bounds(0.0, 6.0)
        .with_sample("run", 6.0)
        .with_sample("idle", 0.0)
        .with_sample("walk", 2.0)
}

fn strafe_2d() -> BlendSpace2D {
    BlendSpace2D::new("strafe", "x", "y")
        .with_bounds(Vec2::splat(-2.0), Vec2::splat(2.0))
        .with_sample("idle", Vec2::ZERO)
        .with_sample("forward", Vec2::new(0.0, 1.0))
        .with_sample("backward", Vec2::new(0.0, -1.0))
        .with_sample("left", Vec2::new(-1.0, 0.0))
        .with_sample("right", Vec2::new(1.0, 0.0))
}

// ============================================================================
// 1D
// ============================================================================

#[test]
fn samples_stay_sorted() {
    let space = locomotion_1d();
    let positions: Vec<f32> = space.samples().iter().map(|s| s.position).collect();
    assert_eq!(positions, [0.0, 2.0, 6.0]);
}

#[test]
fn bracketing_between_samples() {
    let space = locomotion_1d();
    let (lower, upper, t) = space.find_blend_indices(3.0);
    assert_eq!((lower, upper), (1, 2));
    assert!(approx(t, 0.25));

    let weights = space.get_sample_weights(3.0);
    assert!(approx(weights[1], 0.75));
    assert!(approx(weights[2], 0.25));
}

#[test]
fn values_outside_bounds_clamp() {
    let space = locomotion_1d();
    assert_eq!(space.get_sample_weights(-5.0), [1.0, 0.0, 0.0]);
    assert_eq!(space.get_sample_weights(50.0), [0.0, 0.0, 1.0]);
}

#[test]
fn empty_space_has_no_weights() {
    let space = BlendSpace1D::new("empty", "speed");
    assert!(space.get_sample_weights(1.0).is_empty());
}

// ============================================================================
// 2D
// ============================================================================

#[test]
fn diamond_with_center_triangulates_into_four() {
    let space = strafe_2d();
    assert_eq!(space.triangles().len(), 4);
    assert!(space.find_containing_triangle(Vec2::new(0.2, 0.2)).is_some());
}

#[test]
fn exact_sample_gets_full_weight() {
    let space = strafe_2d();
    let weights = space.get_sample_weights(Vec2::new(0.0, 1.0));
    assert!(approx(weights[1], 1.0));
    assert!(approx(sum(&weights), 1.0));
}

#[test]
fn outside_hull_falls_back_to_inverse_distance() {
    let space = strafe_2d();
    let weights = space.get_sample_weights(Vec2::new(1.5, 1.5));
    assert!(approx(sum(&weights), 1.0));
    assert!(weights.iter().all(|w| *w >= 0.0));
    // Closest samples dominate
    assert!(weights[1] > weights[2]);
    assert!(weights[4] > weights[3]);
}

#[test]
fn freeform_skips_triangulation() {
    let space = strafe_2d().with_mode(BlendSpace2DMode::Freeform);
    assert!(space.triangles().is_empty());
    assert!(approx(sum(&space.get_sample_weights(Vec2::new(0.3, -0.4))), 1.0));
}

#[test]
fn removing_a_sample_retriangulates() {
    let mut space = strafe_2d();
    space.remove_sample(0);
    assert_eq!(space.triangles().len(), 2);
}

#[test]
fn two_dimensional_json_round_trip() {
    let space = strafe_2d();
    let restored = BlendSpace2D::from_json(&space.to_json().unwrap()).unwrap();
    assert_eq!(restored.samples(), space.samples());
    assert_eq!(restored.triangles().len(), space.triangles().len());
    assert_eq!(restored.bounds(), space.bounds());
}

#[test]
fn one_dimensional_compiles_into_node() {
    let mut clips = AnimationLibrary::new();
    for (name, x) in [("idle", 0.0), ("walk", 2.0), ("run", 6.0)] {
        clips.add(Animation::new(
            name,
            vec![AnimationChannel::new(
                "root",
                vec![
                    Keyframe::new(0.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
                    Keyframe::new(1.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
                ],
            )],
        ));
    }
    let mut builder = SkeletonBuilder::new();
    builder.add_bone("root", "", Mat4::IDENTITY, Mat4::IDENTITY);
    let skeleton = builder.build();

    let mut node = locomotion_1d().compile(&clips).unwrap();
    node.set_parameter("speed", 4.0);
    let mut ctx = EvalContext::new(&skeleton);
    assert!(approx(node.evaluate(&mut ctx, 0.0).get(0).position.x, 4.0));

    assert!(BlendSpace1D::new("broken", "speed").with_sample("missing", 0.0).compile(&clips).is_err());
}

#[test]
fn compiled_nodes_clamp_to_space_bounds() {
    let mut clips = AnimationLibrary::new();
    for name in ["sw", "se", "nw", "ne", "idle", "walk", "run"] {
        clips.add(Animation::new(
            name,
            vec![AnimationChannel::new(
                "root",
                vec![Keyframe::new(0.0, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)],
            )],
        ));
    }

    let square = BlendSpace2D::new("square", "x", "y")
        .with_bounds(Vec2::splat(-1.0), Vec2::splat(1.0))
        .with_sample("sw", Vec2::new(0.0, 0.0))
        .with_sample("se", Vec2::new(1.0, 0.0))
        .with_sample("nw", Vec2::new(0.0, 1.0))
        .with_sample("ne", Vec2::new(1.0, 1.0));
    let mut node = square.compile(&clips).unwrap();
    for p in [Vec2::new(5.0, 5.0), Vec2::new(-3.0, 0.5), Vec2::new(0.25, 0.75)] {
        node.set_parameter("x", p.x);
        node.set_parameter("y", p.y);
        let expected = square.get_sample_weights(p);
        for (got, want) in node.weights().iter().zip(&expected) {
            assert!(approx(*got, *want), "{p}: node {:?} space {expected:?}", node.weights());
        }
    }

    let line = locomotion_1d();
    let mut node = line.compile(&clips).unwrap();
    node.set_parameter("speed", 40.0);
    assert_eq!(node.weights(), line.get_sample_weights(40.0));
}

// ============================================================================
// Properties
// ============================================================================

fn well_spaced(points: &[Vec2]) -> bool {
    points
        .iter()
        .enumerate()
        .all(|(i, a)| points[i + 1..].iter().all(|b| a.distance(*b) > 0.2))
}

fn point_set() -> impl Strategy<Value = Vec<Vec2>> {
    prop::collection::vec((-10.0f32..10.0, -10.0f32..10.0), 3..14)
        .prop_map(|raw| raw.into_iter().map(|(x, y)| Vec2::new(x, y)).collect())
}

proptest! {
    #[test]
    fn delaunay_circumcircles_are_empty(points in point_set()) {
        prop_assume!(well_spaced(&points));
        for triangle in triangulate(&points) {
            let r_sq = triangle.circumradius_sq;
            for (i, p) in points.iter().enumerate() {
                if triangle.contains_index(i) {
                    continue;
                }
                let d_sq = p.distance_squared(triangle.circumcenter);
                prop_assert!(d_sq >= r_sq * (1.0 - 1e-3) - 1e-3, "point {i} inside circumcircle");
            }
        }
    }

    #[test]
    fn stored_circumcircles_match_recomputation(points in point_set()) {
        prop_assume!(well_spaced(&points));
        for triangle in triangulate(&points) {
            let [a, b, c] = triangle.indices.map(|i| points[i]);
            let (center, r_sq) = circumcircle(a, b, c).unwrap();
            prop_assert!(center.distance(triangle.circumcenter) < 1e-3);
            prop_assert!((r_sq - triangle.circumradius_sq).abs() <= 1e-3 * r_sq.max(1.0));
        }
    }

    #[test]
    fn two_dimensional_weights_sum_to_one(x in -3.0f32..3.0, y in -3.0f32..3.0) {
        let weights = strafe_2d().get_sample_weights(Vec2::new(x, y));
        prop_assert!((sum(&weights) - 1.0).abs() < 1e-3);
        prop_assert!(weights.iter().all(|w| *w >= -1e-6));
    }

    #[test]
    fn one_dimensional_weights_sum_to_one(v in -10.0f32..10.0) {
        let weights = locomotion_1d().get_sample_weights(v);
        prop_assert!((sum(&weights) - 1.0).abs() < 1e-5);
    }
}
