//! Animation Clip Tests
//!
//! Tests for:
//! - Keyframe channel sampling (step, linear, Catmull-Rom, clamping)
//! - KeyframeCursor sequential sampling matching binary search
//! - Quaternion interpolation staying unit length
//! - Easing curves
//! - Animation duration and pose sampling

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Quat, Vec3};
use proptest::prelude::*;

use nova::animation::interpolation::{Easing, nlerp, slerp, smoothstep};
use nova::animation::keyframe::KeyframeCursor;
use nova::animation::{Animation, AnimationChannel, AnimationLibrary, InterpolationMode, Keyframe, SkeletonBuilder};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn key(time: f32, x: f32) -> Keyframe {
    Keyframe::new(time, Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
}

fn ramp() -> AnimationChannel {
    AnimationChannel::new("root", vec![key(0.0, 0.0), key(1.0, 10.0), key(2.0, 20.0), key(4.0, 0.0)])
}

// ============================================================================
// Channel sampling
// ============================================================================

#[test]
fn channel_sorts_keyframes_on_construction() {
    let channel = AnimationChannel::new("root", vec![key(2.0, 2.0), key(0.0, 0.0), key(1.0, 1.0)]);
    let times: Vec<f32> = channel.keyframes().iter().map(|k| k.time).collect();
    assert_eq!(times, [0.0, 1.0, 2.0]);
}

#[test]
fn linear_midpoint() {
    let k = ramp().interpolate(0.5);
    assert!(approx(k.position.x, 5.0), "got {}", k.position.x);
}

#[test]
fn step_holds_previous_key() {
    let channel = ramp().with_interpolation(InterpolationMode::Step);
    assert!(approx(channel.interpolate(1.9).position.x, 10.0));
}

#[test]
fn sampling_clamps_outside_range() {
    let channel = ramp();
    assert!(approx(channel.interpolate(-3.0).position.x, 0.0));
    assert!(approx(channel.interpolate(99.0).position.x, 0.0));
    assert!(approx(channel.interpolate(3.0).position.x, 10.0));
}

#[test]
fn catmull_rom_passes_through_keys() {
    let channel = ramp().with_interpolation(InterpolationMode::CatmullRom);
    for (t, x) in [(0.0, 0.0), (1.0, 10.0), (2.0, 20.0), (4.0, 0.0)] {
        assert!(approx(channel.interpolate(t).position.x, x), "t={t}");
    }
}

#[test]
fn empty_channel_yields_identity() {
    let channel = AnimationChannel::new("root", Vec::new());
    let k = channel.interpolate(1.0);
    assert_eq!(k.position, Vec3::ZERO);
    assert_eq!(k.rotation, Quat::IDENTITY);
}

#[test]
fn cursor_matches_binary_search_forward_and_backward() {
    let channel = ramp();
    let mut cursor = KeyframeCursor::default();
    let times = [0.0, 0.3, 1.1, 3.9, 4.5, 0.2, 2.5, 1.0];
    for t in times {
        let a = channel.interpolate(t);
        let b = channel.interpolate_with_cursor(t, &mut cursor);
        assert!(approx(a.position.x, b.position.x), "t={t}");
    }
}

#[test]
fn keyframe_matrix_is_trs() {
    let k = Keyframe::new(0.0, Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(FRAC_PI_2), Vec3::splat(2.0));
    let p = k.to_matrix().transform_point3(Vec3::X);
    assert!(p.distance(Vec3::new(1.0, 2.0, 1.0)) < EPSILON, "got {p}");
}

// ============================================================================
// Interpolation helpers
// ============================================================================

#[test]
fn smoothstep_is_clamped() {
    assert_eq!(smoothstep(-1.0), 0.0);
    assert_eq!(smoothstep(2.0), 1.0);
    assert!(approx(smoothstep(0.5), 0.5));
}

#[test]
fn easing_in_is_below_linear() {
    assert!(Easing::QuadIn.apply(0.3) < 0.3);
    assert!(Easing::CubicOut.apply(0.3) > 0.3);
    assert!(approx(Easing::SineInOut.apply(0.5), 0.5));
}

proptest! {
    #[test]
    fn slerp_stays_unit_length(a in -PI..PI, b in -PI..PI, t in 0.0f32..1.0) {
        let q = slerp(Quat::from_rotation_y(a), Quat::from_rotation_x(b), t);
        prop_assert!((q.length() - 1.0).abs() < 1e-4);
        let n = nlerp(Quat::from_rotation_z(a), Quat::from_rotation_x(b), t);
        prop_assert!((n.length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sampled_rotation_is_unit(angle in -PI..PI, t in -1.0f32..3.0) {
        let channel = AnimationChannel::new("root", vec![
            Keyframe::new(0.0, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
            Keyframe::new(1.0, Vec3::ZERO, Quat::from_rotation_y(angle), Vec3::ONE),
            Keyframe::new(2.0, Vec3::ZERO, Quat::from_rotation_x(angle), Vec3::ONE),
        ]).with_interpolation(InterpolationMode::CatmullRom);
        let q = channel.interpolate(t).rotation;
        prop_assert!((q.length() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn linear_sampling_stays_within_key_range(t in -5.0f32..10.0) {
        let x = ramp().interpolate(t).position.x;
        prop_assert!((0.0..=20.0).contains(&x));
    }

    #[test]
    fn easing_output_is_clamped(t in -2.0f32..3.0) {
        for easing in [Easing::Linear, Easing::QuadInOut, Easing::CubicInOut, Easing::Smoothstep] {
            let v = easing.apply(t);
            prop_assert!((0.0..=1.0 + 1e-6).contains(&v));
        }
    }
}

// ============================================================================
// Animation clips
// ============================================================================

#[test]
fn duration_is_last_keyframe() {
    let clip = Animation::new(
        "walk",
        vec![ramp(), AnimationChannel::new("spine", vec![key(0.0, 0.0), key(6.0, 1.0)])],
    );
    assert!(approx(clip.duration(), 6.0));
}

#[test]
fn evaluate_returns_local_matrices_by_bone() {
    let clip = Animation::new("walk", vec![ramp()]);
    let matrices = clip.evaluate(1.0);
    let m = matrices.get("root").copied().unwrap_or(Mat4::IDENTITY);
    assert!(approx(m.w_axis.x, 10.0));
}

#[test]
fn sample_pose_keeps_bind_for_unanimated_bones() {
    let mut builder = SkeletonBuilder::new();
    builder
        .add_bone("root", "", Mat4::IDENTITY, Mat4::IDENTITY)
        .add_bone("tail", "root", Mat4::IDENTITY, Mat4::from_translation(Vec3::Y));
    let skeleton = builder.build();

    let clip = Animation::new("walk", vec![ramp()]);
    let pose = clip.sample_pose(&skeleton, 0.5);
    assert!(approx(pose.get(0).position.x, 5.0));
    assert!(approx(pose.get(1).position.y, 1.0));
}

#[test]
fn library_shares_clips_by_name() {
    let mut library = AnimationLibrary::new();
    let added = library.add(Animation::new("walk", vec![ramp()]));
    let fetched = library.get("walk").unwrap();
    assert!(std::sync::Arc::ptr_eq(&added, &fetched));
    assert!(library.get("run").is_none());
}
