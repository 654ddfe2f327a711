//! Animation Controller Tests
//!
//! Tests for:
//! - Instant replacement and timed cross-fades
//! - Blended transforms and poses during a fade
//! - Stop, pause/resume and playback speed
//! - Loop and end events

use glam::{Mat4, Quat, Vec3};

use nova::animation::{
    Animation, AnimationChannel, AnimationController, ControllerEvent, InstanceState, Keyframe, Skeleton,
    SkeletonBuilder,
};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// Root held at `x` for one second.
fn hold(name: &str, x: f32) -> Animation {
    Animation::new(
        name,
        vec![AnimationChannel::new(
            "root",
            vec![
                Keyframe::new(0.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
                Keyframe::new(1.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
            ],
        )],
    )
}

fn skeleton() -> Skeleton {
    let mut builder = SkeletonBuilder::new();
    builder.add_bone("root", "", Mat4::IDENTITY, Mat4::IDENTITY);
    builder.build()
}

fn controller() -> AnimationController {
    let mut controller = AnimationController::new();
    controller.add_animation(hold("walk", 0.0));
    controller.add_animation(hold("run", 4.0));
    controller
}

// ============================================================================
// Playback
// ============================================================================

#[test]
fn first_play_starts_at_full_weight() {
    let mut c = controller();
    assert!(c.play("walk", 0.3, true));
    let walk = c.instance("walk").unwrap();
    assert!(approx(walk.weight(), 1.0));
    assert_eq!(walk.state(), InstanceState::Playing);
    assert_eq!(c.current_animation(), Some("walk"));
}

#[test]
fn instant_switch_leaves_one_instance() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.play("run", 0.0, true);
    assert_eq!(c.active_instances().len(), 1);
    assert!(approx(c.instance("run").unwrap().weight(), 1.0));
}

#[test]
fn cross_fade_splits_weight() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.cross_fade("run", 0.5, true);
    c.update(0.25);

    assert!(approx(c.instance("walk").unwrap().weight(), 0.5));
    assert!(approx(c.instance("run").unwrap().weight(), 0.5));
    assert_eq!(c.instance("walk").unwrap().state(), InstanceState::BlendingOut);
    assert_eq!(c.current_animation(), Some("run"));

    let transforms = c.blend_animations();
    assert!(approx(transforms["root"].position.x, 2.0));

    let pose = c.blend_pose(&skeleton());
    assert!(approx(pose.get(0).position.x, 2.0));
}

#[test]
fn fade_completes_and_prunes() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.play("run", 0.5, true);
    c.update(0.6);
    assert_eq!(c.active_instances().len(), 1);
    assert_eq!(c.instance("run").unwrap().state(), InstanceState::Playing);
    assert!(approx(c.blend_pose(&skeleton()).get(0).position.x, 4.0));
}

#[test]
fn replaying_does_not_restart() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.update(0.3);
    c.play("walk", 0.2, true);
    assert_eq!(c.active_instances().len(), 1);
    assert!(approx(c.instance("walk").unwrap().time, 0.3));
}

#[test]
fn unknown_clip_is_rejected() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    assert!(!c.play("swim", 0.2, true));
    assert!(c.is_playing("walk"));
}

#[test]
fn stop_fades_out() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.stop("walk", 0.5);
    assert!(!c.is_playing("walk"));
    c.update(0.25);
    assert!(approx(c.instance("walk").unwrap().weight(), 0.5));
    c.update(0.3);
    assert!(c.active_instances().is_empty());
    assert!(c.blend_animations().is_empty());
}

#[test]
fn stop_all_immediately() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.play("run", 0.4, true);
    c.stop_all(0.0);
    assert!(c.active_instances().is_empty());
    assert_eq!(c.current_animation(), None);
}

// ============================================================================
// Time
// ============================================================================

#[test]
fn pause_and_resume() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.update(0.2);
    c.pause("walk");
    assert_eq!(c.instance("walk").unwrap().state(), InstanceState::Paused);
    c.update(0.5);
    assert!(approx(c.instance("walk").unwrap().time, 0.2));

    c.resume("walk");
    c.update(0.1);
    assert!(approx(c.instance("walk").unwrap().time, 0.3));
}

#[test]
fn global_and_per_clip_speed_multiply() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.set_speed(2.0);
    c.set_animation_speed("walk", 0.5);
    c.update(0.25);
    assert!(approx(c.instance("walk").unwrap().time, 0.25));
    assert!(approx(c.speed(), 2.0));
}

#[test]
fn loop_and_end_events() {
    let mut c = controller();
    c.play("walk", 0.0, true);
    c.update(1.25);
    let events: Vec<_> = c.drain_events().collect();
    assert_eq!(events, vec![ControllerEvent::Looped("walk".to_string())]);

    c.play("run", 0.0, false);
    c.update(2.0);
    let events: Vec<_> = c.drain_events().collect();
    assert_eq!(events, vec![ControllerEvent::Ended("run".to_string())]);
    // Holds the last frame
    assert!(approx(c.blend_pose(&skeleton()).get(0).position.x, 4.0));
}

#[test]
fn skinning_matrices_follow_blend() {
    let skeleton = skeleton();
    let mut c = controller();
    c.play("run", 0.0, true);
    let mut out = vec![Mat4::IDENTITY; skeleton.bone_count()];
    c.bone_matrices_into(&skeleton, &mut out);
    assert!(approx(out[0].w_axis.x, 4.0));
}
