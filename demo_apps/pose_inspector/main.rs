//! Pose Inspector
//!
//! Builds a unit from a [`UnitAnimationConfig`] (a built-in grunt, or the
//! JSON file given as the first argument), then steps it for a few seconds
//! while ramping `speed` up and down and firing one `attack`.
//!
//! ```text
//! RUST_LOG=debug cargo run -p pose_inspector -- unit.json
//! ```

use anyhow::{Context, Result};
use serde_json::json;

use nova::animation::ClipNode;
use nova::prelude::*;

const FPS: f32 = 60.0;
const FRAMES: usize = 240;
const REPORT_EVERY: usize = 20;

fn humanoid() -> Skeleton {
    let mut builder = SkeletonBuilder::new();
    for (bone, parent, height) in [
        ("Hips", "", 1.0),
        ("Spine", "Hips", 0.2),
        ("Chest", "Spine", 0.2),
        ("Neck", "Chest", 0.2),
        ("Head", "Neck", 0.1),
        ("LeftShoulder", "Chest", 0.15),
        ("LeftHand", "LeftShoulder", 0.5),
        ("RightShoulder", "Chest", 0.15),
        ("RightHand", "RightShoulder", 0.5),
        ("LeftUpLeg", "Hips", -0.1),
        ("LeftFoot", "LeftUpLeg", -0.9),
        ("RightUpLeg", "Hips", -0.1),
        ("RightFoot", "RightUpLeg", -0.9),
    ] {
        builder.add_bone(bone, parent, Mat4::IDENTITY, Mat4::from_translation(Vec3::Y * height));
    }
    builder.build()
}

/// Hips bob by `bob` and the right arm swings by `swing` radians once per `duration`.
fn synth_clip(name: &str, duration: f32, bob: f32, swing: f32, looping: bool) -> Animation {
    let samples = 8;
    let key = |bone_height: f32, amount: f32, rotate: bool| {
        (0..=samples)
            .map(|i| {
                let t = i as f32 / samples as f32;
                let wave = (t * std::f32::consts::TAU).sin() * amount;
                let (offset, rotation) = if rotate {
                    (0.0, Quat::from_rotation_x(wave))
                } else {
                    (wave, Quat::IDENTITY)
                };
                Keyframe::new(t * duration, Vec3::Y * (bone_height + offset), rotation, Vec3::ONE)
            })
            .collect::<Vec<_>>()
    };

    Animation::new(
        name,
        vec![
            AnimationChannel::new("Hips", key(1.0, bob, false)),
            AnimationChannel::new("RightShoulder", key(0.15, swing, true)),
        ],
    )
    .with_looping(looping)
}

fn clips() -> AnimationLibrary {
    let mut library = AnimationLibrary::new();
    library.add(synth_clip("grunt_idle", 2.0, 0.01, 0.05, true));
    library.add(synth_clip("grunt_walk", 1.0, 0.04, 0.4, true));
    library.add(synth_clip("grunt_run", 0.6, 0.08, 0.9, true));
    library.add(synth_clip("grunt_attack", 0.8, 0.0, 2.0, false));
    library
}

fn builtin_config() -> Result<UnitAnimationConfig> {
    let value = json!({
        "id": "grunt",
        "stateMachine": {
            "id": "grunt",
            "name": "Grunt",
            "defaultState": "idle",
            "parameters": [
                {"name": "speed", "type": "float", "defaultValue": 0.0},
                {"name": "attack", "type": "trigger"}
            ],
            "states": [
                {"name": "idle", "clip": "idle",
                 "transitions": [{"to": "move", "condition": "speed > 0.1", "duration": 0.25}]},
                {"name": "move", "clip": "run", "speedMultiplierParameter": "speed",
                 "transitions": [{"to": "idle", "condition": "speed <= 0.1", "duration": 0.3}]},
                {"name": "attack", "clip": "attack", "loop": false,
                 "events": [{"time": 0.5, "name": "hit_frame", "data": {"damage": 12}}],
                 "transitions": [{"to": "idle", "hasExitTime": true, "exitTime": 0.95, "duration": 0.2}]}
            ],
            "anyStateTransitions": [
                {"to": "attack", "conditions": [{"parameter": "attack", "mode": "if_true"}],
                 "duration": 0.1, "priority": 5}
            ]
        },
        "clipMappings": {
            "idle": "grunt_idle",
            "walk": "grunt_walk",
            "run": "grunt_run",
            "attack": "grunt_attack"
        }
    });
    let mut config: UnitAnimationConfig = serde_json::from_value(value)?;
    config.locomotion_blend_tree = Some(BlendTreeTemplates::locomotion_1d(
        "grunt_idle",
        "grunt_walk",
        "grunt_run",
        "speed",
    ));
    Ok(config)
}

/// Triangle wave: 0 -> 1 over the first half of the run, back to 0 after.
fn speed_at(frame: usize) -> f32 {
    let t = frame as f32 / FRAMES as f32;
    1.0 - (2.0 * t - 1.0).abs()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            UnitAnimationConfig::load_from_file(&path).with_context(|| format!("loading unit config {path}"))?
        }
        None => builtin_config()?,
    };
    log::info!("Unit '{}'", config.id);

    let skeleton = humanoid();
    let clips = clips();
    let masks = config.build_masks(&skeleton);

    let events = EventQueue::new();
    let mut machine = config.build_state_machine(&clips);
    machine.set_event_system(Some(Box::new(events.clone())));
    machine.start();

    // Locomotion below, an attack overlay on the upper body above it
    let mut layers = AnimationLayerStack::new();
    if let Some(tree) = config.build_locomotion_tree(&clips, &masks)? {
        layers.add_layer(AnimationLayer::new("locomotion", tree));
    }
    let upper = masks
        .get(&config.masks.upper_body)
        .cloned()
        .context("upper body mask missing")?;
    let attack_tree = BlendTree::new(
        "attack",
        Box::new(ClipNode::new(
            clips.get(config.resolve_clip("attack")).context("attack clip missing")?,
        )),
    );
    layers.add_layer(
        AnimationLayer::new("upper", attack_tree)
            .with_mask(upper)
            .with_blend_mode(LayerBlendMode::Override)
            .with_weight(0.0),
    );

    let hips = skeleton.bone_index("Hips").context("no Hips bone")?;
    let hand = skeleton.bone_index("RightHand").context("no RightHand bone")?;
    let mut matrices = vec![Mat4::IDENTITY; skeleton.bone_count()];
    let mut scratch = SkeletonScratch::new();
    let dt = 1.0 / FPS;

    for frame in 0..FRAMES {
        let speed = speed_at(frame);
        machine.set_float("speed", speed);
        layers.set_parameter("speed", speed);

        if frame == FRAMES / 2 {
            machine.set_trigger("attack");
            if let Some(layer) = layers.layer_mut("upper") {
                layer.tree_mut().reset();
                layer.fade_in(config.timing.transition_blend_time);
            }
        }
        if frame == FRAMES / 2 + 50
            && let Some(layer) = layers.layer_mut("upper")
        {
            layer.fade_out(config.timing.transition_blend_time);
        }

        machine.update(dt);
        let layered = layers.evaluate(&skeleton, dt);
        skeleton.calculate_pose_matrices_into(&layered, &mut scratch, &mut matrices);

        for event in events.drain() {
            log::info!("frame {frame:3}: event '{}' {}", event.name, event.data);
        }

        if frame % REPORT_EVERY == 0 {
            let weights: Vec<String> = machine
                .controller()
                .map(|c| {
                    c.active_instances()
                        .iter()
                        .map(|i| format!("{}={:.2}", i.name(), i.weight()))
                        .collect()
                })
                .unwrap_or_default();
            let transition = machine
                .transition_target()
                .map(|t| format!(" -> {t} ({:.0}%)", machine.transition_progress() * 100.0))
                .unwrap_or_default();

            log::info!(
                "frame {frame:3} speed {speed:.2} state {}{transition} [{}] hips y {:.3} hand {:?}",
                machine.current_state().unwrap_or("-"),
                weights.join(", "),
                matrices[hips].w_axis.y,
                matrices[hand].w_axis.truncate(),
            );
        }
    }

    log::info!("History:");
    for entry in machine.history() {
        log::info!("  {:6.2}s {} -> {} ({})", entry.timestamp, entry.from, entry.to, entry.trigger);
    }
    log::debug!("{}", serde_json::to_string_pretty(&machine.debug_info())?);
    Ok(())
}
