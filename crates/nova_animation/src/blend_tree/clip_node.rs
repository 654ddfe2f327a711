use std::sync::Arc;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{BlendNode, BlendNodeDesc, EvalContext, NodeEventKind};
use crate::clip::{Animation, wrap_time};
use crate::interpolation::normalize_or_identity;
use crate::keyframe::KeyframeCursor;
use crate::pose::AnimationPose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Once,
    #[default]
    Loop,
    PingPong,
}

impl LoopMode {
    #[must_use]
    pub fn from_looping(looping: bool) -> Self {
        if looping { LoopMode::Loop } else { LoopMode::Once }
    }
}

/// Leaf node playing one clip.
#[derive(Debug, Clone)]
pub struct ClipNode {
    name: String,
    clip: Arc<Animation>,

    pub time: f32,
    pub speed: f32,
    pub loop_mode: LoopMode,
    pub root_motion: bool,

    completed: bool,
    phase: f32,
    last_root_position: Vec3,
    last_root_rotation: Quat,
    cursors: Vec<KeyframeCursor>,
}

impl ClipNode {
    #[must_use]
    pub fn new(clip: Arc<Animation>) -> Self {
        let loop_mode = LoopMode::from_looping(clip.is_looping());
        Self {
            name: clip.name().to_string(),
            clip,
            time: 0.0,
            speed: 1.0,
            loop_mode,
            root_motion: false,
            completed: false,
            phase: 0.0,
            last_root_position: Vec3::ZERO,
            last_root_rotation: Quat::IDENTITY,
            cursors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    #[must_use]
    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    #[must_use]
    pub fn with_root_motion(mut self, enabled: bool) -> Self {
        self.root_motion = enabled;
        self
    }

    #[must_use]
    pub fn clip(&self) -> &Arc<Animation> {
        &self.clip
    }

    /// A non-looping clip that reached its end.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Advances time and reports whether a looping clip wrapped.
    fn advance(&mut self, dt: f32) -> bool {
        let duration = self.clip.duration();
        if duration <= 0.0 {
            return false;
        }
        let step = dt * self.speed;
        if !step.is_finite() {
            log::warn!("ClipNode '{}': ignoring non-finite time step {step}", self.name);
            return false;
        }

        match self.loop_mode {
            LoopMode::Once => {
                self.time += step;
                if self.time >= duration {
                    self.time = duration;
                    self.completed = true;
                } else if self.time < 0.0 {
                    self.time = 0.0;
                    self.completed = true;
                }
                false
            }
            LoopMode::Loop => {
                let (time, wrapped) = wrap_time(self.time + step, duration);
                self.time = time;
                wrapped
            }
            LoopMode::PingPong => {
                // `phase` runs unreflected over [0, 2 * duration)
                let double = duration * 2.0;
                let (phase, wrapped) = wrap_time(self.phase + step, double);
                self.phase = phase;
                self.time = if phase > duration { double - phase } else { phase };
                wrapped
            }
        }
    }
}

impl BlendNode for ClipNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        let was_complete = self.completed;
        let wrapped = self.advance(dt);

        if wrapped {
            ctx.emit(&self.name, NodeEventKind::Looped);
        }
        if self.completed && !was_complete {
            ctx.emit(&self.name, NodeEventKind::Completed);
        }

        let mut pose = AnimationPose::default();
        if ctx.samples_deltas() {
            self.clip
                .sample_delta_pose_into(ctx.skeleton, self.time, &mut self.cursors, &mut pose);
        } else {
            self.clip
                .sample_pose_into(ctx.skeleton, self.time, &mut self.cursors, &mut pose);
        }

        if self.root_motion && !pose.is_empty() {
            let root = pose.get(0);
            if wrapped {
                // Re-anchor at the loop start so the wrap is not a jump back
                let start = self.clip.sample_pose(ctx.skeleton, 0.0).get(0);
                self.last_root_position = start.position;
                self.last_root_rotation = start.rotation;
            }
            pose.root_motion_delta = root.position - self.last_root_position;
            pose.root_motion_rotation = normalize_or_identity(root.rotation * self.last_root_rotation.inverse());
            self.last_root_position = root.position;
            self.last_root_rotation = root.rotation;
        }

        pose
    }

    fn set_parameter(&mut self, _name: &str, _value: f32) {}

    fn reset(&mut self) {
        self.time = 0.0;
        self.phase = 0.0;
        self.completed = false;
        self.last_root_position = Vec3::ZERO;
        self.last_root_rotation = Quat::IDENTITY;
        self.cursors.clear();
    }

    fn clone_node(&self) -> Box<dyn BlendNode> {
        let mut clone = self.clone();
        clone.reset();
        Box::new(clone)
    }

    fn duration(&self) -> f32 {
        self.clip.duration()
    }

    fn normalized_time(&self) -> f32 {
        let duration = self.clip.duration();
        if duration <= 0.0 { 0.0 } else { self.time / duration }
    }

    fn set_normalized_time(&mut self, normalized: f32) {
        let duration = self.clip.duration();
        if duration > 0.0 {
            self.time = normalized.clamp(0.0, 1.0) * duration;
            self.phase = self.time;
        }
    }

    fn parameter_names(&self, _out: &mut Vec<String>) {}

    fn describe(&self) -> BlendNodeDesc {
        BlendNodeDesc::Clip {
            name: self.name.clone(),
            clip: self.clip.name().to_string(),
            speed: self.speed,
            loop_mode: Some(self.loop_mode),
            root_motion: self.root_motion,
        }
    }
}
