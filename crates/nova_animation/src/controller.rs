//! Animation Controller
//!
//! Instance-based playback: every `play` creates an [`AnimationInstance`]
//! and fades the previously playing ones out. Instances blend by their
//! normalized weights until fully faded instances are pruned.
//!
//! ```text
//! Stopped ─play─▶ BlendingIn ─▶ Playing ─stop/play other─▶ BlendingOut ─▶ Stopped
//!                                  │ ▲
//!                            pause │ │ resume
//!                                  ▼ │
//!                                 Paused
//! ```

use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::blend_tree::{EvalContext, PoseAccumulator, WEIGHT_THRESHOLD};
use crate::clip::{Animation, AnimationLibrary, wrap_time};
use crate::pose::{AnimationPose, BoneTransform};
use crate::skeleton::{Skeleton, SkeletonScratch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Stopped,
    Playing,
    Paused,
    BlendingIn,
    BlendingOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A looping instance wrapped around. Reported once per update however
    /// many times the clip length was crossed.
    Looped(String),
    /// A non-looping instance reached its end.
    Ended(String),
}

/// One playing clip inside an [`AnimationController`].
#[derive(Debug, Clone)]
pub struct AnimationInstance {
    clip: Arc<Animation>,

    pub time: f32,
    pub speed: f32,
    pub looping: bool,

    weight: f32,
    target_weight: f32,
    /// Weight change per second.
    blend_speed: f32,
    state: InstanceState,
}

impl AnimationInstance {
    fn new(clip: Arc<Animation>, looping: bool) -> Self {
        Self {
            clip,
            time: 0.0,
            speed: 1.0,
            looping,
            weight: 1.0,
            target_weight: 1.0,
            blend_speed: f32::INFINITY,
            state: InstanceState::Playing,
        }
    }

    #[must_use]
    pub fn clip(&self) -> &Arc<Animation> {
        &self.clip
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.clip.name()
    }

    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[must_use]
    pub fn target_weight(&self) -> f32 {
        self.target_weight
    }

    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        matches!(self.state, InstanceState::Playing | InstanceState::BlendingIn)
    }

    #[must_use]
    pub fn normalized_time(&self) -> f32 {
        let duration = self.clip.duration();
        if duration <= 0.0 { 0.0 } else { self.time / duration }
    }

    fn fade_out(&mut self, blend_time: f32) {
        if blend_time <= 0.0 {
            self.weight = 0.0;
            self.target_weight = 0.0;
            self.state = InstanceState::Stopped;
        } else {
            self.target_weight = 0.0;
            self.blend_speed = 1.0 / blend_time;
            self.state = InstanceState::BlendingOut;
        }
    }

    fn fade_in(&mut self, blend_time: f32) {
        self.target_weight = 1.0;
        if blend_time <= 0.0 {
            self.weight = 1.0;
            self.state = InstanceState::Playing;
        } else {
            self.blend_speed = 1.0 / blend_time;
            self.state = if self.weight >= 1.0 {
                InstanceState::Playing
            } else {
                InstanceState::BlendingIn
            };
        }
    }

    fn update_weight(&mut self, dt: f32) {
        let step = self.blend_speed * dt;
        match self.state {
            InstanceState::BlendingIn => {
                self.weight += step;
                if !step.is_finite() || self.weight >= self.target_weight {
                    self.weight = self.target_weight;
                    self.state = InstanceState::Playing;
                }
            }
            InstanceState::BlendingOut => {
                self.weight -= step;
                if !step.is_finite() || self.weight <= 0.0 {
                    self.weight = 0.0;
                    self.state = InstanceState::Stopped;
                }
            }
            _ => {}
        }
    }

    /// Advances time; reports a wrap or the end of a one-shot clip.
    fn advance(&mut self, dt: f32, events: &mut Vec<ControllerEvent>) {
        if matches!(self.state, InstanceState::Paused | InstanceState::Stopped) {
            return;
        }
        let duration = self.clip.duration();
        if duration <= 0.0 {
            return;
        }
        let step = dt * self.speed;
        if !step.is_finite() {
            log::warn!("AnimationInstance '{}': ignoring non-finite time step {step}", self.name());
            return;
        }

        self.time += step;

        if self.looping {
            let (time, wrapped) = wrap_time(self.time, duration);
            self.time = time;
            if wrapped {
                events.push(ControllerEvent::Looped(self.name().to_string()));
            }
        } else if self.time >= duration || self.time < 0.0 {
            self.time = self.time.clamp(0.0, duration);
            // Holds the last frame until faded out by the next play
            if self.state != InstanceState::BlendingOut {
                self.state = InstanceState::Stopped;
            }
            events.push(ControllerEvent::Ended(self.name().to_string()));
        }
    }
}

/// Plays clips from an owned [`AnimationLibrary`] with cross-fading.
#[derive(Debug, Clone)]
pub struct AnimationController {
    library: AnimationLibrary,
    instances: Vec<AnimationInstance>,
    playback_speed: f32,
    events: Vec<ControllerEvent>,
    scratch: SkeletonScratch,
}

impl Default for AnimationController {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationController {
    #[must_use]
    pub fn new() -> Self {
        Self::with_library(AnimationLibrary::new())
    }

    #[must_use]
    pub fn with_library(library: AnimationLibrary) -> Self {
        Self {
            library,
            instances: Vec::new(),
            playback_speed: 1.0,
            events: Vec::new(),
            scratch: SkeletonScratch::new(),
        }
    }

    // ========================================================================
    // Library
    // ========================================================================

    pub fn add_animation(&mut self, animation: Animation) -> Arc<Animation> {
        self.library.add(animation)
    }

    pub fn insert_animation(&mut self, clip: Arc<Animation>) {
        self.library.insert(clip);
    }

    #[must_use]
    pub fn animation(&self, name: &str) -> Option<Arc<Animation>> {
        self.library.get(name)
    }

    #[must_use]
    pub fn library(&self) -> &AnimationLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut AnimationLibrary {
        &mut self.library
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Plays `name`, fading out whatever plays now over `blend_time` seconds.
    ///
    /// With nothing else contributing the new instance starts at full
    /// weight. Playing a clip that is already playing fades the others out
    /// without restarting it. Returns `false` for unknown clips.
    pub fn play(&mut self, name: &str, blend_time: f32, looping: bool) -> bool {
        let Some(clip) = self.library.get(name) else {
            log::warn!("AnimationController: unknown animation '{name}'");
            return false;
        };

        let existing = self
            .instances
            .iter()
            .position(|i| i.is_playing() && i.name() == name);

        for (index, instance) in self.instances.iter_mut().enumerate() {
            if Some(index) == existing || (instance.state == InstanceState::BlendingOut && blend_time > 0.0) {
                continue;
            }
            if instance.weight > 0.0 || instance.state != InstanceState::Stopped {
                instance.fade_out(blend_time);
            }
        }

        if let Some(index) = existing {
            let instance = &mut self.instances[index];
            instance.looping = looping;
            instance.fade_in(blend_time);
        } else {
            let others_contribute = self.instances.iter().any(|i| i.weight > 0.0);
            let mut instance = AnimationInstance::new(clip, looping);
            if blend_time > 0.0 && others_contribute {
                instance.weight = 0.0;
                instance.fade_in(blend_time);
            }
            self.instances.push(instance);
        }

        self.prune();
        log::debug!("AnimationController: play '{name}' (blend {blend_time}s, looping {looping})");
        true
    }

    /// Same as [`AnimationController::play`]; reads better at call sites
    /// that always blend.
    pub fn cross_fade(&mut self, name: &str, blend_time: f32, looping: bool) -> bool {
        self.play(name, blend_time, looping)
    }

    pub fn stop(&mut self, name: &str, blend_time: f32) {
        for instance in self.instances.iter_mut().filter(|i| i.name() == name) {
            instance.fade_out(blend_time);
        }
        self.prune();
    }

    pub fn stop_all(&mut self, blend_time: f32) {
        for instance in &mut self.instances {
            instance.fade_out(blend_time);
        }
        self.prune();
    }

    pub fn pause(&mut self, name: &str) {
        for instance in self.instances.iter_mut().filter(|i| i.name() == name) {
            if instance.is_playing() {
                instance.state = InstanceState::Paused;
            }
        }
    }

    pub fn resume(&mut self, name: &str) {
        for instance in self.instances.iter_mut().filter(|i| i.name() == name) {
            if instance.state == InstanceState::Paused {
                instance.state = if instance.weight < instance.target_weight {
                    InstanceState::BlendingIn
                } else {
                    InstanceState::Playing
                };
            }
        }
    }

    /// Global playback speed multiplier.
    pub fn set_speed(&mut self, speed: f32) {
        self.playback_speed = speed;
    }

    #[must_use]
    pub fn speed(&self) -> f32 {
        self.playback_speed
    }

    /// Speed of every instance of `name`.
    pub fn set_animation_speed(&mut self, name: &str, speed: f32) {
        for instance in self.instances.iter_mut().filter(|i| i.name() == name) {
            instance.speed = speed;
        }
    }

    /// Steps weights and times, then prunes fully faded instances.
    pub fn update(&mut self, dt: f32) {
        if !dt.is_finite() {
            log::warn!("AnimationController: ignoring non-finite update step {dt}");
            return;
        }
        let dt = dt * self.playback_speed;
        for instance in &mut self.instances {
            instance.update_weight(dt);
            instance.advance(dt, &mut self.events);
        }
        self.prune();
    }

    fn prune(&mut self) {
        self.instances
            .retain(|i| !(i.state == InstanceState::Stopped && i.weight <= 0.0));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn is_playing(&self, name: &str) -> bool {
        self.instances.iter().any(|i| i.name() == name && i.is_playing())
    }

    #[must_use]
    pub fn active_instances(&self) -> &[AnimationInstance] {
        &self.instances
    }

    #[must_use]
    pub fn instance(&self, name: &str) -> Option<&AnimationInstance> {
        self.instances.iter().rev().find(|i| i.name() == name)
    }

    /// Most recently started instance that is not fading out.
    #[must_use]
    pub fn current_animation(&self) -> Option<&str> {
        self.instances
            .iter()
            .rev()
            .find(|i| i.is_playing() || i.state == InstanceState::Paused)
            .map(AnimationInstance::name)
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, ControllerEvent> {
        self.events.drain(..)
    }

    // ========================================================================
    // Blending
    // ========================================================================

    fn contributing(&self) -> impl Iterator<Item = &AnimationInstance> {
        self.instances.iter().filter(|i| i.weight > WEIGHT_THRESHOLD)
    }

    /// Local transforms of every animated bone, blended by normalized
    /// instance weight. Empty when nothing contributes.
    #[must_use]
    pub fn blend_animations(&self) -> FxHashMap<String, BoneTransform> {
        let mut result: Option<FxHashMap<String, BoneTransform>> = None;
        let mut accumulated = 0.0;

        for instance in self.contributing() {
            let transforms = instance.clip.evaluate_transforms(instance.time);
            match &mut result {
                None => result = Some(transforms),
                Some(blended) => {
                    let t = instance.weight / (accumulated + instance.weight);
                    for (bone, transform) in transforms {
                        blended
                            .entry(bone)
                            .and_modify(|current| *current = BoneTransform::lerp(current, &transform, t))
                            .or_insert(transform);
                    }
                }
            }
            accumulated += instance.weight;
        }

        result.unwrap_or_default()
    }

    /// Blended pose for `skeleton`; bones no clip animates keep their bind
    /// transform. Identity pose when nothing contributes.
    #[must_use]
    pub fn blend_pose(&self, skeleton: &Skeleton) -> AnimationPose {
        let ctx = EvalContext::new(skeleton);
        let mut accumulator = PoseAccumulator::default();
        for instance in self.contributing() {
            accumulator.add(instance.clip.sample_pose(skeleton, instance.time), instance.weight);
        }
        accumulator.finish(&ctx)
    }

    /// Final skinning matrices for the blended pose.
    pub fn bone_matrices_into(&mut self, skeleton: &Skeleton, out: &mut [Mat4]) {
        let pose = self.blend_pose(skeleton);
        skeleton.calculate_pose_matrices_into(&pose, &mut self.scratch, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::test_support::{hold, slide};

    fn controller() -> AnimationController {
        let mut controller = AnimationController::new();
        controller.insert_animation(slide("walk", 1.0, 1.0));
        controller.insert_animation(hold("run", 4.0, 1.0));
        controller
    }

    #[test]
    fn instant_play_replaces() {
        let mut c = controller();
        c.play("walk", 0.0, true);
        c.play("run", 0.0, true);
        assert_eq!(c.active_instances().len(), 1);
        assert_eq!(c.active_instances()[0].name(), "run");
        assert_eq!(c.active_instances()[0].weight(), 1.0);
    }

    #[test]
    fn unknown_clip_is_rejected() {
        let mut c = controller();
        assert!(!c.play("swim", 0.2, true));
        assert!(c.active_instances().is_empty());
    }

    #[test]
    fn blend_out_prunes() {
        let mut c = controller();
        c.play("walk", 0.0, true);
        c.play("run", 0.5, true);
        c.update(0.25);
        assert_eq!(c.active_instances().len(), 2);
        c.update(0.3);
        assert_eq!(c.active_instances().len(), 1);
        assert!(c.is_playing("run"));
        assert!(!c.is_playing("walk"));
    }

    #[test]
    fn one_shot_ends_and_holds() {
        let mut c = controller();
        c.play("walk", 0.0, false);
        c.update(1.5);
        let events: Vec<_> = c.drain_events().collect();
        assert_eq!(events, vec![ControllerEvent::Ended("walk".to_string())]);
        assert_eq!(c.active_instances()[0].state(), InstanceState::Stopped);
        assert!((c.active_instances()[0].time - 1.0).abs() < 1e-6);
    }

    #[test]
    fn looping_reports_wraps() {
        let mut c = controller();
        c.play("walk", 0.0, true);
        c.update(2.5);
        let loops = c.drain_events().filter(|e| matches!(e, ControllerEvent::Looped(_))).count();
        assert_eq!(loops, 1);
        assert!((c.instance("walk").unwrap().time - 0.5).abs() < 1e-6);
    }

    #[test]
    fn oversized_steps_terminate() {
        let mut c = controller();
        c.play("walk", 0.0, true);
        c.update(1.0e9);
        assert!((0.0..1.0).contains(&c.instance("walk").unwrap().time));
        assert_eq!(c.drain_events().count(), 1);

        c.update(f32::INFINITY);
        c.update(f32::NAN);
        assert!(c.instance("walk").unwrap().time.is_finite());
        assert_eq!(c.drain_events().count(), 0);
    }

    #[test]
    fn reverse_playback_wraps_many_times() {
        let mut c = controller();
        c.play("walk", 0.0, true);
        c.set_animation_speed("walk", -1.0);
        c.update(12.25);
        assert!((c.instance("walk").unwrap().time - 0.75).abs() < 1e-4);
        assert_eq!(c.drain_events().count(), 1);
    }

    #[test]
    fn pause_freezes_time() {
        let mut c = controller();
        c.play("walk", 0.0, true);
        c.update(0.25);
        c.pause("walk");
        c.update(0.25);
        assert!((c.instance("walk").unwrap().time - 0.25).abs() < 1e-6);
        c.resume("walk");
        c.update(0.25);
        assert!((c.instance("walk").unwrap().time - 0.5).abs() < 1e-6);
    }
}
