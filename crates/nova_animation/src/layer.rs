//! Animation Layers
//!
//! An [`AnimationLayerStack`] evaluates an ordered list of blend trees and
//! folds their poses into one. Each [`AnimationLayer`] contributes according
//! to its [`LayerBlendMode`], its current weight and an optional
//! [`BlendMask`]. Layer weights fade towards a target at a fixed rate.
//!
//! Layers sharing a sync group have their playback phase aligned to the
//! group's heaviest member before every evaluation, so e.g. an upper-body
//! layer stays in step with the locomotion below it.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::blend_tree::{BlendTree, EvalContext, NodeEvent, WEIGHT_THRESHOLD};
use crate::mask::BlendMask;
use crate::pose::AnimationPose;
use crate::skeleton::Skeleton;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerBlendMode {
    /// Lerp from the layers below towards this layer.
    #[default]
    Override,
    /// Add this layer's pose as a delta.
    Additive,
    /// Multiply into the layers below.
    Multiply,
}

#[derive(Debug, Clone)]
pub struct AnimationLayer {
    pub name: String,
    tree: BlendTree,
    pub mask: Option<BlendMask>,
    pub blend_mode: LayerBlendMode,
    pub sync_group: Option<String>,
    pub enabled: bool,

    weight: f32,
    target_weight: f32,
    /// Weight change per second; infinite snaps immediately.
    blend_speed: f32,
}

impl AnimationLayer {
    #[must_use]
    pub fn new(name: impl Into<String>, tree: BlendTree) -> Self {
        Self {
            name: name.into(),
            tree,
            mask: None,
            blend_mode: LayerBlendMode::Override,
            sync_group: None,
            enabled: true,
            weight: 1.0,
            target_weight: 1.0,
            blend_speed: f32::INFINITY,
        }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: BlendMask) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_blend_mode(mut self, mode: LayerBlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    #[must_use]
    pub fn with_sync_group(mut self, group: impl Into<String>) -> Self {
        self.sync_group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.set_weight(weight);
        self
    }

    #[must_use]
    pub fn tree(&self) -> &BlendTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut BlendTree {
        &mut self.tree
    }

    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[must_use]
    pub fn target_weight(&self) -> f32 {
        self.target_weight
    }

    /// Weight the layer contributes with this frame.
    #[must_use]
    pub fn effective_weight(&self) -> f32 {
        if self.enabled { self.weight } else { 0.0 }
    }

    #[must_use]
    pub fn is_fading(&self) -> bool {
        (self.weight - self.target_weight).abs() > f32::EPSILON
    }

    /// Sets the weight immediately, cancelling any fade.
    pub fn set_weight(&mut self, weight: f32) {
        let weight = weight.clamp(0.0, 1.0);
        self.weight = weight;
        self.target_weight = weight;
    }

    /// Fades to `target` over `duration` seconds (`<= 0` is immediate).
    pub fn fade_to(&mut self, target: f32, duration: f32) {
        let target = target.clamp(0.0, 1.0);
        if duration <= 0.0 {
            self.set_weight(target);
            return;
        }
        self.target_weight = target;
        self.blend_speed = (target - self.weight).abs() / duration;
    }

    pub fn fade_in(&mut self, duration: f32) {
        self.fade_to(1.0, duration);
    }

    pub fn fade_out(&mut self, duration: f32) {
        self.fade_to(0.0, duration);
    }

    /// Moves the weight towards the target.
    pub fn update_weight(&mut self, dt: f32) {
        if !self.is_fading() {
            return;
        }
        let step = self.blend_speed * dt;
        let delta = self.target_weight - self.weight;
        if !step.is_finite() || delta.abs() <= step {
            self.weight = self.target_weight;
        } else {
            self.weight += step.copysign(delta);
        }
    }
}

/// Ordered layers, bottom first.
#[derive(Debug, Clone, Default)]
pub struct AnimationLayerStack {
    layers: Vec<AnimationLayer>,
    events: Vec<NodeEvent>,
}

impl AnimationLayerStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layer(&mut self, layer: AnimationLayer) {
        if self.layer(&layer.name).is_some() {
            log::warn!("Layer '{}' added twice; later lookups find the first", layer.name);
        }
        self.layers.push(layer);
    }

    pub fn insert_layer(&mut self, index: usize, layer: AnimationLayer) {
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
    }

    pub fn remove_layer(&mut self, name: &str) -> Option<AnimationLayer> {
        let index = self.layers.iter().position(|l| l.name == name)?;
        Some(self.layers.remove(index))
    }

    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&AnimationLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut AnimationLayer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    #[must_use]
    pub fn layers(&self) -> &[AnimationLayer] {
        &self.layers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Forwards a parameter to every layer's tree.
    pub fn set_parameter(&mut self, name: &str, value: f32) {
        for layer in &mut self.layers {
            layer.tree.set_parameter(name, value);
        }
    }

    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.tree.reset();
        }
        self.events.clear();
    }

    /// Node events produced by the last evaluations.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, NodeEvent> {
        self.events.drain(..)
    }

    /// Advances every layer by `dt` and combines their poses.
    pub fn evaluate(&mut self, skeleton: &Skeleton, dt: f32) -> AnimationPose {
        let mut ctx = EvalContext::new(skeleton);
        let pose = self.evaluate_with(&mut ctx, dt);
        self.events.extend(ctx.drain_events());
        pose
    }

    pub fn evaluate_with(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        for layer in &mut self.layers {
            layer.update_weight(dt);
        }
        self.sync_groups();

        let mut result: Option<AnimationPose> = None;
        for layer in &mut self.layers {
            let weight = layer.effective_weight();
            if weight <= WEIGHT_THRESHOLD {
                continue;
            }

            let additive = layer.blend_mode == LayerBlendMode::Additive;
            let pose = ctx.with_delta_sampling(additive, |ctx| layer.tree.evaluate(ctx, dt));
            if let Some(mask) = &mut layer.mask {
                mask.rebuild(ctx.skeleton);
            }
            let mask = layer.mask.as_ref();
            let below = result.get_or_insert_with(|| ctx.skeleton.bind_pose());

            match layer.blend_mode {
                LayerBlendMode::Override => below.blend_in_place(&pose, weight, mask),
                LayerBlendMode::Additive => below.additive_in_place(&pose, weight, mask),
                LayerBlendMode::Multiply => *below = AnimationPose::multiply_blend(below, &pose, weight, mask),
            }
        }

        result.unwrap_or_else(|| ctx.identity_pose())
    }

    fn sync_groups(&mut self) {
        let mut groups: SmallVec<[&str; 4]> = SmallVec::new();
        for layer in &self.layers {
            if let Some(group) = layer.sync_group.as_deref()
                && !groups.contains(&group)
            {
                groups.push(group);
            }
        }
        let groups: SmallVec<[String; 4]> = groups.into_iter().map(str::to_string).collect();

        for group in &groups {
            let members = || {
                self.layers
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| l.sync_group.as_deref() == Some(group.as_str()))
            };
            let Some((leader, _)) = members()
                .filter(|(_, l)| l.effective_weight() > WEIGHT_THRESHOLD)
                .max_by(|a, b| a.1.effective_weight().total_cmp(&b.1.effective_weight()))
            else {
                continue;
            };
            let phase = self.layers[leader].tree.normalized_time();
            let followers: SmallVec<[usize; 8]> = members().map(|(i, _)| i).filter(|&i| i != leader).collect();
            for i in followers {
                self.layers[i].tree.set_normalized_time(phase);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::{BlendNode, ClipNode};
    use crate::blend_tree::test_support::{hold, offset_child_skeleton, slide, two_bone_skeleton};

    fn clip_tree(clip: std::sync::Arc<crate::clip::Animation>) -> BlendTree {
        let name = clip.name().to_string();
        BlendTree::new(name, Box::new(ClipNode::new(clip)) as Box<dyn BlendNode>)
    }

    #[test]
    fn fades_reach_target() {
        let mut layer = AnimationLayer::new("upper", clip_tree(hold("wave", 1.0, 1.0))).with_weight(0.0);
        layer.fade_in(0.5);
        layer.update_weight(0.25);
        assert!((layer.weight() - 0.5).abs() < 1e-5);
        layer.update_weight(1.0);
        assert_eq!(layer.weight(), 1.0);
        assert!(!layer.is_fading());
    }

    #[test]
    fn override_layer_blends_over_base() {
        let skeleton = two_bone_skeleton();
        let mut stack = AnimationLayerStack::new();
        stack.add_layer(AnimationLayer::new("base", clip_tree(hold("walk", 2.0, 1.0))));
        stack.add_layer(AnimationLayer::new("over", clip_tree(hold("aim", 4.0, 1.0))).with_weight(0.5));

        let pose = stack.evaluate(&skeleton, 0.1);
        assert!((pose.get(0).position.x - 3.0).abs() < 1e-4);
    }

    #[test]
    fn additive_layer_adds_delta() {
        let skeleton = two_bone_skeleton();
        let mut stack = AnimationLayerStack::new();
        stack.add_layer(AnimationLayer::new("base", clip_tree(hold("walk", 2.0, 1.0))));
        stack.add_layer(
            AnimationLayer::new("breath", clip_tree(hold("breath", 0.5, 1.0))).with_blend_mode(LayerBlendMode::Additive),
        );
        let pose = stack.evaluate(&skeleton, 0.1);
        assert!((pose.get(0).position.x - 2.5).abs() < 1e-4);
    }

    #[test]
    fn additive_layer_leaves_bind_bones_alone() {
        let skeleton = offset_child_skeleton();
        let mut stack = AnimationLayerStack::new();
        stack.add_layer(AnimationLayer::new("base", clip_tree(hold("walk", 2.0, 1.0))));
        stack.add_layer(
            AnimationLayer::new("breath", clip_tree(hold("breath", 0.5, 1.0))).with_blend_mode(LayerBlendMode::Additive),
        );
        let pose = stack.evaluate(&skeleton, 0.1);
        assert!((pose.get(0).position.x - 2.5).abs() < 1e-4);
        assert!((pose.get(1).position - glam::Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn empty_stack_is_identity() {
        let skeleton = two_bone_skeleton();
        let mut stack = AnimationLayerStack::new();
        let pose = stack.evaluate(&skeleton, 0.1);
        assert_eq!(pose.bone_count(), 2);
        assert_eq!(pose.get(0).position.x, 0.0);
    }

    #[test]
    fn sync_group_aligns_followers_to_leader() {
        let skeleton = two_bone_skeleton();
        let mut stack = AnimationLayerStack::new();
        stack.add_layer(AnimationLayer::new("legs", clip_tree(slide("walk", 1.0, 1.0))).with_sync_group("gait"));
        stack.add_layer(
            AnimationLayer::new("arms", clip_tree(slide("swing", 1.0, 2.0)))
                .with_sync_group("gait")
                .with_weight(0.4),
        );

        stack.evaluate(&skeleton, 0.5);
        stack.evaluate(&skeleton, 0.0);
        let legs = stack.layer("legs").unwrap().tree().normalized_time();
        let arms = stack.layer("arms").unwrap().tree().normalized_time();
        assert!((legs - 0.5).abs() < 1e-5);
        assert!((arms - legs).abs() < 1e-5);
    }
}
