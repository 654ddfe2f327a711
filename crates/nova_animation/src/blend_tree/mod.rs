//! Blend Trees
//!
//! A blend tree is a tree of [`BlendNode`]s that produces one
//! [`AnimationPose`] per frame. Leaves are [`ClipNode`]s sampling clips;
//! inner nodes combine their children's poses.
//!
//! # Parameters
//!
//! [`BlendNode::set_parameter`] is forwarded down the whole subtree. Every
//! node picks out the names it reacts to and ignores the rest, so a single
//! parameter set can drive trees whose nodes use overlapping subsets.
//!
//! # Events
//!
//! Clip nodes report wrap-arounds and completion through the
//! [`EvalContext`] passed to `evaluate`; callers drain them after the frame.

mod additive;
mod blend1d;
mod blend2d;
mod clip_node;
mod desc;
mod layered;
mod state_selector;
mod templates;

pub use additive::AdditiveNode;
pub use blend1d::{Blend1DEntry, Blend1DNode};
pub use blend2d::{Blend2DNode, Blend2DPoint};
pub use clip_node::{ClipNode, LoopMode};
pub use desc::{
    AdditiveReferenceDesc, Blend1DEntryDesc, Blend2DPointDesc, BlendNodeDesc, BlendTree, BlendTreeDesc,
    LayerDesc, SelectorStateDesc,
};
pub use layered::{LayeredNode, NodeLayer};
pub use state_selector::StateSelectorNode;
pub use templates::BlendTreeTemplates;

use std::fmt;

use crate::pose::AnimationPose;
use crate::skeleton::Skeleton;

/// Weights at or below this are not evaluated.
pub const WEIGHT_THRESHOLD: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    /// A looping clip wrapped around.
    Looped,
    /// A non-looping clip reached its end. Fired once until reset.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub node: String,
    pub kind: NodeEventKind,
}

/// Per-frame evaluation state shared by every node of a tree.
pub struct EvalContext<'a> {
    pub skeleton: &'a Skeleton,
    events: Vec<NodeEvent>,
    delta: bool,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(skeleton: &'a Skeleton) -> Self {
        Self {
            skeleton,
            events: Vec::new(),
            delta: false,
        }
    }

    /// Whether clip leaves should produce delta poses (identity for bones
    /// they don't animate) instead of filling those bones from the bind pose.
    #[must_use]
    pub fn samples_deltas(&self) -> bool {
        self.delta
    }

    /// Runs `f` with delta sampling switched to `delta`, then restores it.
    pub fn with_delta_sampling<R>(&mut self, delta: bool, f: impl FnOnce(&mut Self) -> R) -> R {
        let outer = std::mem::replace(&mut self.delta, delta);
        let result = f(self);
        self.delta = outer;
        result
    }

    pub fn emit(&mut self, node: &str, kind: NodeEventKind) {
        log::trace!("Blend node '{node}' event {kind:?}");
        self.events.push(NodeEvent {
            node: node.to_string(),
            kind,
        });
    }

    #[must_use]
    pub fn events(&self) -> &[NodeEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> std::vec::Drain<'_, NodeEvent> {
        self.events.drain(..)
    }

    /// Identity pose sized for the context's skeleton.
    #[must_use]
    pub fn identity_pose(&self) -> AnimationPose {
        AnimationPose::new(self.skeleton.bone_count())
    }
}

/// A node of a blend tree.
///
/// Nodes own their children exclusively. Evaluation advances playback time
/// by `dt` and returns the node's pose for the new time.
pub trait BlendNode: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose;

    /// Sets a named float parameter on this node and all descendants.
    /// Unknown names are ignored.
    fn set_parameter(&mut self, name: &str, value: f32);

    /// Rewinds playback state (times, blend progress) of the subtree.
    fn reset(&mut self);

    fn clone_node(&self) -> Box<dyn BlendNode>;

    /// Playback length in seconds of the dominant clip.
    fn duration(&self) -> f32;

    /// Playback position in `[0, 1]`.
    fn normalized_time(&self) -> f32;

    fn set_normalized_time(&mut self, normalized: f32);

    /// Appends the parameter names this subtree reacts to.
    fn parameter_names(&self, out: &mut Vec<String>);

    /// Serializable description of the subtree.
    fn describe(&self) -> BlendNodeDesc;
}

impl Clone for Box<dyn BlendNode> {
    fn clone(&self) -> Self {
        self.clone_node()
    }
}

/// Accumulates weighted poses: the first pose is taken as-is, each next one
/// is blended in by `w / (accumulated + w)`, which yields the normalized
/// weighted average.
#[derive(Debug, Default)]
pub(crate) struct PoseAccumulator {
    pose: Option<AnimationPose>,
    weight: f32,
}

impl PoseAccumulator {
    pub(crate) fn add(&mut self, pose: AnimationPose, weight: f32) {
        match &mut self.pose {
            None => {
                self.pose = Some(pose);
                self.weight = weight;
            }
            Some(acc) => {
                let total = self.weight + weight;
                let t = if total > WEIGHT_THRESHOLD { weight / total } else { 0.5 };
                acc.blend_in_place(&pose, t, None);
                self.weight = total;
            }
        }
    }

    pub(crate) fn finish(self, ctx: &EvalContext<'_>) -> AnimationPose {
        self.pose.unwrap_or_else(|| ctx.identity_pose())
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !name.is_empty() && !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use glam::{Mat4, Quat, Vec3};

    use crate::clip::Animation;
    use crate::keyframe::{AnimationChannel, Keyframe};
    use crate::skeleton::{Skeleton, SkeletonBuilder};

    pub fn two_bone_skeleton() -> Skeleton {
        let mut builder = SkeletonBuilder::new();
        builder
            .add_bone("root", "", Mat4::IDENTITY, Mat4::IDENTITY)
            .add_bone("child", "root", Mat4::IDENTITY, Mat4::IDENTITY);
        builder.build()
    }

    /// Same hierarchy, but the child rests one unit up its parent's Y axis.
    pub fn offset_child_skeleton() -> Skeleton {
        let mut builder = SkeletonBuilder::new();
        builder
            .add_bone("root", "", Mat4::IDENTITY, Mat4::IDENTITY)
            .add_bone("child", "root", Mat4::IDENTITY, Mat4::from_translation(Vec3::Y));
        builder.build()
    }

    /// Root moves along X from 0 to `distance` over `duration` seconds.
    pub fn slide(name: &str, distance: f32, duration: f32) -> Arc<Animation> {
        Arc::new(Animation::new(
            name,
            vec![AnimationChannel::new(
                "root",
                vec![
                    Keyframe::new(0.0, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
                    Keyframe::new(duration, Vec3::X * distance, Quat::IDENTITY, Vec3::ONE),
                ],
            )],
        ))
    }

    /// Root held at a constant X offset.
    pub fn hold(name: &str, x: f32, duration: f32) -> Arc<Animation> {
        Arc::new(Animation::new(
            name,
            vec![AnimationChannel::new(
                "root",
                vec![
                    Keyframe::new(0.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
                    Keyframe::new(duration, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
                ],
            )],
        ))
    }
}
