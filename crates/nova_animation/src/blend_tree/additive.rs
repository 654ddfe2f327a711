use std::sync::Arc;

use super::{AdditiveReferenceDesc, BlendNode, BlendNodeDesc, EvalContext, WEIGHT_THRESHOLD, push_unique};
use crate::clip::Animation;
use crate::pose::AnimationPose;

#[derive(Debug, Clone)]
enum Reference {
    /// The additive child is sampled as a delta pose.
    None,
    Pose(AnimationPose),
    /// Sampled on first use, once a skeleton is known.
    Clip {
        clip: Arc<Animation>,
        time: f32,
        cached: Option<AnimationPose>,
    },
}

/// Layers `(additive - reference) * weight` on top of a base pose.
#[derive(Debug, Clone)]
pub struct AdditiveNode {
    name: String,
    base: Box<dyn BlendNode>,
    additive: Box<dyn BlendNode>,
    pub weight: f32,
    weight_parameter: Option<String>,
    reference: Reference,
}

impl AdditiveNode {
    #[must_use]
    pub fn new(name: impl Into<String>, base: Box<dyn BlendNode>, additive: Box<dyn BlendNode>) -> Self {
        Self {
            name: name.into(),
            base,
            additive,
            weight: 1.0,
            weight_parameter: None,
            reference: Reference::None,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Drives the weight from a named parameter instead of the fixed value.
    #[must_use]
    pub fn with_weight_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.weight_parameter = Some(parameter.into());
        self
    }

    #[must_use]
    pub fn with_reference_pose(mut self, pose: AnimationPose) -> Self {
        self.reference = Reference::Pose(pose);
        self
    }

    #[must_use]
    pub fn with_reference_clip(mut self, clip: Arc<Animation>, time: f32) -> Self {
        self.reference = Reference::Clip {
            clip,
            time,
            cached: None,
        };
        self
    }

    pub fn clear_reference(&mut self) {
        self.reference = Reference::None;
    }

    #[must_use]
    pub fn base(&self) -> &dyn BlendNode {
        self.base.as_ref()
    }

    #[must_use]
    pub fn additive(&self) -> &dyn BlendNode {
        self.additive.as_ref()
    }

    #[must_use]
    pub fn weight_parameter(&self) -> Option<&str> {
        self.weight_parameter.as_deref()
    }

    fn reference_pose(&mut self, ctx: &EvalContext<'_>) -> Option<&AnimationPose> {
        match &mut self.reference {
            Reference::None => None,
            Reference::Pose(pose) => Some(pose),
            Reference::Clip { clip, time, cached } => {
                let stale = cached
                    .as_ref()
                    .is_none_or(|p| p.bone_count() != ctx.skeleton.bone_count());
                if stale {
                    *cached = Some(clip.sample_pose(ctx.skeleton, *time));
                }
                cached.as_ref()
            }
        }
    }
}

impl BlendNode for AdditiveNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        let mut pose = self.base.evaluate(ctx, dt);
        let as_delta = matches!(self.reference, Reference::None);
        let additive = ctx.with_delta_sampling(as_delta, |ctx| self.additive.evaluate(ctx, dt));

        let weight = self.weight;
        if weight <= WEIGHT_THRESHOLD {
            return pose;
        }

        match self.reference_pose(ctx) {
            Some(reference) => {
                let delta = additive.make_additive(reference);
                pose.additive_in_place(&delta, weight, None);
            }
            None => pose.additive_in_place(&additive, weight, None),
        }
        pose
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        if self.weight_parameter.as_deref() == Some(name) {
            self.weight = value;
        }
        self.base.set_parameter(name, value);
        self.additive.set_parameter(name, value);
    }

    fn reset(&mut self) {
        self.base.reset();
        self.additive.reset();
    }

    fn clone_node(&self) -> Box<dyn BlendNode> {
        let mut clone = self.clone();
        clone.reset();
        Box::new(clone)
    }

    fn duration(&self) -> f32 {
        self.base.duration()
    }

    fn normalized_time(&self) -> f32 {
        self.base.normalized_time()
    }

    fn set_normalized_time(&mut self, normalized: f32) {
        self.base.set_normalized_time(normalized);
        self.additive.set_normalized_time(normalized);
    }

    fn parameter_names(&self, out: &mut Vec<String>) {
        if let Some(parameter) = &self.weight_parameter {
            push_unique(out, parameter);
        }
        self.base.parameter_names(out);
        self.additive.parameter_names(out);
    }

    fn describe(&self) -> BlendNodeDesc {
        let reference = match &self.reference {
            Reference::None => None,
            Reference::Pose(pose) => Some(AdditiveReferenceDesc::Pose {
                transforms: pose.transforms().to_vec(),
            }),
            Reference::Clip { clip, time, .. } => Some(AdditiveReferenceDesc::Clip {
                clip: clip.name().to_string(),
                time: *time,
            }),
        };
        BlendNodeDesc::Additive {
            name: self.name.clone(),
            base: Box::new(self.base.describe()),
            additive: Box::new(self.additive.describe()),
            weight: self.weight,
            weight_parameter: self.weight_parameter.clone(),
            reference,
        }
    }
}
