//! Serializable blend tree descriptions.
//!
//! A [`BlendNodeDesc`] is the authoring form of a node subtree: clips and
//! masks are referenced by name and resolved against an
//! [`AnimationLibrary`] and a [`BlendMaskLibrary`] when the tree is built.
//! Live nodes export back to descriptions through [`BlendNode::describe`].

use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    AdditiveNode, Blend1DNode, Blend2DNode, BlendNode, ClipNode, EvalContext, LayeredNode, LoopMode, NodeLayer,
    StateSelectorNode,
};
use crate::clip::AnimationLibrary;
use crate::delaunay::WeightMode;
use crate::errors::{AnimationError, Result};
use crate::mask::BlendMaskLibrary;
use crate::pose::{AnimationPose, BoneTransform};

fn one() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BlendNodeDesc {
    Clip {
        #[serde(default)]
        name: String,
        clip: String,
        #[serde(default = "one")]
        speed: f32,
        /// Falls back to the clip's own looping flag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loop_mode: Option<LoopMode>,
        #[serde(default)]
        root_motion: bool,
    },
    #[serde(rename = "blend_1d")]
    Blend1D {
        #[serde(default)]
        name: String,
        parameter: String,
        #[serde(default)]
        sync: bool,
        /// `[min, max]` parameter range.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bounds: Option<[f32; 2]>,
        #[serde(default)]
        entries: Vec<Blend1DEntryDesc>,
    },
    #[serde(rename = "blend_2d")]
    Blend2D {
        #[serde(default)]
        name: String,
        parameter_x: String,
        parameter_y: String,
        #[serde(default)]
        mode: WeightMode,
        #[serde(default)]
        sync: bool,
        /// `[min, max]` corners of the parameter rectangle.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bounds: Option<[Vec2; 2]>,
        #[serde(default)]
        points: Vec<Blend2DPointDesc>,
    },
    Additive {
        #[serde(default)]
        name: String,
        base: Box<BlendNodeDesc>,
        additive: Box<BlendNodeDesc>,
        #[serde(default = "one")]
        weight: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weight_parameter: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<AdditiveReferenceDesc>,
    },
    Layered {
        #[serde(default)]
        name: String,
        base: Box<BlendNodeDesc>,
        #[serde(default)]
        layers: Vec<LayerDesc>,
    },
    StateSelector {
        #[serde(default)]
        name: String,
        states: Vec<SelectorStateDesc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blend1DEntryDesc {
    pub node: BlendNodeDesc,
    pub threshold: f32,
    #[serde(default = "one")]
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blend2DPointDesc {
    pub node: BlendNodeDesc,
    pub position: Vec2,
    #[serde(default = "one")]
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdditiveReferenceDesc {
    /// Sample `clip` at `time` seconds.
    Clip {
        clip: String,
        #[serde(default)]
        time: f32,
    },
    Pose { transforms: Vec<BoneTransform> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDesc {
    pub node: BlendNodeDesc,
    /// Name of a mask in the mask library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_parameter: Option<String>,
    #[serde(default)]
    pub additive: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorStateDesc {
    pub name: String,
    pub node: BlendNodeDesc,
}

impl BlendNodeDesc {
    /// Leaf description playing `clip` with default settings.
    #[must_use]
    pub fn clip(clip: impl Into<String>) -> Self {
        let clip = clip.into();
        Self::Clip {
            name: clip.clone(),
            clip,
            speed: 1.0,
            loop_mode: None,
            root_motion: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Clip { name, .. }
            | Self::Blend1D { name, .. }
            | Self::Blend2D { name, .. }
            | Self::Additive { name, .. }
            | Self::Layered { name, .. }
            | Self::StateSelector { name, .. } => name,
        }
    }

    /// Instantiates the subtree, resolving clip and mask names.
    pub fn build(&self, clips: &AnimationLibrary, masks: &BlendMaskLibrary) -> Result<Box<dyn BlendNode>> {
        let node: Box<dyn BlendNode> = match self {
            Self::Clip {
                name,
                clip,
                speed,
                loop_mode,
                root_motion,
            } => {
                let animation = clips
                    .get(clip)
                    .ok_or_else(|| AnimationError::ClipNotFound(clip.clone()))?;
                let mut node = ClipNode::new(animation)
                    .with_speed(*speed)
                    .with_root_motion(*root_motion);
                if !name.is_empty() {
                    node = node.with_name(name.clone());
                }
                if let Some(mode) = loop_mode {
                    node = node.with_loop_mode(*mode);
                }
                Box::new(node)
            }
            Self::Blend1D {
                name,
                parameter,
                sync,
                bounds,
                entries,
            } => {
                let mut node = Blend1DNode::new(name.clone(), parameter.clone()).with_sync(*sync);
                node.set_bounds(bounds.map(|[min, max]| (min, max)));
                for entry in entries {
                    node.add_entry(entry.node.build(clips, masks)?, entry.threshold, entry.speed);
                }
                Box::new(node)
            }
            Self::Blend2D {
                name,
                parameter_x,
                parameter_y,
                mode,
                sync,
                bounds,
                points,
            } => {
                let mut node =
                    Blend2DNode::new(name.clone(), parameter_x.clone(), parameter_y.clone(), *mode).with_sync(*sync);
                node.set_bounds(bounds.map(|[min, max]| (min, max)));
                for point in points {
                    node.add_point(point.node.build(clips, masks)?, point.position, point.speed);
                }
                Box::new(node)
            }
            Self::Additive {
                name,
                base,
                additive,
                weight,
                weight_parameter,
                reference,
            } => {
                let mut node = AdditiveNode::new(name.clone(), base.build(clips, masks)?, additive.build(clips, masks)?)
                    .with_weight(*weight);
                if let Some(parameter) = weight_parameter {
                    node = node.with_weight_parameter(parameter.clone());
                }
                match reference {
                    Some(AdditiveReferenceDesc::Clip { clip, time }) => {
                        let animation = clips
                            .get(clip)
                            .ok_or_else(|| AnimationError::ClipNotFound(clip.clone()))?;
                        node = node.with_reference_clip(animation, *time);
                    }
                    Some(AdditiveReferenceDesc::Pose { transforms }) => {
                        node = node.with_reference_pose(AnimationPose::from_transforms(transforms.clone()));
                    }
                    None => {}
                }
                Box::new(node)
            }
            Self::Layered { name, base, layers } => {
                let mut node = LayeredNode::new(name.clone(), base.build(clips, masks)?);
                for layer in layers {
                    let mut built = NodeLayer::new(layer.node.build(clips, masks)?)
                        .with_weight(layer.weight)
                        .with_additive(layer.additive);
                    if let Some(mask) = &layer.mask {
                        let mask = masks
                            .get(mask)
                            .ok_or_else(|| AnimationError::MaskNotFound(mask.clone()))?;
                        built = built.with_mask(mask.clone());
                    }
                    if let Some(parameter) = &layer.weight_parameter {
                        built = built.with_weight_parameter(parameter.clone());
                    }
                    built.enabled = layer.enabled;
                    node.add_layer(built);
                }
                Box::new(node)
            }
            Self::StateSelector { name, states, initial } => {
                let mut node = StateSelectorNode::new(name.clone());
                for state in states {
                    node.add_state(state.name.clone(), state.node.build(clips, masks)?);
                }
                if let Some(initial) = initial {
                    if !states.iter().any(|s| &s.name == initial) {
                        return Err(AnimationError::InvalidBlendTree(format!(
                            "state selector '{name}' starts in unknown state '{initial}'"
                        )));
                    }
                    node.set_current_state(initial, 0.0);
                }
                Box::new(node)
            }
        };
        Ok(node)
    }
}

// ============================================================================
// BlendTree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendTreeDesc {
    pub name: String,
    /// Initial parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
    pub root: BlendNodeDesc,
}

/// A named root node plus the values of the parameters it reacts to.
#[derive(Debug, Clone)]
pub struct BlendTree {
    name: String,
    root: Box<dyn BlendNode>,
    parameters: BTreeMap<String, f32>,
}

impl BlendTree {
    #[must_use]
    /// Every parameter the root reacts to starts at 0.
    pub fn new(name: impl Into<String>, mut root: Box<dyn BlendNode>) -> Self {
        let mut names = Vec::new();
        root.parameter_names(&mut names);
        for name in &names {
            root.set_parameter(name, 0.0);
        }
        Self {
            name: name.into(),
            root,
            parameters: names.into_iter().map(|n| (n, 0.0)).collect(),
        }
    }

    pub fn from_desc(desc: &BlendTreeDesc, clips: &AnimationLibrary, masks: &BlendMaskLibrary) -> Result<Self> {
        let mut tree = Self::new(desc.name.clone(), desc.root.build(clips, masks)?);
        for (name, value) in &desc.parameters {
            tree.parameters.insert(name.clone(), *value);
            tree.root.set_parameter(name, *value);
        }
        log::debug!(
            "Built blend tree '{}' with {} parameters",
            tree.name,
            tree.parameters.len()
        );
        Ok(tree)
    }

    pub fn from_json_str(json: &str, clips: &AnimationLibrary, masks: &BlendMaskLibrary) -> Result<Self> {
        let desc: BlendTreeDesc = serde_json::from_str(json)?;
        Self::from_desc(&desc, clips, masks)
    }

    pub fn load_from_file(
        path: impl AsRef<Path>,
        clips: &AnimationLibrary,
        masks: &BlendMaskLibrary,
    ) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json, clips, masks)
    }

    #[must_use]
    pub fn describe(&self) -> BlendTreeDesc {
        BlendTreeDesc {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            root: self.root.describe(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.describe())?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn root(&self) -> &dyn BlendNode {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> &mut dyn BlendNode {
        self.root.as_mut()
    }

    /// Sets a parameter the tree reacts to. Unknown names are ignored.
    pub fn set_parameter(&mut self, name: &str, value: f32) {
        match self.parameters.get_mut(name) {
            Some(slot) => {
                *slot = value;
                self.root.set_parameter(name, value);
            }
            None => log::trace!("Blend tree '{}' has no parameter '{name}'", self.name),
        }
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).copied()
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, f32)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        self.root.evaluate(ctx, dt)
    }

    pub fn reset(&mut self) {
        self.root.reset();
    }

    #[must_use]
    pub fn duration(&self) -> f32 {
        self.root.duration()
    }

    #[must_use]
    pub fn normalized_time(&self) -> f32 {
        self.root.normalized_time()
    }

    pub fn set_normalized_time(&mut self, normalized: f32) {
        self.root.set_normalized_time(normalized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::test_support::{hold, two_bone_skeleton};
    use crate::mask::BlendMask;

    fn library() -> AnimationLibrary {
        let mut clips = AnimationLibrary::new();
        for (name, x) in [("idle", 0.0), ("walk", 1.0), ("run", 2.0), ("wave", 5.0)] {
            clips.insert(hold(name, x, 1.0));
        }
        clips
    }

    const TREE: &str = r#"{
        "name": "locomotion",
        "parameters": { "speed": 0.5 },
        "root": {
            "type": "layered",
            "name": "body",
            "base": {
                "type": "blend_1d",
                "name": "move",
                "parameter": "speed",
                "entries": [
                    { "node": { "type": "clip", "clip": "walk" }, "threshold": 0.0 },
                    { "node": { "type": "clip", "clip": "run" }, "threshold": 1.0 }
                ]
            },
            "layers": [
                {
                    "node": { "type": "clip", "clip": "wave" },
                    "mask": "upper",
                    "weightParameter": "wave"
                }
            ]
        }
    }"#;

    fn masks() -> BlendMaskLibrary {
        let mut masks = BlendMaskLibrary::new();
        let mut upper = BlendMask::new("upper");
        upper.add_bone("child", 1.0, true);
        masks.add(upper);
        masks
    }

    #[test]
    fn builds_from_json_and_applies_parameters() {
        let skeleton = two_bone_skeleton();
        let mut tree = BlendTree::from_json_str(TREE, &library(), &masks()).unwrap();
        assert_eq!(tree.parameter("speed"), Some(0.5));
        assert_eq!(tree.parameter("wave"), Some(0.0));

        let mut ctx = EvalContext::new(&skeleton);
        let pose = tree.evaluate(&mut ctx, 0.1);
        assert!((pose.get(0).position.x - 1.5).abs() < 1e-4);
    }

    #[test]
    fn export_round_trips() {
        let tree = BlendTree::from_json_str(TREE, &library(), &masks()).unwrap();
        let json = tree.to_json().unwrap();
        let again = BlendTree::from_json_str(&json, &library(), &masks()).unwrap();
        assert_eq!(tree.describe(), again.describe());
    }

    #[test]
    fn missing_clip_is_an_error() {
        let json = r#"{ "name": "t", "root": { "type": "clip", "clip": "swim" } }"#;
        let err = BlendTree::from_json_str(json, &library(), &masks()).unwrap_err();
        assert!(matches!(err, AnimationError::ClipNotFound(name) if name == "swim"));
    }

    #[test]
    fn missing_mask_is_an_error() {
        let err = BlendTree::from_json_str(TREE, &library(), &BlendMaskLibrary::new()).unwrap_err();
        assert!(matches!(err, AnimationError::MaskNotFound(_)));
    }

    #[test]
    fn unknown_tree_parameter_is_ignored() {
        let mut tree = BlendTree::from_json_str(TREE, &library(), &masks()).unwrap();
        tree.set_parameter("jump", 1.0);
        assert_eq!(tree.parameter("jump"), None);
    }
}
