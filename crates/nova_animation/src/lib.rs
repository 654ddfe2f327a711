//! # Nova Animation
//!
//! Skeletal animation blending for Nova3D.
//!
//! Clips are sampled into [`AnimationPose`]s, combined by blend trees,
//! blend spaces and layers, driven by an [`AnimationController`] or a state
//! machine, and finally turned into skinning matrices by the [`Skeleton`].
//!
//! Registries ([`AnimationLibrary`], [`BlendMaskLibrary`]) are plain values
//! owned by whoever composes the animation setup.

pub mod blend_space;
pub mod blend_tree;
pub mod clip;
pub mod controller;
pub mod delaunay;
pub mod errors;
pub mod events;
pub mod interpolation;
pub mod keyframe;
pub mod layer;
pub mod mask;
pub mod pose;
pub mod skeleton;
pub mod skinning;
pub mod state_machine;
pub mod trigger;
pub mod unit_config;

pub use blend_space::{BlendSample1D, BlendSample2D, BlendSpace1D, BlendSpace2D, BlendSpace2DMode};
pub use blend_tree::{
    AdditiveNode, Blend1DNode, Blend2DNode, BlendNode, BlendNodeDesc, BlendTree, BlendTreeDesc, BlendTreeTemplates,
    ClipNode, EvalContext, LayeredNode, LoopMode, NodeEvent, NodeEventKind, StateSelectorNode,
};
pub use clip::{Animation, AnimationLibrary};
pub use controller::{AnimationController, AnimationInstance, ControllerEvent, InstanceState};
pub use errors::{AnimationError, Result};
pub use events::{AnimationEventBus, AnimationEventSystem, EventQueue};
pub use keyframe::{AnimationChannel, InterpolationMode, Keyframe};
pub use layer::{AnimationLayer, AnimationLayerStack, LayerBlendMode};
pub use mask::{BlendMask, BlendMaskLibrary, BoneWeight, MaskCombine, MaskPreset};
pub use pose::{AnimationPose, BoneTransform, PosePool};
pub use skeleton::{Bone, Skeleton, SkeletonBuilder, SkeletonScratch};
pub use skinning::{DualQuat, SkinningMethod, dual_quaternion_skin, linear_blend_skin};
pub use state_machine::{
    AnimationParameter, AnimationStateMachine, ConditionExpressionParser, DataDrivenStateMachine, ParameterValue,
    StateMachineConfig,
};
pub use trigger::{
    AnimationTrigger, AnimationTriggerSystem, ComboDetector, PropertyCompareMode, TriggerConfig, TriggerContext,
    TriggerKind, TriggerTemplates,
};
pub use unit_config::UnitAnimationConfig;
