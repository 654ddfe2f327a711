//! # Nova3D
//!
//! Umbrella crate re-exporting the Nova3D subsystems.
//!
//! ```rust,ignore
//! use nova::prelude::*;
//!
//! let mut controller = AnimationController::new();
//! controller.add_animation(walk_clip);
//! controller.play("walk", 0.2, true);
//! controller.update(1.0 / 60.0);
//! let pose = controller.blend_pose(&skeleton);
//! ```

pub use nova_animation as animation;

pub use nova_animation::{
    AnimationController, AnimationError, AnimationLayerStack, AnimationLibrary, AnimationPose, AnimationTriggerSystem,
    BlendMask, BlendMaskLibrary, BlendSpace1D, BlendSpace2D, BlendTree, DataDrivenStateMachine, Skeleton,
    UnitAnimationConfig,
};

/// Common imports for application code.
pub mod prelude {
    pub use nova_animation::blend_tree::{BlendNode, BlendTree, BlendTreeDesc, BlendTreeTemplates, EvalContext};
    pub use nova_animation::{
        Animation, AnimationChannel, AnimationController, AnimationEventBus, AnimationEventSystem, AnimationLayer,
        AnimationLayerStack, AnimationLibrary, AnimationPose, AnimationStateMachine, BlendMask, BlendMaskLibrary,
        BlendSpace1D, BlendSpace2D, BoneTransform, DataDrivenStateMachine, EventQueue, InterpolationMode, Keyframe,
        LayerBlendMode, MaskPreset, Skeleton, SkeletonBuilder, SkeletonScratch, TriggerContext, TriggerTemplates,
        UnitAnimationConfig,
    };
    pub use glam::{Mat4, Quat, Vec2, Vec3};
}
