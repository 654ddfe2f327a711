//! Runtime Pose Representation
//!
//! [`AnimationPose`] is an array of [`BoneTransform`]s indexed by skeleton
//! bone index. Poses are transient: a blend tree produces one per frame, the
//! caller converts it into skinning matrices and drops (or pools) it.
//!
//! Out-of-range bone indices read as identity, so poses with different bone
//! counts can be blended; the result has the larger count.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::interpolation::{normalize_or_identity, slerp};
use crate::mask::BlendMask;
use crate::skeleton::Skeleton;

/// Local translation / rotation / scale of one bone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for BoneTransform {
    fn from(matrix: Mat4) -> Self {
        Self::from_matrix(&matrix)
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[must_use]
    pub const fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    #[must_use]
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation: normalize_or_identity(rotation),
            scale,
        }
    }

    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Lerp position/scale, slerp rotation.
    #[must_use]
    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            position: a.position.lerp(b.position, t),
            rotation: slerp(a.rotation, b.rotation, t),
            scale: a.scale.lerp(b.scale, t),
        }
    }

    /// Applies an additive delta: translation adds, rotation pre-multiplies, scale multiplies.
    #[must_use]
    pub fn add(base: &Self, additive: &Self) -> Self {
        Self {
            position: base.position + additive.position,
            rotation: normalize_or_identity(additive.rotation * base.rotation),
            scale: base.scale * additive.scale,
        }
    }

    /// The delta that [`BoneTransform::add`] would apply to `reference` to reach `self`.
    #[must_use]
    pub fn difference(&self, reference: &Self) -> Self {
        let safe = |v: f32| if v.abs() < 1e-6 { 1.0 } else { v };
        let ref_scale = Vec3::new(safe(reference.scale.x), safe(reference.scale.y), safe(reference.scale.z));
        Self {
            position: self.position - reference.position,
            rotation: normalize_or_identity(self.rotation * reference.rotation.inverse()),
            scale: self.scale / ref_scale,
        }
    }

    /// Scales a delta transform towards identity.
    #[must_use]
    pub fn scaled_additive(&self, weight: f32) -> Self {
        Self {
            position: self.position * weight,
            rotation: slerp(Quat::IDENTITY, self.rotation, weight),
            scale: Vec3::ONE.lerp(self.scale, weight),
        }
    }

    /// Multiplicative blend: moves towards `self * other` component-wise by `weight`.
    #[must_use]
    pub fn multiply(&self, other: &Self, weight: f32) -> Self {
        Self {
            position: self.position.lerp(self.position * other.position, weight),
            rotation: slerp(self.rotation, self.rotation * other.rotation, weight),
            scale: self.scale.lerp(self.scale * other.scale, weight),
        }
    }

    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && self.scale.abs_diff_eq(other.scale, epsilon)
            && self.rotation.dot(other.rotation).abs() > 1.0 - epsilon
    }
}

/// Per-bone transforms plus root motion accumulated during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationPose {
    transforms: Vec<BoneTransform>,
    pub root_motion_delta: Vec3,
    pub root_motion_rotation: Quat,
}

impl Default for AnimationPose {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AnimationPose {
    /// Identity pose with `bone_count` bones.
    #[must_use]
    pub fn new(bone_count: usize) -> Self {
        Self {
            transforms: vec![BoneTransform::IDENTITY; bone_count],
            root_motion_delta: Vec3::ZERO,
            root_motion_rotation: Quat::IDENTITY,
        }
    }

    #[must_use]
    pub fn from_transforms(transforms: Vec<BoneTransform>) -> Self {
        Self {
            transforms,
            ..Self::new(0)
        }
    }

    /// The skeleton's default local transforms.
    #[must_use]
    pub fn bind_pose(skeleton: &Skeleton) -> Self {
        Self::from_transforms(skeleton.bones().iter().map(|b| b.local_transform).collect())
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn transforms(&self) -> &[BoneTransform] {
        &self.transforms
    }

    #[inline]
    pub fn transforms_mut(&mut self) -> &mut [BoneTransform] {
        &mut self.transforms
    }

    /// Transform of bone `index`, identity when out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> BoneTransform {
        self.transforms.get(index).copied().unwrap_or_default()
    }

    /// Sets bone `index`. Out-of-range writes are ignored.
    #[inline]
    pub fn set(&mut self, index: usize, transform: BoneTransform) {
        if let Some(slot) = self.transforms.get_mut(index) {
            *slot = transform;
        }
    }

    /// Resizes to `bone_count`, filling new bones with identity.
    pub fn resize(&mut self, bone_count: usize) {
        self.transforms.resize(bone_count, BoneTransform::IDENTITY);
    }

    /// Resets every bone to identity and clears root motion.
    pub fn reset(&mut self) {
        self.transforms.fill(BoneTransform::IDENTITY);
        self.root_motion_delta = Vec3::ZERO;
        self.root_motion_rotation = Quat::IDENTITY;
    }

    pub fn copy_from(&mut self, other: &Self) {
        self.transforms.clear();
        self.transforms.extend_from_slice(&other.transforms);
        self.root_motion_delta = other.root_motion_delta;
        self.root_motion_rotation = other.root_motion_rotation;
    }

    #[must_use]
    pub fn to_matrices(&self) -> Vec<Mat4> {
        self.transforms.iter().map(BoneTransform::to_matrix).collect()
    }

    // ========================================================================
    // Blending
    // ========================================================================

    /// Full-body lerp from `a` (t = 0) to `b` (t = 1).
    #[must_use]
    pub fn blend(a: &Self, b: &Self, t: f32) -> Self {
        Self::blend_with(a, b, t, |_| 1.0)
    }

    /// Lerp where each bone's `t` is scaled by the mask weight.
    #[must_use]
    pub fn blend_masked(a: &Self, b: &Self, t: f32, mask: &BlendMask) -> Self {
        Self::blend_with(a, b, t, |i| mask.bone_weight(i))
    }

    fn blend_with(a: &Self, b: &Self, t: f32, weight_of: impl Fn(usize) -> f32) -> Self {
        let count = a.bone_count().max(b.bone_count());
        let transforms = (0..count)
            .map(|i| BoneTransform::lerp(&a.get(i), &b.get(i), t * weight_of(i)))
            .collect();

        Self {
            transforms,
            root_motion_delta: a.root_motion_delta.lerp(b.root_motion_delta, t),
            root_motion_rotation: slerp(a.root_motion_rotation, b.root_motion_rotation, t),
        }
    }

    /// `base + additive * weight` per bone. Bones with an identity delta are left intact.
    #[must_use]
    pub fn additive_blend(base: &Self, additive: &Self, weight: f32) -> Self {
        let mut result = base.clone();
        result.additive_in_place(additive, weight, None);
        result
    }

    /// Converts a full pose into a delta pose relative to `reference`.
    #[must_use]
    pub fn make_additive(&self, reference: &Self) -> Self {
        let count = self.bone_count().max(reference.bone_count());
        Self {
            transforms: (0..count)
                .map(|i| self.get(i).difference(&reference.get(i)))
                .collect(),
            root_motion_delta: self.root_motion_delta - reference.root_motion_delta,
            root_motion_rotation: normalize_or_identity(
                self.root_motion_rotation * reference.root_motion_rotation.inverse(),
            ),
        }
    }

    #[must_use]
    pub fn multiply_blend(base: &Self, multiplier: &Self, weight: f32, mask: Option<&BlendMask>) -> Self {
        let count = base.bone_count().max(multiplier.bone_count());
        let transforms = (0..count)
            .map(|i| {
                let w = weight * mask.map_or(1.0, |m| m.bone_weight(i));
                base.get(i).multiply(&multiplier.get(i), w)
            })
            .collect();
        Self {
            transforms,
            root_motion_delta: base.root_motion_delta,
            root_motion_rotation: base.root_motion_rotation,
        }
    }

    /// Blends `other` into `self` by `t`, optionally masked. Root motion blends unmasked.
    pub fn blend_in_place(&mut self, other: &Self, t: f32, mask: Option<&BlendMask>) {
        if self.bone_count() < other.bone_count() {
            self.resize(other.bone_count());
        }
        for (i, slot) in self.transforms.iter_mut().enumerate() {
            let w = t * mask.map_or(1.0, |m| m.bone_weight(i));
            if w <= 0.0 {
                continue;
            }
            *slot = BoneTransform::lerp(slot, &other.get(i), w);
        }
        self.root_motion_delta = self.root_motion_delta.lerp(other.root_motion_delta, t);
        self.root_motion_rotation = slerp(self.root_motion_rotation, other.root_motion_rotation, t);
    }

    /// Adds a delta pose scaled by `weight` (and the mask, if any).
    pub fn additive_in_place(&mut self, additive: &Self, weight: f32, mask: Option<&BlendMask>) {
        if self.bone_count() < additive.bone_count() {
            self.resize(additive.bone_count());
        }
        for (i, slot) in self.transforms.iter_mut().enumerate() {
            let w = weight * mask.map_or(1.0, |m| m.bone_weight(i));
            if w <= 0.0 {
                continue;
            }
            let delta = additive.get(i).scaled_additive(w);
            *slot = BoneTransform::add(slot, &delta);
        }
        self.root_motion_delta += additive.root_motion_delta * weight;
        self.root_motion_rotation = normalize_or_identity(
            slerp(Quat::IDENTITY, additive.root_motion_rotation, weight) * self.root_motion_rotation,
        );
    }
}

// ============================================================================
// Pooling
// ============================================================================

/// Recycles pose allocations for a fixed bone count.
#[derive(Debug, Default)]
pub struct PosePool {
    bone_count: usize,
    free: Vec<AnimationPose>,
    max_pooled: usize,
}

impl PosePool {
    const DEFAULT_CAPACITY: usize = 16;

    #[must_use]
    pub fn new(bone_count: usize) -> Self {
        Self {
            bone_count,
            free: Vec::new(),
            max_pooled: Self::DEFAULT_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_capacity(bone_count: usize, max_pooled: usize) -> Self {
        Self {
            bone_count,
            free: Vec::with_capacity(max_pooled),
            max_pooled,
        }
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    /// Number of poses waiting for reuse.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Returns an identity pose, reusing a released allocation when possible.
    pub fn acquire(&mut self) -> AnimationPose {
        match self.free.pop() {
            Some(mut pose) => {
                pose.resize(self.bone_count);
                pose.reset();
                pose
            }
            None => AnimationPose::new(self.bone_count),
        }
    }

    pub fn release(&mut self, pose: AnimationPose) {
        if self.free.len() < self.max_pooled {
            self.free.push(pose);
        }
    }
}
