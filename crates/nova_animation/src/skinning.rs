//! CPU Vertex Skinning
//!
//! Deforms bind-pose vertices by up to four weighted joint influences,
//! using the matrices produced by
//! [`Skeleton::calculate_pose_matrices_into`](crate::skeleton::Skeleton::calculate_pose_matrices_into).
//!
//! - [`linear_blend_skin`]: weighted sum of transformed positions. Fast,
//!   but volume collapses around strongly twisted joints.
//! - [`dual_quaternion_skin`]: blends rigid transforms as dual quaternions,
//!   which preserves volume. Joint scale is ignored.

use glam::{Mat4, Quat, Vec3};

use crate::blend_tree::WEIGHT_THRESHOLD;

/// Joint influences per vertex.
pub const MAX_INFLUENCES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinnedVertex {
    pub position: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkinningMethod {
    #[default]
    LinearBlend,
    DualQuaternion,
}

/// Valid influences and the sum of their weights.
fn influences<'a>(
    joints: &'a [u32; MAX_INFLUENCES],
    weights: &'a [f32; MAX_INFLUENCES],
    joint_count: usize,
) -> impl Iterator<Item = (usize, f32)> + 'a {
    joints
        .iter()
        .zip(weights)
        .map(|(&joint, &weight)| (joint as usize, weight))
        .filter(move |&(joint, weight)| weight > WEIGHT_THRESHOLD && joint < joint_count)
}

/// Linear blend skinning. Weights are renormalized over the valid
/// influences; a vertex without any is returned unchanged.
#[must_use]
pub fn linear_blend_skin(
    position: Vec3,
    normal: Vec3,
    joints: &[u32; MAX_INFLUENCES],
    weights: &[f32; MAX_INFLUENCES],
    matrices: &[Mat4],
) -> SkinnedVertex {
    let mut skinned_position = Vec3::ZERO;
    let mut skinned_normal = Vec3::ZERO;
    let mut total = 0.0;

    for (joint, weight) in influences(joints, weights, matrices.len()) {
        let matrix = &matrices[joint];
        skinned_position += matrix.transform_point3(position) * weight;
        skinned_normal += matrix.transform_vector3(normal) * weight;
        total += weight;
    }

    if total <= WEIGHT_THRESHOLD {
        return SkinnedVertex { position, normal };
    }

    SkinnedVertex {
        position: skinned_position / total,
        normal: skinned_normal.normalize_or_zero(),
    }
}

// ============================================================================
// Dual quaternions
// ============================================================================

/// Rigid transform as a unit dual quaternion `real + ε·dual`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualQuat {
    pub real: Quat,
    pub dual: Quat,
}

impl Default for DualQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl DualQuat {
    pub const IDENTITY: Self = Self {
        real: Quat::IDENTITY,
        dual: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
    };

    #[must_use]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        let real = rotation.normalize();
        let t = Quat::from_xyzw(translation.x, translation.y, translation.z, 0.0);
        Self {
            real,
            dual: (t * real) * 0.5,
        }
    }

    /// Rotation and translation of `matrix`; scale is dropped.
    #[must_use]
    pub fn from_mat4(matrix: &Mat4) -> Self {
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        Self::from_rotation_translation(rotation, translation)
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.real
    }

    #[must_use]
    pub fn translation(&self) -> Vec3 {
        let t = (self.dual * self.real.conjugate()) * 2.0;
        Vec3::new(t.x, t.y, t.z)
    }

    #[must_use]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.real * point + self.translation()
    }

    #[must_use]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.real * vector
    }

    #[must_use]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.real, self.translation())
    }

    /// Divides both parts by the length of the real part. A zero real part
    /// yields the identity.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let length = self.real.length();
        if length <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self {
            real: self.real / length,
            dual: self.dual / length,
        }
    }

    /// Weighted blend of rigid transforms.
    ///
    /// Quaternions in the opposite hemisphere of the first one are negated
    /// before summing, so the blend takes the shortest path.
    #[must_use]
    pub fn blend(items: &[(DualQuat, f32)]) -> Self {
        let Some((pivot, _)) = items.first() else {
            return Self::IDENTITY;
        };

        let mut real = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
        let mut dual = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
        for (dq, weight) in items {
            let weight = if dq.real.dot(pivot.real) < 0.0 { -weight } else { *weight };
            real = real + dq.real * weight;
            dual = dual + dq.dual * weight;
        }

        Self { real, dual }.normalize()
    }
}

/// Converts skinning matrices to dual quaternions, reusing `out`.
pub fn dual_quats_from_matrices(matrices: &[Mat4], out: &mut Vec<DualQuat>) {
    out.clear();
    out.extend(matrices.iter().map(DualQuat::from_mat4));
}

/// Dual quaternion skinning over per-joint transforms. A vertex without
/// valid influences is returned unchanged.
#[must_use]
pub fn dual_quaternion_skin(
    position: Vec3,
    normal: Vec3,
    joints: &[u32; MAX_INFLUENCES],
    weights: &[f32; MAX_INFLUENCES],
    joint_transforms: &[DualQuat],
) -> SkinnedVertex {
    let mut blend: [(DualQuat, f32); MAX_INFLUENCES] = [(DualQuat::IDENTITY, 0.0); MAX_INFLUENCES];
    let mut count = 0;
    for (joint, weight) in influences(joints, weights, joint_transforms.len()) {
        blend[count] = (joint_transforms[joint], weight);
        count += 1;
    }

    if count == 0 {
        return SkinnedVertex { position, normal };
    }

    let dq = DualQuat::blend(&blend[..count]);
    SkinnedVertex {
        position: dq.transform_point(position),
        normal: dq.transform_vector(normal).normalize_or_zero(),
    }
}

/// Skins a whole mesh. All slices must have the same length; extra
/// entries of the longer ones are ignored.
#[must_use]
pub fn skin_vertices(
    positions: &[Vec3],
    normals: &[Vec3],
    joints: &[[u32; MAX_INFLUENCES]],
    weights: &[[f32; MAX_INFLUENCES]],
    matrices: &[Mat4],
    method: SkinningMethod,
) -> Vec<SkinnedVertex> {
    let vertices = positions.iter().zip(normals).zip(joints).zip(weights);
    match method {
        SkinningMethod::LinearBlend => vertices
            .map(|(((p, n), j), w)| linear_blend_skin(*p, *n, j, w, matrices))
            .collect(),
        SkinningMethod::DualQuaternion => {
            let mut dual_quats = Vec::with_capacity(matrices.len());
            dual_quats_from_matrices(matrices, &mut dual_quats);
            vertices
                .map(|(((p, n), j), w)| dual_quaternion_skin(*p, *n, j, w, &dual_quats))
                .collect()
        }
    }
}
