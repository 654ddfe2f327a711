//! Skinning Tests
//!
//! Tests for:
//! - Bind pose leaving vertices in place
//! - Sampled clips deforming vertices through skeleton matrices
//! - Linear blend and dual quaternion skinning agreeing on rigid influences

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3};

use nova::animation::skinning::skin_vertices;
use nova::animation::{Animation, AnimationChannel, Keyframe, Skeleton, SkeletonBuilder, SkeletonScratch, SkinningMethod};

const EPSILON: f32 = 1e-4;

fn arm() -> Skeleton {
    let mut builder = SkeletonBuilder::new();
    builder
        .add_bone("shoulder", "", Mat4::IDENTITY, Mat4::IDENTITY)
        .add_bone("elbow", "shoulder", Mat4::from_translation(-Vec3::X), Mat4::from_translation(Vec3::X));
    builder.build()
}

fn bend() -> Animation {
    let bent = Quat::from_rotation_z(FRAC_PI_2);
    Animation::new(
        "bend",
        vec![AnimationChannel::new(
            "elbow",
            vec![
                Keyframe::new(0.0, Vec3::X, Quat::IDENTITY, Vec3::ONE),
                Keyframe::new(1.0, Vec3::X, bent, Vec3::ONE),
            ],
        )],
    )
}

fn forearm_mesh() -> (Vec<Vec3>, Vec<Vec3>, Vec<[u32; 4]>, Vec<[f32; 4]>) {
    let positions = vec![Vec3::new(0.5, 0.0, 0.0), Vec3::new(1.5, 0.0, 0.0)];
    let normals = vec![Vec3::Y, Vec3::Y];
    let joints = vec![[0, 0, 0, 0], [1, 0, 0, 0]];
    let weights = vec![[1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]];
    (positions, normals, joints, weights)
}

fn matrices_at(skeleton: &Skeleton, time: f32) -> Vec<Mat4> {
    let pose = bend().sample_pose(skeleton, time);
    let mut scratch = SkeletonScratch::new();
    let mut out = vec![Mat4::IDENTITY; skeleton.bone_count()];
    skeleton.calculate_pose_matrices_into(&pose, &mut scratch, &mut out);
    out
}

#[test]
fn bind_pose_keeps_vertices() {
    let skeleton = arm();
    let matrices = matrices_at(&skeleton, 0.0);
    let (positions, normals, joints, weights) = forearm_mesh();

    for method in [SkinningMethod::LinearBlend, SkinningMethod::DualQuaternion] {
        let skinned = skin_vertices(&positions, &normals, &joints, &weights, &matrices, method);
        for (vertex, original) in skinned.iter().zip(&positions) {
            assert!(vertex.position.distance(*original) < EPSILON, "{method:?}");
        }
    }
}

#[test]
fn bent_elbow_rotates_forearm_only() {
    let skeleton = arm();
    let matrices = matrices_at(&skeleton, 1.0);
    let (positions, normals, joints, weights) = forearm_mesh();

    for method in [SkinningMethod::LinearBlend, SkinningMethod::DualQuaternion] {
        let skinned = skin_vertices(&positions, &normals, &joints, &weights, &matrices, method);
        assert!(skinned[0].position.distance(Vec3::new(0.5, 0.0, 0.0)) < EPSILON, "{method:?}");
        assert!(skinned[1].position.distance(Vec3::new(1.0, 0.5, 0.0)) < EPSILON, "{method:?}");
        assert!(skinned[1].normal.distance(-Vec3::X) < EPSILON, "{method:?}");
    }
}

#[test]
fn mismatched_slices_use_shortest() {
    let skeleton = arm();
    let matrices = matrices_at(&skeleton, 0.5);
    let (positions, normals, joints, weights) = forearm_mesh();
    let skinned = skin_vertices(&positions, &normals[..1], &joints, &weights, &matrices, SkinningMethod::default());
    assert_eq!(skinned.len(), 1);
}
