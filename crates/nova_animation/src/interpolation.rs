//! Interpolation Math
//!
//! Scalar, vector and quaternion interpolation primitives shared by
//! keyframe channels, pose blending and the state machines.

use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Values that can be interpolated between keyframes.
pub trait Interpolatable: Copy + Sized {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self;

    /// Cubic Hermite interpolation with explicit tangents scaled by `dt`.
    fn interpolate_cubic(
        v0: Self,
        out_tangent0: Self,
        in_tangent1: Self,
        v1: Self,
        t: f32,
        dt: f32,
    ) -> Self;
}

#[inline]
fn hermite_basis(t: f32) -> (f32, f32, f32, f32) {
    let t2 = t * t;
    let t3 = t2 * t;

    let s2 = -2.0 * t3 + 3.0 * t2;
    let s3 = t3 - t2;
    let s0 = 1.0 - s2;
    let s1 = s3 - t2 + t;
    (s0, s1, s2, s3)
}

impl Interpolatable for f32 {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        lerp(start, end, t)
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);
        s0 * v0 + s1 * out_tangent0 * dt + s2 * v1 + s3 * in_tangent1 * dt
    }
}

impl Interpolatable for Vec3 {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start.lerp(end, t)
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);
        v0 * s0 + out_tangent0 * dt * s1 + v1 * s2 + in_tangent1 * dt * s3
    }
}

impl Interpolatable for Quat {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        slerp(start, end, t)
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);

        let result = Vec4::from(v0) * s0
            + Vec4::from(out_tangent0) * dt * s1
            + Vec4::from(v1) * s2
            + Vec4::from(in_tangent1) * dt * s3;

        normalize_or_identity(Quat::from_vec4(result))
    }
}

// ============================================================================
// Free functions
// ============================================================================

#[inline]
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Normalizes `q`, falling back to identity for degenerate input.
#[inline]
#[must_use]
pub fn normalize_or_identity(q: Quat) -> Quat {
    let len_sq = q.length_squared();
    if len_sq < 1e-12 || !len_sq.is_finite() {
        Quat::IDENTITY
    } else {
        q / len_sq.sqrt()
    }
}

/// Spherical interpolation along the shortest arc. Always returns a unit quaternion.
///
/// Inputs are normalized first so glam's slerp sees unit quaternions; it
/// already flips to the shorter arc and drops to nlerp for nearly parallel
/// inputs.
#[must_use]
pub fn slerp(a: Quat, b: Quat, t: f32) -> Quat {
    normalize_or_identity(normalize_or_identity(a).slerp(normalize_or_identity(b), t))
}

/// Normalized linear interpolation with hemisphere correction.
#[must_use]
pub fn nlerp(a: Quat, b: Quat, t: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    normalize_or_identity(Quat::from_vec4(Vec4::from(a).lerp(Vec4::from(b), t)))
}

/// Uniform Catmull-Rom spline through `p1..p2` using `p0`/`p3` as neighbours.
#[must_use]
pub fn catmull_rom_vec3(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Catmull-Rom on quaternion coefficients, hemisphere-aligned to `q1` and renormalized.
#[must_use]
pub fn catmull_rom_quat(q0: Quat, q1: Quat, q2: Quat, q3: Quat, t: f32) -> Quat {
    let align = |q: Quat| if q1.dot(q) < 0.0 { -q } else { q };
    let (v0, v1, v2, v3) = (
        Vec4::from(align(q0)),
        Vec4::from(q1),
        Vec4::from(align(q2)),
        Vec4::from(align(q3)),
    );

    let t2 = t * t;
    let t3 = t2 * t;
    let v = 0.5
        * ((2.0 * v1)
            + (-v0 + v2) * t
            + (2.0 * v0 - 5.0 * v1 + 4.0 * v2 - v3) * t2
            + (-v0 + 3.0 * v1 - 3.0 * v2 + v3) * t3);

    normalize_or_identity(Quat::from_vec4(v))
}

#[inline]
#[must_use]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// Easing
// ============================================================================

/// Easing curves applied to normalized blend progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    SineInOut,
    Smoothstep,
}

impl Easing {
    /// Maps `t` (clamped to `[0, 1]`) through the curve. Every curve fixes 0 and 1.
    #[must_use]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => t * (2.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    0.5 * u * u * u + 1.0
                }
            }
            Easing::SineInOut => 0.5 * (1.0 - (std::f32::consts::PI * t).cos()),
            Easing::Smoothstep => smoothstep(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn slerp_takes_shortest_path() {
        let a = Quat::from_rotation_y(0.1);
        let b = -Quat::from_rotation_y(0.3);
        let mid = slerp(a, b, 0.5);
        assert!(mid.angle_between(Quat::from_rotation_y(0.2)) < 1e-4);
    }

    #[test]
    fn slerp_endpoints_are_exact() {
        let a = Quat::from_rotation_x(0.4);
        let b = Quat::from_rotation_z(PI * 0.75);
        assert!(slerp(a, b, 0.0).angle_between(a) < 1e-4);
        assert!(slerp(a, b, 1.0).angle_between(b) < 1e-4);
    }

    #[test]
    fn catmull_rom_passes_through_control_points() {
        let p = [Vec3::ZERO, Vec3::X, Vec3::new(2.0, 1.0, 0.0), Vec3::new(3.0, 1.0, 0.0)];
        assert!(catmull_rom_vec3(p[0], p[1], p[2], p[3], 0.0).distance(p[1]) < 1e-5);
        assert!(catmull_rom_vec3(p[0], p[1], p[2], p[3], 1.0).distance(p[2]) < 1e-5);
    }

    #[test]
    fn easing_fixes_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::QuadIn,
            Easing::QuadOut,
            Easing::QuadInOut,
            Easing::CubicIn,
            Easing::CubicOut,
            Easing::CubicInOut,
            Easing::SineInOut,
            Easing::Smoothstep,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-5, "{easing:?}");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-5, "{easing:?}");
        }
    }
}
