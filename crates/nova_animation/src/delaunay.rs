//! 2D Delaunay Triangulation
//!
//! Bowyer-Watson over blend-space sample positions, plus the barycentric and
//! inverse-distance weighting built on top of it.
//!
//! Geometry runs in `f64` internally; circumcircles are always computed by
//! [`circumcircle`] so the values tested during insertion and the values
//! stored on the final triangles come from the same routine.

use glam::{DVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Samples closer than this to the query get the full weight.
pub const SNAP_EPSILON: f32 = 1e-4;
/// Offset added to distances in inverse-distance weighting.
pub const IDW_DISTANCE_BIAS: f32 = 0.001;
const BARYCENTRIC_TOLERANCE: f32 = 1e-5;
const DEGENERATE_AREA: f64 = 1e-12;

/// A triangle over sample indices, counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub indices: [usize; 3],
    pub circumcenter: Vec2,
    pub circumradius_sq: f32,
}

impl Triangle {
    #[must_use]
    pub fn contains_index(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }
}

/// Circumcenter and squared radius of `abc`; `None` for collinear points.
#[must_use]
pub fn circumcircle(a: Vec2, b: Vec2, c: Vec2) -> Option<(Vec2, f32)> {
    circumcircle_f64(a.as_dvec2(), b.as_dvec2(), c.as_dvec2())
        .map(|(center, r_sq)| (center.as_vec2(), r_sq as f32))
}

fn circumcircle_f64(a: DVec2, b: DVec2, c: DVec2) -> Option<(DVec2, f64)> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < DEGENERATE_AREA {
        return None;
    }

    let a2 = a.length_squared();
    let b2 = b.length_squared();
    let c2 = c.length_squared();
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = DVec2::new(ux, uy);
    Some((center, center.distance_squared(a)))
}

/// Barycentric coordinates of `p` in `abc`; `None` for a degenerate triangle.
#[must_use]
pub fn barycentric(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> Option<Vec3> {
    let e0 = b - a;
    let e1 = c - a;
    let e2 = p - a;

    let d00 = e0.dot(e0);
    let d01 = e0.dot(e1);
    let d11 = e1.dot(e1);
    let d20 = e2.dot(e0);
    let d21 = e2.dot(e1);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-10 {
        return None;
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some(Vec3::new(1.0 - v - w, v, w))
}

/// `1 / (d + bias)` weights over all points, normalized to sum to 1.
#[must_use]
pub fn inverse_distance_weights(p: Vec2, points: &[Vec2]) -> Vec<f32> {
    let mut weights: Vec<f32> = points
        .iter()
        .map(|q| 1.0 / (p.distance(*q) + IDW_DISTANCE_BIAS))
        .collect();
    normalize(&mut weights);
    weights
}

fn normalize(weights: &mut [f32]) {
    let total: f32 = weights.iter().sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
}

#[inline]
fn cross(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Bowyer-Watson triangulation of `points`.
///
/// Fewer than three points, or only collinear points, produce no triangles.
/// Points duplicating an earlier point are skipped.
#[must_use]
pub fn triangulate(points: &[Vec2]) -> Vec<Triangle> {
    if points.len() < 3 {
        return Vec::new();
    }

    let mut min = DVec2::splat(f64::INFINITY);
    let mut max = DVec2::splat(f64::NEG_INFINITY);
    for p in points {
        min = min.min(p.as_dvec2());
        max = max.max(p.as_dvec2());
    }
    min -= DVec2::ONE;
    max += DVec2::ONE;
    let dmax = (max - min).max_element();
    let mid = (min + max) * 0.5;

    // Super triangle occupies slots 0..3; samples are offset by 3
    let mut verts: Vec<DVec2> = Vec::with_capacity(points.len() + 3);
    verts.push(DVec2::new(mid.x - 20.0 * dmax, mid.y - dmax));
    verts.push(DVec2::new(mid.x + 20.0 * dmax, mid.y - dmax));
    verts.push(DVec2::new(mid.x, mid.y + 20.0 * dmax));
    verts.extend(points.iter().map(|p| p.as_dvec2()));

    struct Working {
        indices: [usize; 3],
        center: DVec2,
        radius_sq: f64,
    }

    let make = |verts: &[DVec2], indices: [usize; 3]| -> Option<Working> {
        let [a, b, c] = indices.map(|i| verts[i]);
        let (center, radius_sq) = circumcircle_f64(a, b, c)?;
        Some(Working {
            indices,
            center,
            radius_sq,
        })
    };

    let mut triangles: Vec<Working> = make(&verts, [0, 1, 2]).into_iter().collect();

    for i in 3..verts.len() {
        let p = verts[i];
        if verts[3..i].iter().any(|q| q.distance_squared(p) < 1e-12) {
            log::debug!("Skipping duplicate blend sample {}", i - 3);
            continue;
        }

        let mut bad: SmallVec<[usize; 16]> = SmallVec::new();
        for (t, tri) in triangles.iter().enumerate() {
            if tri.center.distance_squared(p) < tri.radius_sq {
                bad.push(t);
            }
        }

        // Boundary of the cavity: edges not shared by two bad triangles
        let mut polygon: SmallVec<[(usize, usize); 16]> = SmallVec::new();
        for &t in &bad {
            let idx = triangles[t].indices;
            for e in 0..3 {
                let (e0, e1) = (idx[e], idx[(e + 1) % 3]);
                let shared = bad.iter().any(|&o| {
                    o != t && {
                        let oi = triangles[o].indices;
                        (0..3).any(|k| {
                            let (o0, o1) = (oi[k], oi[(k + 1) % 3]);
                            (e0 == o0 && e1 == o1) || (e0 == o1 && e1 == o0)
                        })
                    }
                });
                if !shared {
                    polygon.push((e0, e1));
                }
            }
        }

        for &t in bad.iter().rev() {
            triangles.swap_remove(t);
        }

        for (e0, e1) in polygon {
            let mut indices = [e0, e1, i];
            if cross(verts[indices[0]], verts[indices[1]], verts[indices[2]]) < 0.0 {
                indices.swap(1, 2);
            }
            if let Some(tri) = make(&verts, indices) {
                triangles.push(tri);
            }
        }
    }

    triangles
        .into_iter()
        .filter(|t| t.indices.iter().all(|&i| i >= 3))
        .filter(|t| {
            let [a, b, c] = t.indices.map(|i| verts[i]);
            cross(a, b, c).abs() > DEGENERATE_AREA
        })
        .map(|t| Triangle {
            indices: t.indices.map(|i| i - 3),
            circumcenter: t.center.as_vec2(),
            circumradius_sq: t.radius_sq as f32,
        })
        .collect()
}

// ============================================================================
// Weight lookup
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Barycentric inside the hull, inverse-distance outside.
    #[default]
    Barycentric,
    InverseDistance,
}

/// Sample positions plus their triangulation.
#[derive(Debug, Clone, Default)]
pub struct Triangulation {
    points: Vec<Vec2>,
    triangles: Vec<Triangle>,
    mode: WeightMode,
}

impl Triangulation {
    #[must_use]
    pub fn new(points: Vec<Vec2>, mode: WeightMode) -> Self {
        let triangles = match mode {
            WeightMode::Barycentric => triangulate(&points),
            WeightMode::InverseDistance => Vec::new(),
        };
        log::trace!(
            "Triangulated {} blend samples into {} triangles",
            points.len(),
            triangles.len()
        );
        Self {
            points,
            triangles,
            mode,
        }
    }

    #[must_use]
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    #[must_use]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    #[must_use]
    pub fn mode(&self) -> WeightMode {
        self.mode
    }

    /// First triangle whose barycentric coordinates for `p` are all non-negative.
    #[must_use]
    pub fn find_containing_triangle(&self, p: Vec2) -> Option<(usize, Vec3)> {
        self.triangles.iter().enumerate().find_map(|(i, tri)| {
            let [a, b, c] = tri.indices.map(|k| self.points[k]);
            let bary = barycentric(p, a, b, c)?;
            (bary.min_element() >= -BARYCENTRIC_TOLERANCE).then_some((i, bary))
        })
    }

    /// Per-sample weights at `p`, summing to 1 (empty when there are no samples).
    #[must_use]
    pub fn sample_weights(&self, p: Vec2) -> Vec<f32> {
        let mut weights = vec![0.0; self.points.len()];
        self.sample_weights_into(p, &mut weights);
        weights
    }

    /// Writes weights into `out`, which must be as long as the point list.
    pub fn sample_weights_into(&self, p: Vec2, out: &mut [f32]) {
        let n = self.points.len();
        if n == 0 || out.len() < n {
            return;
        }
        out[..n].fill(0.0);

        if n == 1 {
            out[0] = 1.0;
            return;
        }

        // Exactly on a sample: that sample alone
        if let Some(i) = self.points.iter().position(|q| q.distance(p) <= SNAP_EPSILON) {
            out[i] = 1.0;
            return;
        }

        if n == 2 {
            let d0 = p.distance(self.points[0]);
            let d1 = p.distance(self.points[1]);
            let total = d0 + d1;
            if total > 0.001 {
                out[0] = d1 / total;
                out[1] = d0 / total;
            } else {
                out[0] = 0.5;
                out[1] = 0.5;
            }
            return;
        }

        if self.mode == WeightMode::Barycentric
            && let Some((t, bary)) = self.find_containing_triangle(p)
        {
            let bary = bary.max(Vec3::ZERO);
            let indices = self.triangles[t].indices;
            out[indices[0]] = bary.x;
            out[indices[1]] = bary.y;
            out[indices[2]] = bary.z;
            normalize(&mut out[..n]);
            return;
        }

        for (w, q) in out.iter_mut().zip(&self.points) {
            *w = 1.0 / (p.distance(*q) + IDW_DISTANCE_BIAS);
        }
        normalize(&mut out[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_gives_two_triangles() {
        let points = vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        let tris = triangulate(&points);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn collinear_points_have_no_triangles() {
        let points = vec![Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)];
        assert!(triangulate(&points).is_empty());
    }

    #[test]
    fn barycentric_of_vertex() {
        let bary = barycentric(Vec2::X, Vec2::ZERO, Vec2::X, Vec2::Y).unwrap();
        assert!((bary - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn outside_hull_falls_back_to_idw() {
        let tri = Triangulation::new(vec![Vec2::ZERO, Vec2::X, Vec2::Y], WeightMode::Barycentric);
        assert!(tri.find_containing_triangle(Vec2::splat(5.0)).is_none());
        let w = tri.sample_weights(Vec2::splat(5.0));
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(w.iter().all(|&x| x > 0.0));
    }
}
