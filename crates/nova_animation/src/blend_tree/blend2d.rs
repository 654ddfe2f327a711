use glam::Vec2;

use super::{BlendNode, BlendNodeDesc, Blend2DPointDesc, EvalContext, PoseAccumulator, WEIGHT_THRESHOLD, push_unique};
use crate::delaunay::{Triangulation, WeightMode};
use crate::pose::AnimationPose;

#[derive(Debug, Clone)]
pub struct Blend2DPoint {
    pub node: Box<dyn BlendNode>,
    pub position: Vec2,
    pub speed: f32,
}

/// Blends children placed in a 2D parameter plane.
///
/// Weights come from a [`Triangulation`] of the point positions, which is
/// rebuilt whenever points are added or removed.
#[derive(Debug, Clone)]
pub struct Blend2DNode {
    name: String,
    parameter_x: String,
    parameter_y: String,
    value: Vec2,
    points: Vec<Blend2DPoint>,
    triangulation: Triangulation,
    /// Parameter rectangle; positions outside are clamped before weighting.
    bounds: Option<(Vec2, Vec2)>,
    pub sync_enabled: bool,
    weights: Vec<f32>,
}

impl Blend2DNode {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        parameter_x: impl Into<String>,
        parameter_y: impl Into<String>,
        mode: WeightMode,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_x: parameter_x.into(),
            parameter_y: parameter_y.into(),
            value: Vec2::ZERO,
            points: Vec::new(),
            triangulation: Triangulation::new(Vec::new(), mode),
            bounds: None,
            sync_enabled: false,
            weights: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_point(mut self, node: Box<dyn BlendNode>, position: Vec2) -> Self {
        self.add_point(node, position, 1.0);
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, min: Vec2, max: Vec2) -> Self {
        self.set_bounds(Some((min, max)));
        self
    }

    pub fn set_bounds(&mut self, bounds: Option<(Vec2, Vec2)>) {
        self.bounds = bounds.map(|(min, max)| (min.min(max), max.max(min)));
    }

    #[must_use]
    pub fn bounds(&self) -> Option<(Vec2, Vec2)> {
        self.bounds
    }

    #[must_use]
    pub fn with_sync(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    pub fn add_point(&mut self, node: Box<dyn BlendNode>, position: Vec2, speed: f32) {
        self.points.push(Blend2DPoint {
            node,
            position,
            speed,
        });
        self.retriangulate();
    }

    pub fn remove_point(&mut self, index: usize) -> Option<Blend2DPoint> {
        if index >= self.points.len() {
            return None;
        }
        let point = self.points.remove(index);
        self.retriangulate();
        Some(point)
    }

    #[must_use]
    pub fn points(&self) -> &[Blend2DPoint] {
        &self.points
    }

    #[must_use]
    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    #[must_use]
    pub fn mode(&self) -> WeightMode {
        self.triangulation.mode()
    }

    pub fn set_mode(&mut self, mode: WeightMode) {
        if mode != self.triangulation.mode() {
            self.triangulation = Triangulation::new(self.triangulation.points().to_vec(), mode);
        }
    }

    #[must_use]
    pub fn parameters(&self) -> (&str, &str) {
        (&self.parameter_x, &self.parameter_y)
    }

    #[must_use]
    pub fn value(&self) -> Vec2 {
        self.value
    }

    /// Per-point weights at the current parameter position.
    #[must_use]
    pub fn weights(&self) -> Vec<f32> {
        self.triangulation.sample_weights(self.sample_position())
    }

    /// The parameter position clamped to the bounds.
    fn sample_position(&self) -> Vec2 {
        self.bounds.map_or(self.value, |(min, max)| self.value.clamp(min, max))
    }

    fn retriangulate(&mut self) {
        let positions = self.points.iter().map(|p| p.position).collect();
        self.triangulation = Triangulation::new(positions, self.triangulation.mode());
    }

    fn dominant(&self) -> Option<usize> {
        self.weights()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

impl BlendNode for Blend2DNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        if self.points.is_empty() {
            return ctx.identity_pose();
        }

        self.weights.resize(self.points.len(), 0.0);
        let position = self.sample_position();
        self.triangulation.sample_weights_into(position, &mut self.weights);

        let leader = if self.sync_enabled {
            self.weights
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
        } else {
            None
        };

        let mut accumulator = PoseAccumulator::default();
        if let Some(leader) = leader {
            let speed = self.points[leader].speed;
            let pose = self.points[leader].node.evaluate(ctx, dt * speed);
            let phase = self.points[leader].node.normalized_time();
            accumulator.add(pose, self.weights[leader]);

            for (i, point) in self.points.iter_mut().enumerate() {
                if i == leader || self.weights[i] <= WEIGHT_THRESHOLD {
                    continue;
                }
                point.node.set_normalized_time(phase);
                accumulator.add(point.node.evaluate(ctx, 0.0), self.weights[i]);
            }
        } else {
            for (point, &weight) in self.points.iter_mut().zip(&self.weights) {
                if weight <= WEIGHT_THRESHOLD {
                    continue;
                }
                accumulator.add(point.node.evaluate(ctx, dt * point.speed), weight);
            }
        }
        accumulator.finish(ctx)
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        if name == self.parameter_x {
            self.value.x = value;
        }
        if name == self.parameter_y {
            self.value.y = value;
        }
        for point in &mut self.points {
            point.node.set_parameter(name, value);
        }
    }

    fn reset(&mut self) {
        for point in &mut self.points {
            point.node.reset();
        }
    }

    fn clone_node(&self) -> Box<dyn BlendNode> {
        let mut clone = self.clone();
        clone.reset();
        Box::new(clone)
    }

    fn duration(&self) -> f32 {
        self.weights()
            .iter()
            .zip(&self.points)
            .map(|(w, p)| w * p.node.duration())
            .sum()
    }

    fn normalized_time(&self) -> f32 {
        self.dominant()
            .map_or(0.0, |i| self.points[i].node.normalized_time())
    }

    fn set_normalized_time(&mut self, normalized: f32) {
        for point in &mut self.points {
            point.node.set_normalized_time(normalized);
        }
    }

    fn parameter_names(&self, out: &mut Vec<String>) {
        push_unique(out, &self.parameter_x);
        push_unique(out, &self.parameter_y);
        for point in &self.points {
            point.node.parameter_names(out);
        }
    }

    fn describe(&self) -> BlendNodeDesc {
        BlendNodeDesc::Blend2D {
            name: self.name.clone(),
            parameter_x: self.parameter_x.clone(),
            parameter_y: self.parameter_y.clone(),
            mode: self.mode(),
            sync: self.sync_enabled,
            bounds: self.bounds.map(|(min, max)| [min, max]),
            points: self
                .points
                .iter()
                .map(|p| Blend2DPointDesc {
                    node: p.node.describe(),
                    position: p.position,
                    speed: p.speed,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::ClipNode;
    use crate::blend_tree::test_support::{hold, two_bone_skeleton};

    fn directional() -> Blend2DNode {
        Blend2DNode::new("move", "x", "y", WeightMode::Barycentric)
            .with_point(Box::new(ClipNode::new(hold("idle", 0.0, 1.0))), Vec2::ZERO)
            .with_point(Box::new(ClipNode::new(hold("right", 1.0, 1.0))), Vec2::X)
            .with_point(Box::new(ClipNode::new(hold("forward", 2.0, 1.0))), Vec2::Y)
            .with_point(Box::new(ClipNode::new(hold("diag", 3.0, 1.0))), Vec2::ONE)
    }

    #[test]
    fn weight_one_on_sample() {
        let mut node = directional();
        node.set_parameter("x", 1.0);
        node.set_parameter("y", 0.0);
        let weights = node.weights();
        assert!((weights[1] - 1.0).abs() < 1e-5);
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn evaluates_weighted_average() {
        let skeleton = two_bone_skeleton();
        let mut ctx = EvalContext::new(&skeleton);
        let mut node = directional();
        node.set_parameter("x", 0.5);
        node.set_parameter("y", 0.0);
        let pose = node.evaluate(&mut ctx, 0.1);
        assert!((pose.get(0).position.x - 0.5).abs() < 1e-4);
    }

    #[test]
    fn removing_points_retriangulates() {
        let mut node = directional();
        assert!(!node.triangulation().triangles().is_empty());
        node.remove_point(3);
        node.remove_point(2);
        assert!(node.triangulation().triangles().is_empty());
        assert_eq!(node.points().len(), 2);
    }

    #[test]
    fn parameter_names_collects_axes() {
        let node = directional();
        let mut names = Vec::new();
        node.parameter_names(&mut names);
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }
}
