use super::{BlendNode, BlendNodeDesc, Blend1DEntryDesc, EvalContext, push_unique};
use crate::pose::AnimationPose;

#[derive(Debug, Clone)]
pub struct Blend1DEntry {
    pub node: Box<dyn BlendNode>,
    pub threshold: f32,
    /// Playback speed multiplier for this child.
    pub speed: f32,
}

/// Blends the two children whose thresholds bracket a single parameter.
#[derive(Debug, Clone)]
pub struct Blend1DNode {
    name: String,
    parameter: String,
    value: f32,
    entries: Vec<Blend1DEntry>,
    /// Parameter range; values outside are clamped before weighting.
    bounds: Option<(f32, f32)>,
    pub sync_enabled: bool,
}

impl Blend1DNode {
    #[must_use]
    pub fn new(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: parameter.into(),
            value: 0.0,
            entries: Vec::new(),
            bounds: None,
            sync_enabled: false,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, min: f32, max: f32) -> Self {
        self.set_bounds(Some((min, max)));
        self
    }

    pub fn set_bounds(&mut self, bounds: Option<(f32, f32)>) {
        self.bounds = bounds.map(|(min, max)| (min.min(max), max.max(min)));
    }

    #[must_use]
    pub fn bounds(&self) -> Option<(f32, f32)> {
        self.bounds
    }

    #[must_use]
    pub fn with_entry(mut self, node: Box<dyn BlendNode>, threshold: f32) -> Self {
        self.add_entry(node, threshold, 1.0);
        self
    }

    #[must_use]
    pub fn with_sync(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Inserts a child, keeping entries ordered by threshold.
    pub fn add_entry(&mut self, node: Box<dyn BlendNode>, threshold: f32, speed: f32) {
        let at = self.entries.partition_point(|e| e.threshold <= threshold);
        self.entries.insert(
            at,
            Blend1DEntry {
                node,
                threshold,
                speed,
            },
        );
    }

    pub fn remove_entry(&mut self, index: usize) -> Option<Blend1DEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    #[must_use]
    pub fn entries(&self) -> &[Blend1DEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Blend1DEntry] {
        &mut self.entries
    }

    #[must_use]
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    #[must_use]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Bracketing entries for `value` and the fraction between them.
    /// `value` is first clamped to the bounds, if any. Values outside the
    /// threshold range clamp to the first or last entry.
    #[must_use]
    pub fn find_blend_indices(&self, value: f32) -> (usize, usize, f32) {
        let value = self.bounds.map_or(value, |(min, max)| value.clamp(min, max));
        let n = self.entries.len();
        if n <= 1 {
            return (0, 0, 0.0);
        }
        if value <= self.entries[0].threshold {
            return (0, 0, 0.0);
        }
        if value >= self.entries[n - 1].threshold {
            return (n - 1, n - 1, 0.0);
        }

        let upper = self.entries.partition_point(|e| e.threshold <= value).min(n - 1);
        let lower = upper - 1;
        let range = self.entries[upper].threshold - self.entries[lower].threshold;
        let t = if range > 0.0 {
            (value - self.entries[lower].threshold) / range
        } else {
            0.0
        };
        (lower, upper, t.clamp(0.0, 1.0))
    }

    /// Per-entry weights at the current parameter value.
    #[must_use]
    pub fn weights(&self) -> Vec<f32> {
        let mut weights = vec![0.0; self.entries.len()];
        if weights.is_empty() {
            return weights;
        }
        let (lower, upper, t) = self.find_blend_indices(self.value);
        weights[lower] += 1.0 - t;
        weights[upper] += t;
        weights
    }
}

impl BlendNode for Blend1DNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        if self.entries.is_empty() {
            return ctx.identity_pose();
        }

        let (lower, upper, t) = self.find_blend_indices(self.value);
        if lower == upper {
            let entry = &mut self.entries[lower];
            return entry.node.evaluate(ctx, dt * entry.speed);
        }

        if self.sync_enabled {
            // The heavier side leads and the other follows its phase
            let (leader, follower) = if t >= 0.5 { (upper, lower) } else { (lower, upper) };
            let leader_speed = self.entries[leader].speed;
            let leader_pose = self.entries[leader].node.evaluate(ctx, dt * leader_speed);
            let phase = self.entries[leader].node.normalized_time();

            let follow = &mut self.entries[follower].node;
            follow.set_normalized_time(phase);
            let follower_pose = follow.evaluate(ctx, 0.0);

            return if leader == upper {
                AnimationPose::blend(&follower_pose, &leader_pose, t)
            } else {
                AnimationPose::blend(&leader_pose, &follower_pose, t)
            };
        }

        let lower_speed = self.entries[lower].speed;
        let lower_pose = self.entries[lower].node.evaluate(ctx, dt * lower_speed);
        let upper_speed = self.entries[upper].speed;
        let upper_pose = self.entries[upper].node.evaluate(ctx, dt * upper_speed);
        AnimationPose::blend(&lower_pose, &upper_pose, t)
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        if name == self.parameter {
            self.value = value;
        }
        for entry in &mut self.entries {
            entry.node.set_parameter(name, value);
        }
    }

    fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.node.reset();
        }
    }

    fn clone_node(&self) -> Box<dyn BlendNode> {
        let mut clone = self.clone();
        clone.reset();
        Box::new(clone)
    }

    fn duration(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let (lower, upper, t) = self.find_blend_indices(self.value);
        let a = self.entries[lower].node.duration();
        let b = self.entries[upper].node.duration();
        a + (b - a) * t
    }

    fn normalized_time(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let (lower, upper, t) = self.find_blend_indices(self.value);
        let dominant = if t >= 0.5 { upper } else { lower };
        self.entries[dominant].node.normalized_time()
    }

    fn set_normalized_time(&mut self, normalized: f32) {
        for entry in &mut self.entries {
            entry.node.set_normalized_time(normalized);
        }
    }

    fn parameter_names(&self, out: &mut Vec<String>) {
        push_unique(out, &self.parameter);
        for entry in &self.entries {
            entry.node.parameter_names(out);
        }
    }

    fn describe(&self) -> BlendNodeDesc {
        BlendNodeDesc::Blend1D {
            name: self.name.clone(),
            parameter: self.parameter.clone(),
            sync: self.sync_enabled,
            bounds: self.bounds.map(|(min, max)| [min, max]),
            entries: self
                .entries
                .iter()
                .map(|e| Blend1DEntryDesc {
                    node: e.node.describe(),
                    threshold: e.threshold,
                    speed: e.speed,
                })
                .collect(),
        }
    }
}
